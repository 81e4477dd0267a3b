// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Telemetry — usage reports, fitness recomputation, delisting
//!
//! Every usage report is appended to the event log, the tool's aggregates
//! are refreshed, and fitness is recomputed synchronously. The same pass
//! evaluates the delisting policy and one-way trust escalation. Reports are
//! idempotent under their `(tool_id, agent_id, timestamp)` key; re-applying
//! a duplicate is a no-op. Reports against delisted tools are accepted but
//! change nothing — delisted is terminal.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use thiserror::Error;

use crate::application::ToolLockTable;
use crate::domain::fitness::{
    compute_fitness, should_delist, should_escalate_trust, FitnessParams,
};
use crate::domain::repository::{RepositoryError, ToolRepository};
use crate::domain::tool::{ToolId, TrustLevel, UsageReport};
use crate::infrastructure::embedding::EmbeddingIndex;

/// An incoming usage report. `timestamp` defaults to receipt time; callers
/// that retry deliveries should pass an explicit one so the retry is
/// recognized as a duplicate.
#[derive(Debug, Clone)]
pub struct UsageIngest {
    pub tool_id: ToolId,
    pub agent_id: String,
    pub success: bool,
    pub execution_time_ms: u64,
    pub tokens_used: Option<u64>,
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct UsageResult {
    pub fitness: f64,
    pub delisted: bool,
    pub trust_level: TrustLevel,
    pub duplicate: bool,
}

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("tool {0} not found")]
    NotFound(ToolId),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

pub struct TelemetryService {
    repo: Arc<dyn ToolRepository>,
    index: Arc<EmbeddingIndex>,
    params: FitnessParams,
    locks: Arc<ToolLockTable>,
}

impl TelemetryService {
    pub fn new(
        repo: Arc<dyn ToolRepository>,
        index: Arc<EmbeddingIndex>,
        params: FitnessParams,
        locks: Arc<ToolLockTable>,
    ) -> Self {
        Self { repo, index, params, locks }
    }

    pub async fn report_usage(&self, ingest: UsageIngest) -> Result<UsageResult, TelemetryError> {
        if ingest.agent_id.trim().is_empty() {
            return Err(TelemetryError::InvalidInput(
                "agent_id must not be empty".to_string(),
            ));
        }

        let report = UsageReport {
            tool_id: ingest.tool_id,
            agent_id: ingest.agent_id,
            success: ingest.success,
            execution_time_ms: ingest.execution_time_ms,
            tokens_used: ingest.tokens_used,
            timestamp: ingest.timestamp.unwrap_or_else(Utc::now),
        };

        // Reports for one tool apply in arrival order.
        let lock = self.locks.handle(report.tool_id);
        let _guard = lock.lock().await;

        let outcome = match self.repo.record_usage(&report).await {
            Ok(outcome) => outcome,
            Err(RepositoryError::NotFound(_)) => {
                return Err(TelemetryError::NotFound(report.tool_id))
            }
            Err(other) => return Err(other.into()),
        };
        metrics::counter!("usage_reports_total").increment(1);

        let tool = outcome.tool;
        if outcome.duplicate || tool.delisted {
            return Ok(UsageResult {
                fitness: tool.fitness_score,
                delisted: tool.delisted,
                trust_level: tool.trust_level,
                duplicate: outcome.duplicate,
            });
        }

        let now = Utc::now();
        let fitness = compute_fitness(&tool.fitness_inputs(), &self.params, now);
        let streak = if fitness < self.params.fitness_floor {
            tool.low_fitness_streak + 1
        } else {
            0
        };
        self.repo.update_fitness(tool.id, fitness, streak).await?;

        if let Some(reason) = should_delist(&tool.fitness_inputs(), streak as u64, &self.params) {
            self.repo.mark_delisted(tool.id, reason.as_str()).await?;
            self.index.remove(tool.id);
            metrics::counter!("tools_delisted_total").increment(1);
            tracing::info!(tool_id = %tool.id, reason = reason.as_str(), "tool delisted");
            return Ok(UsageResult {
                fitness,
                delisted: true,
                trust_level: tool.trust_level,
                duplicate: false,
            });
        }

        let mut trust_level = tool.trust_level;
        if should_escalate_trust(&tool) {
            trust_level = TrustLevel::BattleTested;
            self.repo.update_trust(tool.id, trust_level).await?;
            tracing::info!(tool_id = %tool.id, "tool escalated to battle-tested");
        }

        Ok(UsageResult {
            fitness,
            delisted: false,
            trust_level,
            duplicate: false,
        })
    }
}
