// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! In-memory `ToolRepository` for development and tests. Mirrors the SQLite
//! implementation's semantics (duplicate detection, write-filter gate on
//! delisted tools, aggregate recomputation from the event log) without any
//! I/O.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::Utc;

use crate::domain::repository::{
    NewToolRecord, RepositoryError, ToolListFilter, ToolRepository, UsageOutcome,
};
use crate::domain::tool::{record_signature, Tool, ToolId, ToolTelemetry, TrustLevel, UsageReport};

#[derive(Default)]
struct Inner {
    tools: HashMap<ToolId, Tool>,
    events: HashMap<ToolId, Vec<UsageReport>>,
    embeddings: HashMap<ToolId, HashMap<String, f32>>,
}

#[derive(Clone, Default)]
pub struct InMemoryToolRepository {
    inner: Arc<Mutex<Inner>>,
}

impl InMemoryToolRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Inner>, RepositoryError> {
        self.inner
            .lock()
            .map_err(|_| RepositoryError::Database("mutex poisoned".to_string()))
    }
}

fn recompute_aggregates(tool: &mut Tool, events: &[UsageReport]) {
    let total = events.len() as u64;
    let successful = events.iter().filter(|e| e.success).count() as u64;
    let mut agents: Vec<&str> = events.iter().map(|e| e.agent_id.as_str()).collect();
    agents.sort_unstable();
    agents.dedup();
    let avg_ms = if events.is_empty() {
        0.0
    } else {
        events.iter().map(|e| e.execution_time_ms as f64).sum::<f64>() / events.len() as f64
    };
    let with_tokens: Vec<u64> = events.iter().filter_map(|e| e.tokens_used).collect();
    let avg_tokens = if with_tokens.is_empty() {
        None
    } else {
        Some(with_tokens.iter().sum::<u64>() as f64 / with_tokens.len() as f64)
    };

    tool.telemetry = ToolTelemetry {
        total_uses: total,
        successful_uses: successful,
        unique_agents: agents.len() as u64,
        avg_execution_time_ms: avg_ms,
        avg_tokens_used: avg_tokens,
    };
}

#[async_trait]
impl ToolRepository for InMemoryToolRepository {
    async fn insert(&self, record: NewToolRecord) -> Result<Tool, RepositoryError> {
        let mut inner = self.lock()?;

        if let Some(existing) = inner
            .tools
            .values()
            .find(|t| !t.delisted && t.content_hash == record.content_hash)
        {
            return Err(RepositoryError::DuplicateContent {
                existing_id: existing.id,
            });
        }

        let id = ToolId::new();
        let created_at = Utc::now();
        let signature = record_signature(
            &record.content_hash,
            &record.name,
            &record.author_agent_id,
            record.version,
            created_at,
            record.exec_ms,
        );

        let tool = Tool {
            id,
            name: record.name,
            description: record.description,
            intent: record.intent,
            code: record.code,
            test_case: record.test_case,
            input_schema: record.input_schema,
            tags: record.tags,
            author_agent_id: record.author_agent_id,
            version: record.version,
            parent_tool_id: record.parent_tool_id,
            content_hash: record.content_hash,
            signature,
            trust_level: record.trust_level,
            created_at,
            telemetry: ToolTelemetry::default(),
            fitness_score: record.fitness_score,
            low_fitness_streak: 0,
            delisted: false,
            delist_reason: None,
            security_scan_passed: record.security_scan_passed,
            exec_ms: record.exec_ms,
            mem_kb: record.mem_kb,
        };

        inner.embeddings.insert(id, record.embedding_terms);
        inner.events.insert(id, Vec::new());
        inner.tools.insert(id, tool.clone());
        Ok(tool)
    }

    async fn find_by_id(&self, id: ToolId) -> Result<Option<Tool>, RepositoryError> {
        Ok(self.lock()?.tools.get(&id).cloned())
    }

    async fn find_active_by_hash(&self, content_hash: &str) -> Result<Option<Tool>, RepositoryError> {
        Ok(self
            .lock()?
            .tools
            .values()
            .find(|t| !t.delisted && t.content_hash == content_hash)
            .cloned())
    }

    async fn list(&self, filter: &ToolListFilter) -> Result<Vec<Tool>, RepositoryError> {
        let inner = self.lock()?;
        let want_delisted = filter.delisted == Some(true);
        let mut tools: Vec<Tool> = inner
            .tools
            .values()
            .filter(|t| t.delisted == want_delisted)
            .filter(|t| filter.min_fitness.map_or(true, |f| t.fitness_score >= f))
            .filter(|t| {
                filter
                    .min_trust_level
                    .map_or(true, |trust| t.trust_level >= trust)
            })
            .filter(|t| filter.author.as_ref().map_or(true, |a| &t.author_agent_id == a))
            .filter(|t| filter.tag.as_ref().map_or(true, |tag| t.tags.contains(tag)))
            .cloned()
            .collect();
        tools.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(tools
            .into_iter()
            .skip(filter.effective_offset() as usize)
            .take(filter.effective_limit() as usize)
            .collect())
    }

    async fn record_usage(&self, report: &UsageReport) -> Result<UsageOutcome, RepositoryError> {
        let mut inner = self.lock()?;
        if !inner.tools.contains_key(&report.tool_id) {
            return Err(RepositoryError::NotFound(format!(
                "tool {} not found",
                report.tool_id
            )));
        }

        let events = inner.events.entry(report.tool_id).or_default();
        let duplicate = events.iter().any(|e| {
            e.agent_id == report.agent_id && e.timestamp == report.timestamp
        });
        if !duplicate {
            events.push(report.clone());
        }
        let snapshot: Vec<UsageReport> = events.clone();

        let tool = inner
            .tools
            .get_mut(&report.tool_id)
            .ok_or_else(|| RepositoryError::NotFound(format!("tool {} not found", report.tool_id)))?;
        if !duplicate && !tool.delisted {
            recompute_aggregates(tool, &snapshot);
        }
        Ok(UsageOutcome {
            duplicate,
            tool: tool.clone(),
        })
    }

    async fn update_fitness(
        &self,
        id: ToolId,
        fitness: f64,
        low_fitness_streak: u32,
    ) -> Result<(), RepositoryError> {
        let mut inner = self.lock()?;
        let tool = inner
            .tools
            .get_mut(&id)
            .ok_or_else(|| RepositoryError::NotFound(format!("tool {id} not found")))?;
        tool.fitness_score = fitness;
        tool.low_fitness_streak = low_fitness_streak;
        Ok(())
    }

    async fn update_trust(&self, id: ToolId, trust: TrustLevel) -> Result<(), RepositoryError> {
        let mut inner = self.lock()?;
        let tool = inner
            .tools
            .get_mut(&id)
            .ok_or_else(|| RepositoryError::NotFound(format!("tool {id} not found")))?;
        tool.trust_level = trust;
        Ok(())
    }

    async fn mark_delisted(&self, id: ToolId, reason: &str) -> Result<(), RepositoryError> {
        let mut inner = self.lock()?;
        inner.embeddings.remove(&id);
        let tool = inner
            .tools
            .get_mut(&id)
            .ok_or_else(|| RepositoryError::NotFound(format!("tool {id} not found")))?;
        tool.delisted = true;
        if tool.delist_reason.is_none() {
            tool.delist_reason = Some(reason.to_string());
        }
        Ok(())
    }

    async fn load_embedding_terms(
        &self,
    ) -> Result<Vec<(ToolId, HashMap<String, f32>)>, RepositoryError> {
        let inner = self.lock()?;
        Ok(inner
            .embeddings
            .iter()
            .map(|(id, terms)| (*id, terms.clone()))
            .collect())
    }
}
