// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Publishing — submit and fork
//!
//! The write path of the evolution loop: a submission runs the Gauntlet,
//! and only an approved artifact is inserted into the registry, indexed
//! for discovery, and seeded with an initial fitness score. Insertion is
//! reported complete only after the index update, so a submitter can
//! immediately discover its own tool.
//!
//! Forking is the same pipeline with lineage attached: the child records
//! its parent and takes `parent.version + 1`.

use chrono::Utc;
use std::sync::Arc;
use thiserror::Error;

use crate::application::gauntlet::Gauntlet;
use crate::application::ToolLockTable;
use crate::domain::fitness::{compute_fitness, FitnessInputs, FitnessParams};
use crate::domain::repository::{NewToolRecord, RepositoryError, ToolRepository};
use crate::domain::tool::{content_hash, Tool, ToolId, TrustLevel};
use crate::domain::sandbox::SandboxError;
use crate::domain::verdict::{ScanResult, Verdict};
use crate::infrastructure::embedding::EmbeddingIndex;

/// A publish request, identical for submit and fork.
#[derive(Debug, Clone)]
pub struct ToolSubmission {
    pub name: String,
    pub description: String,
    pub intent: String,
    pub code: String,
    pub test_case: String,
    pub tags: Vec<String>,
    pub input_schema: Option<serde_json::Value>,
    pub author_agent_id: String,
}

impl ToolSubmission {
    fn validate(&self) -> Result<(), PublishError> {
        for (field, value) in [
            ("name", &self.name),
            ("intent", &self.intent),
            ("code", &self.code),
            ("test_case", &self.test_case),
            ("author_agent_id", &self.author_agent_id),
        ] {
            if value.trim().is_empty() {
                return Err(PublishError::InvalidInput(format!("{field} must not be empty")));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct PublishOutcome {
    pub tool: Tool,
    pub verdict: Verdict,
}

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("artifact already registered as {existing_id}")]
    Duplicate { existing_id: ToolId },

    #[error("static screening rejected the submission")]
    RejectedStatic { scan: ScanResult },

    #[error("sandbox run rejected the submission")]
    RejectedRuntime { verdict: Verdict },

    #[error("sandbox pool is overloaded")]
    Overloaded,

    #[error("parent tool {0} not found")]
    ParentNotFound(ToolId),

    #[error("parent tool {0} is delisted")]
    ParentDelisted(ToolId),

    #[error("sandbox failure: {0}")]
    Sandbox(SandboxError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl From<SandboxError> for PublishError {
    fn from(err: SandboxError) -> Self {
        match err {
            SandboxError::Overloaded => PublishError::Overloaded,
            other => PublishError::Sandbox(other),
        }
    }
}

pub struct PublishingService {
    gauntlet: Gauntlet,
    repo: Arc<dyn ToolRepository>,
    index: Arc<EmbeddingIndex>,
    fitness: FitnessParams,
    locks: Arc<ToolLockTable>,
}

impl PublishingService {
    pub fn new(
        gauntlet: Gauntlet,
        repo: Arc<dyn ToolRepository>,
        index: Arc<EmbeddingIndex>,
        fitness: FitnessParams,
        locks: Arc<ToolLockTable>,
    ) -> Self {
        Self { gauntlet, repo, index, fitness, locks }
    }

    pub async fn submit(&self, submission: ToolSubmission) -> Result<PublishOutcome, PublishError> {
        submission.validate()?;
        self.publish(submission, None, 1).await
    }

    pub async fn fork(
        &self,
        parent_id: ToolId,
        submission: ToolSubmission,
    ) -> Result<PublishOutcome, PublishError> {
        submission.validate()?;

        // Hold the parent's lock across the existence/delist check so a
        // racing delist cannot slip a fork under an inactive parent.
        let parent_lock = self.locks.handle(parent_id);
        let _guard = parent_lock.lock().await;

        let parent = self
            .repo
            .find_by_id(parent_id)
            .await?
            .ok_or(PublishError::ParentNotFound(parent_id))?;
        if parent.delisted {
            return Err(PublishError::ParentDelisted(parent_id));
        }

        self.publish(submission, Some(parent_id), parent.version + 1).await
    }

    async fn publish(
        &self,
        submission: ToolSubmission,
        parent_tool_id: Option<ToolId>,
        version: u32,
    ) -> Result<PublishOutcome, PublishError> {
        let hash = content_hash(&submission.code, &submission.test_case);

        // Reject known duplicates before burning a sandbox slot; the
        // store's unique index backstops the race.
        if let Some(existing) = self.repo.find_active_by_hash(&hash).await? {
            metrics::counter!("publish_duplicate_total").increment(1);
            return Err(PublishError::Duplicate { existing_id: existing.id });
        }

        let verdict = self
            .gauntlet
            .verify(&submission.code, &submission.test_case)
            .await?;
        if !verdict.security_scan.safe {
            return Err(PublishError::RejectedStatic {
                scan: verdict.security_scan,
            });
        }
        if !verdict.approved {
            return Err(PublishError::RejectedRuntime { verdict });
        }

        let now = Utc::now();
        let seed_inputs = FitnessInputs {
            total_uses: 0,
            successful_uses: 0,
            unique_agents: 0,
            avg_execution_time_ms: verdict.exec_ms as f64,
            avg_tokens_used: None,
            created_at: now,
        };
        let seed_fitness = compute_fitness(&seed_inputs, &self.fitness, now);

        let embedding_terms = self.index.embed(&submission.intent);
        let record = NewToolRecord {
            name: submission.name,
            description: submission.description,
            intent: submission.intent.clone(),
            code: submission.code,
            test_case: submission.test_case,
            input_schema: submission.input_schema,
            tags: submission.tags,
            author_agent_id: submission.author_agent_id,
            version,
            parent_tool_id,
            content_hash: hash,
            trust_level: TrustLevel::Verified,
            fitness_score: seed_fitness,
            security_scan_passed: true,
            exec_ms: verdict.exec_ms,
            mem_kb: verdict.mem_kb,
            embedding_terms: embedding_terms.clone(),
        };

        let tool = match self.repo.insert(record).await {
            Ok(tool) => tool,
            Err(RepositoryError::DuplicateContent { existing_id }) => {
                return Err(PublishError::Duplicate { existing_id })
            }
            Err(other) => return Err(other.into()),
        };

        self.index.index_terms(tool.id, embedding_terms);
        metrics::counter!("publish_accepted_total").increment(1);
        tracing::info!(
            tool_id = %tool.id,
            version = tool.version,
            forked = parent_tool_id.is_some(),
            "tool published"
        );

        Ok(PublishOutcome { tool, verdict })
    }
}
