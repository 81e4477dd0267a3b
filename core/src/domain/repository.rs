// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Repository Pattern - Storage Backend Abstraction
//
// Defines the pluggable storage backend for the tool registry, enabling:
// - In-memory storage for development/testing
// - SQLite (single-file, crash-consistent) for production persistence
//
// Every mutation is one transaction: either the tool (including its initial
// fitness row and embedding terms) is fully committed, or nothing is
// observable.

use async_trait::async_trait;
use std::collections::HashMap;

use crate::domain::tool::{Tool, ToolId, TrustLevel, UsageReport};

/// A verified submission ready for insertion. The repository assigns `id`,
/// `created_at`, and `signature`; everything else is decided by the caller.
#[derive(Debug, Clone)]
pub struct NewToolRecord {
    pub name: String,
    pub description: String,
    pub intent: String,
    pub code: String,
    pub test_case: String,
    pub input_schema: Option<serde_json::Value>,
    pub tags: Vec<String>,
    pub author_agent_id: String,
    pub version: u32,
    pub parent_tool_id: Option<ToolId>,
    pub content_hash: String,
    pub trust_level: TrustLevel,
    pub fitness_score: f64,
    pub security_scan_passed: bool,
    pub exec_ms: u64,
    pub mem_kb: u64,
    /// Term-frequency map of the intent text, persisted alongside the tool
    /// so the embedding index can be rebuilt after a restart.
    pub embedding_terms: HashMap<String, f32>,
}

/// Result of applying one usage report.
#[derive(Debug, Clone)]
pub struct UsageOutcome {
    /// True when the `(tool_id, agent_id, timestamp)` key was already seen;
    /// duplicate reports are a no-op.
    pub duplicate: bool,
    /// The tool as of after the report was applied.
    pub tool: Tool,
}

/// Listing filter. The default excludes delisted tools.
#[derive(Debug, Clone, Default)]
pub struct ToolListFilter {
    /// `Some(true)` lists only delisted tools; `Some(false)` or `None` only
    /// active ones.
    pub delisted: Option<bool>,
    pub min_fitness: Option<f64>,
    pub min_trust_level: Option<TrustLevel>,
    pub author: Option<String>,
    pub tag: Option<String>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

impl ToolListFilter {
    pub const DEFAULT_LIMIT: u32 = 50;
    pub const MAX_LIMIT: u32 = 500;

    pub fn effective_limit(&self) -> u32 {
        self.limit.unwrap_or(Self::DEFAULT_LIMIT).min(Self::MAX_LIMIT)
    }

    pub fn effective_offset(&self) -> u32 {
        self.offset.unwrap_or(0)
    }
}

/// Repository interface for the Tool aggregate.
/// One repository for the whole registry context; mutating operations are
/// additionally serialized per tool id by the application services.
#[async_trait]
pub trait ToolRepository: Send + Sync {
    /// Insert a verified record. Enforces at most one non-delisted tool per
    /// content hash; a duplicate yields [`RepositoryError::DuplicateContent`]
    /// with a pointer to the extant tool.
    async fn insert(&self, record: NewToolRecord) -> Result<Tool, RepositoryError>;

    /// Find tool by ID, delisted or not.
    async fn find_by_id(&self, id: ToolId) -> Result<Option<Tool>, RepositoryError>;

    /// Find the active (non-delisted) tool carrying this content hash.
    async fn find_active_by_hash(&self, content_hash: &str) -> Result<Option<Tool>, RepositoryError>;

    /// List tools matching a filter, newest first.
    async fn list(&self, filter: &ToolListFilter) -> Result<Vec<Tool>, RepositoryError>;

    /// Append a usage event and recompute telemetry aggregates in the same
    /// transaction. Reports against delisted tools are accepted into the
    /// log but leave aggregates untouched (delisted is a write-filter gate).
    async fn record_usage(&self, report: &UsageReport) -> Result<UsageOutcome, RepositoryError>;

    /// Persist a recomputed fitness score and low-fitness streak.
    async fn update_fitness(
        &self,
        id: ToolId,
        fitness: f64,
        low_fitness_streak: u32,
    ) -> Result<(), RepositoryError>;

    /// Persist a trust escalation.
    async fn update_trust(&self, id: ToolId, trust: TrustLevel) -> Result<(), RepositoryError>;

    /// Mark a tool delisted. Idempotent; terminal — a delisted tool never
    /// returns to active state.
    async fn mark_delisted(&self, id: ToolId, reason: &str) -> Result<(), RepositoryError>;

    /// All persisted embedding term maps, for index rebuild at startup.
    /// Delisted tools are excluded.
    async fn load_embedding_terms(
        &self,
    ) -> Result<Vec<(ToolId, HashMap<String, f32>)>, RepositoryError>;
}

/// Repository errors
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("Entity not found: {0}")]
    NotFound(String),

    #[error("Duplicate artifact; extant tool is {existing_id}")]
    DuplicateContent { existing_id: ToolId },

    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<sqlx::Error> for RepositoryError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => RepositoryError::NotFound("Row not found".to_string()),
            _ => RepositoryError::Database(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for RepositoryError {
    fn from(err: serde_json::Error) -> Self {
        RepositoryError::Serialization(err.to_string())
    }
}
