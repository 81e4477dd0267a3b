// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # SQLite Connection Pool
//!
//! Wraps `sqlx::sqlite::SqlitePool` in a thin `Database` newtype that can be
//! injected into the repository implementation. The store is a single file
//! in the configured data directory, opened with WAL journaling and
//! `synchronous=FULL` so every committed mutation survives a host crash.
//!
//! The schema is applied idempotently at open; there is no separate
//! migration tool for a single-node embedded store.

use anyhow::{Context, Result};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};
use std::path::Path;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS tools (
    id                    TEXT PRIMARY KEY,
    name                  TEXT NOT NULL,
    description           TEXT NOT NULL,
    intent                TEXT NOT NULL,
    code                  TEXT NOT NULL,
    test_case             TEXT NOT NULL,
    input_schema          TEXT,
    tags                  TEXT NOT NULL,
    author_agent_id       TEXT NOT NULL,
    version               INTEGER NOT NULL,
    parent_tool_id        TEXT,
    content_hash          TEXT NOT NULL,
    signature             TEXT NOT NULL,
    trust_level           INTEGER NOT NULL,
    created_at            TEXT NOT NULL,
    total_uses            INTEGER NOT NULL DEFAULT 0,
    successful_uses       INTEGER NOT NULL DEFAULT 0,
    unique_agents         INTEGER NOT NULL DEFAULT 0,
    avg_execution_time_ms REAL NOT NULL DEFAULT 0,
    avg_tokens_used       REAL,
    fitness_score         REAL NOT NULL DEFAULT 0,
    low_fitness_streak    INTEGER NOT NULL DEFAULT 0,
    delisted              INTEGER NOT NULL DEFAULT 0,
    delist_reason         TEXT,
    security_scan_passed  INTEGER NOT NULL,
    exec_ms               INTEGER NOT NULL,
    mem_kb                INTEGER NOT NULL
);

-- At most one non-delisted tool per content hash (enforced by the store
-- itself, not only by the insert path).
CREATE UNIQUE INDEX IF NOT EXISTS idx_tools_active_hash
    ON tools(content_hash) WHERE delisted = 0;

CREATE INDEX IF NOT EXISTS idx_tools_author ON tools(author_agent_id);
CREATE INDEX IF NOT EXISTS idx_tools_parent ON tools(parent_tool_id);

CREATE TABLE IF NOT EXISTS usage_events (
    tool_id           TEXT NOT NULL REFERENCES tools(id),
    agent_id          TEXT NOT NULL,
    success           INTEGER NOT NULL,
    execution_time_ms INTEGER NOT NULL,
    tokens_used       INTEGER,
    timestamp         TEXT NOT NULL,
    PRIMARY KEY (tool_id, agent_id, timestamp)
);

CREATE TABLE IF NOT EXISTS embedding_vectors (
    tool_id TEXT PRIMARY KEY REFERENCES tools(id),
    terms   TEXT NOT NULL
);
"#;

#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open (creating if missing) the single-file store at `path`.
    pub async fn open(path: &Path) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Full)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .with_context(|| format!("failed to open registry store at {}", path.display()))?;

        let db = Self { pool };
        db.migrate().await?;
        Ok(db)
    }

    /// A private in-memory store. Pinned to a single connection — each
    /// SQLite `:memory:` connection is its own database.
    pub async fn open_in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(":memory:")
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .min_connections(1)
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .context("failed to open in-memory registry store")?;

        let db = Self { pool };
        db.migrate().await?;
        Ok(db)
    }

    async fn migrate(&self) -> Result<()> {
        sqlx::raw_sql(SCHEMA)
            .execute(&self.pool)
            .await
            .context("failed to apply registry schema")?;
        Ok(())
    }

    pub fn get_pool(&self) -> &SqlitePool {
        &self.pool
    }
}
