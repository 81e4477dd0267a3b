// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # SQLite Tool Repository
//!
//! Production `ToolRepository` implementation backed by the `tools`,
//! `usage_events`, and `embedding_vectors` tables via `sqlx`. Every
//! mutation runs in one transaction against a WAL store with synchronous
//! commits, so a tool is either fully committed (row + embedding terms) or
//! not observable at all.
//!
//! Telemetry aggregates are recomputed from the append-only event log
//! inside the transaction that appends to it, which keeps
//! `successful_uses ≤ total_uses` and `unique_agents ≤ total_uses`
//! structural rather than maintained by hand.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqlitePool, SqliteRow};
use sqlx::Row;
use std::collections::HashMap;
use uuid::Uuid;

use crate::domain::repository::{
    NewToolRecord, RepositoryError, ToolListFilter, ToolRepository, UsageOutcome,
};
use crate::domain::tool::{
    record_signature, Tool, ToolId, ToolTelemetry, TrustLevel, UsageReport,
};

pub struct SqliteToolRepository {
    pool: SqlitePool,
}

impl SqliteToolRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn tool_from_row(row: &SqliteRow) -> Result<Tool, RepositoryError> {
    let id: String = row.get("id");
    let parent: Option<String> = row.get("parent_tool_id");
    let tags_json: String = row.get("tags");
    let input_schema_json: Option<String> = row.get("input_schema");
    let trust: i64 = row.get("trust_level");
    let created_at: DateTime<Utc> = row.get("created_at");
    let total_uses: i64 = row.get("total_uses");
    let successful_uses: i64 = row.get("successful_uses");
    let unique_agents: i64 = row.get("unique_agents");
    let exec_ms: i64 = row.get("exec_ms");
    let mem_kb: i64 = row.get("mem_kb");
    let version: i64 = row.get("version");
    let low_fitness_streak: i64 = row.get("low_fitness_streak");

    let id = Uuid::parse_str(&id)
        .map_err(|e| RepositoryError::Serialization(format!("bad tool id: {e}")))?;
    let parent_tool_id = match parent {
        Some(p) => Some(ToolId(Uuid::parse_str(&p).map_err(|e| {
            RepositoryError::Serialization(format!("bad parent tool id: {e}"))
        })?)),
        None => None,
    };
    let tags: Vec<String> = serde_json::from_str(&tags_json)?;
    let input_schema: Option<serde_json::Value> = match input_schema_json {
        Some(raw) => Some(serde_json::from_str(&raw)?),
        None => None,
    };
    let trust_level = TrustLevel::from_i64(trust)
        .ok_or_else(|| RepositoryError::Serialization(format!("bad trust level {trust}")))?;

    Ok(Tool {
        id: ToolId(id),
        name: row.get("name"),
        description: row.get("description"),
        intent: row.get("intent"),
        code: row.get("code"),
        test_case: row.get("test_case"),
        input_schema,
        tags,
        author_agent_id: row.get("author_agent_id"),
        version: version as u32,
        parent_tool_id,
        content_hash: row.get("content_hash"),
        signature: row.get("signature"),
        trust_level,
        created_at,
        telemetry: ToolTelemetry {
            total_uses: total_uses as u64,
            successful_uses: successful_uses as u64,
            unique_agents: unique_agents as u64,
            avg_execution_time_ms: row.get("avg_execution_time_ms"),
            avg_tokens_used: row.get("avg_tokens_used"),
        },
        fitness_score: row.get("fitness_score"),
        low_fitness_streak: low_fitness_streak as u32,
        delisted: row.get("delisted"),
        delist_reason: row.get("delist_reason"),
        security_scan_passed: row.get("security_scan_passed"),
        exec_ms: exec_ms as u64,
        mem_kb: mem_kb as u64,
    })
}

const SELECT_TOOL: &str = "SELECT * FROM tools WHERE id = ?1";

#[async_trait]
impl ToolRepository for SqliteToolRepository {
    async fn insert(&self, record: NewToolRecord) -> Result<Tool, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        // Cheap pre-check; the partial unique index is the backstop for a
        // racing insert.
        let existing = sqlx::query("SELECT id FROM tools WHERE content_hash = ?1 AND delisted = 0")
            .bind(&record.content_hash)
            .fetch_optional(&mut *tx)
            .await?;
        if let Some(row) = existing {
            let id: String = row.get("id");
            let existing_id = ToolId(Uuid::parse_str(&id).map_err(|e| {
                RepositoryError::Serialization(format!("bad tool id: {e}"))
            })?);
            return Err(RepositoryError::DuplicateContent { existing_id });
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
        let tags_json = serde_json::to_string(&record.tags)?;
        let input_schema_json = match &record.input_schema {
            Some(v) => Some(serde_json::to_string(v)?),
            None => None,
        };

        let inserted = sqlx::query(
            r#"
            INSERT INTO tools (
                id, name, description, intent, code, test_case, input_schema,
                tags, author_agent_id, version, parent_tool_id, content_hash,
                signature, trust_level, created_at, fitness_score,
                security_scan_passed, exec_ms, mem_kb
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19)
            "#,
        )
        .bind(id.0.to_string())
        .bind(&record.name)
        .bind(&record.description)
        .bind(&record.intent)
        .bind(&record.code)
        .bind(&record.test_case)
        .bind(input_schema_json)
        .bind(tags_json)
        .bind(&record.author_agent_id)
        .bind(record.version as i64)
        .bind(record.parent_tool_id.map(|p| p.0.to_string()))
        .bind(&record.content_hash)
        .bind(&signature)
        .bind(record.trust_level.as_i64())
        .bind(created_at)
        .bind(record.fitness_score)
        .bind(record.security_scan_passed)
        .bind(record.exec_ms as i64)
        .bind(record.mem_kb as i64)
        .execute(&mut *tx)
        .await;

        if let Err(e) = inserted {
            if e.to_string().contains("UNIQUE") {
                // Lost the race on the partial index; report the winner.
                let row =
                    sqlx::query("SELECT id FROM tools WHERE content_hash = ?1 AND delisted = 0")
                        .bind(&record.content_hash)
                        .fetch_one(&mut *tx)
                        .await?;
                let winner: String = row.get("id");
                let existing_id = ToolId(Uuid::parse_str(&winner).map_err(|err| {
                    RepositoryError::Serialization(format!("bad tool id: {err}"))
                })?);
                return Err(RepositoryError::DuplicateContent { existing_id });
            }
            return Err(e.into());
        }

        let terms_json = serde_json::to_string(&record.embedding_terms)?;
        sqlx::query("INSERT INTO embedding_vectors (tool_id, terms) VALUES (?1, ?2)")
            .bind(id.0.to_string())
            .bind(terms_json)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        let row = sqlx::query(SELECT_TOOL)
            .bind(id.0.to_string())
            .fetch_one(&self.pool)
            .await?;
        tool_from_row(&row)
    }

    async fn find_by_id(&self, id: ToolId) -> Result<Option<Tool>, RepositoryError> {
        let row = sqlx::query(SELECT_TOOL)
            .bind(id.0.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(tool_from_row).transpose()
    }

    async fn find_active_by_hash(&self, content_hash: &str) -> Result<Option<Tool>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM tools WHERE content_hash = ?1 AND delisted = 0")
            .bind(content_hash)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(tool_from_row).transpose()
    }

    async fn list(&self, filter: &ToolListFilter) -> Result<Vec<Tool>, RepositoryError> {
        let mut sql = String::from("SELECT * FROM tools WHERE delisted = ");
        sql.push_str(if filter.delisted == Some(true) { "1" } else { "0" });
        if filter.min_fitness.is_some() {
            sql.push_str(" AND fitness_score >= ?");
        }
        if filter.min_trust_level.is_some() {
            sql.push_str(" AND trust_level >= ?");
        }
        if filter.author.is_some() {
            sql.push_str(" AND author_agent_id = ?");
        }
        if filter.tag.is_some() {
            // Tags are a JSON array of strings; match the quoted element.
            sql.push_str(" AND tags LIKE ?");
        }
        sql.push_str(" ORDER BY created_at DESC LIMIT ? OFFSET ?");

        let mut query = sqlx::query(&sql);
        if let Some(min_fitness) = filter.min_fitness {
            query = query.bind(min_fitness);
        }
        if let Some(trust) = filter.min_trust_level {
            query = query.bind(trust.as_i64());
        }
        if let Some(author) = &filter.author {
            query = query.bind(author.clone());
        }
        if let Some(tag) = &filter.tag {
            query = query.bind(format!("%{}%", serde_json::to_string(tag)?));
        }
        query = query
            .bind(filter.effective_limit() as i64)
            .bind(filter.effective_offset() as i64);

        let rows = query.fetch_all(&self.pool).await?;
        rows.iter().map(tool_from_row).collect()
    }

    async fn record_usage(&self, report: &UsageReport) -> Result<UsageOutcome, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let tool_id = report.tool_id.0.to_string();
        let current = sqlx::query(SELECT_TOOL)
            .bind(&tool_id)
            .fetch_optional(&mut *tx)
            .await?;
        let current = match current {
            Some(row) => tool_from_row(&row)?,
            None => {
                return Err(RepositoryError::NotFound(format!(
                    "tool {} not found",
                    report.tool_id
                )))
            }
        };

        let appended = sqlx::query(
            r#"
            INSERT OR IGNORE INTO usage_events
                (tool_id, agent_id, success, execution_time_ms, tokens_used, timestamp)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(&tool_id)
        .bind(&report.agent_id)
        .bind(report.success)
        .bind(report.execution_time_ms as i64)
        .bind(report.tokens_used.map(|t| t as i64))
        .bind(report.timestamp)
        .execute(&mut *tx)
        .await?;

        let duplicate = appended.rows_affected() == 0;

        // Delisted is a write-filter gate: the event is kept for the audit
        // trail, aggregates stay frozen.
        if !duplicate && !current.delisted {
            sqlx::query(
                r#"
                UPDATE tools SET
                    total_uses = (SELECT COUNT(*) FROM usage_events WHERE tool_id = ?1),
                    successful_uses =
                        (SELECT COUNT(*) FROM usage_events WHERE tool_id = ?1 AND success = 1),
                    unique_agents =
                        (SELECT COUNT(DISTINCT agent_id) FROM usage_events WHERE tool_id = ?1),
                    avg_execution_time_ms = COALESCE(
                        (SELECT AVG(execution_time_ms) FROM usage_events WHERE tool_id = ?1), 0),
                    avg_tokens_used =
                        (SELECT AVG(tokens_used) FROM usage_events
                         WHERE tool_id = ?1 AND tokens_used IS NOT NULL)
                WHERE id = ?1
                "#,
            )
            .bind(&tool_id)
            .execute(&mut *tx)
            .await?;
        }

        let row = sqlx::query(SELECT_TOOL).bind(&tool_id).fetch_one(&mut *tx).await?;
        let tool = tool_from_row(&row)?;
        tx.commit().await?;

        Ok(UsageOutcome { duplicate, tool })
    }

    async fn update_fitness(
        &self,
        id: ToolId,
        fitness: f64,
        low_fitness_streak: u32,
    ) -> Result<(), RepositoryError> {
        sqlx::query("UPDATE tools SET fitness_score = ?2, low_fitness_streak = ?3 WHERE id = ?1")
            .bind(id.0.to_string())
            .bind(fitness)
            .bind(low_fitness_streak as i64)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn update_trust(&self, id: ToolId, trust: TrustLevel) -> Result<(), RepositoryError> {
        sqlx::query("UPDATE tools SET trust_level = ?2 WHERE id = ?1")
            .bind(id.0.to_string())
            .bind(trust.as_i64())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn mark_delisted(&self, id: ToolId, reason: &str) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;
        let updated = sqlx::query(
            "UPDATE tools SET delisted = 1, delist_reason = COALESCE(delist_reason, ?2) WHERE id = ?1",
        )
        .bind(id.0.to_string())
        .bind(reason)
        .execute(&mut *tx)
        .await?;
        if updated.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(format!("tool {id} not found")));
        }
        sqlx::query("DELETE FROM embedding_vectors WHERE tool_id = ?1")
            .bind(id.0.to_string())
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn load_embedding_terms(
        &self,
    ) -> Result<Vec<(ToolId, HashMap<String, f32>)>, RepositoryError> {
        let rows = sqlx::query("SELECT tool_id, terms FROM embedding_vectors")
            .fetch_all(&self.pool)
            .await?;
        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let id: String = row.get("tool_id");
            let terms_json: String = row.get("terms");
            let id = Uuid::parse_str(&id)
                .map_err(|e| RepositoryError::Serialization(format!("bad tool id: {e}")))?;
            let terms: HashMap<String, f32> = serde_json::from_str(&terms_json)?;
            out.push((ToolId(id), terms));
        }
        Ok(out)
    }
}
