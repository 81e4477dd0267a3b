// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Discovery — intent-based retrieval over the live tool set
//!
//! Combines embedding-index candidates with fitness scores and trust
//! filters: the index is over-queried by a configurable multiplier, the
//! candidates are hydrated from the registry and filtered, then ranked by
//! `0.7·similarity + 0.3·fitness`. An empty candidate set stays empty —
//! unrelated results are never substituted.
//!
//! This service also carries the registry read side: `get`, `provenance`,
//! and `list`.

use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;

use crate::domain::repository::{RepositoryError, ToolListFilter, ToolRepository};
use crate::domain::tool::{Tool, ToolId, TrustLevel};
use crate::domain::config::DiscoveryConfig;
use crate::infrastructure::embedding::EmbeddingIndex;

const SIMILARITY_WEIGHT: f64 = 0.7;
const FITNESS_WEIGHT: f64 = 0.3;

#[derive(Debug, Clone)]
pub struct DiscoverOptions {
    pub k: Option<usize>,
    pub min_fitness: f64,
    pub min_trust: TrustLevel,
    pub include_delisted: bool,
    pub tags: Option<Vec<String>>,
}

impl Default for DiscoverOptions {
    fn default() -> Self {
        Self {
            k: None,
            min_fitness: 0.0,
            min_trust: TrustLevel::Verified,
            include_delisted: false,
            tags: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DiscoveredTool {
    pub tool: Tool,
    pub similarity: f64,
    pub score: f64,
}

#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("tool {0} not found")]
    NotFound(ToolId),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

pub struct DiscoveryService {
    repo: Arc<dyn ToolRepository>,
    index: Arc<EmbeddingIndex>,
    config: DiscoveryConfig,
}

impl DiscoveryService {
    pub fn new(
        repo: Arc<dyn ToolRepository>,
        index: Arc<EmbeddingIndex>,
        config: DiscoveryConfig,
    ) -> Self {
        Self { repo, index, config }
    }

    pub async fn discover(
        &self,
        intent: &str,
        opts: DiscoverOptions,
    ) -> Result<Vec<DiscoveredTool>, DiscoveryError> {
        if intent.trim().is_empty() {
            return Err(DiscoveryError::InvalidInput("intent must not be empty".to_string()));
        }
        let k = opts.k.unwrap_or(self.config.default_k);
        if k == 0 {
            return Ok(Vec::new());
        }

        let candidates = self.index.query(intent, k * self.config.candidate_multiplier);
        metrics::counter!("discovery_queries_total").increment(1);

        let mut results = Vec::with_capacity(candidates.len());
        for (tool_id, similarity) in candidates {
            let Some(tool) = self.repo.find_by_id(tool_id).await? else {
                // Index is eventually consistent with the registry; a
                // missing row just drops the candidate.
                continue;
            };
            if tool.delisted && !opts.include_delisted {
                continue;
            }
            if tool.trust_level < opts.min_trust {
                continue;
            }
            if tool.fitness_score < opts.min_fitness {
                continue;
            }
            if let Some(required) = &opts.tags {
                if !required.iter().all(|tag| tool.tags.contains(tag)) {
                    continue;
                }
            }
            let score = SIMILARITY_WEIGHT * similarity + FITNESS_WEIGHT * tool.fitness_score;
            results.push(DiscoveredTool { tool, similarity, score });
        }

        results.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| {
                    b.tool
                        .fitness_score
                        .partial_cmp(&a.tool.fitness_score)
                        .unwrap_or(std::cmp::Ordering::Equal)
                })
                .then_with(|| a.tool.created_at.cmp(&b.tool.created_at))
        });
        results.truncate(k);
        Ok(results)
    }

    pub async fn get(&self, id: ToolId) -> Result<Tool, DiscoveryError> {
        self.repo
            .find_by_id(id)
            .await?
            .ok_or(DiscoveryError::NotFound(id))
    }

    /// Ordered root-to-self fork lineage. The chain is finite and acyclic
    /// by construction; the visited set is a corruption guard, not policy.
    pub async fn provenance(&self, id: ToolId) -> Result<Vec<Tool>, DiscoveryError> {
        let mut chain = Vec::new();
        let mut visited = HashSet::new();
        let mut cursor = Some(id);

        while let Some(current) = cursor {
            if !visited.insert(current) {
                return Err(DiscoveryError::Repository(RepositoryError::Database(
                    format!("provenance cycle detected at {current}"),
                )));
            }
            let tool = self
                .repo
                .find_by_id(current)
                .await?
                .ok_or(DiscoveryError::NotFound(current))?;
            cursor = tool.parent_tool_id;
            chain.push(tool);
        }

        chain.reverse();
        Ok(chain)
    }

    pub async fn list(&self, filter: &ToolListFilter) -> Result<Vec<Tool>, DiscoveryError> {
        Ok(self.repo.list(filter).await?)
    }
}
