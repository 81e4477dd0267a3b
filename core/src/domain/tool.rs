// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Tool Aggregate
//!
//! The primary entity of the registry: an executable artifact (source +
//! declared test) published by an agent. Identity is content-addressed —
//! the SHA-256 of the canonicalized `(code, test_case)` pair — so two
//! submissions of the same artifact collapse onto one record.
//!
//! Canonicalization strips trailing whitespace per line, normalizes line
//! endings to `\n`, and drops trailing blank lines, making the hash stable
//! across platforms and editors.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ToolId(pub Uuid);

impl ToolId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_string(s: &str) -> Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

impl Default for ToolId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ToolId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Ordinal reflecting verification depth. `Verified` and above is only ever
/// assigned by the Gauntlet; `BattleTested` by the fitness engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrustLevel {
    Submitted,
    Verified,
    BattleTested,
    Community,
}

impl TrustLevel {
    pub fn as_i64(self) -> i64 {
        match self {
            TrustLevel::Submitted => 0,
            TrustLevel::Verified => 1,
            TrustLevel::BattleTested => 2,
            TrustLevel::Community => 3,
        }
    }

    pub fn from_i64(v: i64) -> Option<Self> {
        match v {
            0 => Some(TrustLevel::Submitted),
            1 => Some(TrustLevel::Verified),
            2 => Some(TrustLevel::BattleTested),
            3 => Some(TrustLevel::Community),
            _ => None,
        }
    }
}

/// Usage telemetry aggregates, recomputed from the append-only event log
/// inside the same transaction that appends to it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolTelemetry {
    pub total_uses: u64,
    pub successful_uses: u64,
    pub unique_agents: u64,
    pub avg_execution_time_ms: f64,
    /// Mean of reported `tokens_used`, over the reports that carried one.
    pub avg_tokens_used: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tool {
    pub id: ToolId,
    pub name: String,
    pub description: String,
    /// Free text describing what the tool is for; the embedding source.
    pub intent: String,
    pub code: String,
    pub test_case: String,
    pub input_schema: Option<serde_json::Value>,
    pub tags: Vec<String>,
    /// Self-asserted; there is no authenticated identity in this service.
    pub author_agent_id: String,
    pub version: u32,
    pub parent_tool_id: Option<ToolId>,
    pub content_hash: String,
    pub signature: String,
    pub trust_level: TrustLevel,
    pub created_at: DateTime<Utc>,
    pub telemetry: ToolTelemetry,
    pub fitness_score: f64,
    /// Consecutive usage reports with fitness below the floor. Backs the
    /// sustained-low-fitness delisting rule.
    pub low_fitness_streak: u32,
    pub delisted: bool,
    pub delist_reason: Option<String>,
    /// Gauntlet measurements recorded at verification time.
    pub security_scan_passed: bool,
    pub exec_ms: u64,
    pub mem_kb: u64,
}

impl Tool {
    /// Telemetry snapshot plus the fields the fitness function needs.
    pub fn fitness_inputs(&self) -> crate::domain::fitness::FitnessInputs {
        crate::domain::fitness::FitnessInputs {
            total_uses: self.telemetry.total_uses,
            successful_uses: self.telemetry.successful_uses,
            unique_agents: self.telemetry.unique_agents,
            avg_execution_time_ms: self.telemetry.avg_execution_time_ms,
            avg_tokens_used: self.telemetry.avg_tokens_used,
            created_at: self.created_at,
        }
    }

    pub fn success_rate(&self) -> f64 {
        self.telemetry.successful_uses as f64 / (self.telemetry.total_uses.max(1)) as f64
    }
}

/// A single usage observation reported by a calling agent. Append-only;
/// keyed by `(tool_id, agent_id, timestamp)` so re-delivery is a no-op.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageReport {
    pub tool_id: ToolId,
    pub agent_id: String,
    pub success: bool,
    pub execution_time_ms: u64,
    pub tokens_used: Option<u64>,
    pub timestamp: DateTime<Utc>,
}

/// Canonicalize one source blob: `\r\n` and `\r` become `\n`, trailing
/// whitespace is stripped per line, and trailing blank lines are dropped.
pub fn canonicalize_source(source: &str) -> String {
    let unified = source.replace("\r\n", "\n").replace('\r', "\n");
    let mut lines: Vec<&str> = unified.split('\n').map(|l| l.trim_end()).collect();
    while lines.last() == Some(&"") {
        lines.pop();
    }
    lines.join("\n")
}

/// Canonical byte sequence of an artifact pair. The NUL-framed separator
/// cannot occur inside canonicalized text, so the mapping is injective.
pub fn canonical_artifact_bytes(code: &str, test_case: &str) -> Vec<u8> {
    let mut bytes = canonicalize_source(code).into_bytes();
    bytes.extend_from_slice(b"\n\x00\n");
    bytes.extend_from_slice(canonicalize_source(test_case).as_bytes());
    bytes
}

/// SHA-256 over the canonical artifact bytes, hex-encoded. The identity of
/// a tool (invariant: pure function of the canonicalized pair).
pub fn content_hash(code: &str, test_case: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(canonical_artifact_bytes(code, test_case));
    hex::encode(hasher.finalize())
}

/// Digest over the verified record at insertion time. Binds the artifact
/// identity to the metadata the Gauntlet observed.
pub fn record_signature(
    content_hash: &str,
    name: &str,
    author_agent_id: &str,
    version: u32,
    created_at: DateTime<Utc>,
    exec_ms: u64,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content_hash.as_bytes());
    hasher.update(b"\x00");
    hasher.update(name.as_bytes());
    hasher.update(b"\x00");
    hasher.update(author_agent_id.as_bytes());
    hasher.update(b"\x00");
    hasher.update(version.to_le_bytes());
    hasher.update(created_at.to_rfc3339().as_bytes());
    hasher.update(exec_ms.to_le_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonicalization_normalizes_line_endings_and_trailing_space() {
        let a = "def add(a, b):   \r\n    return a + b\r\n\r\n";
        let b = "def add(a, b):\n    return a + b";
        assert_eq!(canonicalize_source(a), canonicalize_source(b));
    }

    #[test]
    fn content_hash_is_stable_for_equivalent_artifacts() {
        let h1 = content_hash("x = 1  \n", "assert x == 1\r\n");
        let h2 = content_hash("x = 1", "assert x == 1");
        assert_eq!(h1, h2);
        assert_eq!(h1.len(), 64);
    }

    #[test]
    fn content_hash_distinguishes_code_from_test_boundary() {
        // Moving a line across the code/test boundary must change the hash.
        let h1 = content_hash("a\nb", "c");
        let h2 = content_hash("a", "b\nc");
        assert_ne!(h1, h2);
    }

    #[test]
    fn trust_level_roundtrips_through_ordinal() {
        for level in [
            TrustLevel::Submitted,
            TrustLevel::Verified,
            TrustLevel::BattleTested,
            TrustLevel::Community,
        ] {
            assert_eq!(TrustLevel::from_i64(level.as_i64()), Some(level));
        }
        assert_eq!(TrustLevel::from_i64(7), None);
        assert!(TrustLevel::Verified < TrustLevel::BattleTested);
    }

    #[test]
    fn success_rate_is_zero_without_usage() {
        let telemetry = ToolTelemetry::default();
        assert_eq!(telemetry.successful_uses, 0);
        let rate = telemetry.successful_uses as f64 / (telemetry.total_uses.max(1)) as f64;
        assert_eq!(rate, 0.0);
    }
}
