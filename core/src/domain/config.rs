// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Service Configuration Types
//
// Defines the configuration schema for an AgentEvolution registry node:
// - Kubernetes-style manifest format (apiVersion/kind/metadata/spec)
// - Data directory and HTTP bind address
// - Sandbox limits and pool sizing
// - Screener import allow-list
// - Fitness weights and budgets
//
// Every field has a default; an empty spec is a valid service.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::domain::fitness::FitnessParams;
use crate::domain::sandbox::SandboxLimits;
use crate::domain::screener::DEFAULT_IMPORT_ALLOWLIST;

pub const API_VERSION: &str = "100monkeys.ai/v1";
pub const KIND: &str = "RegistryConfig";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Top-level Kubernetes-style configuration manifest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfigManifest {
    /// API version (must be "100monkeys.ai/v1")
    #[serde(rename = "apiVersion")]
    pub api_version: String,

    /// Resource kind (must be "RegistryConfig")
    pub kind: String,

    /// Manifest metadata
    pub metadata: ConfigMetadata,

    /// Service configuration specification
    #[serde(default)]
    pub spec: ServiceConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigMetadata {
    /// Human-readable node name
    pub name: String,

    /// Optional labels for categorization
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub labels: HashMap<String, String>,
}

/// Service configuration (content under spec:)
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ServiceConfig {
    /// Directory holding the registry store (created if missing)
    pub data_dir: Option<PathBuf>,

    pub server: ServerConfig,

    pub sandbox: SandboxConfig,

    pub screener: ScreenerConfig,

    pub fitness: FitnessParams,

    pub discovery: DiscoveryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8700,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxConfig {
    /// Interpreter executed on the combined `code + test_case` file.
    pub interpreter: String,
    /// Concurrent sandbox children.
    pub max_concurrency: usize,
    /// Waiting submissions beyond which new ones fail fast as overloaded.
    pub max_queue_depth: usize,
    pub cpu_time_secs: u64,
    pub wall_clock_secs: u64,
    pub memory_mib: u64,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            interpreter: "python3".to_string(),
            max_concurrency: 4,
            max_queue_depth: 64,
            cpu_time_secs: 5,
            wall_clock_secs: 10,
            memory_mib: 256,
        }
    }
}

impl SandboxConfig {
    pub fn limits(&self) -> SandboxLimits {
        SandboxLimits {
            cpu_time_secs: self.cpu_time_secs,
            wall_clock_secs: self.wall_clock_secs,
            memory_bytes: self.memory_mib * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScreenerConfig {
    pub allowed_imports: Vec<String>,
}

impl Default for ScreenerConfig {
    fn default() -> Self {
        Self {
            allowed_imports: DEFAULT_IMPORT_ALLOWLIST.iter().map(|s| s.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Default result count for `discover_tool`.
    pub default_k: usize,
    /// Candidates fetched from the index per requested result.
    pub candidate_multiplier: usize,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            default_k: 5,
            candidate_multiplier: 4,
        }
    }
}

impl RegistryConfigManifest {
    /// A manifest carrying every default. Serialized by `config generate`.
    pub fn example() -> Self {
        Self {
            api_version: API_VERSION.to_string(),
            kind: KIND.to_string(),
            metadata: ConfigMetadata {
                name: "agentevolution".to_string(),
                labels: HashMap::new(),
            },
            spec: ServiceConfig::default(),
        }
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let manifest: Self = serde_yaml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        manifest.validate()?;
        Ok(manifest)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api_version != API_VERSION {
            return Err(ConfigError::Invalid(format!(
                "apiVersion must be '{API_VERSION}', got '{}'",
                self.api_version
            )));
        }
        if self.kind != KIND {
            return Err(ConfigError::Invalid(format!(
                "kind must be '{KIND}', got '{}'",
                self.kind
            )));
        }
        if self.metadata.name.is_empty() {
            return Err(ConfigError::Invalid("metadata.name cannot be empty".to_string()));
        }
        self.spec.validate()
    }
}

impl ServiceConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sandbox.max_concurrency == 0 {
            return Err(ConfigError::Invalid(
                "sandbox.max_concurrency must be at least 1".to_string(),
            ));
        }
        if self.sandbox.wall_clock_secs == 0 || self.sandbox.cpu_time_secs == 0 {
            return Err(ConfigError::Invalid(
                "sandbox time limits must be nonzero".to_string(),
            ));
        }
        if self.sandbox.interpreter.is_empty() {
            return Err(ConfigError::Invalid("sandbox.interpreter cannot be empty".to_string()));
        }
        let f = &self.fitness;
        let weight_sum = f.weight_success
            + f.weight_tokens
            + f.weight_speed
            + f.weight_adoption
            + f.weight_freshness;
        if !(0.99..=1.01).contains(&weight_sum) {
            return Err(ConfigError::Invalid(format!(
                "fitness weights must sum to 1.0, got {weight_sum}"
            )));
        }
        if f.min_observations == 0 {
            return Err(ConfigError::Invalid(
                "fitness.min_observations must be at least 1".to_string(),
            ));
        }
        if self.discovery.candidate_multiplier == 0 || self.discovery.default_k == 0 {
            return Err(ConfigError::Invalid(
                "discovery.default_k and candidate_multiplier must be nonzero".to_string(),
            ));
        }
        Ok(())
    }

    /// Store path inside the data directory.
    pub fn store_path(&self) -> PathBuf {
        self.data_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from("./data"))
            .join("registry.db")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let manifest = RegistryConfigManifest::example();
        assert!(manifest.validate().is_ok());
        assert_eq!(manifest.spec.sandbox.max_concurrency, 4);
        assert_eq!(manifest.spec.sandbox.max_queue_depth, 64);
        assert_eq!(manifest.spec.sandbox.limits().memory_bytes, 256 * 1024 * 1024);
    }

    #[test]
    fn example_roundtrips_through_yaml() {
        let manifest = RegistryConfigManifest::example();
        let yaml = serde_yaml::to_string(&manifest).unwrap();
        let parsed: RegistryConfigManifest = serde_yaml::from_str(&yaml).unwrap();
        assert!(parsed.validate().is_ok());
        assert_eq!(parsed.spec.server.port, manifest.spec.server.port);
    }

    #[test]
    fn minimal_manifest_fills_defaults() {
        let yaml = r#"
apiVersion: 100monkeys.ai/v1
kind: RegistryConfig
metadata:
  name: local
"#;
        let parsed: RegistryConfigManifest = serde_yaml::from_str(yaml).unwrap();
        assert!(parsed.validate().is_ok());
        assert_eq!(parsed.spec.sandbox.interpreter, "python3");
        assert_eq!(parsed.spec.fitness.tokens_budget, 1000.0);
    }

    #[test]
    fn rejects_wrong_kind() {
        let yaml = r#"
apiVersion: 100monkeys.ai/v1
kind: NodeConfig
metadata:
  name: local
"#;
        let parsed: RegistryConfigManifest = serde_yaml::from_str(yaml).unwrap();
        assert!(parsed.validate().is_err());
    }

    #[test]
    fn rejects_skewed_fitness_weights() {
        let mut manifest = RegistryConfigManifest::example();
        manifest.spec.fitness.weight_success = 0.9;
        assert!(manifest.validate().is_err());
    }
}
