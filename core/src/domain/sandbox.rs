// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::verdict::ExecutionReport;

/// Resource caps applied to one sandboxed run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SandboxLimits {
    pub cpu_time_secs: u64,
    pub wall_clock_secs: u64,
    pub memory_bytes: u64,
}

impl Default for SandboxLimits {
    fn default() -> Self {
        Self {
            cpu_time_secs: 5,
            wall_clock_secs: 10,
            memory_bytes: 256 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Error)]
pub enum SandboxError {
    /// The execution queue is at capacity; the submission fails fast rather
    /// than blocking. Discovery and usage reporting are unaffected.
    #[error("sandbox pool is overloaded")]
    Overloaded,
    #[error("failed to spawn sandbox child: {0}")]
    SpawnFailed(String),
    #[error("sandbox I/O error: {0}")]
    Io(String),
}

/// Out-of-process execution of untrusted code. The service never links the
/// submitted code; the minimum bar is a resource-capped child process, and
/// container or microVM isolation is an acceptable refinement behind the
/// same seam.
///
/// The child loads the submitted code, then runs the declared test case;
/// assertion is by non-zero exit. Any fault in the child is contained there
/// and reported, never propagated to the parent.
#[async_trait]
pub trait SandboxExecutor: Send + Sync {
    async fn execute(
        &self,
        code: &str,
        test_case: &str,
        limits: SandboxLimits,
    ) -> Result<ExecutionReport, SandboxError>;
}
