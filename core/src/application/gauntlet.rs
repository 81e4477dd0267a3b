// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Gauntlet — the verification pipeline
//!
//! Orchestrates static screening and sandboxed execution into a single
//! [`Verdict`]. The sequence is strict: screen first, and only a clean scan
//! reaches the sandbox; only a zero-exit run is approved. This service is
//! the sole path by which a tool can reach `TrustLevel::Verified`.

use std::sync::Arc;

use crate::domain::sandbox::{SandboxError, SandboxExecutor, SandboxLimits};
use crate::domain::screener::StaticScreener;
use crate::domain::verdict::Verdict;

pub struct Gauntlet {
    screener: StaticScreener,
    sandbox: Arc<dyn SandboxExecutor>,
    limits: SandboxLimits,
}

impl Gauntlet {
    pub fn new(screener: StaticScreener, sandbox: Arc<dyn SandboxExecutor>, limits: SandboxLimits) -> Self {
        Self { screener, sandbox, limits }
    }

    /// Verify one submission. A negative verdict is a normal outcome;
    /// `Err` means the sandbox itself could not run (overload, spawn
    /// failure) and nothing was measured.
    pub async fn verify(&self, code: &str, test_case: &str) -> Result<Verdict, SandboxError> {
        let scan = self.screener.screen(code, test_case);
        if !scan.safe {
            metrics::counter!("gauntlet_rejected_static_total").increment(1);
            return Ok(Verdict::rejected_static(scan));
        }

        let report = self.sandbox.execute(code, test_case, self.limits).await?;
        let verdict = Verdict::from_execution(scan, &report);
        if verdict.approved {
            metrics::counter!("gauntlet_approved_total").increment(1);
        } else {
            metrics::counter!("gauntlet_rejected_runtime_total").increment(1);
            tracing::info!(
                exit = report.exit_code,
                timed_out = report.timed_out,
                oom = report.oom,
                "gauntlet rejected submission at runtime"
            );
        }
        Ok(verdict)
    }
}
