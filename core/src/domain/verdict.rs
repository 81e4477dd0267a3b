// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Gauntlet verdict types: the static screening result, the raw sandbox
//! execution report, and the combined verdict returned to the caller.

use serde::{Deserialize, Serialize};

/// Outcome of the static screening pass. Deterministic and pure given the
/// screener policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanResult {
    pub safe: bool,
    pub reasons: Vec<String>,
}

impl ScanResult {
    pub fn safe() -> Self {
        Self { safe: true, reasons: Vec::new() }
    }

    pub fn rejected(reasons: Vec<String>) -> Self {
        Self { safe: false, reasons }
    }
}

/// Raw measurements from one sandboxed run of `code + test_case`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionReport {
    /// Exit code of the child, or the conventional `128 + signal` when the
    /// child was signal-killed.
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub wall_ms: u64,
    pub cpu_ms: u64,
    pub peak_mem_kb: u64,
    pub timed_out: bool,
    pub oom: bool,
}

impl ExecutionReport {
    pub fn passed(&self) -> bool {
        self.exit_code == 0 && !self.timed_out && !self.oom
    }

    /// Distinguished failure reason for the RPC surface.
    pub fn failure_reason(&self) -> Option<String> {
        if self.timed_out {
            Some("timed_out".to_string())
        } else if self.oom {
            Some("oom".to_string())
        } else if self.exit_code != 0 {
            Some(format!("test exited with code {}", self.exit_code))
        } else {
            None
        }
    }
}

/// The Gauntlet's combined judgment over a submission. `approved` is the
/// sole path by which a tool reaches `TrustLevel::Verified`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Verdict {
    pub approved: bool,
    pub security_scan: ScanResult,
    pub test_passed: bool,
    pub exec_ms: u64,
    pub mem_kb: u64,
    pub timed_out: bool,
    pub oom: bool,
    pub error: Option<String>,
}

impl Verdict {
    pub fn rejected_static(scan: ScanResult) -> Self {
        Self {
            approved: false,
            security_scan: scan,
            test_passed: false,
            exec_ms: 0,
            mem_kb: 0,
            timed_out: false,
            oom: false,
            error: Some("static screening rejected the submission".to_string()),
        }
    }

    pub fn from_execution(scan: ScanResult, report: &ExecutionReport) -> Self {
        let passed = report.passed();
        Self {
            approved: passed,
            security_scan: scan,
            test_passed: passed,
            exec_ms: report.wall_ms,
            mem_kb: report.peak_mem_kb,
            timed_out: report.timed_out,
            oom: report.oom,
            error: report.failure_reason(),
        }
    }
}
