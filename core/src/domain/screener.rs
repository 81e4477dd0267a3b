// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Static Screener Domain Service
//!
//! First gate of the Gauntlet: rejects submissions whose declared source
//! performs forbidden operations before anything is executed. This is a
//! domain service (not infrastructure) because the screening rules are a
//! core business policy, not a technical concern.
//!
//! The screen is deterministic and pure given the policy: the same source
//! and allow-list always produce the same result. Failure is non-fatal to
//! the service; it surfaces as a negative [`ScanResult`].

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

use crate::domain::verdict::ScanResult;

/// Modules importable by submitted code when no allow-list is configured.
pub const DEFAULT_IMPORT_ALLOWLIST: &[&str] = &[
    "math",
    "random",
    "string",
    "json",
    "datetime",
    "time",
    "hashlib",
    "re",
    "typing",
    "itertools",
    "functools",
    "collections",
];

static RE_DYNAMIC_EVAL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(eval|exec|compile|__import__)\s*\(").unwrap());
static RE_OS_ATTRIBUTE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(os|sys|subprocess|socket|ctypes)\s*\.").unwrap());
static RE_BUILTINS: Lazy<Regex> = Lazy::new(|| Regex::new(r"__builtins__|__globals__").unwrap());
static RE_IMPORT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*import\s+([A-Za-z_][A-Za-z0-9_.]*(?:\s*,\s*[A-Za-z_][A-Za-z0-9_.]*)*)").unwrap());
static RE_FROM_IMPORT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*from\s+([A-Za-z_][A-Za-z0-9_.]*)\s+import\b").unwrap());
static RE_OPEN_CALL: Lazy<Regex> = Lazy::new(|| Regex::new(r"\bopen\s*\(").unwrap());
static RE_OPEN_LITERAL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"\bopen\s*\(\s*(?:r?b?)(['"])([^'"]*)(['"])"#).unwrap());

/// The configurable screening policy. Built once at startup from the
/// service configuration.
#[derive(Debug, Clone)]
pub struct ScreenerPolicy {
    allowed_imports: HashSet<String>,
}

impl ScreenerPolicy {
    pub fn new(allowed_imports: impl IntoIterator<Item = String>) -> Self {
        Self {
            allowed_imports: allowed_imports.into_iter().collect(),
        }
    }

    pub fn allows_import(&self, module_root: &str) -> bool {
        self.allowed_imports.contains(module_root)
    }
}

impl Default for ScreenerPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_IMPORT_ALLOWLIST.iter().map(|s| s.to_string()))
    }
}

/// The static screener. Scans `code` and `test_case` as one unit — the
/// sandbox runs them as one unit too.
#[derive(Debug, Clone, Default)]
pub struct StaticScreener {
    policy: ScreenerPolicy,
}

impl StaticScreener {
    pub fn new(policy: ScreenerPolicy) -> Self {
        Self { policy }
    }

    pub fn screen(&self, code: &str, test_case: &str) -> ScanResult {
        let mut reasons = Vec::new();
        self.screen_blob("code", code, &mut reasons);
        self.screen_blob("test_case", test_case, &mut reasons);

        if reasons.is_empty() {
            ScanResult::safe()
        } else {
            tracing::warn!(reasons = ?reasons, "static screen rejected submission");
            ScanResult::rejected(reasons)
        }
    }

    fn screen_blob(&self, label: &str, source: &str, reasons: &mut Vec<String>) {
        for (line_no, raw_line) in source.lines().enumerate() {
            let line = strip_comment(raw_line);
            if line.trim().is_empty() {
                continue;
            }
            let line_no = line_no + 1;

            // Imports are checked on the string-preserved line; everything
            // else on a line with literal contents blanked out, so that a
            // string merely *mentioning* a forbidden name does not trip.
            for module in imported_modules(&line) {
                let root = module.split('.').next().unwrap_or(&module).to_string();
                if !self.policy.allows_import(&root) {
                    reasons.push(format!(
                        "{label}:{line_no}: import of module '{root}' is not on the allow-list"
                    ));
                }
            }

            let scannable = blank_string_literals(&line);

            if let Some(m) = RE_DYNAMIC_EVAL.captures(&scannable) {
                reasons.push(format!(
                    "{label}:{line_no}: dynamic evaluation via '{}' is forbidden",
                    &m[1]
                ));
            }
            if let Some(m) = RE_OS_ATTRIBUTE.captures(&scannable) {
                reasons.push(format!(
                    "{label}:{line_no}: attribute access on '{}' is forbidden",
                    &m[1]
                ));
            }
            if RE_BUILTINS.is_match(&scannable) {
                reasons.push(format!(
                    "{label}:{line_no}: access to interpreter internals is forbidden"
                ));
            }

            self.check_open_calls(label, line_no, &line, reasons);
        }
    }

    /// `open(...)` is allowed only with a literal relative path — which the
    /// sandbox resolves under its writable scratch directory.
    fn check_open_calls(&self, label: &str, line_no: usize, line: &str, reasons: &mut Vec<String>) {
        if !RE_OPEN_CALL.is_match(&blank_string_literals(line)) {
            return;
        }
        match RE_OPEN_LITERAL.captures(line) {
            Some(m) => {
                let path = &m[2];
                if path.starts_with('/') || path.starts_with('\\') || path.contains("..") {
                    reasons.push(format!(
                        "{label}:{line_no}: file open escapes the scratch directory: '{path}'"
                    ));
                }
            }
            None => {
                reasons.push(format!(
                    "{label}:{line_no}: file open with a non-literal path is forbidden"
                ));
            }
        }
    }
}

/// Drop a `#` comment, ignoring `#` inside single/double-quoted strings.
fn strip_comment(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    let mut quote: Option<char> = None;
    for ch in line.chars() {
        match quote {
            Some(q) => {
                if ch == q {
                    quote = None;
                }
            }
            None => {
                if ch == '\'' || ch == '"' {
                    quote = Some(ch);
                } else if ch == '#' {
                    break;
                }
            }
        }
        out.push(ch);
    }
    out
}

/// Replace the contents of string literals with spaces, preserving offsets.
fn blank_string_literals(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    let mut quote: Option<char> = None;
    for ch in line.chars() {
        match quote {
            Some(q) => {
                if ch == q {
                    quote = None;
                    out.push(ch);
                } else {
                    out.push(' ');
                }
            }
            None => {
                if ch == '\'' || ch == '"' {
                    quote = Some(ch);
                }
                out.push(ch);
            }
        }
    }
    out
}

fn imported_modules(line: &str) -> Vec<String> {
    if let Some(m) = RE_FROM_IMPORT.captures(line) {
        return vec![m[1].to_string()];
    }
    if let Some(m) = RE_IMPORT.captures(line) {
        return m[1]
            .split(',')
            .map(|part| {
                // "import x as y" keeps only the module path.
                part.trim().split_whitespace().next().unwrap_or("").to_string()
            })
            .filter(|s| !s.is_empty())
            .collect();
    }
    Vec::new()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn screener() -> StaticScreener {
        StaticScreener::default()
    }

    #[test]
    fn accepts_plain_arithmetic_tool() {
        let result = screener().screen(
            "def add(a, b):\n    return a + b",
            "assert add(2, 3) == 5",
        );
        assert!(result.safe, "reasons: {:?}", result.reasons);
    }

    #[test]
    fn accepts_allowlisted_imports() {
        let result = screener().screen(
            "import json\nimport math, hashlib\nfrom datetime import timedelta\n",
            "assert True",
        );
        assert!(result.safe, "reasons: {:?}", result.reasons);
    }

    #[test]
    fn rejects_disallowed_import() {
        let result = screener().screen("import socket\n", "assert True");
        assert!(!result.safe);
        assert!(result.reasons[0].contains("socket"));
    }

    #[test]
    fn rejects_dotted_import_by_root() {
        let result = screener().screen("import os.path\n", "assert True");
        assert!(!result.safe);
    }

    #[test]
    fn rejects_dynamic_evaluation() {
        for snippet in ["eval('1+1')", "exec(payload)", "__import__('os')"] {
            let result = screener().screen(snippet, "assert True");
            assert!(!result.safe, "should reject {snippet}");
        }
    }

    #[test]
    fn ignores_forbidden_names_inside_strings() {
        let result = screener().screen(
            "note = 'never call eval(x) or import os'",
            "assert 'eval' in note",
        );
        assert!(result.safe, "reasons: {:?}", result.reasons);
    }

    #[test]
    fn ignores_comment_only_mentions() {
        let result = screener().screen("x = 1  # os.system would be bad here", "assert x == 1");
        assert!(result.safe, "reasons: {:?}", result.reasons);
    }

    #[test]
    fn rejects_open_with_absolute_path() {
        let result = screener().screen("f = open('/etc/passwd')", "assert True");
        assert!(!result.safe);
    }

    #[test]
    fn rejects_open_with_traversal() {
        let result = screener().screen("f = open('../secrets.txt')", "assert True");
        assert!(!result.safe);
    }

    #[test]
    fn rejects_open_with_computed_path() {
        let result = screener().screen("f = open(path_var)", "assert True");
        assert!(!result.safe);
    }

    #[test]
    fn accepts_open_with_relative_literal() {
        let result = screener().screen("f = open('notes.txt', 'w')", "assert True");
        assert!(result.safe, "reasons: {:?}", result.reasons);
    }

    #[test]
    fn screen_reports_test_case_violations_too() {
        let result = screener().screen("x = 1", "import subprocess");
        assert!(!result.safe);
        assert!(result.reasons[0].starts_with("test_case:"));
    }

    #[test]
    fn custom_allowlist_is_respected() {
        let policy = ScreenerPolicy::new(["numpy".to_string()]);
        let screener = StaticScreener::new(policy);
        assert!(screener.screen("import numpy", "assert True").safe);
        assert!(!screener.screen("import json", "assert True").safe);
    }
}
