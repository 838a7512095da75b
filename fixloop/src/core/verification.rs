//! Verification run results and reduction of raw test output to counts.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Literal marker counted as one passing test.
pub const PASSED_MARKER: &str = "PASSED";
/// Literal marker counted as one failing test.
pub const FAILED_MARKER: &str = "FAILED";

/// Failure count reported when the verification command times out.
pub const TIMEOUT_FAILED_COUNT: u32 = 999;
/// Exit code reported when the verification command times out.
pub const TIMEOUT_EXIT_CODE: i32 = -1;

static FAILED_LINE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)([\w/._]+::\w+) FAILED - (.+)$").unwrap());
static ERROR_LINE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)(\w+Error: .+)$").unwrap());

/// Outcome of one verification run.
///
/// `total` is derived as `passed + failed` from two independent marker counts;
/// it is not cross-checked against any summary line the tool prints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationResult {
    pub passed: u32,
    pub failed: u32,
    pub total: u32,
    /// Human-readable failure summaries, in output order.
    pub failures: Vec<String>,
    pub exit_code: i32,
    /// Combined primary + secondary output.
    pub output: String,
}

impl VerificationResult {
    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }

    /// True when this run has strictly more failures than `other`.
    pub fn is_worse_than(&self, other: &VerificationResult) -> bool {
        self.failed > other.failed
    }

    /// Sentinel for a run killed by the wall-clock timeout.
    pub fn timed_out() -> Self {
        Self {
            passed: 0,
            failed: TIMEOUT_FAILED_COUNT,
            total: TIMEOUT_FAILED_COUNT,
            failures: vec!["Test suite timeout".to_string()],
            exit_code: TIMEOUT_EXIT_CODE,
            output: String::new(),
        }
    }

    pub fn is_timeout(&self) -> bool {
        self.exit_code == TIMEOUT_EXIT_CODE && self.failed == TIMEOUT_FAILED_COUNT
    }
}

/// Reduce the two output streams of a verification run into a result.
///
/// The primary stream comes first and the secondary stream is appended; tools
/// may report failures on either, so both are always counted.
pub fn reduce_output(primary: &str, secondary: &str, exit_code: i32) -> VerificationResult {
    let output = combine_streams(primary, secondary);
    let passed = count_marker(&output, PASSED_MARKER);
    let failed = count_marker(&output, FAILED_MARKER);
    let failures = failure_summaries(&output);
    VerificationResult {
        passed,
        failed,
        total: passed + failed,
        failures,
        exit_code,
        output,
    }
}

fn combine_streams(primary: &str, secondary: &str) -> String {
    let mut combined = String::with_capacity(primary.len() + secondary.len() + 1);
    combined.push_str(primary);
    if !secondary.is_empty() {
        if !primary.is_empty() && !primary.ends_with('\n') {
            combined.push('\n');
        }
        combined.push_str(secondary);
    }
    combined
}

fn count_marker(output: &str, marker: &str) -> u32 {
    output.matches(marker).count() as u32
}

/// Extract `"<name>: <reason>"` summaries from `<name> FAILED - <reason>` lines,
/// falling back to bare `<Kind>Error: <reason>` lines when none match.
pub fn failure_summaries(output: &str) -> Vec<String> {
    let structured: Vec<String> = FAILED_LINE_RE
        .captures_iter(output)
        .map(|caps| format!("{}: {}", &caps[1], caps[2].trim_end()))
        .collect();
    if !structured.is_empty() {
        return structured;
    }
    ERROR_LINE_RE
        .captures_iter(output)
        .map(|caps| caps[1].trim_end().to_string())
        .collect()
}
