//! Stopping-condition evaluation for the fix loop.
//!
//! Mechanical checks (success, safety ceiling, regressions, plateau) are
//! evaluated first in a fixed priority order and can never be overridden by
//! the oracle. Only when none of them fires is the continuation question
//! delegated.

use std::fmt;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::core::verification::VerificationResult;

/// Default global iteration ceiling for a fix session.
pub const DEFAULT_MAX_ITERATIONS: u32 = 20;
/// Largest tolerated drop in total test count between consecutive runs.
pub const DEFAULT_SCOPE_DROP_TOLERANCE: u32 = 2;

const UNCLEAR_RESPONSE_REASON: &str = "Agent response unclear - stopping as safety measure";
const FIRST_ATTEMPT_REASON: &str = "First attempt - continuing";

/// Why a session stopped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum StopCondition {
    /// Current run has zero failures.
    Success,
    /// Iteration counter reached the configured ceiling.
    Safety { ceiling: u32 },
    /// Total test count dropped beyond tolerance (test discovery broke).
    RegressionScope {
        previous_total: u32,
        current_total: u32,
    },
    /// Failed count increased.
    RegressionCount {
        previous_failed: u32,
        current_failed: u32,
    },
    /// Failure summaries are identical to the previous run.
    NoProgress,
    /// Oracle answered `STOP`, or gave an answer that could not be read.
    OracleDeclined { reason: String },
    /// Operator cancelled the session.
    Interrupted,
}

impl StopCondition {
    pub fn is_success(&self) -> bool {
        matches!(self, StopCondition::Success)
    }

    /// Stable kebab-case label used in logs and reports.
    pub fn label(&self) -> &'static str {
        match self {
            StopCondition::Success => "stop-success",
            StopCondition::Safety { .. } => "stop-safety",
            StopCondition::RegressionScope { .. } => "stop-regression-scope",
            StopCondition::RegressionCount { .. } => "stop-regression-count",
            StopCondition::NoProgress => "stop-no-progress",
            StopCondition::OracleDeclined { .. } => "stop-oracle-declined",
            StopCondition::Interrupted => "stop-interrupted",
        }
    }
}

impl fmt::Display for StopCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopCondition::Success => write!(f, "All tests passing"),
            StopCondition::Safety { ceiling } => {
                write!(f, "Safety limit: maximum iterations ({ceiling}) reached")
            }
            StopCondition::RegressionScope {
                previous_total,
                current_total,
            } => write!(
                f,
                "Test count decreased significantly ({previous_total} -> {current_total})"
            ),
            StopCondition::RegressionCount {
                previous_failed,
                current_failed,
            } => write!(
                f,
                "Regression: failures increased from {previous_failed} to {current_failed}"
            ),
            StopCondition::NoProgress => write!(f, "No progress: failures have not changed"),
            StopCondition::OracleDeclined { reason } => write!(f, "{reason}"),
            StopCondition::Interrupted => write!(f, "Interrupted by operator"),
        }
    }
}

/// Outcome of one evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Evaluation {
    Continue { reason: String },
    Stop(StopCondition),
}

/// Parsed answer to the continuation question.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContinuationDecision {
    Continue { reason: String },
    Stop { reason: String },
}

impl From<ContinuationDecision> for Evaluation {
    fn from(decision: ContinuationDecision) -> Self {
        match decision {
            ContinuationDecision::Continue { reason } => Evaluation::Continue { reason },
            ContinuationDecision::Stop { reason } => {
                Evaluation::Stop(StopCondition::OracleDeclined { reason })
            }
        }
    }
}

/// Read a continuation answer.
///
/// Tokens are matched case-insensitively. Exactly one of `CONTINUE:` or
/// `STOP:` must be present; an answer with both, or neither, stops.
pub fn parse_continuation(response: &str) -> ContinuationDecision {
    // ASCII uppercasing keeps byte offsets aligned with `response`.
    let upper = response.to_ascii_uppercase();
    let continue_at = upper.find("CONTINUE:");
    let stop_at = upper.find("STOP:");
    match (continue_at, stop_at) {
        (Some(at), None) => ContinuationDecision::Continue {
            reason: agent_reason(&response[at + "CONTINUE:".len()..], "Agent decided to continue"),
        },
        (None, Some(at)) => ContinuationDecision::Stop {
            reason: agent_reason(&response[at + "STOP:".len()..], "Agent decided to stop"),
        },
        _ => ContinuationDecision::Stop {
            reason: UNCLEAR_RESPONSE_REASON.to_string(),
        },
    }
}

fn agent_reason(rest: &str, fallback: &str) -> String {
    let trimmed = rest.trim();
    if trimmed.is_empty() {
        fallback.to_string()
    } else {
        format!("Agent: {trimmed}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoppingPolicy {
    pub max_iterations: u32,
    pub scope_drop_tolerance: u32,
}

impl Default for StoppingPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ITERATIONS)
    }
}

impl StoppingPolicy {
    pub fn new(max_iterations: u32) -> Self {
        Self {
            max_iterations,
            scope_drop_tolerance: DEFAULT_SCOPE_DROP_TOLERANCE,
        }
    }

    /// Mechanical checks in priority order; the first match wins.
    pub fn mechanical(
        &self,
        iteration: u32,
        current: &VerificationResult,
        previous: Option<&VerificationResult>,
    ) -> Option<StopCondition> {
        if !current.has_failures() {
            return Some(StopCondition::Success);
        }
        if iteration >= self.max_iterations {
            return Some(StopCondition::Safety {
                ceiling: self.max_iterations,
            });
        }
        let previous = previous?;
        if u64::from(current.total) + u64::from(self.scope_drop_tolerance)
            < u64::from(previous.total)
        {
            return Some(StopCondition::RegressionScope {
                previous_total: previous.total,
                current_total: current.total,
            });
        }
        if current.is_worse_than(previous) {
            return Some(StopCondition::RegressionCount {
                previous_failed: previous.failed,
                current_failed: current.failed,
            });
        }
        if current.failures == previous.failures {
            return Some(StopCondition::NoProgress);
        }
        None
    }

    /// Full evaluation: mechanical checks, then the first-attempt rule, then
    /// the oracle via `consult`.
    ///
    /// `consult` is only invoked when no mechanical condition fires and a
    /// previous result exists. Its answer is read with [`parse_continuation`].
    pub fn evaluate<F>(
        &self,
        iteration: u32,
        current: &VerificationResult,
        previous: Option<&VerificationResult>,
        consult: F,
    ) -> Result<Evaluation>
    where
        F: FnOnce() -> Result<String>,
    {
        if let Some(stop) = self.mechanical(iteration, current, previous) {
            return Ok(Evaluation::Stop(stop));
        }
        if previous.is_none() {
            return Ok(Evaluation::Continue {
                reason: FIRST_ATTEMPT_REASON.to_string(),
            });
        }
        let answer = consult()?;
        Ok(parse_continuation(&answer).into())
    }
}
