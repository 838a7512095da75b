//! Append-only attempt history for one fix or refactor session.
//!
//! The ledger never forgets: entries are assigned a sequence number on append
//! and are exposed only through read queries. Rolling back a rejected
//! candidate resets the artifact state, not the history.

use serde::{Deserialize, Serialize};

use crate::core::verification::VerificationResult;

/// Failures recorded against a single target before it is abandoned.
pub const DEFAULT_MAX_FAILURES_PER_TARGET: usize = 3;

/// Verification counts captured alongside an attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationSnapshot {
    pub passed: u32,
    pub failed: u32,
    pub total: u32,
    pub failures: Vec<String>,
}

impl From<&VerificationResult> for VerificationSnapshot {
    fn from(result: &VerificationResult) -> Self {
        Self {
            passed: result.passed,
            failed: result.failed,
            total: result.total,
            failures: result.failures.clone(),
        }
    }
}

/// Attempt as proposed by the caller, before the ledger numbers it.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NewAttempt {
    pub target: String,
    pub proposed_unit: Option<String>,
    pub success: bool,
    pub validation_errors: Vec<String>,
    pub artifacts_changed: Vec<String>,
    pub verification: Option<VerificationSnapshot>,
}

/// One recorded unit of work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attempt {
    /// 1-based position in the ledger.
    pub sequence: usize,
    pub target: String,
    pub proposed_unit: Option<String>,
    pub success: bool,
    pub validation_errors: Vec<String>,
    pub artifacts_changed: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verification: Option<VerificationSnapshot>,
}

/// Whether a target may be retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryBudget {
    Available { remaining: usize },
    Exhausted,
}

impl RetryBudget {
    pub fn is_exhausted(self) -> bool {
        matches!(self, RetryBudget::Exhausted)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Ledger {
    attempts: Vec<Attempt>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an attempt and return the sequence number it was given.
    pub fn append(&mut self, attempt: NewAttempt) -> usize {
        let sequence = self.attempts.len() + 1;
        self.attempts.push(Attempt {
            sequence,
            target: attempt.target,
            proposed_unit: attempt.proposed_unit,
            success: attempt.success,
            validation_errors: attempt.validation_errors,
            artifacts_changed: attempt.artifacts_changed,
            verification: attempt.verification,
        });
        sequence
    }

    pub fn attempts(&self) -> &[Attempt] {
        &self.attempts
    }

    pub fn len(&self) -> usize {
        self.attempts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attempts.is_empty()
    }

    pub fn last(&self) -> Option<&Attempt> {
        self.attempts.last()
    }

    /// Failed attempts for `target`, in the order they were recorded.
    pub fn history_for<'a>(&'a self, target: &'a str) -> impl Iterator<Item = &'a Attempt> + 'a {
        self.attempts
            .iter()
            .filter(move |attempt| attempt.target == target && !attempt.success)
    }

    pub fn failure_count(&self, target: &str) -> usize {
        self.history_for(target).count()
    }

    pub fn success_count(&self) -> usize {
        self.attempts.iter().filter(|attempt| attempt.success).count()
    }

    /// Remaining retries for `target` given a per-target failure cap.
    pub fn retry_budget(&self, target: &str, max_failures: usize) -> RetryBudget {
        let failures = self.failure_count(target);
        if failures >= max_failures {
            RetryBudget::Exhausted
        } else {
            RetryBudget::Available {
                remaining: max_failures - failures,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attempt(target: &str, success: bool) -> NewAttempt {
        NewAttempt {
            target: target.to_string(),
            success,
            validation_errors: if success {
                Vec::new()
            } else {
                vec!["call-site-delegated: not delegated".to_string()]
            },
            ..NewAttempt::default()
        }
    }

    #[test]
    fn append_assigns_one_based_sequence() {
        let mut ledger = Ledger::new();
        assert!(ledger.is_empty());
        assert_eq!(ledger.append(attempt("a", false)), 1);
        assert_eq!(ledger.append(attempt("b", true)), 2);
        assert_eq!(ledger.len(), 2);
        let sequences: Vec<usize> = ledger.attempts().iter().map(|a| a.sequence).collect();
        assert_eq!(sequences, vec![1, 2]);
        assert_eq!(ledger.last().map(|a| a.target.as_str()), Some("b"));
    }

    #[test]
    fn history_only_returns_failures_for_target() {
        let mut ledger = Ledger::new();
        ledger.append(attempt("x", false));
        ledger.append(attempt("y", false));
        ledger.append(attempt("x", true));
        ledger.append(attempt("x", false));

        let history: Vec<usize> = ledger.history_for("x").map(|a| a.sequence).collect();
        assert_eq!(history, vec![1, 4]);
        assert_eq!(ledger.success_count(), 1);
    }

    /// Three failures and no successes exhaust the default per-target budget.
    #[test]
    fn retry_budget_exhausts_after_three_failures() {
        let mut ledger = Ledger::new();
        for _ in 0..2 {
            ledger.append(attempt("X", false));
        }
        assert_eq!(
            ledger.retry_budget("X", DEFAULT_MAX_FAILURES_PER_TARGET),
            RetryBudget::Available { remaining: 1 }
        );

        ledger.append(attempt("X", false));
        assert!(
            ledger
                .retry_budget("X", DEFAULT_MAX_FAILURES_PER_TARGET)
                .is_exhausted()
        );
        assert_eq!(
            ledger.retry_budget("Y", DEFAULT_MAX_FAILURES_PER_TARGET),
            RetryBudget::Available { remaining: 3 }
        );
    }

    #[test]
    fn serializes_as_plain_list() {
        let mut ledger = Ledger::new();
        ledger.append(attempt("x", true));
        let json = serde_json::to_value(&ledger).expect("serialize");
        assert!(json.is_array());
        assert_eq!(json[0]["sequence"], 1);
        assert_eq!(json[0]["target"], "x");
        assert!(json[0].get("verification").is_none());
    }
}
