//! Iterative test-fix loop for `fixloop fix`.

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::core::ledger::{Ledger, NewAttempt, VerificationSnapshot};
use crate::core::response::changed_artifacts;
use crate::core::stopping::{Evaluation, StopCondition, StoppingPolicy};
use crate::core::verification::VerificationResult;
use crate::interrupt::Interrupt;
use crate::io::oracle::Oracle;
use crate::io::prompt::PromptEngine;
use crate::io::verifier::Verifier;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixSettings {
    /// Path or scope handed to the verification command.
    pub target: String,
    pub policy: StoppingPolicy,
}

/// Progress record handed to the caller after each iteration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IterationReport {
    pub iteration: u32,
    pub passed: u32,
    pub failed: u32,
    pub total: u32,
    pub artifacts_changed: Vec<String>,
    /// Why the loop continued or stopped after this iteration.
    pub decision: String,
}

/// Summary of a fix session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FixOutcome {
    pub success: bool,
    pub stop: StopCondition,
    pub iterations: u32,
    pub ledger: Ledger,
    pub final_result: Option<VerificationSnapshot>,
}

struct Session {
    ledger: Ledger,
    iteration: u32,
    last: Option<VerificationSnapshot>,
}

impl Session {
    fn finish(self, stop: StopCondition) -> FixOutcome {
        info!(stop = stop.label(), iterations = self.iteration, "fix loop stopped");
        FixOutcome {
            success: stop.is_success(),
            stop,
            iterations: self.iteration,
            ledger: self.ledger,
            final_result: self.last,
        }
    }
}

/// Run verification, ask the oracle for fixes, and repeat until a stop condition.
///
/// Stops with an error only for infrastructure failures (missing verifier,
/// oracle failure). Every other ending is a [`StopCondition`] in the outcome.
#[instrument(skip_all, fields(target = %settings.target, max_iterations = settings.policy.max_iterations))]
pub fn run_fix_loop<V: Verifier, F: FnMut(&IterationReport)>(
    verifier: &V,
    oracle: &mut Oracle,
    prompts: &PromptEngine,
    settings: &FixSettings,
    interrupt: &Interrupt,
    mut on_iteration: F,
) -> Result<FixOutcome> {
    let policy = settings.policy;
    let mut session = Session {
        ledger: Ledger::new(),
        iteration: 0,
        last: None,
    };
    let mut previous: Option<VerificationResult> = None;

    loop {
        if interrupt.is_triggered() {
            return Ok(session.finish(StopCondition::Interrupted));
        }
        session.iteration += 1;
        let iteration = session.iteration;

        let current = verifier
            .run(&settings.target)
            .with_context(|| format!("verify {} (iteration {iteration})", settings.target))?;
        session.last = Some(VerificationSnapshot::from(&current));
        if current.is_timeout() {
            warn!(iteration, "verification timed out");
        }
        info!(
            iteration,
            passed = current.passed,
            failed = current.failed,
            total = current.total,
            "verification result"
        );

        if let Some(stop) = policy.mechanical(iteration, &current, previous.as_ref()) {
            on_iteration(&report(iteration, &current, Vec::new(), stop.to_string()));
            return Ok(session.finish(stop));
        }

        let analysis = oracle
            .ask(&prompts.analysis(&current, &session.ledger)?)
            .context("request failure analysis")?;
        if interrupt.is_triggered() {
            return Ok(session.finish(StopCondition::Interrupted));
        }

        let applied = oracle
            .ask(&prompts.apply(&analysis)?)
            .context("request fix application")?;
        let changed = changed_artifacts(&applied);
        info!(iteration, files = ?changed, "fix applied");
        session.ledger.append(NewAttempt {
            target: settings.target.clone(),
            artifacts_changed: changed.clone(),
            verification: Some(VerificationSnapshot::from(&current)),
            ..NewAttempt::default()
        });
        if interrupt.is_triggered() {
            return Ok(session.finish(StopCondition::Interrupted));
        }

        let ledger = &session.ledger;
        let evaluation = policy
            .evaluate(iteration, &current, previous.as_ref(), || {
                oracle
                    .ask(&prompts.continuation(&current, ledger)?)
                    .context("request continuation decision")
            })?;
        match evaluation {
            Evaluation::Stop(stop) => {
                on_iteration(&report(iteration, &current, changed, stop.to_string()));
                return Ok(session.finish(stop));
            }
            Evaluation::Continue { reason } => {
                info!(iteration, %reason, "continuing");
                on_iteration(&report(iteration, &current, changed, reason));
            }
        }
        previous = Some(current);
    }
}

fn report(
    iteration: u32,
    result: &VerificationResult,
    artifacts_changed: Vec<String>,
    decision: String,
) -> IterationReport {
    IterationReport {
        iteration,
        passed: result.passed,
        failed: result.failed,
        total: result.total,
        artifacts_changed,
        decision,
    }
}
