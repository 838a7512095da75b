//! Prompt rendering for the fix oracle.

use anyhow::{Context, Result};
use minijinja::{Environment, context};
use serde::Serialize;

use crate::core::ledger::{Attempt, Ledger};
use crate::core::validator::python::ClassInfo;
use crate::core::verification::VerificationResult;

const ANALYSIS_TEMPLATE: &str = include_str!("prompts/analysis.md");
const APPLY_TEMPLATE: &str = include_str!("prompts/apply.md");
const CONTINUATION_TEMPLATE: &str = include_str!("prompts/continuation.md");
const PRIMARY_TEMPLATE: &str = include_str!("prompts/primary.md");
const EXTRACT_TEMPLATE: &str = include_str!("prompts/extract.md");

/// Failure summaries shown per history entry before eliding the rest.
const HISTORY_FAILURES_SHOWN: usize = 3;
/// Current failures shown in the continuation question.
const CURRENT_FAILURES_SHOWN: usize = 5;

/// One prior fix attempt as rendered into prompts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FixHistoryEntry {
    pub sequence: usize,
    /// Comma-separated changed files, or `None`.
    pub files: String,
    pub passed: u32,
    pub failed: u32,
    /// First few failure summaries, comma-separated.
    pub failures: String,
    /// Failure summaries not shown.
    pub more: usize,
}

impl FixHistoryEntry {
    fn from_attempt(attempt: &Attempt) -> Self {
        let files = if attempt.artifacts_changed.is_empty() {
            "None".to_string()
        } else {
            attempt.artifacts_changed.join(", ")
        };
        let (passed, failed, failures) = attempt
            .verification
            .as_ref()
            .map(|v| (v.passed, v.failed, v.failures.as_slice()))
            .unwrap_or_default();
        Self {
            sequence: attempt.sequence,
            files,
            passed,
            failed,
            failures: failures
                .iter()
                .take(HISTORY_FAILURES_SHOWN)
                .cloned()
                .collect::<Vec<_>>()
                .join(", "),
            more: failures.len().saturating_sub(HISTORY_FAILURES_SHOWN),
        }
    }
}

/// Fix-loop history in ledger order.
pub fn fix_history(ledger: &Ledger) -> Vec<FixHistoryEntry> {
    ledger
        .attempts()
        .iter()
        .map(FixHistoryEntry::from_attempt)
        .collect()
}

#[derive(Debug, Clone, Serialize)]
struct ExtractHistoryEntry {
    sequence: usize,
    service: String,
    errors: String,
}

/// Inputs for the extract-to-service prompt.
#[derive(Debug, Clone)]
pub struct ExtractRequest<'a> {
    pub class_name: &'a str,
    pub method: &'a str,
    pub line: usize,
    pub service: &'a str,
    pub accesses_environment: bool,
    pub external_calls: &'a [String],
    pub source: &'a str,
}

/// Template engine wrapper around minijinja.
pub struct PromptEngine {
    env: Environment<'static>,
}

impl PromptEngine {
    pub fn new() -> Result<Self> {
        let mut env = Environment::new();
        for (name, source) in [
            ("analysis", ANALYSIS_TEMPLATE),
            ("apply", APPLY_TEMPLATE),
            ("continuation", CONTINUATION_TEMPLATE),
            ("primary", PRIMARY_TEMPLATE),
            ("extract", EXTRACT_TEMPLATE),
        ] {
            env.add_template(name, source)
                .with_context(|| format!("load {name} template"))?;
        }
        Ok(Self { env })
    }

    pub fn analysis(&self, result: &VerificationResult, ledger: &Ledger) -> Result<String> {
        let template = self.env.get_template("analysis")?;
        let rendered = template.render(context! {
            total => result.total,
            passed => result.passed,
            failed => result.failed,
            failures => &result.failures,
            output => result.output.trim_end(),
            history => fix_history(ledger),
        })?;
        Ok(rendered)
    }

    pub fn apply(&self, analysis: &str) -> Result<String> {
        let template = self.env.get_template("apply")?;
        let rendered = template.render(context! {
            analysis => analysis.trim(),
        })?;
        Ok(rendered)
    }

    pub fn continuation(&self, current: &VerificationResult, ledger: &Ledger) -> Result<String> {
        let template = self.env.get_template("continuation")?;
        let current_failures = current
            .failures
            .iter()
            .take(CURRENT_FAILURES_SHOWN)
            .cloned()
            .collect::<Vec<_>>()
            .join(", ");
        let rendered = template.render(context! {
            passed => current.passed,
            failed => current.failed,
            current_failures => current_failures,
            history => fix_history(ledger),
        })?;
        Ok(rendered)
    }

    pub fn primary(&self, class: &ClassInfo, source: &str) -> Result<String> {
        let template = self.env.get_template("primary")?;
        let rendered = template.render(context! {
            class_name => &class.name,
            methods => &class.methods,
            source => source.trim_end(),
        })?;
        Ok(rendered)
    }

    /// Render the extraction prompt with the failed attempts recorded for `request.method`.
    pub fn extract(&self, request: &ExtractRequest<'_>, ledger: &Ledger) -> Result<String> {
        let template = self.env.get_template("extract")?;
        let history: Vec<ExtractHistoryEntry> = ledger
            .history_for(request.method)
            .map(|attempt| ExtractHistoryEntry {
                sequence: attempt.sequence,
                service: attempt.proposed_unit.clone().unwrap_or_default(),
                errors: attempt.validation_errors.join(", "),
            })
            .collect();
        let rendered = template.render(context! {
            class_name => request.class_name,
            method => request.method,
            line => request.line,
            service => request.service,
            accesses_environment => request.accesses_environment,
            external_calls => request.external_calls,
            source => request.source.trim_end(),
            history => history,
        })?;
        Ok(rendered)
    }
}
