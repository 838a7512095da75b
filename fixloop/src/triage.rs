//! Failure triage for `fixloop triage`: failing test to function under test
//! to structural check.

use std::path::Path;

use anyhow::Result;
use serde::Serialize;
use tracing::{debug, instrument};

use crate::core::failures::{FailureRecord, extract_any};
use crate::core::triage::{TriageTarget, target_for};
use crate::core::validator::{self, ValidationIssue, ValidationLimits};
use crate::io::files::read_artifact;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TriageEntry {
    pub failure: FailureRecord,
    pub target: TriageTarget,
    pub issues: Vec<ValidationIssue>,
}

impl TriageEntry {
    /// True when the function under test was found and passes every rule.
    pub fn is_clean(&self) -> bool {
        validator::is_accepted(&self.issues)
    }
}

/// Map each failure in `raw` to its function under test and validate it.
#[instrument(skip_all, fields(src_root = %src_root.display()))]
pub fn run_triage(
    raw: &str,
    src_root: &Path,
    limits: ValidationLimits,
) -> Result<Vec<TriageEntry>> {
    let records = extract_any(raw);
    debug!(failures = records.len(), "extracted failures");
    records
        .into_iter()
        .map(|failure| {
            let target = target_for(&failure, src_root);
            let issues = check_target(&target, limits)?;
            Ok(TriageEntry {
                failure,
                target,
                issues,
            })
        })
        .collect()
}

fn check_target(target: &TriageTarget, limits: ValidationLimits) -> Result<Vec<ValidationIssue>> {
    let Some(path) = target.source_file.as_deref() else {
        return Ok(vec![validator::unit_unavailable(format!(
            "No source file could be derived for {}",
            target.test_name
        ))]);
    };
    if !path.is_file() {
        return Ok(vec![validator::unit_unavailable(format!(
            "Source file {} not found",
            path.display()
        ))]);
    }
    let text = read_artifact(path)?;
    Ok(validator::validate_with(&target.function, &text, limits))
}
