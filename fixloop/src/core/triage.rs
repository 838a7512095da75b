//! Mapping failing tests to the functions they exercise.

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::core::failures::{FailureRecord, UNKNOWN_FILE};

const TEST_PREFIX: &str = "test_";

/// Where a failing test points in the source tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TriageTarget {
    pub test_name: String,
    pub function: String,
    /// Candidate source file, when one could be derived.
    pub source_file: Option<PathBuf>,
}

/// `test_fetch_user` exercises `fetch_user`; names without the prefix map to themselves.
pub fn function_under_test(test_method: &str) -> &str {
    match test_method.strip_prefix(TEST_PREFIX) {
        Some(rest) if !rest.is_empty() => rest,
        _ => test_method,
    }
}

/// `tests/test_accounts.py` under `src` maps to `src/accounts.py`.
pub fn source_candidate(test_file: &str, src_root: &Path) -> Option<PathBuf> {
    let file_name = Path::new(test_file).file_name()?.to_str()?;
    let stripped = file_name.strip_prefix(TEST_PREFIX).unwrap_or(file_name);
    if !stripped.ends_with(".py") {
        return None;
    }
    Some(src_root.join(stripped))
}

/// Module file named by the dotted test path (`tests.test_accounts.T.t`).
fn module_file_from_name(test_name: &str) -> Option<String> {
    test_name
        .split('.')
        .find(|segment| segment.starts_with(TEST_PREFIX))
        .map(|segment| format!("{segment}.py"))
}

pub fn target_for(record: &FailureRecord, src_root: &Path) -> TriageTarget {
    let test_file = if record.test_file == UNKNOWN_FILE {
        module_file_from_name(&record.test_name)
    } else {
        Some(record.test_file.clone())
    };
    TriageTarget {
        test_name: record.test_name.clone(),
        function: function_under_test(&record.test_method).to_string(),
        source_file: test_file.and_then(|file| source_candidate(&file, src_root)),
    }
}
