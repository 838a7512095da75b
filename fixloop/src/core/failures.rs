//! Structured failure extraction from raw test-run text.
//!
//! Two output dialects are understood:
//!
//! - unittest blocks delimited by a rule of 70+ `=` characters, each starting
//!   with `FAIL: <method> (<dotted.path>)`;
//! - pytest verbose lines `tests/<file>.py::<Class>::<method> FAILED` with an
//!   optional `___ <test> ___` detail section.
//!
//! Extraction is pure and never fails: blocks that do not match the expected
//! grammar are skipped.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Placeholder path when a block carries no `File "...", line N` frame.
pub const UNKNOWN_FILE: &str = "unknown";
/// Error kind used when no `<Word>Error:` line is present.
pub const UNKNOWN_ERROR_KIND: &str = "Unknown";
/// Error message used when no `<Word>Error:` line is present.
pub const DEFAULT_ERROR_MESSAGE: &str = "Test failed";

static BLOCK_RULE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"={70,}\n").unwrap());
static HEADER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^FAIL:\s+(\w+)\s+\(([^)]+)\)").unwrap());
static FILE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"File\s+"([^"]+)",\s+line\s+(\d+),\s+in\s+\w+"#).unwrap());
static ERROR_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(\w+Error):\s*(.+)").unwrap());
static TRACE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)-{70,}\n(.+)").unwrap());

static PYTEST_FAILED_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(tests/[\w/]+\.py)::([\w:]+)\s+FAILED").unwrap());
static PYTEST_SECTION_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"_+ [\w:.]+ _+").unwrap());
static PYTEST_LINE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r":(\d+):").unwrap());

/// One parsed test failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureRecord {
    /// Source file of the failing frame, or [`UNKNOWN_FILE`].
    pub test_file: String,
    /// Fully qualified test identifier (`module.Class.method`).
    pub test_name: String,
    /// Owning class, when the dotted path has at least three segments.
    pub test_class: Option<String>,
    /// Leaf method name. Never empty.
    pub test_method: String,
    pub error_kind: String,
    pub error_message: String,
    pub trace: String,
    pub line_number: Option<u32>,
}

/// Extract unittest-style failure records, in input order.
pub fn extract(raw: &str) -> Vec<FailureRecord> {
    BLOCK_RULE_RE
        .split(raw)
        .filter_map(|block| parse_block(block.trim_start()))
        .collect()
}

fn parse_block(block: &str) -> Option<FailureRecord> {
    if !block.starts_with("FAIL:") {
        return None;
    }
    // A malformed header drops the whole block; partial records are never emitted.
    let header = HEADER_RE.captures(block)?;
    let test_method = header[1].to_string();
    let full_path = &header[2];

    let segments: Vec<&str> = full_path.split('.').collect();
    let (test_class, test_name) = match segments.len() {
        n if n >= 3 => (Some(segments[n - 2].to_string()), full_path.to_string()),
        2 => (None, full_path.to_string()),
        _ => (None, test_method.clone()),
    };

    let (test_file, line_number) = match FILE_RE.captures(block) {
        Some(caps) => (caps[1].to_string(), caps[2].parse().ok()),
        None => (UNKNOWN_FILE.to_string(), None),
    };

    let (error_kind, error_message) = match ERROR_RE.captures(block) {
        Some(caps) => (caps[1].to_string(), caps[2].trim().to_string()),
        None => (
            UNKNOWN_ERROR_KIND.to_string(),
            DEFAULT_ERROR_MESSAGE.to_string(),
        ),
    };

    let trace = match TRACE_RE.captures(block) {
        Some(caps) => caps[1].trim().to_string(),
        None => block.to_string(),
    };

    Some(FailureRecord {
        test_file,
        test_name,
        test_class,
        test_method,
        error_kind,
        error_message,
        trace,
        line_number,
    })
}

/// Extract failure records from pytest verbose output.
pub fn extract_pytest(raw: &str) -> Vec<FailureRecord> {
    PYTEST_FAILED_RE
        .captures_iter(raw)
        .map(|caps| {
            let test_file = caps[1].to_string();
            let test_path = caps[2].to_string();
            let parts: Vec<&str> = test_path.split("::").collect();
            let (test_class, test_method) = match parts.as_slice() {
                [class, method] => (Some(class.to_string()), method.to_string()),
                _ => (None, parts.last().copied().unwrap_or_default().to_string()),
            };

            let mut record = FailureRecord {
                test_file,
                test_name: test_path.clone(),
                test_class,
                test_method,
                error_kind: UNKNOWN_ERROR_KIND.to_string(),
                error_message: DEFAULT_ERROR_MESSAGE.to_string(),
                trace: String::new(),
                line_number: None,
            };
            if let Some(section) = pytest_section(raw, &test_path) {
                fill_from_section(&mut record, section);
            }
            record
        })
        .filter(|record| !record.test_method.is_empty())
        .collect()
}

fn pytest_section<'a>(raw: &'a str, test_path: &str) -> Option<&'a str> {
    let header = Regex::new(&format!(r"_+ {} _+", regex::escape(test_path))).ok()?;
    let start = header.find(raw)?.end();
    let rest = &raw[start..];
    let end = PYTEST_SECTION_RE
        .find(rest)
        .map(|m| m.start())
        .unwrap_or(rest.len());
    Some(&rest[..end])
}

fn fill_from_section(record: &mut FailureRecord, section: &str) {
    record.trace = section.trim().to_string();
    if let Some(caps) = ERROR_RE.captures(section) {
        record.error_kind = caps[1].to_string();
        record.error_message = caps[2].trim().to_string();
    }
    if let Some(caps) = PYTEST_LINE_RE.captures(section) {
        record.line_number = caps[1].parse().ok();
    }
}

/// Pick the dialect from the output shape and extract with it.
pub fn extract_any(raw: &str) -> Vec<FailureRecord> {
    let unittest_rule = "=".repeat(70);
    if raw.contains(&unittest_rule) && raw.contains("FAIL:") {
        extract(raw)
    } else {
        extract_pytest(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{SAMPLE_PYTEST_OUTPUT, SAMPLE_UNITTEST_OUTPUT};

    fn rule(ch: char) -> String {
        ch.to_string().repeat(70)
    }

    fn block(header: &str, body: &str) -> String {
        format!("{}\n{header}\n{}\n{body}\n", rule('='), rule('-'))
    }

    #[test]
    fn empty_input_yields_no_records() {
        assert!(extract("").is_empty());
    }

    #[test]
    fn summary_only_output_yields_no_records() {
        let output = format!("\n{}\nRan 10 tests in 0.234s\n\nOK\n", rule('-'));
        assert!(extract(&output).is_empty());
    }

    #[test]
    fn sample_output_yields_records_in_order() {
        let records = extract(SAMPLE_UNITTEST_OUTPUT);
        assert_eq!(records.len(), 2);

        assert_eq!(records[0].test_method, "test_log_level_filtering");
        assert_eq!(records[0].line_number, Some(184));
        assert_eq!(
            records[0].test_class.as_deref(),
            Some("TestCentralLoggingIntegration")
        );
        assert_eq!(
            records[0].test_name,
            "test_central_logging_integration.TestCentralLoggingIntegration.test_log_level_filtering"
        );
        assert_eq!(
            records[0].test_file,
            "/app/tests/test_central_logging_integration.py"
        );
        assert_eq!(records[0].error_kind, "AssertionError");
        assert_eq!(
            records[0].error_message,
            "'Warning message' not found in ''"
        );
        assert!(records[0].trace.starts_with("Traceback"));

        assert_eq!(records[1].test_method, "test_logging_hierarchy_capture");
        assert_eq!(records[1].line_number, Some(153));
        assert_eq!(
            records[1].test_class.as_deref(),
            Some("TestCentralLoggingIntegration")
        );
    }

    #[test]
    fn extraction_is_idempotent() {
        assert_eq!(
            extract(SAMPLE_UNITTEST_OUTPUT),
            extract(SAMPLE_UNITTEST_OUTPUT)
        );
    }

    #[test]
    fn header_without_dotted_path_is_dropped() {
        let output = block("FAIL: foo", "Some error occurred");
        assert!(extract(&output).is_empty());
    }

    #[test]
    fn two_segment_path_has_no_class() {
        let output = block(
            "FAIL: test_standalone (test_module.test_standalone)",
            "AssertionError: 1 != 2",
        );
        let records = extract(&output);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].test_class, None);
        assert_eq!(records[0].test_name, "test_module.test_standalone");
    }

    #[test]
    fn three_segment_path_names_the_class() {
        let output = block("FAIL: t (m.C.t)", "AssertionError: boom");
        let records = extract(&output);
        assert_eq!(records[0].test_class.as_deref(), Some("C"));
        assert_eq!(records[0].test_name, "m.C.t");
    }

    #[test]
    fn single_segment_path_uses_method_name() {
        let output = block("FAIL: test_alone (standalone)", "AssertionError: boom");
        let records = extract(&output);
        assert_eq!(records[0].test_name, "test_alone");
        assert_eq!(records[0].test_class, None);
    }

    #[test]
    fn missing_frame_uses_unknown_file() {
        let output = block(
            "FAIL: test_no_file (test_module.TestClass.test_no_file)",
            "Traceback (most recent call last):\n  Some error without file path\nAssertionError: Something went wrong",
        );
        let records = extract(&output);
        assert_eq!(records[0].test_file, UNKNOWN_FILE);
        assert_eq!(records[0].line_number, None);
    }

    #[test]
    fn missing_error_line_uses_defaults() {
        let output = block("FAIL: test_x (m.C.test_x)", "nothing useful here");
        let records = extract(&output);
        assert_eq!(records[0].error_kind, UNKNOWN_ERROR_KIND);
        assert_eq!(records[0].error_message, DEFAULT_ERROR_MESSAGE);
    }

    #[test]
    fn non_assertion_error_kinds_are_captured() {
        let output = block(
            "FAIL: test_value_error (test_module.TestClass.test_value_error)",
            "Traceback (most recent call last):\n  File \"/app/tests/test_module.py\", line 50, in test_value_error\n    raise ValueError(\"Invalid value\")\nValueError: Invalid value",
        );
        let records = extract(&output);
        assert_eq!(records[0].error_kind, "ValueError");
        assert_eq!(records[0].error_message, "Invalid value");
        assert_eq!(records[0].line_number, Some(50));
    }

    #[test]
    fn trace_keeps_every_frame() {
        let output = block(
            "FAIL: test_complex (m.C.test_complex)",
            "Traceback (most recent call last):\n  File \"/t.py\", line 100, in test_complex\n    self.helper_method()\n  File \"/t.py\", line 110, in helper_method\n    return 1\nAssertionError: nope",
        );
        let records = extract(&output);
        assert_eq!(records[0].line_number, Some(100));
        assert!(records[0].trace.contains("line 110"));
        assert!(records[0].trace.contains("helper_method"));
    }

    #[test]
    fn unicode_messages_survive() {
        let output = block("FAIL: test_u (m.C.test_u)", "AssertionError: 'café' != 'cafe'");
        assert_eq!(extract(&output)[0].error_message, "'café' != 'cafe'");
    }

    #[test]
    fn pytest_lines_are_extracted_with_section_detail() {
        let records = extract_pytest(SAMPLE_PYTEST_OUTPUT);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].test_file, "tests/test_accounts.py");
        assert_eq!(records[0].test_class.as_deref(), Some("TestAccounts"));
        assert_eq!(records[0].test_method, "test_lookup");
        assert_eq!(records[0].error_kind, "AssertionError");
        assert_eq!(records[0].line_number, Some(12));
        assert_eq!(records[1].test_class, None);
        assert_eq!(records[1].test_method, "test_plain");
    }

    #[test]
    fn extract_any_picks_the_dialect() {
        assert_eq!(extract_any(SAMPLE_UNITTEST_OUTPUT).len(), 2);
        assert_eq!(extract_any(SAMPLE_PYTEST_OUTPUT).len(), 2);
    }
}
