//! Test-only fixtures: sample tool output, Python sources, and scripted collaborators.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};

use crate::core::verification::VerificationResult;
use crate::error::FixError;
use crate::io::verifier::Verifier;

/// Two unittest failure blocks as printed by `python -m unittest`.
pub const SAMPLE_UNITTEST_OUTPUT: &str = r#"======================================================================
FAIL: test_log_level_filtering (test_central_logging_integration.TestCentralLoggingIntegration.test_log_level_filtering)
Test that log level filtering works correctly.
----------------------------------------------------------------------
Traceback (most recent call last):
  File "/app/tests/test_central_logging_integration.py", line 184, in test_log_level_filtering
    self.assertIn("Warning message", output)
AssertionError: 'Warning message' not found in ''

======================================================================
FAIL: test_logging_hierarchy_capture (test_central_logging_integration.TestCentralLoggingIntegration.test_logging_hierarchy_capture)
Test that child loggers inherit central logging configuration.
----------------------------------------------------------------------
Traceback (most recent call last):
  File "/app/tests/test_central_logging_integration.py", line 153, in test_logging_hierarchy_capture
    self.assertIn("Parent message", output)
AssertionError: 'Parent message' not found in ''
"#;

/// `pytest -v` output with two failures and one pass.
pub const SAMPLE_PYTEST_OUTPUT: &str = r#"============================= test session starts ==============================
collected 3 items

tests/test_accounts.py::TestAccounts::test_lookup FAILED                  [ 33%]
tests/test_accounts.py::TestAccounts::test_create PASSED                  [ 66%]
tests/test_plain.py::test_plain FAILED                                    [100%]

=================================== FAILURES ===================================
__________________________ TestAccounts::test_lookup ___________________________

self = <tests.test_accounts.TestAccounts object at 0x7f>

    def test_lookup(self):
>       assert lookup("alice") == "alice"
E       AssertionError: assert 'bob' == 'alice'

tests/test_accounts.py:12: AssertionError
__________________________________ test_plain __________________________________

    def test_plain():
>       assert 1 == 2
E       assert 1 == 2

tests/test_plain.py:4: AssertionError
========================= 2 failed, 1 passed in 0.12s ==========================
"#;

/// A class whose primary method is `process_order` and whose `fetch_user`
/// reads the environment and calls out over HTTP.
pub const ORDER_MANAGER_SOURCE: &str = r#"import os

import requests


class OrderManager:
    def __init__(self):
        self.orders = []

    def process_order(self, order_id):
        order = {"id": order_id}
        user = self.fetch_user(order_id)
        order["user"] = user
        order["total"] = 0
        for line in range(3):
            order["total"] += line
        self.orders.append(order)
        return order

    def fetch_user(self, user_id):
        base = os.environ["USER_API"]
        return requests.get(f"{base}/users/{user_id}").json()
"#;

/// `fetch_user` moved into `FetchUserService`, call site delegating.
pub const EXTRACTED_FETCH_USER: &str = r#"class FetchUserService:
    def __init__(self, client: HttpClient, base_url: str) -> None:
        self.client = client
        self.base_url = base_url

    def fetch_user(self, user_id: int) -> dict:
        return self.client.get(f"{self.base_url}/users/{user_id}")


class OrderManager:
    def __init__(self, fetch_user_service: FetchUserService) -> None:
        self.orders = []
        self.fetch_user_service = fetch_user_service

    def process_order(self, order_id):
        order = {"id": order_id}
        order["user"] = self.fetch_user(order_id)
        self.orders.append(order)
        return order

    def fetch_user(self, user_id: int) -> dict:
        return self.fetch_user_service.fetch_user(user_id)
"#;

/// A service that still reads the environment and builds its own client.
pub const REJECTED_FETCH_USER: &str = r#"class FetchUserService:
    def __init__(self) -> None:
        self.base = os.environ["USER_API"]
        self.http = requests.Session()

    def fetch_user(self, user_id: int) -> dict:
        return self.http.get(f"{self.base}/users/{user_id}").json()


class OrderManager:
    def fetch_user(self, user_id):
        return FetchUserService().fetch_user(user_id)
"#;

/// A result with `passed` passing tests and one failure per summary.
pub fn failing(passed: u32, failures: &[&str]) -> VerificationResult {
    let failed = failures.len() as u32;
    VerificationResult {
        passed,
        failed,
        total: passed + failed,
        failures: failures.iter().map(|f| f.to_string()).collect(),
        exit_code: 1,
        output: String::new(),
    }
}

pub fn passing(passed: u32) -> VerificationResult {
    VerificationResult {
        exit_code: 0,
        ..failing(passed, &[])
    }
}

/// Replays queued verification results and records each requested target.
#[derive(Debug, Default)]
pub struct ScriptedVerifier {
    results: RefCell<VecDeque<VerificationResult>>,
    targets: RefCell<Vec<String>>,
    missing_program: Option<String>,
}

impl ScriptedVerifier {
    pub fn new(results: impl IntoIterator<Item = VerificationResult>) -> Self {
        Self {
            results: RefCell::new(results.into_iter().collect()),
            ..Self::default()
        }
    }

    /// A verifier whose program cannot be found.
    pub fn unavailable(program: &str) -> Self {
        Self {
            missing_program: Some(program.to_string()),
            ..Self::default()
        }
    }

    pub fn targets(&self) -> Vec<String> {
        self.targets.borrow().clone()
    }
}

impl Verifier for ScriptedVerifier {
    fn run(&self, target: &str) -> Result<VerificationResult> {
        if let Some(program) = &self.missing_program {
            return Err(FixError::VerifierUnavailable {
                program: program.clone(),
            }
            .into());
        }
        self.targets.borrow_mut().push(target.to_string());
        self.results
            .borrow_mut()
            .pop_front()
            .ok_or_else(|| anyhow!("scripted verifier exhausted"))
    }
}

/// Temporary directory holding files under test.
pub struct Workspace {
    dir: tempfile::TempDir,
}

impl Workspace {
    pub fn new() -> Result<Self> {
        Ok(Self {
            dir: tempfile::tempdir().context("create temp workspace")?,
        })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Write `contents` at `relative`, creating parent directories.
    pub fn write(&self, relative: &str, contents: &str) -> Result<PathBuf> {
        let path = self.dir.path().join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create {}", parent.display()))?;
        }
        fs::write(&path, contents).with_context(|| format!("write {}", path.display()))?;
        Ok(path)
    }

    pub fn read(&self, relative: &str) -> Result<String> {
        let path = self.dir.path().join(relative);
        fs::read_to_string(&path).with_context(|| format!("read {}", path.display()))
    }
}
