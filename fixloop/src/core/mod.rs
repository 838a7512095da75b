//! Deterministic, pure logic shared by the fix and refactor loops.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data structures and return deterministic outputs suitable for tests.

pub mod artifact;
pub mod failures;
pub mod ledger;
pub mod response;
pub mod stopping;
pub mod summary;
pub mod triage;
pub mod validator;
pub mod verification;
