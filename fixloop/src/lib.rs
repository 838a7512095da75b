//! Iterative test-fix and extract-to-service refactoring loops.
//!
//! A fix session runs an external verification command, asks a fix oracle to
//! analyze and repair the failures, and repeats until a stopping condition
//! fires. A refactoring session asks the oracle to move methods into service
//! classes and only keeps proposals that pass structural validation.
//!
//! - **[`core`]**: Pure, deterministic logic (failure extraction, ledger,
//!   stopping rules, Python validation). No I/O, fully testable in isolation.
//! - **[`io`]**: Side-effecting operations (processes, files, configuration,
//!   the oracle). Isolated to enable scripted doubles in tests.
//!
//! Orchestration modules ([`fix`], [`refactor`], [`triage`]) coordinate core
//! logic with I/O to implement CLI commands.

pub mod core;
pub mod error;
pub mod exit_codes;
pub mod fix;
pub mod interrupt;
pub mod io;
pub mod logging;
pub mod refactor;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
pub mod triage;
