//! Side-effecting adapters: processes, files, configuration, oracle, prompts.

pub mod config;
pub mod files;
pub mod oracle;
pub mod process;
pub mod prompt;
pub mod verifier;
