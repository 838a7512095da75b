//! Errors that end a session instead of feeding the retry loop.
//!
//! Validation failures and unreadable continuation answers are ordinary loop
//! outcomes and never appear here.

use std::path::PathBuf;

use thiserror::Error;

use crate::exit_codes;

#[derive(Error, Debug)]
pub enum FixError {
    /// The artifact could not be read.
    #[error("cannot read artifact {}: {source}", path.display())]
    ArtifactUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The artifact is not valid source.
    #[error("artifact {} has syntax errors", path.display())]
    ArtifactSyntax { path: PathBuf },

    /// The verification command is not installed.
    #[error("verification command `{program}` not found")]
    VerifierUnavailable { program: String },

    /// The oracle process failed or timed out.
    #[error("fix oracle failed: {status}")]
    OracleFailed { status: String },
}

impl FixError {
    pub fn exit_code(&self) -> i32 {
        exit_codes::INVALID
    }
}

/// Exit code for an error returned from a command handler.
pub fn exit_code_for(err: &anyhow::Error) -> i32 {
    err.downcast_ref::<FixError>()
        .map_or(exit_codes::INVALID, FixError::exit_code)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typed_errors_survive_context() {
        let err = anyhow::Error::new(FixError::VerifierUnavailable {
            program: "pytest".to_string(),
        })
        .context("run verification");
        let typed = err.downcast_ref::<FixError>().expect("typed error");
        assert!(matches!(typed, FixError::VerifierUnavailable { .. }));
        assert_eq!(exit_code_for(&err), exit_codes::INVALID);
        assert_eq!(
            typed.to_string(),
            "verification command `pytest` not found"
        );
    }
}
