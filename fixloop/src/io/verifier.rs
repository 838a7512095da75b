//! Verification command adapter.

use std::path::PathBuf;
use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{info, instrument, warn};

use crate::core::verification::{VerificationResult, reduce_output};
use crate::error::FixError;
use crate::io::config::VerifyConfig;
use crate::io::process::{is_program_missing, run_command_with_timeout};

pub trait Verifier {
    /// Run the verification step against `target` and reduce its output.
    fn run(&self, target: &str) -> Result<VerificationResult>;
}

/// Runs the configured command with `target` appended.
#[derive(Debug, Clone)]
pub struct CommandVerifier {
    pub command: Vec<String>,
    pub workdir: Option<PathBuf>,
    pub timeout: Duration,
    pub output_limit_bytes: usize,
}

impl CommandVerifier {
    pub fn from_config(config: &VerifyConfig) -> Self {
        Self {
            command: config.command.clone(),
            workdir: config.workdir.clone(),
            timeout: config.timeout(),
            output_limit_bytes: config.output_limit_bytes,
        }
    }

    fn program(&self) -> &str {
        self.command.first().map(String::as_str).unwrap_or_default()
    }
}

impl Verifier for CommandVerifier {
    #[instrument(skip_all, fields(program = self.program(), verify_target = %target))]
    fn run(&self, target: &str) -> Result<VerificationResult> {
        let (program, args) = self
            .command
            .split_first()
            .context("verification command is empty")?;
        let mut cmd = Command::new(program);
        cmd.args(args).arg(target);
        if let Some(dir) = &self.workdir {
            cmd.current_dir(dir);
        }

        let output = match run_command_with_timeout(cmd, None, self.timeout, self.output_limit_bytes)
        {
            Ok(output) => output,
            Err(err) if is_program_missing(&err) => {
                return Err(FixError::VerifierUnavailable {
                    program: program.clone(),
                }
                .into());
            }
            Err(err) => return Err(err).context("run verification command"),
        };

        if output.timed_out {
            warn!(
                timeout_secs = self.timeout.as_secs(),
                "verification timed out"
            );
            return Ok(VerificationResult::timed_out());
        }

        let result = reduce_output(&output.stdout_text(), &output.stderr_text(), output.exit_code());
        info!(
            passed = result.passed,
            failed = result.failed,
            total = result.total,
            "verification finished"
        );
        Ok(result)
    }
}
