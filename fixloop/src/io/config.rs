//! fixloop configuration stored in `.fixloop.toml`.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::ledger::DEFAULT_MAX_FAILURES_PER_TARGET;
use crate::core::stopping::DEFAULT_MAX_ITERATIONS;
use crate::core::validator::{DEFAULT_MAX_UNIT_LINES, ValidationLimits};
use crate::io::files::write_atomic;

/// Config file looked up in the working directory when `--config` is absent.
pub const DEFAULT_CONFIG_FILE: &str = ".fixloop.toml";

/// fixloop configuration (TOML).
///
/// Intended to be edited by humans. Missing fields take the defaults below.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct FixConfig {
    /// Iteration ceiling for `fixloop fix`.
    pub max_iterations: u32,

    pub verify: VerifyConfig,
    pub oracle: OracleConfig,
    pub refactor: RefactorConfig,
    pub validation: ValidationConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct VerifyConfig {
    /// Verification command; the target is appended as the last argument.
    pub command: Vec<String>,
    /// Directory the command runs in; the current directory when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workdir: Option<PathBuf>,
    pub timeout_secs: u64,
    /// Truncate captured stdout/stderr beyond this many bytes.
    pub output_limit_bytes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct OracleConfig {
    /// Oracle command; the prompt is written to its stdin.
    pub command: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workdir: Option<PathBuf>,
    pub timeout_secs: u64,
    pub output_limit_bytes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RefactorConfig {
    /// Iteration ceiling per class.
    pub max_iterations: u32,
    /// Failed attempts before a target is abandoned.
    pub max_failures_per_target: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ValidationConfig {
    /// Inclusive ceiling for the `max-length` rule.
    pub max_unit_lines: usize,
}

impl Default for VerifyConfig {
    fn default() -> Self {
        Self {
            command: vec!["pytest".to_string(), "-v".to_string(), "--tb=short".to_string()],
            workdir: None,
            timeout_secs: 5 * 60,
            output_limit_bytes: 1_000_000,
        }
    }
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            command: vec!["claude".to_string(), "-p".to_string()],
            workdir: None,
            timeout_secs: 30 * 60,
            output_limit_bytes: 1_000_000,
        }
    }
}

impl Default for RefactorConfig {
    fn default() -> Self {
        Self {
            max_iterations: 50,
            max_failures_per_target: DEFAULT_MAX_FAILURES_PER_TARGET,
        }
    }
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            max_unit_lines: DEFAULT_MAX_UNIT_LINES,
        }
    }
}

impl Default for FixConfig {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            verify: VerifyConfig::default(),
            oracle: OracleConfig::default(),
            refactor: RefactorConfig::default(),
            validation: ValidationConfig::default(),
        }
    }
}

impl VerifyConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl OracleConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl ValidationConfig {
    pub fn limits(&self) -> ValidationLimits {
        ValidationLimits {
            max_unit_lines: self.max_unit_lines,
        }
    }
}

impl FixConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_iterations == 0 {
            return Err(anyhow!("max_iterations must be > 0"));
        }
        validate_command("verify.command", &self.verify.command)?;
        if self.verify.timeout_secs == 0 {
            return Err(anyhow!("verify.timeout_secs must be > 0"));
        }
        if self.verify.output_limit_bytes == 0 {
            return Err(anyhow!("verify.output_limit_bytes must be > 0"));
        }
        validate_command("oracle.command", &self.oracle.command)?;
        if self.oracle.timeout_secs == 0 {
            return Err(anyhow!("oracle.timeout_secs must be > 0"));
        }
        if self.oracle.output_limit_bytes == 0 {
            return Err(anyhow!("oracle.output_limit_bytes must be > 0"));
        }
        if self.refactor.max_iterations == 0 {
            return Err(anyhow!("refactor.max_iterations must be > 0"));
        }
        if self.refactor.max_failures_per_target == 0 {
            return Err(anyhow!("refactor.max_failures_per_target must be > 0"));
        }
        if self.validation.max_unit_lines == 0 {
            return Err(anyhow!("validation.max_unit_lines must be > 0"));
        }
        Ok(())
    }
}

fn validate_command(field: &str, command: &[String]) -> Result<()> {
    match command.first() {
        Some(program) if !program.trim().is_empty() => Ok(()),
        _ => Err(anyhow!("{field} must be a non-empty array")),
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `FixConfig::default()`.
pub fn load_config(path: &Path) -> Result<FixConfig> {
    if !path.exists() {
        let cfg = FixConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: FixConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("invalid config {}", path.display()))?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &FixConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}
