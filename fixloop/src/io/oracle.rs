//! Fix oracle: the external text-completion collaborator.
//!
//! The loops only rely on a request/response exchange: submit one prompt,
//! then receive a (possibly empty) sequence of text chunks. The variant is
//! chosen at construction.

use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::error::FixError;
use crate::io::config::OracleConfig;
use crate::io::process::{is_program_missing, run_command_with_timeout};

/// One piece of an oracle response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseChunk {
    pub content: String,
}

impl ResponseChunk {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
        }
    }
}

#[derive(Debug)]
pub enum Oracle {
    Command(CommandOracle),
    Scripted(ScriptedOracle),
}

impl Oracle {
    pub fn submit(&mut self, prompt: &str) -> Result<()> {
        match self {
            Oracle::Command(oracle) => oracle.submit(prompt),
            Oracle::Scripted(oracle) => oracle.submit(prompt),
        }
    }

    pub fn receive(&mut self) -> Result<Vec<ResponseChunk>> {
        match self {
            Oracle::Command(oracle) => oracle.receive(),
            Oracle::Scripted(oracle) => oracle.receive(),
        }
    }

    /// Submit `prompt` and concatenate the response chunks.
    pub fn ask(&mut self, prompt: &str) -> Result<String> {
        self.submit(prompt)?;
        let chunks = self.receive()?;
        debug!(chunks = chunks.len(), "oracle responded");
        Ok(chunks.into_iter().map(|chunk| chunk.content).collect())
    }

    /// Prompts seen by a scripted oracle; empty for live oracles.
    pub fn recorded_prompts(&self) -> &[String] {
        match self {
            Oracle::Command(_) => &[],
            Oracle::Scripted(oracle) => oracle.prompts(),
        }
    }
}

/// Spawns the configured command per exchange, prompt on stdin.
#[derive(Debug, Clone)]
pub struct CommandOracle {
    pub command: Vec<String>,
    pub workdir: Option<PathBuf>,
    pub timeout: Duration,
    pub output_limit_bytes: usize,
    pending: Option<String>,
}

impl CommandOracle {
    pub fn from_config(config: &OracleConfig) -> Self {
        Self {
            command: config.command.clone(),
            workdir: config.workdir.clone(),
            timeout: config.timeout(),
            output_limit_bytes: config.output_limit_bytes,
            pending: None,
        }
    }

    pub fn submit(&mut self, prompt: &str) -> Result<()> {
        if self.pending.is_some() {
            warn!("previous oracle prompt was never received; replacing it");
        }
        self.pending = Some(prompt.to_string());
        Ok(())
    }

    #[instrument(skip_all, fields(timeout_secs = self.timeout.as_secs()))]
    pub fn receive(&mut self) -> Result<Vec<ResponseChunk>> {
        let prompt = self
            .pending
            .take()
            .ok_or_else(|| anyhow!("oracle receive called without a submitted prompt"))?;
        let (program, args) = self
            .command
            .split_first()
            .context("oracle command is empty")?;
        let mut cmd = Command::new(program);
        cmd.args(args);
        if let Some(dir) = &self.workdir {
            cmd.current_dir(dir);
        }

        let output = match run_command_with_timeout(
            cmd,
            Some(prompt.as_bytes()),
            self.timeout,
            self.output_limit_bytes,
        ) {
            Ok(output) => output,
            Err(err) if is_program_missing(&err) => {
                return Err(FixError::OracleFailed {
                    status: format!("command `{program}` not found"),
                }
                .into());
            }
            Err(err) => return Err(err).context("run oracle command"),
        };

        if output.timed_out {
            return Err(FixError::OracleFailed {
                status: format!("timed out after {}s", self.timeout.as_secs()),
            }
            .into());
        }
        if !output.status.success() {
            let stderr = output.stderr_text();
            return Err(FixError::OracleFailed {
                status: format!("exit code {}: {}", output.exit_code(), stderr.trim()),
            }
            .into());
        }

        Ok(output
            .stdout_text()
            .split_inclusive('\n')
            .map(ResponseChunk::new)
            .collect())
    }
}

/// Replays canned responses and records every prompt.
#[derive(Debug, Clone, Default)]
pub struct ScriptedOracle {
    responses: VecDeque<Vec<ResponseChunk>>,
    prompts: Vec<String>,
    pending: bool,
}

/// One replay-file entry: a whole response, or explicit chunks.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum ReplayEntry {
    Text(String),
    Chunks(Vec<String>),
}

impl ScriptedOracle {
    /// One single-chunk response per item.
    pub fn new<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::from_chunks(
            responses
                .into_iter()
                .map(|response| vec![ResponseChunk::new(response)]),
        )
    }

    pub fn from_chunks<I>(responses: I) -> Self
    where
        I: IntoIterator<Item = Vec<ResponseChunk>>,
    {
        Self {
            responses: responses.into_iter().collect(),
            prompts: Vec::new(),
            pending: false,
        }
    }

    /// Load responses from a JSON array of strings or string arrays.
    pub fn from_replay_file(path: &Path) -> Result<Self> {
        let contents =
            fs::read_to_string(path).with_context(|| format!("read replay {}", path.display()))?;
        let entries: Vec<ReplayEntry> = serde_json::from_str(&contents)
            .with_context(|| format!("parse replay {}", path.display()))?;
        Ok(Self::from_chunks(entries.into_iter().map(|entry| match entry {
            ReplayEntry::Text(text) => vec![ResponseChunk::new(text)],
            ReplayEntry::Chunks(chunks) => chunks.into_iter().map(ResponseChunk::new).collect(),
        })))
    }

    pub fn submit(&mut self, prompt: &str) -> Result<()> {
        self.prompts.push(prompt.to_string());
        self.pending = true;
        Ok(())
    }

    pub fn receive(&mut self) -> Result<Vec<ResponseChunk>> {
        if !std::mem::take(&mut self.pending) {
            return Err(anyhow!("oracle receive called without a submitted prompt"));
        }
        match self.responses.pop_front() {
            Some(chunks) => Ok(chunks),
            None => {
                warn!("scripted oracle exhausted; returning an empty response");
                Ok(Vec::new())
            }
        }
    }

    pub fn prompts(&self) -> &[String] {
        &self.prompts
    }

    pub fn remaining(&self) -> usize {
        self.responses.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scripted_oracle_replays_in_order_and_records_prompts() {
        let mut oracle = Oracle::Scripted(ScriptedOracle::new(["first", "second"]));
        assert_eq!(oracle.ask("p1").expect("ask"), "first");
        assert_eq!(oracle.ask("p2").expect("ask"), "second");
        assert_eq!(oracle.recorded_prompts(), ["p1", "p2"]);
    }

    #[test]
    fn exhausted_script_yields_empty_response() {
        let mut oracle = Oracle::Scripted(ScriptedOracle::default());
        oracle.submit("p").expect("submit");
        assert!(oracle.receive().expect("receive").is_empty());
    }

    #[test]
    fn receive_requires_submit() {
        let mut scripted = ScriptedOracle::new(["x"]);
        assert!(scripted.receive().is_err());
        assert_eq!(scripted.remaining(), 1);
    }

    #[test]
    fn ask_concatenates_chunks() {
        let mut oracle = Oracle::Scripted(ScriptedOracle::from_chunks([vec![
            ResponseChunk::new("CONT"),
            ResponseChunk::new("INUE: "),
            ResponseChunk::new("more"),
        ]]));
        assert_eq!(oracle.ask("p").expect("ask"), "CONTINUE: more");
    }

    #[test]
    fn replay_file_accepts_strings_and_chunk_lists() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("replay.json");
        fs::write(&path, r#"["one", ["t", "wo"], []]"#).expect("write");
        let mut oracle = Oracle::Scripted(ScriptedOracle::from_replay_file(&path).expect("load"));
        assert_eq!(oracle.ask("a").expect("ask"), "one");
        assert_eq!(oracle.ask("b").expect("ask"), "two");
        assert_eq!(oracle.ask("c").expect("ask"), "");
    }

    fn sh_oracle(script: &str) -> CommandOracle {
        CommandOracle::from_config(&OracleConfig {
            command: vec!["sh".to_string(), "-c".to_string(), script.to_string()],
            workdir: None,
            timeout_secs: 10,
            output_limit_bytes: 10_000,
        })
    }

    #[test]
    fn command_oracle_streams_stdout_lines_as_chunks() {
        let mut oracle = sh_oracle("cat; echo; echo done");
        oracle.submit("STOP: enough").expect("submit");
        let chunks = oracle.receive().expect("receive");
        let contents: Vec<&str> = chunks.iter().map(|c| c.content.as_str()).collect();
        assert_eq!(contents, vec!["STOP: enough\n", "done\n"]);
    }

    #[test]
    fn command_oracle_failure_is_typed() {
        let mut oracle = sh_oracle("echo nope >&2; exit 4");
        oracle.submit("p").expect("submit");
        let err = oracle.receive().expect_err("failure");
        match err.downcast_ref::<FixError>() {
            Some(FixError::OracleFailed { status }) => {
                assert!(status.contains("exit code 4"), "{status}");
                assert!(status.contains("nope"), "{status}");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
