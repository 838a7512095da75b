//! Command-line entry point for the fix and refactoring loops.
//!
//! Subcommands map one-to-one onto library operations; the binary only parses
//! arguments, loads configuration, prints results, and picks the exit code.

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use serde::Serialize;

use fixloop::core::failures::extract_any;
use fixloop::core::stopping::{StopCondition, StoppingPolicy};
use fixloop::core::validator::{self, Severity};
use fixloop::error::exit_code_for;
use fixloop::exit_codes;
use fixloop::fix::{FixSettings, run_fix_loop};
use fixloop::interrupt::Interrupt;
use fixloop::io::config::{DEFAULT_CONFIG_FILE, FixConfig, load_config, write_config};
use fixloop::io::files::{read_artifact, write_atomic};
use fixloop::io::oracle::{CommandOracle, Oracle, ScriptedOracle};
use fixloop::io::prompt::PromptEngine;
use fixloop::io::verifier::CommandVerifier;
use fixloop::logging;
use fixloop::refactor::{RefactorSettings, run_refactor_session};
use fixloop::triage::run_triage;

#[derive(Parser)]
#[command(
    name = "fixloop",
    version,
    about = "Iterative test-fix and extract-to-service refactoring loops"
)]
struct Cli {
    /// Config file (defaults to `.fixloop.toml` in the working directory).
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Log loop progress to stderr.
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the tests, ask the oracle for fixes, and repeat until done.
    Fix {
        /// Test path or scope handed to the verification command.
        #[arg(default_value = "tests")]
        target: String,
        #[arg(long)]
        max_iterations: Option<u32>,
        /// JSON file of canned oracle responses.
        #[arg(long)]
        replay: Option<PathBuf>,
        /// Write the session outcome as JSON.
        #[arg(long)]
        report: Option<PathBuf>,
    },
    /// Extract non-primary methods of each class into service classes.
    Refactor {
        file: PathBuf,
        #[arg(long)]
        max_iterations: Option<u32>,
        /// Validate proposals without writing the file.
        #[arg(long)]
        dry_run: bool,
        #[arg(long)]
        replay: Option<PathBuf>,
        #[arg(long)]
        report: Option<PathBuf>,
    },
    /// Print failure records from test output (file or stdin) as JSON.
    Parse { file: Option<PathBuf> },
    /// Check one function or `Class.method` against the structural rules.
    Check { file: PathBuf, unit: String },
    /// Map failing tests to the functions they exercise and check those.
    Triage {
        file: Option<PathBuf>,
        /// Directory holding the source modules.
        #[arg(long, default_value = "src")]
        src: PathBuf,
    },
    /// Write the default config file.
    InitConfig {
        /// Overwrite an existing file.
        #[arg(short, long)]
        force: bool,
    },
}

fn main() {
    let cli = Cli::parse();
    logging::init(cli.verbose);
    match run(cli) {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{:#}", err);
            std::process::exit(exit_code_for(&err));
        }
    }
}

fn run(cli: Cli) -> Result<i32> {
    let config_path = cli
        .config
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
    match cli.command {
        Command::Fix {
            target,
            max_iterations,
            replay,
            report,
        } => {
            let mut config = load_config(&config_path)?;
            if let Some(max) = max_iterations {
                config.max_iterations = max;
            }
            config.validate()?;
            cmd_fix(&config, target, replay.as_deref(), report.as_deref())
        }
        Command::Refactor {
            file,
            max_iterations,
            dry_run,
            replay,
            report,
        } => {
            let mut config = load_config(&config_path)?;
            if let Some(max) = max_iterations {
                config.refactor.max_iterations = max;
            }
            config.validate()?;
            cmd_refactor(&config, &file, dry_run, replay.as_deref(), report.as_deref())
        }
        Command::Parse { file } => cmd_parse(file.as_deref()),
        Command::Check { file, unit } => cmd_check(&load_config(&config_path)?, &file, &unit),
        Command::Triage { file, src } => cmd_triage(&load_config(&config_path)?, file.as_deref(), &src),
        Command::InitConfig { force } => cmd_init_config(&config_path, force),
    }
}

fn cmd_fix(
    config: &FixConfig,
    target: String,
    replay: Option<&Path>,
    report: Option<&Path>,
) -> Result<i32> {
    let interrupt = Interrupt::new();
    interrupt.install_ctrlc_handler()?;
    let mut oracle = build_oracle(config, replay)?;
    let verifier = CommandVerifier::from_config(&config.verify);
    let prompts = PromptEngine::new()?;
    let settings = FixSettings {
        target,
        policy: StoppingPolicy::new(config.max_iterations),
    };

    let outcome = run_fix_loop(
        &verifier,
        &mut oracle,
        &prompts,
        &settings,
        &interrupt,
        |step| {
            println!(
                "iteration {}: {} passed, {} failed - {}",
                step.iteration, step.passed, step.failed, step.decision
            );
        },
    )?;
    println!("stopped: {}", outcome.stop);
    println!("attempts recorded: {}", outcome.ledger.len());
    if let Some(path) = report {
        write_json(path, &outcome)?;
    }

    Ok(match outcome.stop {
        StopCondition::Success => exit_codes::OK,
        StopCondition::Interrupted => exit_codes::INTERRUPTED,
        _ => exit_codes::FAILED,
    })
}

fn cmd_refactor(
    config: &FixConfig,
    file: &Path,
    dry_run: bool,
    replay: Option<&Path>,
    report: Option<&Path>,
) -> Result<i32> {
    let interrupt = Interrupt::new();
    interrupt.install_ctrlc_handler()?;
    let mut oracle = build_oracle(config, replay)?;
    let prompts = PromptEngine::new()?;
    let settings = RefactorSettings {
        dry_run,
        ..RefactorSettings::from_config(config)
    };

    let outcome = run_refactor_session(file, &mut oracle, &prompts, settings, &interrupt)?;
    println!("{}", outcome.summary.render());
    if outcome.written {
        println!("wrote {}", file.display());
    } else if dry_run && outcome.success {
        println!("dry run: {} left unchanged", file.display());
    }
    if let Some(path) = report {
        write_json(path, &outcome)?;
    }

    Ok(if outcome.interrupted {
        exit_codes::INTERRUPTED
    } else if outcome.success {
        exit_codes::OK
    } else {
        exit_codes::FAILED
    })
}

fn cmd_parse(file: Option<&Path>) -> Result<i32> {
    let raw = read_input(file)?;
    let records = extract_any(&raw);
    println!(
        "{}",
        serde_json::to_string_pretty(&records).context("serialize failure records")?
    );
    Ok(exit_codes::OK)
}

fn cmd_check(config: &FixConfig, file: &Path, unit: &str) -> Result<i32> {
    let text = read_artifact(file)?;
    let issues = validator::validate_with(unit, &text, config.validation.limits());
    for issue in &issues {
        let mark = match (issue.passed, issue.severity) {
            (true, _) => "PASS",
            (false, Severity::Error) => "FAIL",
            (false, Severity::Warning) => "WARN",
        };
        println!("{mark} {issue}");
    }
    Ok(if validator::is_accepted(&issues) {
        exit_codes::OK
    } else {
        exit_codes::FAILED
    })
}

fn cmd_triage(config: &FixConfig, file: Option<&Path>, src: &Path) -> Result<i32> {
    let raw = read_input(file)?;
    let entries = run_triage(&raw, src, config.validation.limits())?;
    if entries.is_empty() {
        println!("no failures found");
        return Ok(exit_codes::OK);
    }
    for entry in &entries {
        let source = entry
            .target
            .source_file
            .as_ref()
            .map_or_else(|| "unknown source".to_string(), |path| path.display().to_string());
        println!(
            "{} -> {} ({}): {} {}",
            entry.failure.test_name,
            entry.target.function,
            source,
            entry.failure.error_kind,
            entry.failure.error_message
        );
        for issue in entry.issues.iter().filter(|issue| !issue.passed) {
            println!("  {issue}");
        }
    }
    Ok(if entries.iter().all(|entry| entry.is_clean()) {
        exit_codes::OK
    } else {
        exit_codes::FAILED
    })
}

fn cmd_init_config(path: &Path, force: bool) -> Result<i32> {
    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }
    write_config(path, &FixConfig::default())?;
    println!("wrote {}", path.display());
    Ok(exit_codes::OK)
}

fn build_oracle(config: &FixConfig, replay: Option<&Path>) -> Result<Oracle> {
    Ok(match replay {
        Some(path) => Oracle::Scripted(ScriptedOracle::from_replay_file(path)?),
        None => Oracle::Command(CommandOracle::from_config(&config.oracle)),
    })
}

/// Contents of `file`, or all of stdin when no file is given.
fn read_input(file: Option<&Path>) -> Result<String> {
    match file {
        Some(path) => fs::read_to_string(path).with_context(|| format!("read {}", path.display())),
        None => {
            let mut raw = String::new();
            std::io::stdin()
                .read_to_string(&mut raw)
                .context("read stdin")?;
            Ok(raw)
        }
    }
}

/// Serialize `value` to pretty-printed JSON with trailing newline.
fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let mut payload = serde_json::to_string_pretty(value).context("serialize json")?;
    payload.push('\n');
    write_atomic(path, &payload)
}
