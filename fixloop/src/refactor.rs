//! Extract-to-service refactoring session for `fixloop refactor`.
//!
//! Each class keeps its primary method; every other non-constructor method is
//! moved into its own service class, one oracle proposal at a time. Proposals
//! are validated structurally and only accepted text ever replaces the
//! last-known-good artifact.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::core::artifact::ArtifactState;
use crate::core::ledger::{Ledger, NewAttempt};
use crate::core::response::{extract_code, method_name_answer, service_name};
use crate::core::summary::{Extraction, SessionSummary};
use crate::core::validator::python::{ClassInfo, MethodInfo, PythonSource};
use crate::core::validator::{self, ValidationLimits};
use crate::error::FixError;
use crate::interrupt::Interrupt;
use crate::io::config::FixConfig;
use crate::io::files::{read_artifact, write_atomic};
use crate::io::oracle::Oracle;
use crate::io::prompt::{ExtractRequest, PromptEngine};

const EMPTY_PROPOSAL_ERROR: &str = "Failed to generate refactored code";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefactorSettings {
    /// Extraction attempts allowed per class.
    pub max_iterations: u32,
    pub max_failures_per_target: usize,
    pub limits: ValidationLimits,
    /// Run the session without writing the artifact back.
    pub dry_run: bool,
}

impl RefactorSettings {
    pub fn from_config(config: &FixConfig) -> Self {
        Self {
            max_iterations: config.refactor.max_iterations,
            max_failures_per_target: config.refactor.max_failures_per_target,
            limits: config.validation.limits(),
            dry_run: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RefactorOutcome {
    pub path: PathBuf,
    pub success: bool,
    pub interrupted: bool,
    /// True when the accepted text replaced the file.
    pub written: bool,
    pub ledger: Ledger,
    pub summary: SessionSummary,
    /// Last-known-good text at the end of the session.
    #[serde(skip)]
    pub refactored: String,
}

/// How one class's extraction loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ClassEnd {
    Finished,
    CeilingReached,
    Interrupted,
}

struct Session<'a> {
    oracle: &'a mut Oracle,
    prompts: &'a PromptEngine,
    settings: RefactorSettings,
    interrupt: &'a Interrupt,
    artifact: ArtifactState,
    ledger: Ledger,
    extractions: Vec<Extraction>,
    abandoned: Vec<String>,
}

/// Refactor every class in the file at `path`.
///
/// An unreadable or unparseable artifact is an error and nothing is written.
/// Every other ending is reported through the outcome.
#[instrument(skip_all, fields(path = %path.display(), dry_run = settings.dry_run))]
pub fn run_refactor_session(
    path: &Path,
    oracle: &mut Oracle,
    prompts: &PromptEngine,
    settings: RefactorSettings,
    interrupt: &Interrupt,
) -> Result<RefactorOutcome> {
    let text = read_artifact(path)?;
    let classes = {
        let source = PythonSource::parse(&text)
            .with_context(|| format!("parse artifact {}", path.display()))?;
        if !source.is_valid() {
            return Err(FixError::ArtifactSyntax {
                path: path.to_path_buf(),
            }
            .into());
        }
        source.analyze_classes()
    };
    info!(classes = classes.len(), "analyzed artifact");

    let mut session = Session {
        oracle,
        prompts,
        settings,
        interrupt,
        artifact: ArtifactState::new(text),
        ledger: Ledger::new(),
        extractions: Vec::new(),
        abandoned: Vec::new(),
    };

    let mut class_end = ClassEnd::Finished;
    for class in &classes {
        class_end = session.refactor_class(class)?;
        if class_end != ClassEnd::Finished {
            warn!(class = %class.name, "class did not finish; stopping session");
            break;
        }
    }

    let interrupted = class_end == ClassEnd::Interrupted;
    let success = class_end == ClassEnd::Finished && session.abandoned.is_empty();
    let summary = SessionSummary::from_ledger(
        &session.ledger,
        session.extractions,
        session.abandoned,
    );
    let refactored = session.artifact.into_current();

    let written = success && !settings.dry_run;
    if written {
        write_atomic(path, &refactored)?;
        info!("wrote refactored artifact");
    }

    Ok(RefactorOutcome {
        path: path.to_path_buf(),
        success,
        interrupted,
        written,
        ledger: session.ledger,
        summary,
        refactored,
    })
}

impl Session<'_> {
    #[instrument(skip_all, fields(class = %class.name))]
    fn refactor_class(&mut self, class: &ClassInfo) -> Result<ClassEnd> {
        if self.interrupt.is_triggered() {
            return Ok(ClassEnd::Interrupted);
        }
        let primary = self.primary_method(class)?;
        info!(primary = primary.as_deref().unwrap_or("none"), "primary method");

        let mut targets: Vec<&MethodInfo> = class
            .methods
            .iter()
            .filter(|method| !method.is_constructor && Some(&method.name) != primary.as_ref())
            .collect();
        targets.reverse();

        let mut iteration = 0;
        while let Some(target) = targets.last().copied() {
            if iteration >= self.settings.max_iterations {
                warn!(remaining = targets.len(), "iteration ceiling reached");
                return Ok(ClassEnd::CeilingReached);
            }
            if self.interrupt.is_triggered() {
                return Ok(ClassEnd::Interrupted);
            }
            iteration += 1;
            info!(iteration, method = %target.name, "extracting");

            if self.extract(class, target)? {
                targets.pop();
                continue;
            }
            if self
                .ledger
                .retry_budget(&target.name, self.settings.max_failures_per_target)
                .is_exhausted()
            {
                warn!(method = %target.name, "abandoning after repeated failures");
                self.abandoned.push(format!("{}.{}", class.name, target.name));
                targets.pop();
            }
        }
        Ok(ClassEnd::Finished)
    }

    /// The oracle's pick when it names a non-constructor method, else the longest one.
    fn primary_method(&mut self, class: &ClassInfo) -> Result<Option<String>> {
        let prompt = self.prompts.primary(class, self.artifact.current())?;
        let answer = self
            .oracle
            .ask(&prompt)
            .context("request primary method")?;
        let named = method_name_answer(&answer)
            .and_then(|name| class.method(name))
            .filter(|method| !method.is_constructor);
        if named.is_none() {
            warn!(answer = answer.trim(), "unusable primary method answer; using longest method");
        }
        Ok(named
            .or_else(|| class.longest_method())
            .map(|method| method.name.clone()))
    }

    /// One extraction attempt. Returns true when the proposal was accepted.
    fn extract(&mut self, class: &ClassInfo, method: &MethodInfo) -> Result<bool> {
        let service = service_name(&method.name);
        let request = ExtractRequest {
            class_name: &class.name,
            method: &method.name,
            line: method.line,
            service: &service,
            accesses_environment: method.accesses_environment,
            external_calls: &method.external_calls,
            source: self.artifact.current(),
        };
        let prompt = self.prompts.extract(&request, &self.ledger)?;
        let reply = self
            .oracle
            .ask(&prompt)
            .with_context(|| format!("request extraction of {}", method.name))?;

        let candidate = extract_code(&reply);
        if candidate.is_empty() {
            self.record(method, &service, false, vec![EMPTY_PROPOSAL_ERROR.to_string()]);
            return Ok(false);
        }

        let issues = validator::validate_extraction(
            &candidate,
            &class.name,
            &method.name,
            &service,
            self.settings.limits,
        );
        if !validator::is_accepted(&issues) {
            let errors = validator::blocking_messages(&issues);
            info!(method = %method.name, errors = errors.len(), "proposal rejected");
            self.record(method, &service, false, errors);
            return Ok(false);
        }

        self.artifact.commit(candidate);
        self.extractions
            .push(Extraction::new(&class.name, method, &service));
        self.record(method, &service, true, Vec::new());
        info!(method = %method.name, %service, "proposal accepted");
        Ok(true)
    }

    fn record(&mut self, method: &MethodInfo, service: &str, success: bool, errors: Vec<String>) {
        self.ledger.append(NewAttempt {
            target: method.name.clone(),
            proposed_unit: Some(service.to_string()),
            success,
            validation_errors: errors,
            ..NewAttempt::default()
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::oracle::ScriptedOracle;
    use crate::test_support::{
        EXTRACTED_FETCH_USER, ORDER_MANAGER_SOURCE, REJECTED_FETCH_USER, Workspace,
    };

    fn settings() -> RefactorSettings {
        RefactorSettings::from_config(&FixConfig::default())
    }

    fn fenced(code: &str) -> String {
        format!("Here is the module:\n```python\n{code}```\n")
    }

    fn run(
        workspace: &Workspace,
        responses: Vec<String>,
        settings: RefactorSettings,
    ) -> (RefactorOutcome, Oracle) {
        let path = workspace
            .write("orders.py", ORDER_MANAGER_SOURCE)
            .expect("write source");
        let mut oracle = Oracle::Scripted(ScriptedOracle::new(responses));
        let prompts = PromptEngine::new().expect("prompts");
        let outcome = run_refactor_session(&path, &mut oracle, &prompts, settings, &Interrupt::new())
            .expect("session");
        (outcome, oracle)
    }

    #[test]
    fn accepted_extraction_is_written() {
        let workspace = Workspace::new().expect("workspace");
        let (outcome, oracle) = run(
            &workspace,
            vec!["process_order".to_string(), fenced(EXTRACTED_FETCH_USER)],
            settings(),
        );

        assert!(outcome.success, "{:#?}", outcome.ledger);
        assert!(outcome.written);
        assert_eq!(
            workspace.read("orders.py").expect("read"),
            EXTRACTED_FETCH_USER.trim()
        );
        assert_eq!(outcome.ledger.success_count(), 1);
        assert_eq!(outcome.summary.extractions.len(), 1);
        let extraction = &outcome.summary.extractions[0];
        assert_eq!(extraction.service, "FetchUserService");
        assert!(extraction.removed_environment_access);
        assert_eq!(extraction.injected_calls, vec!["requests.get".to_string()]);

        let prompts = oracle.recorded_prompts();
        assert_eq!(prompts.len(), 2);
        assert!(prompts[1].contains("named `FetchUserService`"));
        assert!(prompts[1].contains("WARNING: `fetch_user` reads environment variables"));
    }

    #[test]
    fn dry_run_leaves_the_file_alone() {
        let workspace = Workspace::new().expect("workspace");
        let (outcome, _) = run(
            &workspace,
            vec!["process_order".to_string(), fenced(EXTRACTED_FETCH_USER)],
            RefactorSettings {
                dry_run: true,
                ..settings()
            },
        );
        assert!(outcome.success);
        assert!(!outcome.written);
        assert_eq!(outcome.refactored, EXTRACTED_FETCH_USER.trim());
        assert_eq!(
            workspace.read("orders.py").expect("read"),
            ORDER_MANAGER_SOURCE
        );
    }

    /// Three rejected proposals abandon the target and leave the file as it was.
    #[test]
    fn repeated_rejections_abandon_the_target() {
        let workspace = Workspace::new().expect("workspace");
        let (outcome, oracle) = run(
            &workspace,
            vec![
                "process_order".to_string(),
                fenced(REJECTED_FETCH_USER),
                fenced(REJECTED_FETCH_USER),
                fenced(REJECTED_FETCH_USER),
            ],
            settings(),
        );

        assert!(!outcome.success);
        assert!(!outcome.written);
        assert_eq!(outcome.summary.abandoned, vec!["OrderManager.fetch_user".to_string()]);
        assert_eq!(outcome.ledger.failure_count("fetch_user"), 3);
        assert_eq!(outcome.refactored, ORDER_MANAGER_SOURCE);
        assert_eq!(
            workspace.read("orders.py").expect("read"),
            ORDER_MANAGER_SOURCE
        );

        let errors = &outcome.ledger.attempts()[0].validation_errors;
        assert!(errors.contains(
            &"call-site-delegated: Function fetch_user was not removed from OrderManager"
                .to_string()
        ));
        assert!(errors.iter().any(|e| e.starts_with("service-no-environment-access:")));
        assert!(
            errors
                .iter()
                .any(|e| e.starts_with("service-no-concrete-dependency-creation:"))
        );
        let prompts = oracle.recorded_prompts();
        assert!(prompts[3].contains("#### Attempt 2"));
        assert!(prompts[3].contains("- Service class: FetchUserService"));
    }

    #[test]
    fn rejected_then_accepted_proposal_succeeds() {
        let workspace = Workspace::new().expect("workspace");
        let (outcome, _) = run(
            &workspace,
            vec![
                "process_order".to_string(),
                fenced(REJECTED_FETCH_USER),
                fenced(EXTRACTED_FETCH_USER),
            ],
            settings(),
        );
        assert!(outcome.success);
        assert_eq!(outcome.ledger.len(), 2);
        assert!(!outcome.ledger.attempts()[0].success);
        assert!(outcome.ledger.attempts()[1].success);
    }

    #[test]
    fn unusable_primary_answer_falls_back_to_longest_method() {
        let workspace = Workspace::new().expect("workspace");
        let (outcome, oracle) = run(
            &workspace,
            vec![
                "I would say __init__ is central".to_string(),
                fenced(EXTRACTED_FETCH_USER),
            ],
            settings(),
        );
        assert!(outcome.success);
        assert!(oracle.recorded_prompts()[1].contains("Method to extract: `fetch_user`"));
    }

    #[test]
    fn empty_proposal_is_a_failed_attempt() {
        let workspace = Workspace::new().expect("workspace");
        let (outcome, _) = run(
            &workspace,
            vec!["process_order".to_string(), "   ".to_string()],
            RefactorSettings {
                max_iterations: 1,
                ..settings()
            },
        );
        assert!(!outcome.success);
        assert!(outcome.summary.abandoned.is_empty());
        assert_eq!(
            outcome.ledger.attempts()[0].validation_errors,
            vec![EMPTY_PROPOSAL_ERROR.to_string()]
        );
    }

    #[test]
    fn syntax_errors_abort_before_any_exchange() {
        let workspace = Workspace::new().expect("workspace");
        let path = workspace
            .write("broken.py", "class A:\n    def f(self:\n        pass\n")
            .expect("write");
        let mut oracle = Oracle::Scripted(ScriptedOracle::default());
        let prompts = PromptEngine::new().expect("prompts");
        let err = run_refactor_session(&path, &mut oracle, &prompts, settings(), &Interrupt::new())
            .expect_err("syntax");
        assert!(matches!(
            err.downcast_ref::<FixError>(),
            Some(FixError::ArtifactSyntax { .. })
        ));
        assert!(oracle.recorded_prompts().is_empty());
    }

    #[test]
    fn interrupt_writes_nothing() {
        let workspace = Workspace::new().expect("workspace");
        let path = workspace
            .write("orders.py", ORDER_MANAGER_SOURCE)
            .expect("write");
        let mut oracle = Oracle::Scripted(ScriptedOracle::default());
        let prompts = PromptEngine::new().expect("prompts");
        let interrupt = Interrupt::new();
        interrupt.trigger();

        let outcome = run_refactor_session(&path, &mut oracle, &prompts, settings(), &interrupt)
            .expect("session");
        assert!(outcome.interrupted);
        assert!(!outcome.success);
        assert!(!outcome.written);
        assert!(outcome.ledger.is_empty());
    }

    #[test]
    fn file_without_classes_succeeds_unchanged() {
        let workspace = Workspace::new().expect("workspace");
        let path = workspace
            .write("util.py", "def helper(x: int) -> int:\n    return x\n")
            .expect("write");
        let mut oracle = Oracle::Scripted(ScriptedOracle::default());
        let prompts = PromptEngine::new().expect("prompts");
        let outcome = run_refactor_session(&path, &mut oracle, &prompts, settings(), &Interrupt::new())
            .expect("session");
        assert!(outcome.success);
        assert_eq!(outcome.summary.render().lines().last(), Some("No methods were extracted."));
    }
}
