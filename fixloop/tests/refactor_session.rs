//! End-to-end refactoring sessions driven from replay files.

use fixloop::core::validator::{self, ValidationLimits};
use fixloop::interrupt::Interrupt;
use fixloop::io::config::FixConfig;
use fixloop::io::oracle::{Oracle, ScriptedOracle};
use fixloop::io::prompt::PromptEngine;
use fixloop::refactor::{RefactorSettings, run_refactor_session};
use fixloop::test_support::{
    EXTRACTED_FETCH_USER, ORDER_MANAGER_SOURCE, REJECTED_FETCH_USER, Workspace,
};

fn replay(workspace: &Workspace, responses: &[String]) -> Oracle {
    let json = serde_json::to_string(responses).expect("replay json");
    let path = workspace.write("replay.json", &json).expect("write replay");
    Oracle::Scripted(ScriptedOracle::from_replay_file(&path).expect("load replay"))
}

fn fenced(code: &str) -> String {
    format!("```python\n{code}```")
}

/// A rejected proposal, then an accepted one: the file ends up with the
/// accepted text and the summary names what changed.
#[test]
fn session_recovers_from_a_rejected_proposal() {
    let workspace = Workspace::new().expect("workspace");
    let path = workspace
        .write("app/orders.py", ORDER_MANAGER_SOURCE)
        .expect("write source");
    let mut oracle = replay(
        &workspace,
        &[
            "`process_order`".to_string(),
            fenced(REJECTED_FETCH_USER),
            fenced(EXTRACTED_FETCH_USER),
        ],
    );
    let prompts = PromptEngine::new().expect("prompts");

    let outcome = run_refactor_session(
        &path,
        &mut oracle,
        &prompts,
        RefactorSettings::from_config(&FixConfig::default()),
        &Interrupt::new(),
    )
    .expect("session");

    assert!(outcome.success);
    assert!(outcome.written);
    let written = workspace.read("app/orders.py").expect("read");
    assert!(validator::is_accepted(&validator::validate_extraction(
        &written,
        "OrderManager",
        "fetch_user",
        "FetchUserService",
        ValidationLimits::default(),
    )));

    let summary = outcome.summary.render();
    assert!(summary.starts_with("The session made 2 attempts and 1 succeeded."));
    assert!(summary.contains("Moved OrderManager.fetch_user into FetchUserService."));
    assert!(summary.contains("FetchUserService no longer reads environment variables"));
    assert!(summary.contains("injected client for requests.get"));

    let third_prompt = &oracle.recorded_prompts()[2];
    assert!(third_prompt.contains("### Previous Failed Attempts"));
    assert!(third_prompt.contains("service-no-environment-access"));
}

#[test]
fn ceiling_leaves_the_file_untouched() {
    let workspace = Workspace::new().expect("workspace");
    let path = workspace
        .write("orders.py", ORDER_MANAGER_SOURCE)
        .expect("write source");
    let mut oracle = replay(
        &workspace,
        &["process_order".to_string(), fenced(REJECTED_FETCH_USER)],
    );
    let prompts = PromptEngine::new().expect("prompts");
    let mut config = FixConfig::default();
    config.refactor.max_iterations = 1;

    let outcome = run_refactor_session(
        &path,
        &mut oracle,
        &prompts,
        RefactorSettings::from_config(&config),
        &Interrupt::new(),
    )
    .expect("session");

    assert!(!outcome.success);
    assert!(!outcome.written);
    assert_eq!(outcome.ledger.failure_count("fetch_user"), 1);
    assert_eq!(
        workspace.read("orders.py").expect("read"),
        ORDER_MANAGER_SOURCE
    );
}
