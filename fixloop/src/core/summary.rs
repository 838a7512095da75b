//! Plain-language summary of a refactoring session.

use serde::Serialize;

use crate::core::ledger::Ledger;
use crate::core::validator::python::MethodInfo;

/// A method that was successfully extracted into a service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Extraction {
    pub class_name: String,
    pub method: String,
    pub service: String,
    /// The method read the environment before extraction.
    pub removed_environment_access: bool,
    /// External calls now reached through an injected client.
    pub injected_calls: Vec<String>,
}

impl Extraction {
    pub fn new(class_name: &str, method: &MethodInfo, service: &str) -> Self {
        Self {
            class_name: class_name.to_string(),
            method: method.name.clone(),
            service: service.to_string(),
            removed_environment_access: method.accesses_environment,
            injected_calls: method.external_calls.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionSummary {
    pub attempts: usize,
    pub successes: usize,
    pub extractions: Vec<Extraction>,
    pub abandoned: Vec<String>,
}

impl SessionSummary {
    pub fn from_ledger(ledger: &Ledger, extractions: Vec<Extraction>, abandoned: Vec<String>) -> Self {
        Self {
            attempts: ledger.len(),
            successes: ledger.success_count(),
            extractions,
            abandoned,
        }
    }

    /// Key improvements, one sentence each.
    pub fn improvements(&self) -> Vec<String> {
        let mut out = Vec::new();
        for extraction in &self.extractions {
            out.push(format!(
                "Moved {}.{} into {}.",
                extraction.class_name, extraction.method, extraction.service
            ));
            if extraction.removed_environment_access {
                out.push(format!(
                    "{} no longer reads environment variables; configuration arrives through its constructor.",
                    extraction.service
                ));
            }
            if !extraction.injected_calls.is_empty() {
                out.push(format!(
                    "{} receives an injected client for {}.",
                    extraction.service,
                    extraction.injected_calls.join(", ")
                ));
            }
        }
        out
    }

    pub fn render(&self) -> String {
        let mut lines = vec![format!(
            "The session made {} {} and {} succeeded.",
            self.attempts,
            plural(self.attempts, "attempt", "attempts"),
            self.successes
        )];
        if self.abandoned.is_empty() {
            lines.push("No target was abandoned.".to_string());
        } else {
            lines.push(format!(
                "The session abandoned {} after repeated validation failures.",
                self.abandoned.join(", ")
            ));
        }
        let improvements = self.improvements();
        if improvements.is_empty() {
            lines.push("No methods were extracted.".to_string());
        } else {
            lines.extend(improvements);
        }
        lines.join("\n")
    }
}

fn plural<'a>(n: usize, one: &'a str, many: &'a str) -> &'a str {
    if n == 1 { one } else { many }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ledger::NewAttempt;

    fn method(name: &str, env: bool, calls: &[&str]) -> MethodInfo {
        MethodInfo {
            name: name.to_string(),
            line: 1,
            line_count: 3,
            is_constructor: false,
            is_static: false,
            is_class_method: false,
            accesses_environment: env,
            external_calls: calls.iter().map(|c| c.to_string()).collect(),
        }
    }

    #[test]
    fn renders_counts_and_improvements() {
        let mut ledger = Ledger::new();
        ledger.append(NewAttempt {
            target: "fetch_user".to_string(),
            success: false,
            ..NewAttempt::default()
        });
        ledger.append(NewAttempt {
            target: "fetch_user".to_string(),
            success: true,
            ..NewAttempt::default()
        });
        let extraction = Extraction::new(
            "UserManager",
            &method("fetch_user", true, &["requests.get"]),
            "FetchUserService",
        );
        let summary = SessionSummary::from_ledger(&ledger, vec![extraction], Vec::new());

        assert_eq!(
            summary.render(),
            "The session made 2 attempts and 1 succeeded.\n\
             No target was abandoned.\n\
             Moved UserManager.fetch_user into FetchUserService.\n\
             FetchUserService no longer reads environment variables; configuration arrives through its constructor.\n\
             FetchUserService receives an injected client for requests.get."
        );
    }

    #[test]
    fn reports_abandoned_targets() {
        let summary = SessionSummary::from_ledger(&Ledger::new(), Vec::new(), vec!["save".to_string()]);
        let text = summary.render();
        assert!(text.starts_with("The session made 0 attempts and 0 succeeded."));
        assert!(text.contains("The session abandoned save after repeated validation failures."));
        assert!(text.ends_with("No methods were extracted."));
    }
}
