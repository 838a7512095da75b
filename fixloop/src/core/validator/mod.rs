//! Structural validation of Python artifacts.
//!
//! Two entry points share one rule vocabulary:
//!
//! - [`validate`] checks a single unit (function or `Class.method`) against the
//!   unit rules.
//! - [`validate_extraction`] checks a whole artifact after an
//!   extract-to-service refactoring, using the acceptance hooks, and appends
//!   the unit rules for each service method as warnings.
//!
//! Every independent rule is always reported so callers can show all
//! violations at once. Only `syntax-valid` (and `unit-present` for a single
//! unit) short-circuit, because nothing else can be checked without them.

pub mod python;
pub mod rules;

use std::fmt;

use serde::{Deserialize, Serialize};
use tree_sitter::Node;

use self::python::PythonSource;

/// Default inclusive ceiling for a unit's line span.
pub const DEFAULT_MAX_UNIT_LINES: usize = 30;

/// Enumerated structural rules, in canonical reporting order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Rule {
    SyntaxValid,
    UnitPresent,
    MaxLength,
    NoEnvironmentAccess,
    NoConcreteDependencyCreation,
    TypedParameters,
    TypedResult,
    NoDefaultParameterValues,
    ServiceUnitPresent,
    CallSiteDelegated,
    ServiceNoEnvironmentAccess,
    ServiceNoConcreteDependencyCreation,
}

impl Rule {
    pub fn name(self) -> &'static str {
        match self {
            Rule::SyntaxValid => "syntax-valid",
            Rule::UnitPresent => "unit-present",
            Rule::MaxLength => "max-length",
            Rule::NoEnvironmentAccess => "no-environment-access",
            Rule::NoConcreteDependencyCreation => "no-concrete-dependency-creation",
            Rule::TypedParameters => "typed-parameters",
            Rule::TypedResult => "typed-result",
            Rule::NoDefaultParameterValues => "no-default-parameter-values",
            Rule::ServiceUnitPresent => "service-unit-present",
            Rule::CallSiteDelegated => "call-site-delegated",
            Rule::ServiceNoEnvironmentAccess => "service-no-environment-access",
            Rule::ServiceNoConcreteDependencyCreation => "service-no-concrete-dependency-creation",
        }
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

/// One rule outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub rule: Rule,
    pub passed: bool,
    pub message: String,
    pub severity: Severity,
}

impl ValidationIssue {
    fn error(rule: Rule, passed: bool, message: impl Into<String>) -> Self {
        Self {
            rule,
            passed,
            message: message.into(),
            severity: Severity::Error,
        }
    }

    fn as_warning(mut self) -> Self {
        self.severity = Severity::Warning;
        self
    }

    /// True when this issue should block acceptance.
    pub fn is_blocking(&self) -> bool {
        !self.passed && self.severity == Severity::Error
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.rule, self.message)
    }
}

/// Tunable limits for the unit rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidationLimits {
    pub max_unit_lines: usize,
}

impl Default for ValidationLimits {
    fn default() -> Self {
        Self {
            max_unit_lines: DEFAULT_MAX_UNIT_LINES,
        }
    }
}

/// A batch is accepted when every error-severity issue passed.
pub fn is_accepted(issues: &[ValidationIssue]) -> bool {
    !issues.iter().any(ValidationIssue::is_blocking)
}

/// Messages of the blocking issues, in reporting order.
pub fn blocking_messages(issues: &[ValidationIssue]) -> Vec<String> {
    issues
        .iter()
        .filter(|issue| issue.is_blocking())
        .map(ToString::to_string)
        .collect()
}

/// A lone failing `unit-present` issue for a unit whose artifact is unavailable.
pub fn unit_unavailable(message: impl Into<String>) -> ValidationIssue {
    ValidationIssue::error(Rule::UnitPresent, false, message)
}

/// Check one unit with the default limits.
pub fn validate(unit: &str, text: &str) -> Vec<ValidationIssue> {
    validate_with(unit, text, ValidationLimits::default())
}

/// Check one unit (`name` or `Class.method`) inside `text`.
pub fn validate_with(unit: &str, text: &str, limits: ValidationLimits) -> Vec<ValidationIssue> {
    let source = match parse_checked(text) {
        Ok(source) => source,
        Err(issue) => return vec![issue],
    };
    let mut issues = vec![ValidationIssue::error(
        Rule::SyntaxValid,
        true,
        "Artifact parses",
    )];

    let Some(node) = source.find_unit(unit) else {
        issues.push(ValidationIssue::error(
            Rule::UnitPresent,
            false,
            format!("Unit '{unit}' not found"),
        ));
        return issues;
    };
    issues.push(ValidationIssue::error(
        Rule::UnitPresent,
        true,
        format!("Unit '{unit}' found"),
    ));
    issues.extend(unit_rules(node, source.bytes(), limits));
    issues
}

/// Check an artifact after extracting `owner.target` into `service`.
pub fn validate_extraction(
    text: &str,
    owner: &str,
    target: &str,
    service: &str,
    limits: ValidationLimits,
) -> Vec<ValidationIssue> {
    let source = match parse_checked(text) {
        Ok(source) => source,
        Err(issue) => return vec![issue],
    };
    let src = source.bytes();
    let mut issues = vec![ValidationIssue::error(
        Rule::SyntaxValid,
        true,
        "Artifact parses",
    )];

    let service_node = source.find_class(service);
    issues.push(match service_node {
        Some(_) => ValidationIssue::error(
            Rule::ServiceUnitPresent,
            true,
            format!("Service class {service} exists"),
        ),
        None => ValidationIssue::error(
            Rule::ServiceUnitPresent,
            false,
            format!("Service class {service} was not created"),
        ),
    });

    issues.push(call_site_issue(&source, owner, target, service));

    let (env_hits, concrete_hits) = match service_node {
        Some(class) => (
            rules::environment_accesses(class, src),
            rules::concrete_dependency_creations(class, src),
        ),
        None => (Vec::new(), Vec::new()),
    };
    issues.push(if env_hits.is_empty() {
        ValidationIssue::error(
            Rule::ServiceNoEnvironmentAccess,
            true,
            format!("Service class {service} does not read the environment"),
        )
    } else {
        ValidationIssue::error(
            Rule::ServiceNoEnvironmentAccess,
            false,
            format!(
                "Service class {service} accesses environment variables: {}",
                env_hits.join(", ")
            ),
        )
    });
    issues.push(if concrete_hits.is_empty() {
        ValidationIssue::error(
            Rule::ServiceNoConcreteDependencyCreation,
            true,
            format!("Service class {service} receives its clients"),
        )
    } else {
        ValidationIssue::error(
            Rule::ServiceNoConcreteDependencyCreation,
            false,
            format!(
                "Service class {service} uses concrete implementations instead of interfaces: {}",
                concrete_hits.join(", ")
            ),
        )
    });

    if let Some(class) = service_node {
        for method in python::class_methods(class, src) {
            let name = python::field_text(method.node, "name", src).unwrap_or_default();
            if name == "__init__" {
                continue;
            }
            issues.extend(
                unit_rules(method.node, src, limits)
                    .into_iter()
                    .map(|issue| {
                        let message = format!("{service}.{name}: {}", issue.message);
                        ValidationIssue { message, ..issue }.as_warning()
                    }),
            );
        }
    }
    issues
}

fn parse_checked(text: &str) -> Result<PythonSource<'_>, ValidationIssue> {
    let source = PythonSource::parse(text).map_err(|err| {
        ValidationIssue::error(Rule::SyntaxValid, false, format!("Could not parse: {err:#}"))
    })?;
    if !source.is_valid() {
        let at = source
            .first_error_line()
            .map(|line| format!(" near line {line}"))
            .unwrap_or_default();
        return Err(ValidationIssue::error(
            Rule::SyntaxValid,
            false,
            format!("Refactored code has syntax errors{at}"),
        ));
    }
    Ok(source)
}

/// `owner` must still exist and its `target` must be gone or reduced to a
/// single statement forwarding to an injected collaborator.
fn call_site_issue(
    source: &PythonSource<'_>,
    owner: &str,
    target: &str,
    service: &str,
) -> ValidationIssue {
    if owner == service {
        return ValidationIssue::error(
            Rule::CallSiteDelegated,
            false,
            format!("Service class {service} must differ from {owner}"),
        );
    }
    let src = source.bytes();
    let Some(class) = source.find_class(owner) else {
        return ValidationIssue::error(
            Rule::CallSiteDelegated,
            false,
            format!("Class {owner} was removed"),
        );
    };
    let intact = python::class_methods(class, src).into_iter().any(|method| {
        python::field_text(method.node, "name", src) == Some(target)
            && !rules::is_pure_delegation(method.node, src)
    });
    if intact {
        return ValidationIssue::error(
            Rule::CallSiteDelegated,
            false,
            format!("Function {target} was not removed from {owner}"),
        );
    }
    ValidationIssue::error(
        Rule::CallSiteDelegated,
        true,
        format!("Function {target} is removed or delegated"),
    )
}

/// The six unit rules over one `function_definition`.
fn unit_rules(node: Node<'_>, src: &[u8], limits: ValidationLimits) -> Vec<ValidationIssue> {
    let mut issues = Vec::with_capacity(6);

    let lines = python::line_span(node);
    issues.push(ValidationIssue::error(
        Rule::MaxLength,
        lines <= limits.max_unit_lines,
        format!("Unit is {lines} lines (max {})", limits.max_unit_lines),
    ));

    let env = rules::environment_accesses(node, src);
    issues.push(if env.is_empty() {
        ValidationIssue::error(Rule::NoEnvironmentAccess, true, "No environment access")
    } else {
        ValidationIssue::error(
            Rule::NoEnvironmentAccess,
            false,
            format!("Reads environment directly: {}", env.join(", ")),
        )
    });

    let concrete = rules::concrete_dependency_creations(node, src);
    issues.push(if concrete.is_empty() {
        ValidationIssue::error(
            Rule::NoConcreteDependencyCreation,
            true,
            "No concrete dependencies created",
        )
    } else {
        ValidationIssue::error(
            Rule::NoConcreteDependencyCreation,
            false,
            format!(
                "Creates concrete dependencies instead of receiving them: {}",
                concrete.join(", ")
            ),
        )
    });

    let params = rules::parameters(node, src);
    let untyped: Vec<&str> = params
        .iter()
        .filter(|p| p.annotation.is_none())
        .map(|p| p.name.as_str())
        .collect();
    let wildcard: Vec<&str> = params
        .iter()
        .filter(|p| p.is_wildcard_typed())
        .map(|p| p.name.as_str())
        .collect();
    issues.push(match (untyped.is_empty(), wildcard.is_empty()) {
        (true, true) => {
            ValidationIssue::error(Rule::TypedParameters, true, "All parameters are typed")
        }
        (false, true) => ValidationIssue::error(
            Rule::TypedParameters,
            false,
            format!("Parameters missing type hints: {}", untyped.join(", ")),
        ),
        (true, false) => ValidationIssue::error(
            Rule::TypedParameters,
            false,
            format!("Parameters typed as Any: {}", wildcard.join(", ")),
        ),
        (false, false) => ValidationIssue::error(
            Rule::TypedParameters,
            false,
            format!(
                "Parameters missing type hints: {}; typed as Any: {}",
                untyped.join(", "),
                wildcard.join(", ")
            ),
        ),
    });

    issues.push(if rules::has_return_annotation(node) {
        ValidationIssue::error(Rule::TypedResult, true, "Return type declared")
    } else {
        ValidationIssue::error(Rule::TypedResult, false, "Missing return type hint")
    });

    let defaults: Vec<&str> = params
        .iter()
        .filter(|p| p.has_default)
        .map(|p| p.name.as_str())
        .collect();
    issues.push(if defaults.is_empty() {
        ValidationIssue::error(
            Rule::NoDefaultParameterValues,
            true,
            "No default parameter values",
        )
    } else {
        ValidationIssue::error(
            Rule::NoDefaultParameterValues,
            false,
            format!("Parameters with default values: {}", defaults.join(", ")),
        )
    });

    issues
}
