//! Reading structured facts out of free-text oracle responses.

use std::sync::LazyLock;

use regex::Regex;

static CHANGED_FILE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(?:Modified|Updated|Fixed).*?([/\w._-]+\.py)").unwrap());
static IDENTIFIER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap());

const PYTHON_FENCE: &str = "```python";
const FENCE: &str = "```";

/// Python files the oracle reports as changed, de-duplicated in first-seen order.
pub fn changed_artifacts(response: &str) -> Vec<String> {
    let mut files: Vec<String> = Vec::new();
    for caps in CHANGED_FILE_RE.captures_iter(response) {
        let file = &caps[1];
        if !files.iter().any(|seen| seen == file) {
            files.push(file.to_string());
        }
    }
    files
}

/// Code inside the first ```python fence, or the whole trimmed reply.
pub fn extract_code(response: &str) -> String {
    if let Some(start) = response.find(PYTHON_FENCE) {
        let body = &response[start + PYTHON_FENCE.len()..];
        let end = body.find(FENCE).unwrap_or(body.len());
        return body[..end].trim().to_string();
    }
    response.trim().to_string()
}

/// The identifier the oracle named as primary method, if its answer is one.
///
/// Surrounding whitespace, backticks, a trailing `()` and a `Class.` prefix
/// are tolerated.
pub fn method_name_answer(response: &str) -> Option<&str> {
    let candidate = response
        .trim()
        .trim_matches('`')
        .trim_end_matches("()")
        .rsplit('.')
        .next()?
        .trim();
    IDENTIFIER_RE.is_match(candidate).then_some(candidate)
}

/// `fetch_user` becomes `FetchUserService`.
pub fn service_name(method: &str) -> String {
    let mut name: String = method
        .split('_')
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect();
    name.push_str("Service");
    name
}
