//! Syntax-tree predicates behind the structural rules.
//!
//! Each function inspects one subtree and reports what it found; turning the
//! findings into pass/fail issues is the caller's job.

use tree_sitter::Node;

use super::python::{descendants, field_text, node_text};

const ENV_ATTRIBUTES: &[&str] = &["environ", "environb", "getenv", "getenvb"];
const ENV_FUNCTIONS: &[&str] = &["getenv", "getenvb", "load_dotenv", "dotenv_values"];

/// Modules whose calls reach the network, a database, or a cloud API.
const CLIENT_MODULES: &[&str] = &[
    "requests",
    "httpx",
    "aiohttp",
    "urllib",
    "urllib3",
    "pymongo",
    "psycopg2",
    "sqlite3",
    "sqlalchemy",
    "redis",
    "boto3",
    "mysql",
];

/// Bare constructors of concrete clients (typically imported by name).
const CLIENT_CONSTRUCTORS: &[&str] = &[
    "Client",
    "AsyncClient",
    "Session",
    "ClientSession",
    "MongoClient",
    "Redis",
    "StrictRedis",
    "urlopen",
    "create_engine",
];

const HTTP_VERBS: &[&str] = &["get", "post", "put", "delete", "patch"];
const WILDCARD_TYPES: &[&str] = &["Any", "typing.Any", "t.Any"];
const RECEIVER_NAMES: &[&str] = &["self", "cls"];

/// Source snippets of every environment read under `node`.
///
/// Covers `os.environ`/`os.getenv` style attributes, `environ[...]` and
/// `environ.get` after `from os import environ`, and the bare accessor
/// functions. Nested lambdas and comprehensions are part of the walk.
pub fn environment_accesses(node: Node<'_>, src: &[u8]) -> Vec<String> {
    let mut found = Vec::new();
    for current in descendants(node) {
        let hit = match current.kind() {
            "attribute" => {
                let object = field_text(current, "object", src);
                let attribute = field_text(current, "attribute", src).unwrap_or_default();
                (object == Some("os") && ENV_ATTRIBUTES.contains(&attribute))
                    || object == Some("environ")
            }
            "subscript" => field_text(current, "value", src) == Some("environ"),
            "call" => current
                .child_by_field_name("function")
                .is_some_and(|function| {
                    function.kind() == "identifier"
                        && ENV_FUNCTIONS.contains(&node_text(function, src))
                }),
            _ => false,
        };
        if hit {
            found.push(node_text(current, src).to_string());
        }
    }
    found
}

/// Callee text of every call under `node` that builds a concrete client.
pub fn concrete_dependency_creations(node: Node<'_>, src: &[u8]) -> Vec<String> {
    let mut found = Vec::new();
    for current in descendants(node) {
        if current.kind() != "call" {
            continue;
        }
        let Some(function) = current.child_by_field_name("function") else {
            continue;
        };
        let hit = match function.kind() {
            "identifier" => CLIENT_CONSTRUCTORS.contains(&node_text(function, src)),
            "attribute" => root_identifier(function, src)
                .is_some_and(|root| CLIENT_MODULES.contains(&root)),
            _ => false,
        };
        if hit {
            found.push(node_text(function, src).to_string());
        }
    }
    found
}

/// External HTTP calls under `node`, normalized as `module.verb`.
pub fn external_calls(node: Node<'_>, src: &[u8]) -> Vec<String> {
    let mut found = Vec::new();
    for current in descendants(node) {
        if current.kind() != "call" {
            continue;
        }
        let Some(function) = current.child_by_field_name("function") else {
            continue;
        };
        if function.kind() != "attribute" {
            continue;
        }
        let attribute = field_text(function, "attribute", src).unwrap_or_default();
        let Some(object) = function.child_by_field_name("object") else {
            continue;
        };
        let object_text = node_text(object, src);
        let call = if object.kind() == "identifier"
            && object_text == "requests"
            && HTTP_VERBS.contains(&attribute)
        {
            Some(format!("requests.{attribute}"))
        } else if object.kind() == "identifier" && object_text == "httpx" {
            Some(format!("httpx.{attribute}"))
        } else if attribute == "urlopen" && root_identifier(object, src) == Some("urllib") {
            Some("urllib.urlopen".to_string())
        } else {
            None
        };
        if let Some(call) = call
            && !found.contains(&call)
        {
            found.push(call);
        }
    }
    found
}

/// Leftmost identifier of an attribute/call chain (`a` in `a.b().c`).
fn root_identifier<'a>(node: Node<'_>, src: &'a [u8]) -> Option<&'a str> {
    let mut current = node;
    loop {
        match current.kind() {
            "identifier" => return Some(node_text(current, src)),
            "attribute" => current = current.child_by_field_name("object")?,
            "call" => current = current.child_by_field_name("function")?,
            _ => return None,
        }
    }
}

/// One declared parameter of a function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parameter {
    pub name: String,
    pub annotation: Option<String>,
    pub has_default: bool,
}

impl Parameter {
    pub fn is_wildcard_typed(&self) -> bool {
        self.annotation
            .as_deref()
            .is_some_and(|ty| WILDCARD_TYPES.contains(&ty.trim()))
    }
}

/// Parameters of a `function_definition`, excluding a leading `self`/`cls`
/// and the bare `*` and `/` separators.
pub fn parameters(function: Node<'_>, src: &[u8]) -> Vec<Parameter> {
    let Some(list) = function.child_by_field_name("parameters") else {
        return Vec::new();
    };
    let mut params = Vec::new();
    let mut cursor = list.walk();
    for (index, child) in list.named_children(&mut cursor).enumerate() {
        let param = match child.kind() {
            "identifier" | "list_splat_pattern" | "dictionary_splat_pattern" => Parameter {
                name: node_text(child, src).to_string(),
                annotation: None,
                has_default: false,
            },
            "typed_parameter" => {
                let mut inner = child.walk();
                let name = child
                    .named_children(&mut inner)
                    .find(|n| n.kind() != "type")
                    .map(|n| node_text(n, src))
                    .unwrap_or_default();
                Parameter {
                    name: name.to_string(),
                    annotation: field_text(child, "type", src).map(str::to_string),
                    has_default: false,
                }
            }
            "default_parameter" | "typed_default_parameter" => Parameter {
                name: field_text(child, "name", src).unwrap_or_default().to_string(),
                annotation: field_text(child, "type", src).map(str::to_string),
                has_default: true,
            },
            _ => continue,
        };
        if index == 0 && RECEIVER_NAMES.contains(&param.name.as_str()) {
            continue;
        }
        params.push(param);
    }
    params
}

pub fn has_return_annotation(function: Node<'_>) -> bool {
    function.child_by_field_name("return_type").is_some()
}

/// True when the body is exactly one statement that forwards to an injected
/// collaborator, either `return self.<attr>.<method>(...)` or the bare call
/// (optionally awaited). A leading docstring does not count as a statement.
pub fn is_pure_delegation(function: Node<'_>, src: &[u8]) -> bool {
    let Some(body) = function.child_by_field_name("body") else {
        return false;
    };
    let mut cursor = body.walk();
    let statements: Vec<Node<'_>> = body
        .named_children(&mut cursor)
        .filter(|n| n.kind() != "comment")
        .collect();
    let statements: &[Node<'_>] = match statements.as_slice() {
        [first, rest @ ..] if is_docstring(*first) => rest,
        all => all,
    };
    let [statement] = statements else {
        return false;
    };
    let value = match statement.kind() {
        "return_statement" | "expression_statement" => statement.named_child(0),
        _ => None,
    };
    value.is_some_and(|value| is_forwarding_call(value, src))
}

fn is_forwarding_call(node: Node<'_>, src: &[u8]) -> bool {
    let call = match node.kind() {
        "call" => node,
        "await" => match node.named_child(0) {
            Some(inner) if inner.kind() == "call" => inner,
            _ => return false,
        },
        _ => return false,
    };
    call.child_by_field_name("function")
        .filter(|callee| callee.kind() == "attribute")
        .and_then(|callee| callee.child_by_field_name("object"))
        .is_some_and(|holder| holder.kind() == "attribute" && is_rooted_at_self(holder, src))
}

/// `self.a`, `self.a.b`, ... with no calls or subscripts along the chain.
fn is_rooted_at_self(node: Node<'_>, src: &[u8]) -> bool {
    match node.kind() {
        "identifier" => node_text(node, src) == "self",
        "attribute" => node
            .child_by_field_name("object")
            .is_some_and(|object| is_rooted_at_self(object, src)),
        _ => false,
    }
}

fn is_docstring(statement: Node<'_>) -> bool {
    statement.kind() == "expression_statement"
        && statement
            .named_child(0)
            .is_some_and(|expr| expr.kind() == "string")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::validator::python::PythonSource;

    fn with_unit<T>(text: &str, unit: &str, f: impl FnOnce(Node<'_>, &[u8]) -> T) -> T {
        let source = PythonSource::parse(text).expect("parse");
        assert!(source.is_valid(), "fixture must parse: {text}");
        let node = source.find_unit(unit).expect("unit present");
        f(node, source.bytes())
    }

    #[test]
    fn environment_reads_in_every_form() {
        let cases = [
            "def f():\n    return os.environ['X']\n",
            "def f():\n    return os.getenv('X')\n",
            "def f():\n    return environ.get('X')\n",
            "def f():\n    return environ['X']\n",
            "def f():\n    return getenv('X')\n",
            "def f():\n    load_dotenv()\n",
            "def f():\n    return [os.environ[k] for k in ('A', 'B')]\n",
            "def f():\n    g = lambda: os.getenv('X')\n    return g()\n",
        ];
        for case in cases {
            let hits = with_unit(case, "f", environment_accesses);
            assert!(!hits.is_empty(), "expected env access in {case:?}");
        }
    }

    #[test]
    fn unrelated_attributes_are_not_environment_reads() {
        let text = "def f(config):\n    return config.environment + os.path.join('a', 'b')\n";
        assert!(with_unit(text, "f", environment_accesses).is_empty());
    }

    #[test]
    fn concrete_clients_are_detected() {
        let text = "def f():\n    s = requests.Session()\n    c = MongoClient('x')\n    e = boto3.session.Session().client('s3')\n    return s, c, e\n";
        let hits = with_unit(text, "f", concrete_dependency_creations);
        assert!(hits.contains(&"requests.Session".to_string()));
        assert!(hits.contains(&"MongoClient".to_string()));
        assert!(hits.iter().any(|h| h.ends_with(".client")));
    }

    #[test]
    fn injected_clients_are_not_concrete() {
        let text = "def f(client):\n    return client.get('/users')\n";
        assert!(with_unit(text, "f", concrete_dependency_creations).is_empty());
    }

    #[test]
    fn external_calls_are_normalized() {
        let text = "def f(u):\n    a = requests.post(u)\n    b = requests.post(u)\n    c = httpx.get(u)\n    d = urllib.request.urlopen(u)\n    return a, b, c, d\n";
        assert_eq!(
            with_unit(text, "f", external_calls),
            vec![
                "requests.post".to_string(),
                "httpx.get".to_string(),
                "urllib.urlopen".to_string()
            ]
        );
    }

    #[test]
    fn parameters_skip_receiver_and_separators() {
        let text = "class A:\n    def m(self, a: int, b, *args, c: str = 'x', d=1, **kw) -> None:\n        pass\n";
        let params = with_unit(text, "A.m", parameters);
        let names: Vec<&str> = params.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "*args", "c", "d", "**kw"]);
        assert_eq!(params[0].annotation.as_deref(), Some("int"));
        assert_eq!(params[1].annotation, None);
        assert!(params[3].has_default);
        assert_eq!(params[3].annotation.as_deref(), Some("str"));
        assert!(params[4].has_default);

        let separators = "def f(a: int, /, b: int, *, c: int) -> int:\n    return a\n";
        let names: Vec<String> = with_unit(separators, "f", parameters)
            .into_iter()
            .map(|p| p.name)
            .collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }

    #[test]
    fn any_annotation_is_wildcard() {
        let text = "def f(a: Any, b: typing.Any, c: int) -> int:\n    return c\n";
        let params = with_unit(text, "f", parameters);
        let wildcard: Vec<bool> = params.iter().map(Parameter::is_wildcard_typed).collect();
        assert_eq!(wildcard, vec![true, true, false]);
    }

    #[test]
    fn delegation_accepts_single_forwarding_statement() {
        let cases = [
            ("def f(self):\n    return self.svc.run()\n", true),
            ("def f(self):\n    \"\"\"Doc.\"\"\"\n    return self.svc.run()\n", true),
            ("def f(self):\n    self.svc.run()\n", true),
            ("async def f(self):\n    return await self.svc.run()\n", true),
            ("def f(self):\n    x = self.svc.run()\n    return x\n", false),
            ("def f(self):\n    return 42\n", false),
            ("def f(self):\n    pass\n", false),
            (
                "def f(self, user_id):\n    return requests.get(os.environ['URL'] + str(user_id))\n",
                false,
            ),
            ("def f(self):\n    return self.run()\n", false),
            ("def f(self):\n    return self.factory().run()\n", false),
            ("def f(self):\n    return other.svc.run()\n", false),
        ];
        for (text, expected) in cases {
            assert_eq!(
                with_unit(text, "f", is_pure_delegation),
                expected,
                "case {text:?}"
            );
        }
    }
}
