//! Python syntax-tree access on top of tree-sitter.
//!
//! Parsing is pure: no filesystem access, a fresh parser per call.

use anyhow::{Context, Result, anyhow};
use serde::Serialize;
use tree_sitter::{Node, Parser, Tree};

use super::rules;

/// Parsed Python source.
pub struct PythonSource<'src> {
    text: &'src str,
    tree: Tree,
}

impl<'src> PythonSource<'src> {
    pub fn parse(text: &'src str) -> Result<Self> {
        let mut parser = Parser::new();
        parser
            .set_language(&tree_sitter_python::LANGUAGE.into())
            .context("load python grammar")?;
        let tree = parser
            .parse(text, None)
            .ok_or_else(|| anyhow!("python parser returned no tree"))?;
        Ok(Self { text, tree })
    }

    /// True when the tree has no error or missing nodes.
    pub fn is_valid(&self) -> bool {
        !self.tree.root_node().has_error()
    }

    pub fn root(&self) -> Node<'_> {
        self.tree.root_node()
    }

    pub fn bytes(&self) -> &'src [u8] {
        self.text.as_bytes()
    }

    /// First line (1-based) of the first syntax error, when any.
    pub fn first_error_line(&self) -> Option<usize> {
        descendants(self.root())
            .into_iter()
            .find(|node| node.is_error() || node.is_missing())
            .map(|node| node.start_position().row + 1)
    }

    /// Locate a function by `name` or `Class.method`, first match in document order.
    pub fn find_unit(&self, unit: &str) -> Option<Node<'_>> {
        match unit.split_once('.') {
            Some((class_name, method)) => {
                let class = self.find_class(class_name)?;
                class_methods(class, self.bytes())
                    .into_iter()
                    .map(|def| def.node)
                    .find(|node| field_text(*node, "name", self.bytes()) == Some(method))
            }
            None => descendants(self.root()).into_iter().find(|node| {
                node.kind() == "function_definition"
                    && field_text(*node, "name", self.bytes()) == Some(unit)
            }),
        }
    }

    pub fn find_class(&self, name: &str) -> Option<Node<'_>> {
        self.class_nodes()
            .into_iter()
            .find(|node| field_text(*node, "name", self.bytes()) == Some(name))
    }

    /// Every class definition, including nested ones, in document order.
    pub fn class_nodes(&self) -> Vec<Node<'_>> {
        descendants(self.root())
            .into_iter()
            .filter(|node| node.kind() == "class_definition")
            .collect()
    }

    /// Structural summary of every class and its directly defined methods.
    pub fn analyze_classes(&self) -> Vec<ClassInfo> {
        let src = self.bytes();
        self.class_nodes()
            .into_iter()
            .map(|class| ClassInfo {
                name: field_text(class, "name", src).unwrap_or_default().to_string(),
                line: class.start_position().row + 1,
                methods: class_methods(class, src)
                    .into_iter()
                    .map(|def| MethodInfo::from_definition(&def, src))
                    .collect(),
            })
            .collect()
    }
}

/// One class and its methods.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClassInfo {
    pub name: String,
    pub line: usize,
    pub methods: Vec<MethodInfo>,
}

impl ClassInfo {
    pub fn method(&self, name: &str) -> Option<&MethodInfo> {
        self.methods.iter().find(|method| method.name == name)
    }

    /// Non-constructor method with the largest line span; ties keep the first.
    pub fn longest_method(&self) -> Option<&MethodInfo> {
        self.methods
            .iter()
            .filter(|method| !method.is_constructor)
            .fold(None, |best: Option<&MethodInfo>, method| match best {
                Some(current) if current.line_count >= method.line_count => Some(current),
                _ => Some(method),
            })
    }
}

/// One method defined directly in a class body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MethodInfo {
    pub name: String,
    pub line: usize,
    pub line_count: usize,
    pub is_constructor: bool,
    pub is_static: bool,
    pub is_class_method: bool,
    pub accesses_environment: bool,
    pub external_calls: Vec<String>,
}

impl MethodInfo {
    fn from_definition(def: &MethodDef<'_>, src: &[u8]) -> Self {
        let name = field_text(def.node, "name", src)
            .unwrap_or_default()
            .to_string();
        Self {
            is_constructor: name == "__init__",
            is_static: def.decorators.iter().any(|d| d == "staticmethod"),
            is_class_method: def.decorators.iter().any(|d| d == "classmethod"),
            line: def.node.start_position().row + 1,
            line_count: line_span(def.node),
            accesses_environment: !rules::environment_accesses(def.node, src).is_empty(),
            external_calls: rules::external_calls(def.node, src),
            name,
        }
    }
}

/// A `function_definition` directly inside a class body, with its decorator names.
pub struct MethodDef<'tree> {
    pub node: Node<'tree>,
    pub decorators: Vec<String>,
}

/// Methods defined directly in `class`'s body, unwrapping decorators.
pub fn class_methods<'tree>(class: Node<'tree>, src: &[u8]) -> Vec<MethodDef<'tree>> {
    let Some(body) = class.child_by_field_name("body") else {
        return Vec::new();
    };
    let mut methods = Vec::new();
    let mut cursor = body.walk();
    for child in body.named_children(&mut cursor) {
        match child.kind() {
            "function_definition" => methods.push(MethodDef {
                node: child,
                decorators: Vec::new(),
            }),
            "decorated_definition" => {
                let Some(definition) = child.child_by_field_name("definition") else {
                    continue;
                };
                if definition.kind() != "function_definition" {
                    continue;
                }
                let mut inner = child.walk();
                let decorators = child
                    .named_children(&mut inner)
                    .filter(|node| node.kind() == "decorator")
                    .map(|node| decorator_name(node, src))
                    .collect();
                methods.push(MethodDef {
                    node: definition,
                    decorators,
                });
            }
            _ => {}
        }
    }
    methods
}

fn decorator_name(decorator: Node<'_>, src: &[u8]) -> String {
    node_text(decorator, src)
        .trim_start_matches('@')
        .trim()
        .to_string()
}

/// Inclusive line span of a definition.
pub fn line_span(node: Node<'_>) -> usize {
    let start = node.start_position();
    let end = node.end_position();
    // A node ending at column 0 stops before that row's first character.
    let end_row = if end.column == 0 && end.row > start.row {
        end.row - 1
    } else {
        end.row
    };
    end_row - start.row + 1
}

pub fn node_text<'a>(node: Node<'_>, src: &'a [u8]) -> &'a str {
    node.utf8_text(src).unwrap_or("")
}

pub fn field_text<'a>(node: Node<'_>, field: &str, src: &'a [u8]) -> Option<&'a str> {
    node.child_by_field_name(field).map(|n| node_text(n, src))
}

/// `node` and every descendant, in document (pre-)order.
pub fn descendants(node: Node<'_>) -> Vec<Node<'_>> {
    let mut out = Vec::new();
    let mut stack = vec![node];
    while let Some(current) = stack.pop() {
        out.push(current);
        let mut cursor = current.walk();
        let children: Vec<Node<'_>> = current.children(&mut cursor).collect();
        stack.extend(children.into_iter().rev());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const SOURCE: &str = r#"
import os

class Accounts:
    def __init__(self, client):
        self.client = client

    @staticmethod
    def helper(x: int) -> int:
        return x

    def lookup(self, name: str) -> str:
        key = os.getenv("KEY")
        response = requests.get(name)
        return response.text

def lookup(name):
    return name
"#;

    #[test]
    fn detects_syntax_errors() {
        let valid = PythonSource::parse(SOURCE).expect("parse");
        assert!(valid.is_valid());
        assert_eq!(valid.first_error_line(), None);

        let broken = PythonSource::parse("def broken(:\n    pass\n").expect("parse");
        assert!(!broken.is_valid());
        assert_eq!(broken.first_error_line(), Some(1));
    }

    #[test]
    fn finds_qualified_and_bare_units_in_document_order() {
        let source = PythonSource::parse(SOURCE).expect("parse");

        let qualified = source.find_unit("Accounts.lookup").expect("method");
        assert_eq!(qualified.start_position().row + 1, 12);

        // Bare names match the first definition, here the method.
        let bare = source.find_unit("lookup").expect("function");
        assert_eq!(bare.start_position().row + 1, 12);

        assert!(source.find_unit("Accounts.missing").is_none());
        assert!(source.find_unit("Nope.lookup").is_none());
    }

    #[test]
    fn analyzes_class_methods() {
        let source = PythonSource::parse(SOURCE).expect("parse");
        let classes = source.analyze_classes();
        assert_eq!(classes.len(), 1);
        let accounts = &classes[0];
        assert_eq!(accounts.name, "Accounts");
        assert_eq!(accounts.line, 4);

        let names: Vec<&str> = accounts.methods.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["__init__", "helper", "lookup"]);

        let init = accounts.method("__init__").expect("init");
        assert!(init.is_constructor);

        let helper = accounts.method("helper").expect("helper");
        assert!(helper.is_static);
        assert!(!helper.is_class_method);
        assert_eq!(helper.line, 9);

        let lookup = accounts.method("lookup").expect("lookup");
        assert_eq!(lookup.line_count, 4);
        assert!(lookup.accesses_environment);
        assert_eq!(lookup.external_calls, vec!["requests.get".to_string()]);

        assert_eq!(
            accounts.longest_method().map(|m| m.name.as_str()),
            Some("lookup")
        );
    }
}
