//! Extract code entities (functions, classes, methods) from ASTs.

use crate::languages::Language;
use std::path::{Path, PathBuf};

/// The kind of entity the AST surface can yield.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CodeEntityKind {
    Function,
    Class,
    Method,
    Variable,
    Import,
}

/// An extracted code entity, pre semantic enrichment.
#[derive(Debug, Clone)]
pub struct CodeEntity {
    pub kind: CodeEntityKind,
    pub name: String,
    pub file: PathBuf,
    /// 1-indexed, inclusive.
    pub start_line: usize,
    pub end_line: usize,
    pub parameters: Option<Vec<String>>,
    pub return_type: Option<String>,
    /// Enclosing class/struct/trait name for methods.
    pub parent: Option<String>,
    pub source_text: String,
}

impl CodeEntity {
    /// Dot-qualified name: `Class.method` for members, bare name otherwise.
    pub fn qualified_name(&self) -> String {
        match &self.parent {
            Some(parent) => format!("{}.{}", parent, self.name),
            None => self.name.clone(),
        }
    }
}

pub(crate) fn node_text<'a>(node: &tree_sitter::Node, source: &'a str) -> &'a str {
    &source[node.byte_range()]
}

pub(crate) fn parse_tree(source: &str, language: Language) -> Option<tree_sitter::Tree> {
    let mut parser = tree_sitter::Parser::new();
    parser.set_language(&language.ts_language()).ok()?;
    parser.parse(source.as_bytes(), None)
}

fn make_entity(
    node: &tree_sitter::Node,
    path: &Path,
    source: &str,
    kind: CodeEntityKind,
    name: &str,
    parent: Option<&str>,
) -> CodeEntity {
    CodeEntity {
        kind,
        name: name.to_string(),
        file: path.to_path_buf(),
        start_line: node.start_position().row + 1,
        end_line: node.end_position().row + 1,
        parameters: extract_parameters(node, source),
        return_type: extract_return_type(node, source),
        parent: parent.map(String::from),
        source_text: node_text(node, source).to_string(),
    }
}

fn extract_parameters(node: &tree_sitter::Node, source: &str) -> Option<Vec<String>> {
    let params = node.child_by_field_name("parameters")?;
    let mut cursor = params.walk();
    let names: Vec<String> = params
        .children(&mut cursor)
        .filter(|c| c.is_named() && c.kind() != "comment")
        .map(|c| node_text(&c, source).to_string())
        .collect();
    Some(names)
}

fn extract_return_type(node: &tree_sitter::Node, source: &str) -> Option<String> {
    node.child_by_field_name("return_type")
        .or_else(|| node.child_by_field_name("result"))
        .map(|n| node_text(&n, source).trim_start_matches("->").trim().to_string())
}

/// Extract entities from source, dispatching on language.
pub fn extract_entities(path: &Path, source: &str, language: Language) -> Vec<CodeEntity> {
    let Some(tree) = parse_tree(source, language) else {
        return Vec::new();
    };
    let root = tree.root_node();
    let mut entities = Vec::new();
    match language {
        Language::Python => walk_python(&root, path, source, None, &mut entities),
        Language::Rust => walk_rust(&root, path, source, None, &mut entities),
        Language::TypeScript | Language::JavaScript => {
            walk_js(&root, path, source, None, &mut entities)
        }
        Language::Go => walk_go(&root, path, source, &mut entities),
        Language::Java => walk_java(&root, path, source, None, &mut entities),
    }
    entities
}

// ---------------------------------------------------------------------------
// Python
// ---------------------------------------------------------------------------

fn walk_python(
    node: &tree_sitter::Node,
    path: &Path,
    source: &str,
    parent_class: Option<&str>,
    entities: &mut Vec<CodeEntity>,
) {
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        match child.kind() {
            "function_definition" => {
                if let Some(name_node) = child.child_by_field_name("name") {
                    let kind = if parent_class.is_some() {
                        CodeEntityKind::Method
                    } else {
                        CodeEntityKind::Function
                    };
                    entities.push(make_entity(
                        &child,
                        path,
                        source,
                        kind,
                        node_text(&name_node, source),
                        parent_class,
                    ));
                }
            }
            // @property, @staticmethod, ... wrap the inner definition
            "decorated_definition" => {
                walk_python(&child, path, source, parent_class, entities);
            }
            "class_definition" => {
                if let Some(name_node) = child.child_by_field_name("name") {
                    let class_name = node_text(&name_node, source);
                    entities.push(make_entity(
                        &child,
                        path,
                        source,
                        CodeEntityKind::Class,
                        class_name,
                        None,
                    ));
                    if let Some(body) = child.child_by_field_name("body") {
                        walk_python(&body, path, source, Some(class_name), entities);
                    }
                }
            }
            _ => {
                if parent_class.is_none() {
                    walk_python(&child, path, source, None, entities);
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Rust
// ---------------------------------------------------------------------------

fn walk_rust(
    node: &tree_sitter::Node,
    path: &Path,
    source: &str,
    parent_type: Option<&str>,
    entities: &mut Vec<CodeEntity>,
) {
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        match child.kind() {
            "function_item" => {
                if let Some(name_node) = child.child_by_field_name("name") {
                    let kind = if parent_type.is_some() {
                        CodeEntityKind::Method
                    } else {
                        CodeEntityKind::Function
                    };
                    entities.push(make_entity(
                        &child,
                        path,
                        source,
                        kind,
                        node_text(&name_node, source),
                        parent_type,
                    ));
                }
            }
            "struct_item" | "enum_item" | "type_item" => {
                if let Some(name_node) = child.child_by_field_name("name") {
                    entities.push(make_entity(
                        &child,
                        path,
                        source,
                        CodeEntityKind::Class,
                        node_text(&name_node, source),
                        None,
                    ));
                }
            }
            "impl_item" => {
                if let Some(type_node) = child.child_by_field_name("type") {
                    let type_name = node_text(&type_node, source);
                    if let Some(body) = child.child_by_field_name("body") {
                        walk_rust(&body, path, source, Some(type_name), entities);
                    }
                }
            }
            "trait_item" => {
                if let Some(name_node) = child.child_by_field_name("name") {
                    let name = node_text(&name_node, source);
                    entities.push(make_entity(
                        &child,
                        path,
                        source,
                        CodeEntityKind::Class,
                        name,
                        None,
                    ));
                    // Default method implementations inside the trait body
                    if let Some(body) = child.child_by_field_name("body") {
                        walk_rust(&body, path, source, Some(name), entities);
                    }
                }
            }
            _ => {
                if parent_type.is_none() {
                    walk_rust(&child, path, source, None, entities);
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// TypeScript / JavaScript
// ---------------------------------------------------------------------------

fn has_child_kind(node: &tree_sitter::Node, kind: &str) -> bool {
    let mut cursor = node.walk();
    node.children(&mut cursor).any(|c| c.kind() == kind)
}

fn walk_js(
    node: &tree_sitter::Node,
    path: &Path,
    source: &str,
    parent_class: Option<&str>,
    entities: &mut Vec<CodeEntity>,
) {
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        match child.kind() {
            "function_declaration" => {
                if let Some(name_node) = child.child_by_field_name("name") {
                    entities.push(make_entity(
                        &child,
                        path,
                        source,
                        CodeEntityKind::Function,
                        node_text(&name_node, source),
                        parent_class,
                    ));
                }
            }
            "class_declaration" => {
                if let Some(name_node) = child.child_by_field_name("name") {
                    let class_name = node_text(&name_node, source);
                    entities.push(make_entity(
                        &child,
                        path,
                        source,
                        CodeEntityKind::Class,
                        class_name,
                        None,
                    ));
                    if let Some(body) = child.child_by_field_name("body") {
                        walk_js(&body, path, source, Some(class_name), entities);
                    }
                }
            }
            "interface_declaration" | "type_alias_declaration" => {
                if let Some(name_node) = child.child_by_field_name("name") {
                    entities.push(make_entity(
                        &child,
                        path,
                        source,
                        CodeEntityKind::Class,
                        node_text(&name_node, source),
                        None,
                    ));
                }
            }
            "method_definition" => {
                if let Some(name_node) = child.child_by_field_name("name") {
                    entities.push(make_entity(
                        &child,
                        path,
                        source,
                        CodeEntityKind::Method,
                        node_text(&name_node, source),
                        parent_class,
                    ));
                }
            }
            // const foo = () => {} binds the declared name as the entity name
            "lexical_declaration" | "variable_declaration" => {
                let mut inner = child.walk();
                for decl in child.children(&mut inner) {
                    if decl.kind() != "variable_declarator" {
                        continue;
                    }
                    let is_callable = has_child_kind(&decl, "arrow_function")
                        || has_child_kind(&decl, "function_expression")
                        || has_child_kind(&decl, "function");
                    if is_callable
                        && let Some(name_node) = decl.child_by_field_name("name")
                        && name_node.kind() == "identifier"
                    {
                        entities.push(make_entity(
                            &child,
                            path,
                            source,
                            CodeEntityKind::Function,
                            node_text(&name_node, source),
                            parent_class,
                        ));
                    }
                }
            }
            _ => {
                if parent_class.is_none() {
                    walk_js(&child, path, source, None, entities);
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Go
// ---------------------------------------------------------------------------

fn walk_go(node: &tree_sitter::Node, path: &Path, source: &str, entities: &mut Vec<CodeEntity>) {
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        match child.kind() {
            "function_declaration" => {
                if let Some(name_node) = child.child_by_field_name("name") {
                    entities.push(make_entity(
                        &child,
                        path,
                        source,
                        CodeEntityKind::Function,
                        node_text(&name_node, source),
                        None,
                    ));
                }
            }
            "method_declaration" => {
                if let Some(name_node) = child.child_by_field_name("name") {
                    let receiver_type = child
                        .child_by_field_name("receiver")
                        .map(|r| go_receiver_type(&r, source));
                    entities.push(make_entity(
                        &child,
                        path,
                        source,
                        CodeEntityKind::Method,
                        node_text(&name_node, source),
                        receiver_type.as_deref(),
                    ));
                }
            }
            "type_declaration" => {
                let mut inner = child.walk();
                for spec in child.children(&mut inner) {
                    if spec.kind() == "type_spec"
                        && let Some(name_node) = spec.child_by_field_name("name")
                        && let Some(type_node) = spec.child_by_field_name("type")
                        && matches!(type_node.kind(), "struct_type" | "interface_type")
                    {
                        entities.push(make_entity(
                            &spec,
                            path,
                            source,
                            CodeEntityKind::Class,
                            node_text(&name_node, source),
                            None,
                        ));
                    }
                }
            }
            _ => walk_go(&child, path, source, entities),
        }
    }
}

/// `(s *Server)` → `Server`
fn go_receiver_type(receiver: &tree_sitter::Node, source: &str) -> String {
    let text = node_text(receiver, source);
    text.trim_matches(|c| c == '(' || c == ')')
        .split_whitespace()
        .last()
        .unwrap_or("")
        .trim_start_matches('*')
        .to_string()
}

// ---------------------------------------------------------------------------
// Java
// ---------------------------------------------------------------------------

fn walk_java(
    node: &tree_sitter::Node,
    path: &Path,
    source: &str,
    parent_class: Option<&str>,
    entities: &mut Vec<CodeEntity>,
) {
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        match child.kind() {
            "class_declaration" | "interface_declaration" => {
                if let Some(name_node) = child.child_by_field_name("name") {
                    let class_name = node_text(&name_node, source);
                    entities.push(make_entity(
                        &child,
                        path,
                        source,
                        CodeEntityKind::Class,
                        class_name,
                        None,
                    ));
                    if let Some(body) = child.child_by_field_name("body") {
                        walk_java(&body, path, source, Some(class_name), entities);
                    }
                }
            }
            "method_declaration" | "constructor_declaration" => {
                if let Some(name_node) = child.child_by_field_name("name") {
                    entities.push(make_entity(
                        &child,
                        path,
                        source,
                        CodeEntityKind::Method,
                        node_text(&name_node, source),
                        parent_class,
                    ));
                }
            }
            _ => {
                if parent_class.is_none() {
                    walk_java(&child, path, source, None, entities);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extract(source: &str, lang: Language) -> Vec<CodeEntity> {
        extract_entities(Path::new("test.src"), source, lang)
    }

    #[test]
    fn python_functions_and_methods() {
        let source = r#"
def top(): pass

class Greeter:
    def greet(self, name):
        return name
"#;
        let entities = extract(source, Language::Python);
        let names: Vec<(&str, CodeEntityKind)> = entities
            .iter()
            .map(|e| (e.name.as_str(), e.kind))
            .collect();
        assert!(names.contains(&("top", CodeEntityKind::Function)));
        assert!(names.contains(&("Greeter", CodeEntityKind::Class)));
        assert!(names.contains(&("greet", CodeEntityKind::Method)));
        let greet = entities.iter().find(|e| e.name == "greet").unwrap();
        assert_eq!(greet.parent.as_deref(), Some("Greeter"));
        assert_eq!(greet.qualified_name(), "Greeter.greet");
    }

    #[test]
    fn rust_impl_methods_bind_type_parent() {
        let source = r#"
pub struct Engine;

impl Engine {
    pub fn start(&self) -> bool { true }
}

pub trait Drive {
    fn wheels(&self) -> u8 { 4 }
}
"#;
        let entities = extract(source, Language::Rust);
        let start = entities.iter().find(|e| e.name == "start").unwrap();
        assert_eq!(start.kind, CodeEntityKind::Method);
        assert_eq!(start.parent.as_deref(), Some("Engine"));
        let wheels = entities.iter().find(|e| e.name == "wheels").unwrap();
        assert_eq!(wheels.parent.as_deref(), Some("Drive"));
        assert!(entities.iter().any(|e| e.name == "Engine" && e.kind == CodeEntityKind::Class));
    }

    #[test]
    fn typescript_arrow_function_binds_declared_name() {
        let source = r#"
export function greet(name: string) { return name; }
const add = (a: number, b: number) => a + b;
interface Shape { area(): number; }
"#;
        let entities = extract(source, Language::TypeScript);
        assert!(entities
            .iter()
            .any(|e| e.name == "greet" && e.kind == CodeEntityKind::Function));
        assert!(entities
            .iter()
            .any(|e| e.name == "add" && e.kind == CodeEntityKind::Function));
        assert!(entities
            .iter()
            .any(|e| e.name == "Shape" && e.kind == CodeEntityKind::Class));
    }

    #[test]
    fn go_methods_bind_receiver_type() {
        let source = r#"
package main

type Server struct{}

func (s *Server) Start() error { return nil }

func main() {}
"#;
        let entities = extract(source, Language::Go);
        let start = entities.iter().find(|e| e.name == "Start").unwrap();
        assert_eq!(start.kind, CodeEntityKind::Method);
        assert_eq!(start.parent.as_deref(), Some("Server"));
        assert!(entities.iter().any(|e| e.name == "Server" && e.kind == CodeEntityKind::Class));
        assert!(entities.iter().any(|e| e.name == "main" && e.kind == CodeEntityKind::Function));
    }

    #[test]
    fn java_constructors_are_methods() {
        let source = r#"
public class Account {
    public Account() {}
    public long balance() { return 0; }
}
interface Audited {}
"#;
        let entities = extract(source, Language::Java);
        let ctor = entities.iter().find(|e| e.name == "Account" && e.kind == CodeEntityKind::Method);
        assert!(ctor.is_some(), "constructor should map to method");
        assert!(entities
            .iter()
            .any(|e| e.name == "Account" && e.kind == CodeEntityKind::Class));
        assert!(entities
            .iter()
            .any(|e| e.name == "Audited" && e.kind == CodeEntityKind::Class));
        assert!(entities
            .iter()
            .any(|e| e.name == "balance" && e.parent.as_deref() == Some("Account")));
    }

    #[test]
    fn line_numbers_are_one_indexed_inclusive() {
        let source = "def f():\n    pass\n";
        let entities = extract(source, Language::Python);
        assert_eq!(entities[0].start_line, 1);
        assert_eq!(entities[0].end_line, 2);
    }
}
