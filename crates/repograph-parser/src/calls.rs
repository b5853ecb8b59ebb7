//! Extract call sites and inheritance relations from ASTs.
//!
//! Caller context is maintained by mapping each call line to the innermost
//! enclosing function or method scope (dot-qualified, `Class.method`).

use crate::entities::{self, node_text, parse_tree, CodeEntityKind};
use crate::languages::Language;
use std::path::{Path, PathBuf};

/// How a call's receiver expression reads at the call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiverKind {
    /// `self.x()` / `this.x()`
    SelfRef,
    /// `super.x()` / `super().x()`
    Super,
    /// Any other receiver expression.
    Variable,
    /// Plain call with no receiver.
    None,
}

/// A single call site.
#[derive(Debug, Clone)]
pub struct CallSite {
    pub callee_symbol: String,
    pub caller_file: PathBuf,
    /// Dot-qualified enclosing scope, e.g. `Indexer.run`; `None` at module scope.
    pub caller_entity: Option<String>,
    /// 1-indexed line of the call.
    pub line: usize,
    /// Receiver expression text, when present.
    pub receiver: Option<String>,
    pub receiver_kind: ReceiverKind,
    /// Full callee expression as written (`client.fetch`, `Foo::new`).
    pub qualified_name: Option<String>,
    /// Simple assignment target when the call is the right-hand side of one
    /// (`x` for `x = Foo()`, `self.field` for `self.field = Bar()`).
    pub assigned_to: Option<String>,
}

/// Whether an inheritance relation is subclassing or interface satisfaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InheritanceKind {
    Inherit,
    Implement,
}

/// One `child → parent` inheritance relation.
#[derive(Debug, Clone)]
pub struct InheritanceRelation {
    pub child: String,
    pub parent: String,
    pub kind: InheritanceKind,
    pub line: usize,
}

#[derive(Debug)]
struct FunctionScope {
    qualified: String,
    start: usize,
    end: usize,
}

/// Scopes come straight from entity extraction, so call context and entity
/// ids agree on qualified names.
fn collect_scopes(path: &Path, source: &str, language: Language) -> Vec<FunctionScope> {
    entities::extract_entities(path, source, language)
        .into_iter()
        .filter(|e| matches!(e.kind, CodeEntityKind::Function | CodeEntityKind::Method))
        .map(|e| FunctionScope {
            qualified: e.qualified_name(),
            start: e.start_line,
            end: e.end_line,
        })
        .collect()
}

/// Innermost scope containing a 1-indexed line.
fn enclosing_scope(scopes: &[FunctionScope], line: usize) -> Option<&FunctionScope> {
    scopes
        .iter()
        .filter(|s| s.start <= line && line <= s.end)
        .max_by_key(|s| s.start)
}

/// Extract every call site in a file.
pub fn extract_call_sites(source: &str, language: Language, path: &Path) -> Vec<CallSite> {
    let Some(tree) = parse_tree(source, language) else {
        return Vec::new();
    };
    let scopes = collect_scopes(path, source, language);
    let mut calls = Vec::new();
    walk_calls(
        &tree.root_node(),
        source,
        language,
        path,
        &scopes,
        &mut calls,
    );
    calls
}

fn walk_calls(
    node: &tree_sitter::Node,
    source: &str,
    language: Language,
    path: &Path,
    scopes: &[FunctionScope],
    calls: &mut Vec<CallSite>,
) {
    let call_kind = match language {
        Language::Python => node.kind() == "call",
        Language::Rust | Language::Go => node.kind() == "call_expression",
        Language::TypeScript | Language::JavaScript => {
            node.kind() == "call_expression" || node.kind() == "new_expression"
        }
        Language::Java => {
            node.kind() == "method_invocation" || node.kind() == "object_creation_expression"
        }
    };

    if call_kind && let Some(mut site) = describe_call(node, source, language, path) {
        site.caller_entity =
            enclosing_scope(scopes, site.line).map(|s| s.qualified.clone());
        site.assigned_to = assignment_target(node, source, language);
        calls.push(site);
    }

    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        walk_calls(&child, source, language, path, scopes, calls);
    }
}

fn describe_call(
    node: &tree_sitter::Node,
    source: &str,
    language: Language,
    path: &Path,
) -> Option<CallSite> {
    let line = node.start_position().row + 1;
    let (callee, receiver) = match language {
        Language::Python | Language::Rust | Language::Go => {
            let func = node.child_by_field_name("function")?;
            split_callee(&func, source)
        }
        Language::TypeScript | Language::JavaScript => {
            if node.kind() == "new_expression" {
                let ctor = node.child_by_field_name("constructor")?;
                (node_text(&ctor, source).to_string(), None)
            } else {
                let func = node.child_by_field_name("function")?;
                split_callee(&func, source)
            }
        }
        Language::Java => {
            if node.kind() == "object_creation_expression" {
                let ty = node.child_by_field_name("type")?;
                (node_text(&ty, source).to_string(), None)
            } else {
                let name = node.child_by_field_name("name")?;
                let receiver = node
                    .child_by_field_name("object")
                    .map(|o| node_text(&o, source).to_string());
                (node_text(&name, source).to_string(), receiver)
            }
        }
    };

    if callee.is_empty() {
        return None;
    }

    let receiver_kind = classify_receiver(receiver.as_deref());
    let qualified_name = receiver.as_deref().map(|r| format!("{r}.{callee}"));

    Some(CallSite {
        callee_symbol: callee.rsplit("::").next().unwrap_or(&callee).to_string(),
        caller_file: path.to_path_buf(),
        caller_entity: None,
        line,
        receiver,
        receiver_kind,
        qualified_name,
        assigned_to: None,
    })
}

/// Split a callee expression into (callee name, receiver expression).
fn split_callee(func: &tree_sitter::Node, source: &str) -> (String, Option<String>) {
    match func.kind() {
        "identifier" => (node_text(func, source).to_string(), None),
        // Python obj.method / JS member / Rust field_expression
        "attribute" | "member_expression" | "field_expression" => {
            let property = func
                .child_by_field_name("attribute")
                .or_else(|| func.child_by_field_name("property"))
                .or_else(|| func.child_by_field_name("field"));
            let object = func
                .child_by_field_name("object")
                .or_else(|| func.child_by_field_name("value"))
                .or_else(|| func.child_by_field_name("operand"));
            match (property, object) {
                (Some(p), Some(o)) => (
                    node_text(&p, source).to_string(),
                    Some(node_text(&o, source).to_string()),
                ),
                (Some(p), None) => (node_text(&p, source).to_string(), None),
                _ => (node_text(func, source).to_string(), None),
            }
        }
        // Go pkg.Func / obj.Method
        "selector_expression" => {
            let field = func.child_by_field_name("field");
            let operand = func.child_by_field_name("operand");
            match (field, operand) {
                (Some(f), Some(o)) => (
                    node_text(&f, source).to_string(),
                    Some(node_text(&o, source).to_string()),
                ),
                _ => (node_text(func, source).to_string(), None),
            }
        }
        // Rust Foo::new
        "scoped_identifier" => {
            let text = node_text(func, source);
            let name = text.rsplit("::").next().unwrap_or(text).to_string();
            let prefix = text.rsplit_once("::").map(|(p, _)| p.to_string());
            (name, prefix)
        }
        _ => {
            let text = node_text(func, source);
            let name = text
                .rsplit(['.', ':'])
                .next()
                .unwrap_or("")
                .trim()
                .to_string();
            (name, None)
        }
    }
}

fn classify_receiver(receiver: Option<&str>) -> ReceiverKind {
    match receiver {
        Option::None => ReceiverKind::None,
        Some("self") | Some("this") => ReceiverKind::SelfRef,
        Some(r) if r == "super" || r.starts_with("super(") || r.starts_with("super.") => {
            ReceiverKind::Super
        }
        Some(_) => ReceiverKind::Variable,
    }
}

/// When the call is the right-hand side of a simple assignment or binding,
/// return the target expression (`x`, `self.field`, `this.field`).
fn assignment_target(
    call: &tree_sitter::Node,
    source: &str,
    language: Language,
) -> Option<String> {
    let parent = call.parent()?;
    let target = match (language, parent.kind()) {
        (Language::Python, "assignment") => parent.child_by_field_name("left"),
        (
            Language::TypeScript | Language::JavaScript,
            "variable_declarator",
        ) => parent.child_by_field_name("name"),
        (Language::TypeScript | Language::JavaScript, "assignment_expression") => {
            parent.child_by_field_name("left")
        }
        (Language::Rust, "let_declaration") => parent.child_by_field_name("pattern"),
        (Language::Java, "variable_declarator") => parent.child_by_field_name("name"),
        (Language::Java, "assignment_expression") => parent.child_by_field_name("left"),
        (Language::Go, "short_var_declaration") | (Language::Go, "assignment_statement") => {
            parent.child_by_field_name("left")
        }
        _ => Option::None,
    }?;
    let text = node_text(&target, source).trim().to_string();
    // Multi-target bindings are ambiguous; keep single targets only.
    if text.is_empty() || text.contains(',') {
        return Option::None;
    }
    Some(text)
}

/// Extract inheritance relations from a file.
pub fn extract_inheritances(
    source: &str,
    language: Language,
    _path: &Path,
) -> Vec<InheritanceRelation> {
    let Some(tree) = parse_tree(source, language) else {
        return Vec::new();
    };
    let mut relations = Vec::new();
    walk_inheritance(&tree.root_node(), source, language, &mut relations);
    relations
}

fn walk_inheritance(
    node: &tree_sitter::Node,
    source: &str,
    language: Language,
    relations: &mut Vec<InheritanceRelation>,
) {
    match (language, node.kind()) {
        (Language::Python, "class_definition") => {
            if let Some(name_node) = node.child_by_field_name("name") {
                let child_name = node_text(&name_node, source);
                let line = node.start_position().row + 1;
                if let Some(bases) = node.child_by_field_name("superclasses") {
                    let mut cursor = bases.walk();
                    for base in bases.children(&mut cursor) {
                        if matches!(base.kind(), "identifier" | "attribute") {
                            let parent = node_text(&base, source)
                                .rsplit('.')
                                .next()
                                .unwrap_or("")
                                .to_string();
                            if !parent.is_empty() && parent != "object" {
                                relations.push(InheritanceRelation {
                                    child: child_name.to_string(),
                                    parent,
                                    kind: InheritanceKind::Inherit,
                                    line,
                                });
                            }
                        }
                    }
                }
            }
        }
        (Language::Rust, "impl_item") => {
            if let (Some(trait_node), Some(type_node)) = (
                node.child_by_field_name("trait"),
                node.child_by_field_name("type"),
            ) {
                relations.push(InheritanceRelation {
                    child: node_text(&type_node, source).to_string(),
                    parent: strip_generics(node_text(&trait_node, source)),
                    kind: InheritanceKind::Implement,
                    line: node.start_position().row + 1,
                });
            }
        }
        (
            Language::TypeScript | Language::JavaScript,
            "class_declaration",
        ) => {
            if let Some(name_node) = node.child_by_field_name("name") {
                let child_name = node_text(&name_node, source).to_string();
                let line = node.start_position().row + 1;
                let mut cursor = node.walk();
                for part in node.children(&mut cursor) {
                    if part.kind() == "class_heritage" {
                        collect_ts_heritage(&part, source, &child_name, line, relations);
                    }
                }
            }
        }
        (Language::Java, "class_declaration" | "interface_declaration") => {
            if let Some(name_node) = node.child_by_field_name("name") {
                let child_name = node_text(&name_node, source).to_string();
                let line = node.start_position().row + 1;
                if let Some(superclass) = node.child_by_field_name("superclass") {
                    let parent = node_text(&superclass, source)
                        .trim_start_matches("extends")
                        .trim();
                    relations.push(InheritanceRelation {
                        child: child_name.clone(),
                        parent: strip_generics(parent),
                        kind: InheritanceKind::Inherit,
                        line,
                    });
                }
                if let Some(interfaces) = node.child_by_field_name("interfaces") {
                    for parent in node_text(&interfaces, source)
                        .trim_start_matches("implements")
                        .split(',')
                    {
                        let parent = parent.trim();
                        if !parent.is_empty() {
                            relations.push(InheritanceRelation {
                                child: child_name.clone(),
                                parent: strip_generics(parent),
                                kind: InheritanceKind::Implement,
                                line,
                            });
                        }
                    }
                }
            }
        }
        _ => {}
    }

    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        walk_inheritance(&child, source, language, relations);
    }
}

/// TS `extends Base implements A, B` / JS `extends Base`.
fn collect_ts_heritage(
    heritage: &tree_sitter::Node,
    source: &str,
    child_name: &str,
    line: usize,
    relations: &mut Vec<InheritanceRelation>,
) {
    let text = node_text(heritage, source);
    let (extends_part, implements_part) = match text.split_once("implements") {
        Some((e, i)) => (e, Some(i)),
        Option::None => (text, Option::None),
    };
    if let Some(base) = extends_part.trim().strip_prefix("extends") {
        let base = strip_generics(base.trim());
        if !base.is_empty() {
            relations.push(InheritanceRelation {
                child: child_name.to_string(),
                parent: base,
                kind: InheritanceKind::Inherit,
                line,
            });
        }
    }
    if let Some(interfaces) = implements_part {
        for parent in interfaces.split(',') {
            let parent = strip_generics(parent.trim());
            if !parent.is_empty() {
                relations.push(InheritanceRelation {
                    child: child_name.to_string(),
                    parent,
                    kind: InheritanceKind::Implement,
                    line,
                });
            }
        }
    }
}

fn strip_generics(name: &str) -> String {
    name.split('<').next().unwrap_or(name).trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn calls(source: &str, lang: Language) -> Vec<CallSite> {
        extract_call_sites(source, lang, Path::new("test.src"))
    }

    #[test]
    fn python_call_context_and_receiver() {
        let source = r#"
class Loader:
    def load(self):
        self.parse()
        helper()

    def parse(self):
        pass

def top():
    x = Loader()
    x.load()
"#;
        let sites = calls(source, Language::Python);

        let parse_call = sites.iter().find(|c| c.callee_symbol == "parse").unwrap();
        assert_eq!(parse_call.caller_entity.as_deref(), Some("Loader.load"));
        assert_eq!(parse_call.receiver_kind, ReceiverKind::SelfRef);

        let helper_call = sites.iter().find(|c| c.callee_symbol == "helper").unwrap();
        assert_eq!(helper_call.receiver_kind, ReceiverKind::None);

        let ctor = sites.iter().find(|c| c.callee_symbol == "Loader").unwrap();
        assert_eq!(ctor.assigned_to.as_deref(), Some("x"));
        assert_eq!(ctor.caller_entity.as_deref(), Some("top"));

        let load_call = sites.iter().find(|c| c.callee_symbol == "load").unwrap();
        assert_eq!(load_call.receiver.as_deref(), Some("x"));
        assert_eq!(load_call.receiver_kind, ReceiverKind::Variable);
    }

    #[test]
    fn python_attribute_binding_in_init() {
        let source = r#"
class App:
    def __init__(self):
        self.store = Store()

    def run(self):
        self.store.save()
"#;
        let sites = calls(source, Language::Python);
        let ctor = sites.iter().find(|c| c.callee_symbol == "Store").unwrap();
        assert_eq!(ctor.assigned_to.as_deref(), Some("self.store"));
        let save = sites.iter().find(|c| c.callee_symbol == "save").unwrap();
        assert_eq!(save.receiver.as_deref(), Some("self.store"));
    }

    #[test]
    fn typescript_new_and_member_calls() {
        let source = r#"
class Service {
    run() { this.helper(); }
    helper() {}
}
const svc = new Service();
svc.run();
"#;
        let sites = calls(source, Language::TypeScript);
        let ctor = sites.iter().find(|c| c.callee_symbol == "Service").unwrap();
        assert_eq!(ctor.assigned_to.as_deref(), Some("svc"));
        let helper = sites.iter().find(|c| c.callee_symbol == "helper").unwrap();
        assert_eq!(helper.receiver_kind, ReceiverKind::SelfRef);
        assert_eq!(helper.caller_entity.as_deref(), Some("Service.run"));
    }

    #[test]
    fn rust_scoped_and_method_calls() {
        let source = r#"
struct Engine;
impl Engine {
    fn start(&self) { self.warm_up(); }
    fn warm_up(&self) {}
}
fn main() {
    let e = Engine::new();
    e.start();
}
"#;
        let sites = calls(source, Language::Rust);
        let new_call = sites.iter().find(|c| c.callee_symbol == "new").unwrap();
        assert_eq!(new_call.receiver.as_deref(), Some("Engine"));
        assert_eq!(new_call.assigned_to.as_deref(), Some("e"));
        let warm = sites.iter().find(|c| c.callee_symbol == "warm_up").unwrap();
        assert_eq!(warm.receiver_kind, ReceiverKind::SelfRef);
        assert_eq!(warm.caller_entity.as_deref(), Some("Engine.start"));
    }

    #[test]
    fn java_invocation_and_creation() {
        let source = r#"
public class App {
    private Store store;
    public App() { this.store = new Store(); }
    public void run() { store.save(); }
}
"#;
        let sites = calls(source, Language::Java);
        let ctor = sites.iter().find(|c| c.callee_symbol == "Store").unwrap();
        assert_eq!(ctor.assigned_to.as_deref(), Some("this.store"));
        let save = sites.iter().find(|c| c.callee_symbol == "save").unwrap();
        assert_eq!(save.receiver.as_deref(), Some("store"));
    }

    #[test]
    fn python_inheritance() {
        let source = "class Child(Base, mixins.Extra):\n    pass\n";
        let rels = extract_inheritances(source, Language::Python, Path::new("t.py"));
        assert_eq!(rels.len(), 2);
        assert_eq!(rels[0].parent, "Base");
        assert_eq!(rels[1].parent, "Extra");
        assert!(rels.iter().all(|r| r.kind == InheritanceKind::Inherit));
    }

    #[test]
    fn typescript_extends_and_implements() {
        let source = "class Button extends Widget implements Clickable, Focusable {}\n";
        let rels = extract_inheritances(source, Language::TypeScript, Path::new("t.ts"));
        assert_eq!(rels.len(), 3);
        assert!(rels
            .iter()
            .any(|r| r.parent == "Widget" && r.kind == InheritanceKind::Inherit));
        assert!(rels
            .iter()
            .any(|r| r.parent == "Clickable" && r.kind == InheritanceKind::Implement));
    }

    #[test]
    fn rust_trait_impl_is_implement() {
        let source = "struct A;\ntrait T {}\nimpl T for A {}\n";
        let rels = extract_inheritances(source, Language::Rust, Path::new("t.rs"));
        assert_eq!(rels.len(), 1);
        assert_eq!(rels[0].child, "A");
        assert_eq!(rels[0].parent, "T");
        assert_eq!(rels[0].kind, InheritanceKind::Implement);
    }

    #[test]
    fn java_extends_and_implements() {
        let source = "class Car extends Vehicle implements Drivable {}\n";
        let rels = extract_inheritances(source, Language::Java, Path::new("t.java"));
        assert!(rels
            .iter()
            .any(|r| r.parent == "Vehicle" && r.kind == InheritanceKind::Inherit));
        assert!(rels
            .iter()
            .any(|r| r.parent == "Drivable" && r.kind == InheritanceKind::Implement));
    }
}
