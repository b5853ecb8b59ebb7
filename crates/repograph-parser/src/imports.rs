//! Extract import statements from ASTs.

use crate::entities::{node_text, parse_tree};
use crate::languages::Language;

/// A single imported symbol, possibly renamed at the import site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportedSymbol {
    pub name: String,
    pub alias: Option<String>,
}

impl ImportedSymbol {
    pub fn plain(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            alias: None,
        }
    }

    /// The name this symbol is visible as in the importing file.
    pub fn local_name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }
}

/// One import statement: a module specifier plus its named symbols.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportStatement {
    /// Module specifier as written: `./utils`, `os.path`, `crate::graph`.
    pub module: String,
    /// Named symbols; empty for bare module imports.
    pub symbols: Vec<ImportedSymbol>,
    /// Module-level alias (`import numpy as np`, `import * as ns from 'm'`).
    pub alias: Option<String>,
    pub line: usize,
}

/// Extract all imports from source, dispatching on language.
pub fn extract_imports(source: &str, language: Language) -> Vec<ImportStatement> {
    let Some(tree) = parse_tree(source, language) else {
        return Vec::new();
    };
    let root = tree.root_node();
    let mut imports = Vec::new();
    match language {
        Language::Python => collect_python_imports(&root, source, &mut imports),
        Language::Rust => collect_rust_imports(&root, source, &mut imports),
        Language::TypeScript | Language::JavaScript => {
            collect_js_imports(&root, source, &mut imports)
        }
        Language::Go => collect_go_imports(&root, source, &mut imports),
        Language::Java => collect_java_imports(&root, source, &mut imports),
    }
    imports
}

fn collect_python_imports(
    node: &tree_sitter::Node,
    source: &str,
    imports: &mut Vec<ImportStatement>,
) {
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        let line = child.start_position().row + 1;
        match child.kind() {
            "import_statement" => {
                let mut inner = child.walk();
                for item in child.children(&mut inner) {
                    match item.kind() {
                        "dotted_name" => imports.push(ImportStatement {
                            module: node_text(&item, source).to_string(),
                            symbols: Vec::new(),
                            alias: None,
                            line,
                        }),
                        "aliased_import" => {
                            let module = item
                                .child_by_field_name("name")
                                .map(|n| node_text(&n, source).to_string())
                                .unwrap_or_default();
                            let alias = item
                                .child_by_field_name("alias")
                                .map(|n| node_text(&n, source).to_string());
                            imports.push(ImportStatement {
                                module,
                                symbols: Vec::new(),
                                alias,
                                line,
                            });
                        }
                        _ => {}
                    }
                }
            }
            "import_from_statement" => {
                let module = child
                    .child_by_field_name("module_name")
                    .map(|n| node_text(&n, source).to_string())
                    .unwrap_or_default();
                let mut symbols = Vec::new();
                let mut inner = child.walk();
                for item in child.children(&mut inner) {
                    match item.kind() {
                        "dotted_name" if node_text(&item, source) != module => {
                            symbols.push(ImportedSymbol::plain(node_text(&item, source)));
                        }
                        "aliased_import" => {
                            let name = item
                                .child_by_field_name("name")
                                .map(|n| node_text(&n, source).to_string())
                                .unwrap_or_default();
                            let alias = item
                                .child_by_field_name("alias")
                                .map(|n| node_text(&n, source).to_string());
                            symbols.push(ImportedSymbol { name, alias });
                        }
                        "wildcard_import" => {}
                        _ => {}
                    }
                }
                imports.push(ImportStatement {
                    module,
                    symbols,
                    alias: None,
                    line,
                });
            }
            _ => collect_python_imports(&child, source, imports),
        }
    }
}

fn collect_rust_imports(
    node: &tree_sitter::Node,
    source: &str,
    imports: &mut Vec<ImportStatement>,
) {
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if child.kind() == "use_declaration" {
            let line = child.start_position().row + 1;
            let text = node_text(&child, source)
                .trim_start_matches("pub ")
                .trim_start_matches("use ")
                .trim_end_matches(';')
                .trim();
            imports.extend(parse_rust_use(text, line));
        } else {
            collect_rust_imports(&child, source, imports);
        }
    }
}

/// Parse a `use` path textually: `a::b::{c, d as e}` or `a::b::c as d`.
fn parse_rust_use(text: &str, line: usize) -> Vec<ImportStatement> {
    if let Some((prefix, list)) = text.split_once("::{") {
        let list = list.trim_end_matches('}');
        let symbols = list
            .split(',')
            .map(|s| parse_rust_symbol(s.trim()))
            .filter(|s| !s.name.is_empty() && s.name != "*")
            .collect();
        return vec![ImportStatement {
            module: prefix.trim().to_string(),
            symbols,
            alias: None,
            line,
        }];
    }
    let (path, alias) = match text.split_once(" as ") {
        Some((p, a)) => (p.trim(), Some(a.trim().to_string())),
        None => (text, None),
    };
    let (module, leaf) = match path.rsplit_once("::") {
        Some((m, l)) => (m.to_string(), l.to_string()),
        None => (path.to_string(), String::new()),
    };
    let symbols = if leaf.is_empty() || leaf == "*" {
        Vec::new()
    } else {
        vec![ImportedSymbol {
            name: leaf,
            alias: alias.clone(),
        }]
    };
    let module_alias = if symbols.is_empty() { alias } else { None };
    vec![ImportStatement {
        module,
        symbols,
        alias: module_alias,
        line,
    }]
}

fn parse_rust_symbol(text: &str) -> ImportedSymbol {
    match text.split_once(" as ") {
        Some((name, alias)) => ImportedSymbol {
            name: name.trim().to_string(),
            alias: Some(alias.trim().to_string()),
        },
        None => ImportedSymbol::plain(text),
    }
}

fn collect_js_imports(
    node: &tree_sitter::Node,
    source: &str,
    imports: &mut Vec<ImportStatement>,
) {
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if child.kind() != "import_statement" {
            continue;
        }
        let line = child.start_position().row + 1;
        let module = child
            .child_by_field_name("source")
            .map(|n| node_text(&n, source).trim_matches(['"', '\'']).to_string())
            .unwrap_or_default();
        let mut symbols = Vec::new();
        let mut alias = None;

        let mut inner = child.walk();
        for clause in child.children(&mut inner) {
            if clause.kind() != "import_clause" {
                continue;
            }
            let mut clause_cursor = clause.walk();
            for part in clause.children(&mut clause_cursor) {
                match part.kind() {
                    // Default import: bound name stands for the module
                    "identifier" => {
                        symbols.push(ImportedSymbol::plain(node_text(&part, source)));
                    }
                    "namespace_import" => {
                        let mut ns = part.walk();
                        alias = part
                            .children(&mut ns)
                            .find(|c| c.kind() == "identifier")
                            .map(|c| node_text(&c, source).to_string());
                    }
                    "named_imports" => {
                        let mut specs = part.walk();
                        for spec in part.children(&mut specs) {
                            if spec.kind() == "import_specifier"
                                && let Some(name_node) = spec.child_by_field_name("name")
                            {
                                symbols.push(ImportedSymbol {
                                    name: node_text(&name_node, source).to_string(),
                                    alias: spec
                                        .child_by_field_name("alias")
                                        .map(|a| node_text(&a, source).to_string()),
                                });
                            }
                        }
                    }
                    _ => {}
                }
            }
        }
        imports.push(ImportStatement {
            module,
            symbols,
            alias,
            line,
        });
    }
}

fn collect_go_imports(
    node: &tree_sitter::Node,
    source: &str,
    imports: &mut Vec<ImportStatement>,
) {
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if child.kind() == "import_declaration" {
            let mut inner = child.walk();
            collect_go_specs(&child, source, imports, &mut inner);
        }
    }
}

fn collect_go_specs<'a>(
    node: &tree_sitter::Node<'a>,
    source: &str,
    imports: &mut Vec<ImportStatement>,
    cursor: &mut tree_sitter::TreeCursor<'a>,
) {
    for child in node.children(cursor) {
        match child.kind() {
            "import_spec" => {
                let module = child
                    .child_by_field_name("path")
                    .map(|p| node_text(&p, source).trim_matches('"').to_string())
                    .unwrap_or_default();
                let alias = child
                    .child_by_field_name("name")
                    .map(|n| node_text(&n, source).to_string())
                    .filter(|n| n != "_" && n != ".");
                imports.push(ImportStatement {
                    module,
                    symbols: Vec::new(),
                    alias,
                    line: child.start_position().row + 1,
                });
            }
            "import_spec_list" => {
                let mut inner = child.walk();
                collect_go_specs(&child, source, imports, &mut inner);
            }
            _ => {}
        }
    }
}

fn collect_java_imports(
    node: &tree_sitter::Node,
    source: &str,
    imports: &mut Vec<ImportStatement>,
) {
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if child.kind() != "import_declaration" {
            continue;
        }
        let line = child.start_position().row + 1;
        let text = node_text(&child, source)
            .trim_start_matches("import")
            .trim()
            .trim_start_matches("static")
            .trim()
            .trim_end_matches(';')
            .trim();
        if text.ends_with(".*") {
            imports.push(ImportStatement {
                module: text.trim_end_matches(".*").to_string(),
                symbols: Vec::new(),
                alias: None,
                line,
            });
        } else {
            let (module, leaf) = match text.rsplit_once('.') {
                Some((m, l)) => (m.to_string(), l.to_string()),
                None => (text.to_string(), String::new()),
            };
            let symbols = if leaf.is_empty() {
                Vec::new()
            } else {
                vec![ImportedSymbol::plain(leaf)]
            };
            imports.push(ImportStatement {
                module,
                symbols,
                alias: None,
                line,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typescript_named_imports_with_alias() {
        let source = "import { greet, add as plus } from './utils';\nimport * as fs from 'fs';";
        let imports = extract_imports(source, Language::TypeScript);
        assert_eq!(imports.len(), 2);
        assert_eq!(imports[0].module, "./utils");
        assert_eq!(imports[0].symbols[0], ImportedSymbol::plain("greet"));
        assert_eq!(imports[0].symbols[1].local_name(), "plus");
        assert_eq!(imports[1].alias.as_deref(), Some("fs"));
    }

    #[test]
    fn python_import_forms() {
        let source = "import os.path\nimport numpy as np\nfrom utils import loader, saver as sv\n";
        let imports = extract_imports(source, Language::Python);
        assert_eq!(imports.len(), 3);
        assert_eq!(imports[0].module, "os.path");
        assert_eq!(imports[1].alias.as_deref(), Some("np"));
        assert_eq!(imports[2].module, "utils");
        assert_eq!(imports[2].symbols[1].local_name(), "sv");
    }

    #[test]
    fn rust_use_list() {
        let source = "use crate::graph::{Node, Edge as E};\nuse std::fmt;\n";
        let imports = extract_imports(source, Language::Rust);
        assert_eq!(imports[0].module, "crate::graph");
        assert_eq!(imports[0].symbols.len(), 2);
        assert_eq!(imports[0].symbols[1].local_name(), "E");
        assert_eq!(imports[1].module, "std");
        assert_eq!(imports[1].symbols[0].name, "fmt");
    }

    #[test]
    fn go_grouped_imports() {
        let source = "package main\n\nimport (\n\t\"fmt\"\n\tmyio \"io/ioutil\"\n)\n";
        let imports = extract_imports(source, Language::Go);
        assert_eq!(imports.len(), 2);
        assert_eq!(imports[0].module, "fmt");
        assert_eq!(imports[1].module, "io/ioutil");
        assert_eq!(imports[1].alias.as_deref(), Some("myio"));
    }

    #[test]
    fn java_imports() {
        let source = "import java.util.List;\nimport java.util.*;\n";
        let imports = extract_imports(source, Language::Java);
        assert_eq!(imports[0].module, "java.util");
        assert_eq!(imports[0].symbols[0].name, "List");
        assert!(imports[1].symbols.is_empty());
    }
}
