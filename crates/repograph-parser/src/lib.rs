//! Tree-sitter AST surface for RPG entity and dependency extraction.
//!
//! Supports TypeScript, JavaScript, Python, Rust, Go, and Java. Extracts
//! code entities, import statements, call sites, and inheritance relations.
//! Parser failure on malformed input produces an empty result with recorded
//! errors rather than failing the pipeline.

pub mod calls;
pub mod entities;
pub mod imports;
pub mod languages;

pub use calls::{
    extract_call_sites, extract_inheritances, CallSite, InheritanceKind, InheritanceRelation,
    ReceiverKind,
};
pub use entities::{CodeEntity, CodeEntityKind};
pub use imports::{ImportStatement, ImportedSymbol};
pub use languages::Language;

use rayon::prelude::*;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Everything the AST surface recovers from one file.
#[derive(Debug, Clone, Default)]
pub struct ParseResult {
    pub entities: Vec<CodeEntity>,
    pub imports: Vec<ImportStatement>,
    pub errors: Vec<String>,
}

/// Parse one source file. Never fails: unparseable input yields an empty
/// result with a non-empty `errors` list.
pub fn parse_source(source: &str, language: Language, path: &Path) -> ParseResult {
    let Some(tree) = entities::parse_tree(source, language) else {
        return ParseResult {
            entities: Vec::new(),
            imports: Vec::new(),
            errors: vec![format!(
                "failed to parse {} as {}",
                path.display(),
                language.name()
            )],
        };
    };

    let mut errors = Vec::new();
    if tree.root_node().has_error() {
        // Recoverable: tree-sitter still yields a partial tree.
        debug!(file = %path.display(), "syntax errors in source; extracting from partial tree");
        errors.push(format!(
            "syntax errors in {}; entities extracted from partial tree",
            path.display()
        ));
    }

    ParseResult {
        entities: entities::extract_entities(path, source, language),
        imports: imports::extract_imports(source, language),
        errors,
    }
}

/// Parse many files in parallel. Each entry is `(relative_path, source)`.
/// Language is detected per file from the extension; unrecognized
/// extensions are skipped.
pub fn parse_files_parallel(files: Vec<(PathBuf, String)>) -> Vec<(PathBuf, ParseResult)> {
    files
        .into_par_iter()
        .filter_map(|(rel_path, source)| {
            let language = rel_path
                .extension()
                .and_then(|e| e.to_str())
                .and_then(Language::from_extension)?;
            let result = parse_source(&source, language, &rel_path);
            Some((rel_path, result))
        })
        .collect()
}
