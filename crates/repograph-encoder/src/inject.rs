//! Dependency injection: recover import, call, and inheritance edges from
//! ASTs and attach them to the graph.
//!
//! Runs as phases: import resolution, symbol table construction, call/
//! inheritance extraction, type-aware receiver inference, edge creation.
//! Edges are file-level, deduplicated by `(source, target, type)`.

use repograph_core::config::InjectorConfig;
use repograph_core::{DependencyType, EntityType, RpgResult};
use repograph_store::{DependencyEdgeArgs, NodeFilter, Rpg};
use repograph_parser::{
    CallSite, ImportStatement, InheritanceKind, InheritanceRelation, Language, ReceiverKind,
};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::PathBuf;
use tracing::debug;

/// Outcome counts for one injection pass.
#[derive(Debug, Default)]
pub struct InjectReport {
    pub import_edges: usize,
    pub call_edges: usize,
    pub inherit_edges: usize,
    pub implement_edges: usize,
}

/// Repository-wide symbol index built from low-level nodes.
#[derive(Debug, Default)]
pub struct SymbolTable {
    /// Qualified name (`Class.method`, bare function name) → defining file.
    qualified: HashMap<String, String>,
    /// Unqualified name → defining files (the collision set).
    by_name: HashMap<String, Vec<String>>,
    /// Class name → defining file.
    classes: HashMap<String, String>,
    /// Class name → parent class names, in declaration order.
    class_parents: HashMap<String, Vec<String>>,
}

impl SymbolTable {
    /// Index every entity in the graph by qualified and unqualified name.
    pub fn build(rpg: &Rpg) -> RpgResult<Self> {
        let mut table = SymbolTable::default();
        for node in rpg.nodes(&NodeFilter {
            high_level: Some(false),
            ..NodeFilter::default()
        })? {
            let Some(meta) = node.metadata() else { continue };
            let Some(path) = meta.path.clone() else { continue };
            let Some(qualified) = meta.qualified_name.clone() else {
                continue;
            };
            match meta.entity_type {
                EntityType::Class => {
                    table.classes.insert(qualified.clone(), path.clone());
                }
                EntityType::Function | EntityType::Method => {}
                EntityType::File | EntityType::Module => continue,
            }
            let unqualified = qualified
                .rsplit('.')
                .next()
                .unwrap_or(&qualified)
                .to_string();
            table.qualified.insert(qualified, path.clone());
            let files = table.by_name.entry(unqualified).or_default();
            if !files.contains(&path) {
                files.push(path);
            }
        }
        Ok(table)
    }

    pub fn file_of_qualified(&self, qualified: &str) -> Option<&String> {
        self.qualified.get(qualified)
    }

    pub fn file_of_class(&self, class: &str) -> Option<&String> {
        self.classes.get(class)
    }

    /// A repository-wide unique unqualified match, or `None` on collision.
    pub fn unique_file_of(&self, name: &str) -> Option<&String> {
        match self.by_name.get(name) {
            Some(files) if files.len() == 1 => files.first(),
            _ => None,
        }
    }

    pub fn class_defines(&self, class: &str, method: &str) -> bool {
        self.qualified.contains_key(&format!("{class}.{method}"))
    }

    fn record_parents(&mut self, class: &str, parent: &str) {
        let parents = self.class_parents.entry(class.to_string()).or_default();
        if !parents.iter().any(|p| p == parent) {
            parents.push(parent.to_string());
        }
    }

    /// Depth-first method resolution order from `class` upward, cycle-guarded.
    /// Returns the first ancestor defining `method`.
    pub fn resolve_super(&self, class: &str, method: &str) -> Option<String> {
        let mut visited = HashSet::new();
        self.resolve_super_inner(class, method, &mut visited)
    }

    fn resolve_super_inner(
        &self,
        class: &str,
        method: &str,
        visited: &mut HashSet<String>,
    ) -> Option<String> {
        if !visited.insert(class.to_string()) {
            return None;
        }
        let parents = self.class_parents.get(class)?;
        for parent in parents {
            if self.class_defines(parent, method) {
                return Some(parent.clone());
            }
            if let Some(found) = self.resolve_super_inner(parent, method, visited) {
                return Some(found);
            }
        }
        None
    }
}

/// File id convention shared with the encoder: `{path}:file`.
fn file_node_id(path: &str) -> String {
    format!("{path}:file")
}

/// Inject dependency edges for the given files. The symbol table spans the
/// whole graph, so a file-scoped slice (as evolution uses) still resolves
/// cross-file targets.
pub fn inject(
    rpg: &mut Rpg,
    files: &[(PathBuf, String)],
    config: &InjectorConfig,
) -> RpgResult<InjectReport> {
    let mut report = InjectReport::default();

    // Known files: every file-level node in the graph.
    let known_files: Vec<String> = rpg
        .nodes(&NodeFilter {
            high_level: Some(false),
            entity_type: Some(EntityType::File),
            ..NodeFilter::default()
        })?
        .iter()
        .filter_map(|n| n.metadata().and_then(|m| m.path.clone()))
        .collect();

    let mut table = SymbolTable::build(rpg)?;
    let blocklist: HashSet<&str> = config
        .common_name_blocklist
        .iter()
        .map(String::as_str)
        .collect();

    // Phase 3 first gathers raw call/inheritance material so phase 4's
    // type inference sees the whole slice.
    struct FileSlice {
        rel: String,
        language: Language,
        imports: Vec<ImportStatement>,
        calls: Vec<CallSite>,
        inherits: Vec<InheritanceRelation>,
    }
    let mut per_file: Vec<FileSlice> = Vec::new();
    for (path, source) in files {
        let rel = path.to_string_lossy().replace('\\', "/");
        let Some(language) = Language::from_path(&rel) else {
            continue;
        };
        let imports = repograph_parser::imports::extract_imports(source, language);
        let calls = repograph_parser::extract_call_sites(source, language, path);
        let inherits = repograph_parser::extract_inheritances(source, language, path);
        for relation in &inherits {
            table.record_parents(&relation.child, &relation.parent);
        }
        per_file.push(FileSlice {
            rel,
            language,
            imports,
            calls,
            inherits,
        });
    }

    // Phase 1: import edges.
    let mut aliases: HashMap<String, HashMap<String, String>> = HashMap::new();
    for FileSlice {
        rel,
        language,
        imports,
        ..
    } in &per_file
    {
        let file_aliases = aliases.entry(rel.clone()).or_default();
        for import in imports {
            if let Some(target) = resolve_import(&import.module, rel, *language, &known_files) {
                if target != *rel {
                    let added = rpg.add_dependency_edge(DependencyEdgeArgs {
                        source: file_node_id(rel),
                        target: file_node_id(&target),
                        dependency_type: DependencyType::Import,
                        is_runtime: None,
                        line: Some(import.line),
                    })?;
                    if added {
                        report.import_edges += 1;
                    }
                }
                for symbol in &import.symbols {
                    file_aliases.insert(symbol.local_name().to_string(), target.clone());
                }
                if let Some(alias) = &import.alias {
                    file_aliases.insert(alias.clone(), target.clone());
                }
            }
        }
    }

    // Phases 4-5: calls with type inference, then inheritance edges.
    for FileSlice { rel, calls, .. } in &per_file {
        let bindings = collect_receiver_bindings(calls, &table);
        let file_aliases = aliases.get(rel);

        for call in calls {
            let resolved = resolve_call_target(call, &table, &bindings, file_aliases, &blocklist);
            if let Some(target_file) = resolved
                && target_file != *rel
            {
                let added = rpg.add_dependency_edge(DependencyEdgeArgs {
                    source: file_node_id(rel),
                    target: file_node_id(&target_file),
                    dependency_type: DependencyType::Call,
                    is_runtime: None,
                    line: Some(call.line),
                })?;
                if added {
                    report.call_edges += 1;
                }
            }
        }
    }

    for FileSlice { rel, inherits, .. } in &per_file {
        for relation in inherits {
            let parent_file = aliases
                .get(rel)
                .and_then(|a| a.get(&relation.parent))
                .cloned()
                .or_else(|| table.file_of_class(&relation.parent).cloned());
            if let Some(parent_file) = parent_file
                && parent_file != *rel
            {
                let dependency_type = match relation.kind {
                    InheritanceKind::Inherit => DependencyType::Inherit,
                    InheritanceKind::Implement => DependencyType::Implement,
                };
                let added = rpg.add_dependency_edge(DependencyEdgeArgs {
                    source: file_node_id(rel),
                    target: file_node_id(&parent_file),
                    dependency_type,
                    is_runtime: None,
                    line: Some(relation.line),
                })?;
                if added {
                    match relation.kind {
                        InheritanceKind::Inherit => report.inherit_edges += 1,
                        InheritanceKind::Implement => report.implement_edges += 1,
                    }
                }
            }
        }
    }

    debug!(?report, "dependency injection complete");
    Ok(report)
}

/// Receiver bindings inferred from a file's call sites:
/// - `(scope, variable) → class` for `x = Foo()` inside a function
/// - `(class, field) → class` for `self.field = Bar()` in a constructor
#[derive(Debug, Default)]
struct ReceiverBindings {
    locals: HashMap<(String, String), String>,
    attributes: HashMap<(String, String), String>,
}

fn collect_receiver_bindings(calls: &[CallSite], table: &SymbolTable) -> ReceiverBindings {
    let mut bindings = ReceiverBindings::default();
    for call in calls {
        let Some(target) = &call.assigned_to else { continue };
        // Only constructor-shaped callees bind a type: a known class name,
        // or `Type::new` style where the receiver names the class.
        let class = if table.file_of_class(&call.callee_symbol).is_some() {
            call.callee_symbol.clone()
        } else if call.callee_symbol == "new"
            && let Some(receiver) = &call.receiver
            && table.file_of_class(receiver).is_some()
        {
            receiver.clone()
        } else {
            continue;
        };

        if let Some(field) = target
            .strip_prefix("self.")
            .or_else(|| target.strip_prefix("this."))
        {
            // Attribute initialization inside an enclosing class's constructor
            if let Some(scope) = &call.caller_entity
                && let Some((owner, _)) = scope.split_once('.')
            {
                bindings
                    .attributes
                    .insert((owner.to_string(), field.to_string()), class);
            }
        } else if let Some(scope) = &call.caller_entity {
            bindings
                .locals
                .insert((scope.clone(), target.clone()), class);
        }
    }
    bindings
}

/// Resolve a call site to the defining file: type-aware target first, then
/// the file's import aliases, then a repository-wide unique unqualified
/// match with common names rejected.
fn resolve_call_target(
    call: &CallSite,
    table: &SymbolTable,
    bindings: &ReceiverBindings,
    aliases: Option<&HashMap<String, String>>,
    blocklist: &HashSet<&str>,
) -> Option<String> {
    // Phase 4: infer the receiver's class and rewrite the callee.
    if let Some(class) = infer_receiver_class(call, table, bindings) {
        if table.class_defines(&class, &call.callee_symbol) {
            return table
                .file_of_qualified(&format!("{class}.{}", call.callee_symbol))
                .cloned();
        }
        if let Some(found) = table.resolve_super(&class, &call.callee_symbol) {
            return table
                .file_of_qualified(&format!("{found}.{}", call.callee_symbol))
                .cloned();
        }
        // The receiver type is known but the method is not indexed; fall
        // back to the class's own file.
        return table.file_of_class(&class).cloned();
    }

    // Enclosing file's alias bindings.
    if let Some(aliases) = aliases
        && let Some(target) = aliases.get(&call.callee_symbol)
    {
        return Some(target.clone());
    }

    // Unique unqualified match, rejecting common names.
    if blocklist.contains(call.callee_symbol.as_str()) {
        return None;
    }
    table.unique_file_of(&call.callee_symbol).cloned()
}

fn infer_receiver_class(
    call: &CallSite,
    table: &SymbolTable,
    bindings: &ReceiverBindings,
) -> Option<String> {
    let enclosing_class = call
        .caller_entity
        .as_deref()
        .and_then(|scope| scope.split_once('.'))
        .map(|(class, _)| class.to_string());

    match call.receiver_kind {
        ReceiverKind::SelfRef => {
            // `self.field.m()` routes through the attribute binding;
            // `self.m()` resolves to the enclosing class.
            let receiver = call.receiver.as_deref().unwrap_or("self");
            if let Some(field) = receiver
                .strip_prefix("self.")
                .or_else(|| receiver.strip_prefix("this."))
            {
                let owner = enclosing_class?;
                return bindings
                    .attributes
                    .get(&(owner, field.to_string()))
                    .cloned();
            }
            enclosing_class
        }
        ReceiverKind::Super => {
            let class = enclosing_class?;
            table.resolve_super(&class, &call.callee_symbol)
        }
        ReceiverKind::Variable => {
            let receiver = call.receiver.as_deref()?;
            // A receiver that names a class directly (static call).
            if table.file_of_class(receiver).is_some() {
                return Some(receiver.to_string());
            }
            // `self.field.m()` / `this.field.m()` are Variable receivers too.
            if let Some(field) = receiver
                .strip_prefix("self.")
                .or_else(|| receiver.strip_prefix("this."))
            {
                let owner = enclosing_class?;
                return bindings
                    .attributes
                    .get(&(owner, field.to_string()))
                    .cloned();
            }
            let scope = call.caller_entity.clone()?;
            bindings
                .locals
                .get(&(scope, receiver.to_string()))
                .cloned()
        }
        ReceiverKind::None => None,
    }
}

/// Resolve an import specifier to a known repository file: relative
/// resolution with the language's extension set first, then a suffix match.
pub fn resolve_import(
    module: &str,
    importer: &str,
    language: Language,
    known_files: &[String],
) -> Option<String> {
    let known: HashSet<&str> = known_files.iter().map(String::as_str).collect();
    let importer_dir = match importer.rsplit_once('/') {
        Some((dir, _)) => dir.to_string(),
        None => String::new(),
    };

    match language {
        Language::TypeScript | Language::JavaScript => {
            if module.starts_with("./") || module.starts_with("../") {
                let base = normalize_path(&format!("{importer_dir}/{module}"));
                if known.contains(base.as_str()) {
                    return Some(base);
                }
                for ext in language.extension_set() {
                    let candidate = format!("{base}.{ext}");
                    if known.contains(candidate.as_str()) {
                        return Some(candidate);
                    }
                    let index = format!("{base}/index.{ext}");
                    if known.contains(index.as_str()) {
                        return Some(index);
                    }
                }
                return None;
            }
            suffix_match(&module.replace('.', "/"), known_files)
        }
        Language::Python => {
            let dots = module.chars().take_while(|c| *c == '.').count();
            let remainder = &module[dots..];
            let rel_path = remainder.replace('.', "/");
            if dots > 0 {
                // One dot is the current package, each extra dot pops one level.
                let mut base: Vec<&str> = if importer_dir.is_empty() {
                    Vec::new()
                } else {
                    importer_dir.split('/').collect()
                };
                for _ in 1..dots {
                    base.pop();
                }
                let prefix = base.join("/");
                return try_python_candidates(&prefix, &rel_path, &known);
            }
            // Absolute: from the repository root, then relative to the importer.
            try_python_candidates("", &rel_path, &known)
                .or_else(|| try_python_candidates(&importer_dir, &rel_path, &known))
                .or_else(|| suffix_match(&rel_path, known_files))
        }
        Language::Rust => {
            let trimmed = module
                .trim_start_matches("crate::")
                .trim_start_matches("self::")
                .trim_start_matches("super::");
            suffix_match(&trimmed.replace("::", "/"), known_files)
        }
        Language::Go | Language::Java => {
            suffix_match(&module.replace('.', "/"), known_files)
        }
    }
}

fn try_python_candidates(prefix: &str, rel_path: &str, known: &HashSet<&str>) -> Option<String> {
    let joined = if prefix.is_empty() {
        rel_path.to_string()
    } else if rel_path.is_empty() {
        prefix.to_string()
    } else {
        format!("{prefix}/{rel_path}")
    };
    for candidate in [format!("{joined}.py"), format!("{joined}/__init__.py")] {
        let candidate = normalize_path(&candidate);
        if known.contains(candidate.as_str()) {
            return Some(candidate);
        }
    }
    None
}

/// Match a `/`-separated module path against the tail of known file paths,
/// ignoring extensions and `index`/`mod`/`__init__` leaf files. Only an
/// unambiguous match resolves.
fn suffix_match(module_path: &str, known_files: &[String]) -> Option<String> {
    if module_path.is_empty() {
        return None;
    }
    let mut matches: Vec<&String> = Vec::new();
    for file in known_files {
        let stem = file.rsplit_once('.').map_or(file.as_str(), |(s, _)| s);
        let stem = stem
            .trim_end_matches("/__init__")
            .trim_end_matches("/index")
            .trim_end_matches("/mod");
        if stem == module_path || stem.ends_with(&format!("/{module_path}")) {
            matches.push(file);
        }
    }
    match matches.as_slice() {
        [only] => Some((*only).clone()),
        _ => None,
    }
}

/// Collapse `.` and `..` segments in a POSIX path.
fn normalize_path(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }
    segments.join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_collapses_dots() {
        assert_eq!(normalize_path("src/./a/../b"), "src/b");
        assert_eq!(normalize_path("./x"), "x");
    }

    #[test]
    fn relative_ts_import_tries_extension_set() {
        let known = vec!["src/utils.ts".to_string(), "src/main.ts".to_string()];
        let resolved = resolve_import("./utils", "src/main.ts", Language::TypeScript, &known);
        assert_eq!(resolved.as_deref(), Some("src/utils.ts"));
    }

    #[test]
    fn relative_ts_import_falls_back_to_index() {
        let known = vec!["src/lib/index.ts".to_string(), "src/main.ts".to_string()];
        let resolved = resolve_import("./lib", "src/main.ts", Language::TypeScript, &known);
        assert_eq!(resolved.as_deref(), Some("src/lib/index.ts"));
    }

    #[test]
    fn python_absolute_and_relative_imports() {
        let known = vec![
            "pkg/loader.py".to_string(),
            "pkg/sub/__init__.py".to_string(),
            "pkg/main.py".to_string(),
        ];
        assert_eq!(
            resolve_import("pkg.loader", "pkg/main.py", Language::Python, &known).as_deref(),
            Some("pkg/loader.py")
        );
        assert_eq!(
            resolve_import(".loader", "pkg/main.py", Language::Python, &known).as_deref(),
            Some("pkg/loader.py")
        );
        assert_eq!(
            resolve_import(".sub", "pkg/main.py", Language::Python, &known).as_deref(),
            Some("pkg/sub/__init__.py")
        );
    }

    #[test]
    fn rust_use_suffix_match() {
        let known = vec!["src/graph/node.rs".to_string(), "src/lib.rs".to_string()];
        assert_eq!(
            resolve_import("crate::graph::node", "src/lib.rs", Language::Rust, &known).as_deref(),
            Some("src/graph/node.rs")
        );
    }

    #[test]
    fn ambiguous_suffix_match_is_rejected() {
        let known = vec!["a/util.py".to_string(), "b/util.py".to_string()];
        assert_eq!(suffix_match("util", &known), None);
    }

    #[test]
    fn external_package_does_not_resolve() {
        let known = vec!["src/main.ts".to_string()];
        assert_eq!(
            resolve_import("react", "src/main.ts", Language::TypeScript, &known),
            None
        );
    }
}
