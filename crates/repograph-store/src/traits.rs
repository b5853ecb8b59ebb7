//! The [`GraphStore`] trait defining the storage contract for RPG graphs.
//!
//! Two-layer API design:
//! - **Primitive CRUD** methods form the trait foundation: node and edge
//!   lifecycle, indexed lookups, one-hop neighborhood queries.
//! - **Derived operations** (deep traversal, scope closure, topological
//!   order, document export/import) ship as provided methods built on the
//!   primitives; backends may override them with native machinery (the
//!   relational backend uses recursive CTEs for subtree closure).
//!
//! All backends implement this trait and must pass the shared conformance
//! suite, ensuring they are fully swappable without changing pipeline code.

use repograph_core::{
    DependencyType, Edge, EdgeFamily, EdgeKey, EntityType, Node, RpgDocument, RpgError, RpgResult,
    SourceLanguage, StructuralMetadata,
};
use std::collections::{BTreeMap, HashSet, VecDeque};

/// Node selection predicate. Every field is conjunctive; `None` matches all.
#[derive(Debug, Clone, Default)]
pub struct NodeFilter {
    /// `Some(true)` selects high-level nodes only, `Some(false)` low-level.
    pub high_level: Option<bool>,
    pub entity_type: Option<EntityType>,
    pub language: Option<SourceLanguage>,
    /// Matches nodes whose `metadata.path` starts with this prefix.
    pub path_prefix: Option<String>,
}

impl NodeFilter {
    pub fn matches(&self, node: &Node) -> bool {
        if let Some(high) = self.high_level
            && node.is_high_level() != high
        {
            return false;
        }
        let meta = node.metadata();
        if let Some(entity_type) = self.entity_type
            && meta.map(|m| m.entity_type) != Some(entity_type)
        {
            return false;
        }
        if let Some(language) = self.language
            && meta.and_then(|m| m.language) != Some(language)
        {
            return false;
        }
        if let Some(prefix) = &self.path_prefix {
            let matched = meta
                .and_then(|m| m.path.as_deref())
                .is_some_and(|p| p.starts_with(prefix.as_str()));
            if !matched {
                return false;
            }
        }
        true
    }
}

/// Edge selection predicate.
#[derive(Debug, Clone, Default)]
pub struct EdgeFilter {
    pub source: Option<String>,
    pub target: Option<String>,
    pub family: Option<EdgeFamily>,
    pub dependency_type: Option<DependencyType>,
}

impl EdgeFilter {
    pub fn matches(&self, edge: &Edge) -> bool {
        if let Some(source) = &self.source
            && edge.source() != source
        {
            return false;
        }
        if let Some(target) = &self.target
            && edge.target() != target
        {
            return false;
        }
        if let Some(family) = self.family
            && !edge.in_family(family)
        {
            return false;
        }
        if let Some(dep) = self.dependency_type {
            match edge {
                Edge::Dependency {
                    dependency_type, ..
                } => {
                    if *dependency_type != dep {
                        return false;
                    }
                }
                Edge::Functional { .. } => return false,
            }
        }
        true
    }
}

/// Partial node update. `feature` fields and `metadata.extra` keys are
/// merged; scalar metadata fields are replaced atomically when present.
#[derive(Debug, Clone, Default)]
pub struct NodePatch {
    pub description: Option<String>,
    pub keywords: Option<Vec<String>>,
    pub sub_features: Option<Vec<String>>,
    pub entity_type: Option<EntityType>,
    pub path: Option<String>,
    pub qualified_name: Option<String>,
    pub language: Option<SourceLanguage>,
    pub start_line: Option<usize>,
    pub end_line: Option<usize>,
    /// Merged key-by-key into `metadata.extra`.
    pub extra: BTreeMap<String, serde_json::Value>,
    pub source_code: Option<String>,
}

impl NodePatch {
    pub fn feature(feature: &repograph_core::SemanticFeature) -> Self {
        Self {
            description: Some(feature.description.clone()),
            keywords: Some(feature.keywords.clone()),
            sub_features: Some(feature.sub_features.clone()),
            ..Self::default()
        }
    }

    /// Apply this patch to a node in place.
    pub fn apply(&self, node: &mut Node) {
        {
            let feature = node.feature_mut();
            if let Some(d) = &self.description {
                feature.description = d.clone();
            }
            if let Some(k) = &self.keywords {
                feature.keywords = k.clone();
            }
            if let Some(s) = &self.sub_features {
                feature.sub_features = s.clone();
            }
        }

        let touches_metadata = self.entity_type.is_some()
            || self.path.is_some()
            || self.qualified_name.is_some()
            || self.language.is_some()
            || self.start_line.is_some()
            || self.end_line.is_some()
            || !self.extra.is_empty();

        if touches_metadata {
            // A high-level node gains metadata on first grounding.
            if let Node::HighLevel { metadata, .. } = node
                && metadata.is_none()
            {
                *metadata = Some(StructuralMetadata::new(
                    self.entity_type.unwrap_or(EntityType::Module),
                ));
            }
            if let Some(meta) = node.metadata_mut() {
                if let Some(t) = self.entity_type {
                    meta.entity_type = t;
                }
                if let Some(p) = &self.path {
                    meta.path = Some(p.clone());
                }
                if let Some(q) = &self.qualified_name {
                    meta.qualified_name = Some(q.clone());
                }
                if let Some(l) = self.language {
                    meta.language = Some(l);
                }
                if let Some(s) = self.start_line {
                    meta.start_line = Some(s);
                }
                if let Some(e) = self.end_line {
                    meta.end_line = Some(e);
                }
                for (key, value) in &self.extra {
                    meta.extra.insert(key.clone(), value.clone());
                }
            }
        }

        if let Some(code) = &self.source_code
            && let Node::LowLevel { source_code, .. } = node
        {
            *source_code = Some(code.clone());
        }
    }
}

/// Traversal direction relative to edge orientation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Out,
    In,
    Both,
}

/// Visit order for deep traversal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TraversalStrategy {
    #[default]
    Bfs,
    Dfs,
}

/// Bounded multi-edge traversal request.
#[derive(Debug, Clone)]
pub struct TraverseSpec {
    pub start: String,
    pub family: EdgeFamily,
    pub direction: Direction,
    pub max_depth: usize,
    pub strategy: TraversalStrategy,
    /// Restrict visited neighbors to these entity types.
    pub entity_types: Option<Vec<EntityType>>,
}

impl TraverseSpec {
    pub fn new(start: impl Into<String>, family: EdgeFamily, direction: Direction) -> Self {
        Self {
            start: start.into(),
            family,
            direction,
            max_depth: usize::MAX,
            strategy: TraversalStrategy::Bfs,
            entity_types: None,
        }
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }
}

/// Traversal result: nodes and edges in visit order, each node once.
#[derive(Debug, Clone, Default)]
pub struct Traversal {
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
    pub max_depth_reached: usize,
}

/// A feature-search hit.
#[derive(Debug, Clone)]
pub struct ScoredNode {
    pub node: Node,
    pub score: f64,
}

/// The storage contract. Each public write operation is its own transaction
/// unit; readers observe a consistent snapshot during traversal-producing
/// operations.
pub trait GraphStore: Send {
    /// Insert or replace a node. Idempotent with respect to the node id.
    fn add_node(&mut self, node: Node) -> RpgResult<()>;

    fn get_node(&self, id: &str) -> RpgResult<Node>;

    fn has_node(&self, id: &str) -> bool;

    /// Merge a partial update into a node and return the updated node.
    fn update_node(&mut self, id: &str, patch: &NodePatch) -> RpgResult<Node>;

    /// Remove a node, cascading all incident edges.
    fn remove_node(&mut self, id: &str) -> RpgResult<()>;

    fn nodes(&self, filter: &NodeFilter) -> RpgResult<Vec<Node>>;

    fn node_count(&self) -> usize;

    /// Insert an edge. Returns `false` without effect when an edge with the
    /// same `(source, target, kind)` identity already exists. Fails with
    /// `Validation` when either endpoint is missing.
    fn add_edge(&mut self, edge: Edge) -> RpgResult<bool>;

    fn remove_edge(&mut self, key: &EdgeKey) -> RpgResult<()>;

    fn edges(&self, filter: &EdgeFilter) -> RpgResult<Vec<Edge>>;

    fn edge_count(&self) -> usize;

    fn out_edges(&self, id: &str, family: EdgeFamily) -> RpgResult<Vec<Edge>>;

    fn in_edges(&self, id: &str, family: EdgeFamily) -> RpgResult<Vec<Edge>>;

    /// Rank nodes whose semantic feature matches the free-text query.
    /// `scopes` restricts candidates to the union of functional subtrees
    /// rooted at the given ids.
    fn search_by_feature(&self, query: &str, scopes: &[String]) -> RpgResult<Vec<ScoredNode>>;

    /// Remove every node and edge.
    fn clear(&mut self) -> RpgResult<()>;

    // -----------------------------------------------------------------
    // Derived operations (provided; backends may override with native
    // machinery)
    // -----------------------------------------------------------------

    /// Functional children of a node, in insertion order.
    fn children(&self, id: &str) -> RpgResult<Vec<Node>> {
        let edges = self.out_edges(id, EdgeFamily::Functional)?;
        edges
            .iter()
            .map(|e| self.get_node(e.target()))
            .collect()
    }

    /// Functional parent of a node; the hierarchy is a forest, so at most one.
    fn parent(&self, id: &str) -> RpgResult<Option<Node>> {
        let edges = self.in_edges(id, EdgeFamily::Functional)?;
        match edges.first() {
            Some(e) => Ok(Some(self.get_node(e.source())?)),
            None => Ok(None),
        }
    }

    /// Targets of outgoing dependency edges.
    fn dependencies(&self, id: &str) -> RpgResult<Vec<Node>> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for edge in self.out_edges(id, EdgeFamily::Dependency)? {
            if seen.insert(edge.target().to_string()) {
                out.push(self.get_node(edge.target())?);
            }
        }
        Ok(out)
    }

    /// Sources of incoming dependency edges.
    fn dependents(&self, id: &str) -> RpgResult<Vec<Node>> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for edge in self.in_edges(id, EdgeFamily::Dependency)? {
            if seen.insert(edge.source().to_string()) {
                out.push(self.get_node(edge.source())?);
            }
        }
        Ok(out)
    }

    /// All node ids in the functional subtree rooted at `root`, including
    /// the root itself. The relational backend overrides this with a
    /// recursive CTE.
    fn subtree_ids(&self, root: &str) -> RpgResult<Vec<String>> {
        if !self.has_node(root) {
            return Ok(Vec::new());
        }
        let mut visited = HashSet::new();
        let mut order = Vec::new();
        let mut queue = VecDeque::new();
        visited.insert(root.to_string());
        queue.push_back(root.to_string());
        while let Some(id) = queue.pop_front() {
            order.push(id.clone());
            for edge in self.out_edges(&id, EdgeFamily::Functional)? {
                let target = edge.target().to_string();
                if visited.insert(target.clone()) {
                    queue.push_back(target);
                }
            }
        }
        Ok(order)
    }

    /// Bounded traversal over the selected edge family and direction.
    /// Guaranteed to terminate: visited set plus depth bound. `max_depth`
    /// of zero returns only the start node.
    fn traverse(&self, spec: &TraverseSpec) -> RpgResult<Traversal> {
        let start = self.get_node(&spec.start)?;
        let mut result = Traversal {
            nodes: vec![start],
            edges: Vec::new(),
            max_depth_reached: 0,
        };
        let mut visited: HashSet<String> = HashSet::new();
        visited.insert(spec.start.clone());

        // Frontier holds (id, depth); BFS pops front, DFS pops back.
        let mut frontier: VecDeque<(String, usize)> = VecDeque::new();
        frontier.push_back((spec.start.clone(), 0));

        while let Some((id, depth)) = match spec.strategy {
            TraversalStrategy::Bfs => frontier.pop_front(),
            TraversalStrategy::Dfs => frontier.pop_back(),
        } {
            if depth >= spec.max_depth {
                continue;
            }
            let mut hops: Vec<(Edge, String)> = Vec::new();
            if matches!(spec.direction, Direction::Out | Direction::Both) {
                for edge in self.out_edges(&id, spec.family)? {
                    let neighbor = edge.target().to_string();
                    hops.push((edge, neighbor));
                }
            }
            if matches!(spec.direction, Direction::In | Direction::Both) {
                for edge in self.in_edges(&id, spec.family)? {
                    let neighbor = edge.source().to_string();
                    hops.push((edge, neighbor));
                }
            }
            for (edge, neighbor) in hops {
                if visited.contains(&neighbor) {
                    continue;
                }
                let node = self.get_node(&neighbor)?;
                if let Some(kinds) = &spec.entity_types {
                    let keep = node
                        .metadata()
                        .is_some_and(|m| kinds.contains(&m.entity_type));
                    if !keep {
                        continue;
                    }
                }
                visited.insert(neighbor.clone());
                result.edges.push(edge);
                result.nodes.push(node);
                result.max_depth_reached = result.max_depth_reached.max(depth + 1);
                frontier.push_back((neighbor, depth + 1));
            }
        }
        Ok(result)
    }

    /// Nodes whose `metadata.path` or any `metadata.extra.paths` entry
    /// matches the glob. `*` matches a single path segment, `**` any number.
    fn search_by_path(&self, glob: &str) -> RpgResult<Vec<Node>> {
        let matcher = compile_path_glob(glob)?;
        let mut out = Vec::new();
        for node in self.nodes(&NodeFilter::default())? {
            if node
                .grounded_paths()
                .iter()
                .any(|p| matcher.is_match(p.as_str()))
            {
                out.push(node);
            }
        }
        Ok(out)
    }

    /// Post-order walk over dependency edges, yielding sources before the
    /// nodes they depend on. Cycle-safe via visited marking.
    fn topological_order(&self) -> RpgResult<Vec<String>> {
        let mut ids: Vec<String> = self
            .nodes(&NodeFilter::default())?
            .iter()
            .map(|n| n.id().to_string())
            .collect();
        ids.sort();

        let mut post = Vec::new();
        let mut visited: HashSet<String> = HashSet::new();
        for id in &ids {
            self.topo_visit(id, &mut visited, &mut post)?;
        }
        post.reverse();
        Ok(post)
    }

    #[doc(hidden)]
    fn topo_visit(
        &self,
        id: &str,
        visited: &mut HashSet<String>,
        post: &mut Vec<String>,
    ) -> RpgResult<()> {
        if !visited.insert(id.to_string()) {
            return Ok(());
        }
        let mut targets: Vec<String> = self
            .out_edges(id, EdgeFamily::Dependency)?
            .iter()
            .map(|e| e.target().to_string())
            .collect();
        targets.sort();
        targets.dedup();
        for target in targets {
            self.topo_visit(&target, visited, post)?;
        }
        post.push(id.to_string());
        Ok(())
    }

    /// Export the full graph as a canonical document.
    fn export_document(
        &self,
        config: repograph_core::GraphConfig,
    ) -> RpgResult<RpgDocument> {
        let mut doc = RpgDocument::new(config);
        doc.nodes = self.nodes(&NodeFilter::default())?;
        doc.nodes.sort_by(|a, b| a.id().cmp(b.id()));
        doc.edges = self.edges(&EdgeFilter::default())?;
        doc.edges.sort_by_key(|e| e.sort_key());
        Ok(doc)
    }

    /// Replace the store contents with a document's nodes and edges.
    fn import_document(&mut self, doc: &RpgDocument) -> RpgResult<()> {
        repograph_core::schema::validate_version(doc)?;
        self.clear()?;
        for node in &doc.nodes {
            self.add_node(node.clone())?;
        }
        for edge in &doc.edges {
            self.add_edge(edge.clone())?;
        }
        Ok(())
    }
}

/// Compile a path glob where `*` never crosses a separator and `**` spans
/// any number of segments.
pub fn compile_path_glob(pattern: &str) -> RpgResult<globset::GlobMatcher> {
    globset::GlobBuilder::new(pattern)
        .literal_separator(true)
        .build()
        .map(|g| g.compile_matcher())
        .map_err(|e| RpgError::Validation(format!("invalid path glob {pattern:?}: {e}")))
}

/// Union of functional subtrees for a scope list, preserving first-seen order.
pub fn scope_closure(store: &dyn GraphStore, scopes: &[String]) -> RpgResult<Vec<String>> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for scope in scopes {
        for id in store.subtree_ids(scope)? {
            if seen.insert(id.clone()) {
                out.push(id);
            }
        }
    }
    Ok(out)
}
