//! Typed RPG façade over a [`GraphStore`].
//!
//! Validates variant shape at the boundary (ids, low-level paths, hierarchy
//! forest rules) and delegates storage to the backend. Pipeline code talks to
//! this type, never to a backend directly; all writes serialize through the
//! single owner of the store.

use crate::traits::{
    EdgeFilter, GraphStore, NodeFilter, NodePatch, ScoredNode, Traversal, TraverseSpec,
};
use repograph_core::{
    DependencyType, Edge, EdgeFamily, EdgeKey, GraphConfig, Node, RpgDocument, RpgError,
    RpgResult, SemanticFeature, StructuralMetadata,
};

/// Arguments for [`Rpg::add_high_level_node`].
#[derive(Debug, Clone)]
pub struct HighLevelArgs {
    pub id: String,
    pub feature: SemanticFeature,
    pub metadata: Option<StructuralMetadata>,
}

/// Arguments for [`Rpg::add_low_level_node`].
#[derive(Debug, Clone)]
pub struct LowLevelArgs {
    pub id: String,
    pub feature: SemanticFeature,
    pub metadata: StructuralMetadata,
    pub source_code: Option<String>,
}

/// Arguments for [`Rpg::add_functional_edge`].
#[derive(Debug, Clone)]
pub struct FunctionalEdgeArgs {
    pub source: String,
    pub target: String,
    pub level: Option<u32>,
    pub sibling_order: Option<u32>,
}

/// Arguments for [`Rpg::add_dependency_edge`].
#[derive(Debug, Clone)]
pub struct DependencyEdgeArgs {
    pub source: String,
    pub target: String,
    pub dependency_type: DependencyType,
    pub is_runtime: Option<bool>,
    pub line: Option<usize>,
}

/// The Repository Planning Graph: a typed wrapper owning its store.
pub struct Rpg {
    store: Box<dyn GraphStore>,
    config: GraphConfig,
}

impl Rpg {
    pub fn new(store: Box<dyn GraphStore>, config: GraphConfig) -> Self {
        Self { store, config }
    }

    /// Ephemeral graph for tests and short-lived pipelines.
    pub fn in_memory(config: GraphConfig) -> Self {
        Self::new(Box::new(crate::memory::MemoryStore::new()), config)
    }

    pub fn config(&self) -> &GraphConfig {
        &self.config
    }

    pub fn store(&self) -> &dyn GraphStore {
        self.store.as_ref()
    }

    pub fn store_mut(&mut self) -> &mut dyn GraphStore {
        self.store.as_mut()
    }

    // -----------------------------------------------------------------
    // Typed constructors
    // -----------------------------------------------------------------

    pub fn add_high_level_node(&mut self, args: HighLevelArgs) -> RpgResult<()> {
        validate_id(&args.id)?;
        validate_feature(&args.feature)?;
        if self.store.has_node(&args.id) {
            return Err(RpgError::Validation(format!("duplicate node id {}", args.id)));
        }
        self.store.add_node(Node::HighLevel {
            id: args.id,
            feature: args.feature,
            metadata: args.metadata,
            directory_path: None,
        })
    }

    pub fn add_low_level_node(&mut self, args: LowLevelArgs) -> RpgResult<()> {
        validate_id(&args.id)?;
        validate_feature(&args.feature)?;
        if args.metadata.path.as_deref().unwrap_or("").is_empty() {
            return Err(RpgError::Validation(format!(
                "low-level node {} requires a non-empty metadata path",
                args.id
            )));
        }
        if self.store.has_node(&args.id) {
            return Err(RpgError::Validation(format!("duplicate node id {}", args.id)));
        }
        self.store.add_node(Node::LowLevel {
            id: args.id,
            feature: args.feature,
            metadata: args.metadata,
            source_code: args.source_code,
        })
    }

    /// Create a high-level node unless it already exists.
    pub fn ensure_high_level_node(&mut self, id: &str, feature: SemanticFeature) -> RpgResult<()> {
        if self.store.has_node(id) {
            return Ok(());
        }
        self.add_high_level_node(HighLevelArgs {
            id: id.to_string(),
            feature,
            metadata: None,
        })
    }

    /// Add a hierarchy edge. Enforces the functional forest: the target may
    /// have at most one parent, and the target must not already be an
    /// ancestor of the source.
    pub fn add_functional_edge(&mut self, args: FunctionalEdgeArgs) -> RpgResult<bool> {
        if args.source == args.target {
            return Err(RpgError::Validation(format!(
                "functional self-edge on {}",
                args.source
            )));
        }
        if let Some(existing) = self.store.parent(&args.target)? {
            if existing.id() == args.source {
                return Ok(false);
            }
            return Err(RpgError::Validation(format!(
                "{} already has functional parent {}",
                args.target,
                existing.id()
            )));
        }
        // Reject additions whose ancestor chain contains the target.
        let mut cursor = Some(args.source.clone());
        while let Some(id) = cursor {
            if id == args.target {
                return Err(RpgError::Validation(format!(
                    "functional edge {} -> {} would create a cycle",
                    args.source, args.target
                )));
            }
            cursor = self.store.parent(&id)?.map(|n| n.id().to_string());
        }
        self.store.add_edge(Edge::Functional {
            source: args.source,
            target: args.target,
            level: args.level,
            sibling_order: args.sibling_order,
        })
    }

    pub fn add_dependency_edge(&mut self, args: DependencyEdgeArgs) -> RpgResult<bool> {
        self.store.add_edge(Edge::Dependency {
            source: args.source,
            target: args.target,
            dependency_type: args.dependency_type,
            is_runtime: args.is_runtime,
            line: args.line,
        })
    }

    // -----------------------------------------------------------------
    // Delegated queries
    // -----------------------------------------------------------------

    pub fn get_node(&self, id: &str) -> RpgResult<Node> {
        self.store.get_node(id)
    }

    pub fn has_node(&self, id: &str) -> bool {
        self.store.has_node(id)
    }

    pub fn update_node(&mut self, id: &str, patch: &NodePatch) -> RpgResult<Node> {
        self.store.update_node(id, patch)
    }

    pub fn remove_node(&mut self, id: &str) -> RpgResult<()> {
        self.store.remove_node(id)
    }

    pub fn remove_edge(&mut self, key: &EdgeKey) -> RpgResult<()> {
        self.store.remove_edge(key)
    }

    pub fn nodes(&self, filter: &NodeFilter) -> RpgResult<Vec<Node>> {
        self.store.nodes(filter)
    }

    pub fn edges(&self, filter: &EdgeFilter) -> RpgResult<Vec<Edge>> {
        self.store.edges(filter)
    }

    pub fn children(&self, id: &str) -> RpgResult<Vec<Node>> {
        self.store.children(id)
    }

    pub fn parent(&self, id: &str) -> RpgResult<Option<Node>> {
        self.store.parent(id)
    }

    pub fn traverse(&self, spec: &TraverseSpec) -> RpgResult<Traversal> {
        self.store.traverse(spec)
    }

    pub fn search_by_feature(&self, query: &str, scopes: &[String]) -> RpgResult<Vec<ScoredNode>> {
        self.store.search_by_feature(query, scopes)
    }

    pub fn search_by_path(&self, glob: &str) -> RpgResult<Vec<Node>> {
        self.store.search_by_path(glob)
    }

    /// Nodes with no incoming functional edge (hierarchy roots).
    pub fn roots(&self) -> RpgResult<Vec<Node>> {
        let mut out = Vec::new();
        for node in self.store.nodes(&NodeFilter::default())? {
            if self.store.parent(node.id())?.is_none() {
                out.push(node);
            }
        }
        Ok(out)
    }

    /// Functional ancestor chain from the hierarchy root down to `id`,
    /// inclusive. Cycle-guarded.
    pub fn ancestry(&self, id: &str) -> RpgResult<Vec<Node>> {
        let mut chain = vec![self.store.get_node(id)?];
        let mut seen = std::collections::HashSet::new();
        seen.insert(id.to_string());
        let mut cursor = self.store.parent(id)?;
        while let Some(node) = cursor {
            if !seen.insert(node.id().to_string()) {
                break;
            }
            cursor = self.store.parent(node.id())?;
            chain.push(node);
        }
        chain.reverse();
        Ok(chain)
    }

    pub fn export_document(&self) -> RpgResult<RpgDocument> {
        self.store.export_document(self.config.clone())
    }

    pub fn import_document(&mut self, doc: &RpgDocument) -> RpgResult<()> {
        self.config = doc.config.clone();
        self.store.import_document(doc)
    }

    pub fn node_count(&self) -> usize {
        self.store.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.store.edge_count()
    }
}

/// Variant predicates, exposed without leaking store internals.
pub fn is_high_level(node: &Node) -> bool {
    node.is_high_level()
}

pub fn is_low_level(node: &Node) -> bool {
    node.is_low_level()
}

pub fn is_functional(edge: &Edge) -> bool {
    edge.is_functional()
}

pub fn is_dependency(edge: &Edge) -> bool {
    edge.is_dependency()
}

fn validate_id(id: &str) -> RpgResult<()> {
    if id.trim().is_empty() {
        return Err(RpgError::Validation("node id must be non-empty".into()));
    }
    Ok(())
}

fn validate_feature(feature: &SemanticFeature) -> RpgResult<()> {
    if feature.description.trim().is_empty() {
        return Err(RpgError::Validation(
            "feature description must be non-empty".into(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use repograph_core::EntityType;

    fn rpg() -> Rpg {
        Rpg::in_memory(GraphConfig {
            name: "test".into(),
            root_path: None,
            description: None,
        })
    }

    fn low(id: &str, path: &str) -> LowLevelArgs {
        LowLevelArgs {
            id: id.into(),
            feature: SemanticFeature::new("do something"),
            metadata: StructuralMetadata::with_path(EntityType::File, path),
            source_code: None,
        }
    }

    #[test]
    fn duplicate_id_is_rejected() {
        let mut rpg = rpg();
        rpg.add_low_level_node(low("a", "a.ts")).unwrap();
        let err = rpg.add_low_level_node(low("a", "a.ts")).unwrap_err();
        assert_eq!(err.code(), "validation");
    }

    #[test]
    fn low_level_without_path_is_rejected() {
        let mut rpg = rpg();
        let args = LowLevelArgs {
            id: "a".into(),
            feature: SemanticFeature::new("do something"),
            metadata: StructuralMetadata::new(EntityType::File),
            source_code: None,
        };
        assert!(rpg.add_low_level_node(args).is_err());
    }

    #[test]
    fn functional_forest_is_enforced() {
        let mut rpg = rpg();
        for id in ["a", "b", "c"] {
            rpg.add_high_level_node(HighLevelArgs {
                id: id.into(),
                feature: SemanticFeature::new("organize things"),
                metadata: None,
            })
            .unwrap();
        }
        rpg.add_functional_edge(FunctionalEdgeArgs {
            source: "a".into(),
            target: "b".into(),
            level: None,
            sibling_order: None,
        })
        .unwrap();
        // Second parent for b
        let err = rpg
            .add_functional_edge(FunctionalEdgeArgs {
                source: "c".into(),
                target: "b".into(),
                level: None,
                sibling_order: None,
            })
            .unwrap_err();
        assert_eq!(err.code(), "validation");
        // Cycle: b -> a while a is b's ancestor
        let err = rpg
            .add_functional_edge(FunctionalEdgeArgs {
                source: "b".into(),
                target: "a".into(),
                level: None,
                sibling_order: None,
            })
            .unwrap_err();
        assert_eq!(err.code(), "validation");
    }

    #[test]
    fn re_adding_same_parent_edge_is_idempotent() {
        let mut rpg = rpg();
        rpg.add_high_level_node(HighLevelArgs {
            id: "p".into(),
            feature: SemanticFeature::new("organize things"),
            metadata: None,
        })
        .unwrap();
        rpg.add_low_level_node(low("c", "c.ts")).unwrap();
        let args = FunctionalEdgeArgs {
            source: "p".into(),
            target: "c".into(),
            level: None,
            sibling_order: None,
        };
        assert!(rpg.add_functional_edge(args.clone()).unwrap());
        assert!(!rpg.add_functional_edge(args).unwrap());
        assert_eq!(rpg.edge_count(), 1);
    }

    #[test]
    fn ancestry_runs_root_to_node() {
        let mut rpg = rpg();
        for id in ["root", "mid"] {
            rpg.add_high_level_node(HighLevelArgs {
                id: id.into(),
                feature: SemanticFeature::new("organize things"),
                metadata: None,
            })
            .unwrap();
        }
        rpg.add_low_level_node(low("leaf", "l.ts")).unwrap();
        for (s, t) in [("root", "mid"), ("mid", "leaf")] {
            rpg.add_functional_edge(FunctionalEdgeArgs {
                source: s.into(),
                target: t.into(),
                level: None,
                sibling_order: None,
            })
            .unwrap();
        }
        let chain: Vec<String> = rpg
            .ancestry("leaf")
            .unwrap()
            .iter()
            .map(|n| n.id().to_string())
            .collect();
        assert_eq!(chain, vec!["root", "mid", "leaf"]);
    }
}
