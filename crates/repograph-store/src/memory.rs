//! Native-graph backend: an in-memory petgraph store.
//!
//! Ephemeral (no files on disk), which also makes it the test backend.
//! Feature search uses a built-in field-weighted scorer whose weights match
//! the relational backend's BM25 column weights, with a Jaro-Winkler credit
//! for near-miss tokens and a phrase boost on the description.

use crate::traits::{
    EdgeFilter, GraphStore, NodeFilter, NodePatch, ScoredNode,
};
use petgraph::stable_graph::{NodeIndex, StableDiGraph};
use petgraph::visit::EdgeRef;
use petgraph::Direction as PetDirection;
use repograph_core::{Edge, EdgeFamily, EdgeKey, Node, RpgError, RpgResult};
use std::collections::{HashMap, HashSet};

/// In-memory [`GraphStore`] on a stable directed multigraph.
#[derive(Default)]
pub struct MemoryStore {
    graph: StableDiGraph<Node, Edge>,
    ids: HashMap<String, NodeIndex>,
    edge_keys: HashSet<EdgeKey>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn index_of(&self, id: &str) -> RpgResult<NodeIndex> {
        self.ids
            .get(id)
            .copied()
            .ok_or_else(|| RpgError::node_not_found(id))
    }

    fn edges_at(&self, id: &str, direction: PetDirection, family: EdgeFamily) -> RpgResult<Vec<Edge>> {
        let idx = self.index_of(id)?;
        let mut edges: Vec<Edge> = self
            .graph
            .edges_directed(idx, direction)
            .filter(|e| e.weight().in_family(family))
            .map(|e| e.weight().clone())
            .collect();
        // petgraph iterates most-recently-added first; restore insertion order.
        edges.reverse();
        Ok(edges)
    }
}

impl GraphStore for MemoryStore {
    fn add_node(&mut self, node: Node) -> RpgResult<()> {
        let id = node.id().to_string();
        match self.ids.get(&id) {
            Some(&idx) => {
                self.graph[idx] = node;
            }
            None => {
                let idx = self.graph.add_node(node);
                self.ids.insert(id, idx);
            }
        }
        Ok(())
    }

    fn get_node(&self, id: &str) -> RpgResult<Node> {
        Ok(self.graph[self.index_of(id)?].clone())
    }

    fn has_node(&self, id: &str) -> bool {
        self.ids.contains_key(id)
    }

    fn update_node(&mut self, id: &str, patch: &NodePatch) -> RpgResult<Node> {
        let idx = self.index_of(id)?;
        patch.apply(&mut self.graph[idx]);
        Ok(self.graph[idx].clone())
    }

    fn remove_node(&mut self, id: &str) -> RpgResult<()> {
        let idx = self.index_of(id)?;
        // StableDiGraph::remove_node cascades incident edges.
        let incident: Vec<EdgeKey> = self
            .graph
            .edges_directed(idx, PetDirection::Outgoing)
            .chain(self.graph.edges_directed(idx, PetDirection::Incoming))
            .map(|e| e.weight().key())
            .collect();
        for key in incident {
            self.edge_keys.remove(&key);
        }
        self.graph.remove_node(idx);
        self.ids.remove(id);
        Ok(())
    }

    fn nodes(&self, filter: &NodeFilter) -> RpgResult<Vec<Node>> {
        let mut out: Vec<Node> = self
            .graph
            .node_weights()
            .filter(|n| filter.matches(n))
            .cloned()
            .collect();
        out.sort_by(|a, b| a.id().cmp(b.id()));
        Ok(out)
    }

    fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    fn add_edge(&mut self, edge: Edge) -> RpgResult<bool> {
        let key = edge.key();
        if self.edge_keys.contains(&key) {
            return Ok(false);
        }
        let source = self.ids.get(edge.source()).copied().ok_or_else(|| {
            RpgError::Validation(format!("edge source {} does not exist", edge.source()))
        })?;
        let target = self.ids.get(edge.target()).copied().ok_or_else(|| {
            RpgError::Validation(format!("edge target {} does not exist", edge.target()))
        })?;
        self.graph.add_edge(source, target, edge);
        self.edge_keys.insert(key);
        Ok(true)
    }

    fn remove_edge(&mut self, key: &EdgeKey) -> RpgResult<()> {
        if !self.edge_keys.remove(key) {
            return Err(RpgError::NotFound(format!(
                "edge {} -> {}",
                key.source, key.target
            )));
        }
        let source = self.index_of(&key.source)?;
        let edge_idx = self
            .graph
            .edges_directed(source, PetDirection::Outgoing)
            .find(|e| e.weight().key() == *key)
            .map(|e| e.id());
        if let Some(idx) = edge_idx {
            self.graph.remove_edge(idx);
        }
        Ok(())
    }

    fn edges(&self, filter: &EdgeFilter) -> RpgResult<Vec<Edge>> {
        let mut out: Vec<Edge> = self
            .graph
            .edge_weights()
            .filter(|e| filter.matches(e))
            .cloned()
            .collect();
        out.sort_by_key(|e| e.sort_key());
        Ok(out)
    }

    fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    fn out_edges(&self, id: &str, family: EdgeFamily) -> RpgResult<Vec<Edge>> {
        self.edges_at(id, PetDirection::Outgoing, family)
    }

    fn in_edges(&self, id: &str, family: EdgeFamily) -> RpgResult<Vec<Edge>> {
        self.edges_at(id, PetDirection::Incoming, family)
    }

    fn search_by_feature(&self, query: &str, scopes: &[String]) -> RpgResult<Vec<ScoredNode>> {
        let query = query.trim().to_lowercase();
        if query.is_empty() {
            return Ok(Vec::new());
        }
        let terms: Vec<&str> = query.split_whitespace().collect();

        let candidates: Vec<&Node> = if scopes.is_empty() {
            self.graph.node_weights().collect()
        } else {
            let closure: HashSet<String> =
                crate::traits::scope_closure(self, scopes)?.into_iter().collect();
            self.graph
                .node_weights()
                .filter(|n| closure.contains(n.id()))
                .collect()
        };

        let index = FeatureIndex::build(&candidates);
        let mut results: Vec<ScoredNode> = Vec::new();
        for node in candidates {
            let score = index.score(node, &query, &terms);
            if score > 0.0 {
                results.push(ScoredNode {
                    node: node.clone(),
                    score,
                });
            }
        }
        results.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.node.id().cmp(b.node.id()))
        });
        Ok(results)
    }

    fn clear(&mut self) -> RpgResult<()> {
        self.graph.clear();
        self.ids.clear();
        self.edge_keys.clear();
        Ok(())
    }
}

// Per-field weights chosen to match the relational backend's BM25 column
// weights (description 3.0, keywords 2.0, sub-features 1.0), so the two
// backends rank comparably and the conformance suite can treat them as
// interchangeable.
const DESCRIPTION_WEIGHT: f64 = 3.0;
const KEYWORD_WEIGHT: f64 = 2.0;
const SUB_FEATURE_WEIGHT: f64 = 1.0;
/// A near-miss (typo-distance) hit earns a fraction of an exact hit.
const NEAR_MISS_CREDIT: f64 = 0.4;
/// Jaro-Winkler floor for counting a token as a near-miss.
const NEAR_MISS_SIMILARITY: f64 = 0.92;
/// Multiplier when the whole query appears verbatim in the description.
const PHRASE_BOOST: f64 = 1.25;

/// Token sets of one node's feature, split by field so hits can be weighted
/// the way the FTS5 backend weights its columns.
struct FieldTokens {
    description: HashSet<String>,
    keywords: HashSet<String>,
    sub_features: HashSet<String>,
}

impl FieldTokens {
    fn of(node: &Node) -> Self {
        let feature = node.feature();
        let tokenize = |text: &str| {
            text.split_whitespace()
                .map(|t| t.to_lowercase())
                .collect::<HashSet<String>>()
        };
        let mut keywords = HashSet::new();
        for kw in &feature.keywords {
            keywords.extend(tokenize(kw));
        }
        let mut sub_features = HashSet::new();
        for sub in &feature.sub_features {
            sub_features.extend(tokenize(sub));
        }
        Self {
            description: tokenize(&feature.description),
            keywords,
            sub_features,
        }
    }

    /// Heaviest field containing the term exactly.
    fn exact_weight(&self, term: &str) -> Option<f64> {
        if self.description.contains(term) {
            Some(DESCRIPTION_WEIGHT)
        } else if self.keywords.contains(term) {
            Some(KEYWORD_WEIGHT)
        } else if self.sub_features.contains(term) {
            Some(SUB_FEATURE_WEIGHT)
        } else {
            None
        }
    }

    fn all_tokens(&self) -> impl Iterator<Item = &String> {
        self.description
            .iter()
            .chain(self.keywords.iter())
            .chain(self.sub_features.iter())
    }
}

/// Lightweight ranking index over the candidate pool: document frequencies
/// for a BM25-style rarity term, plus per-node field tokens.
struct FeatureIndex {
    document_count: usize,
    document_frequency: HashMap<String, usize>,
}

impl FeatureIndex {
    fn build(candidates: &[&Node]) -> Self {
        let mut document_frequency: HashMap<String, usize> = HashMap::new();
        for node in candidates {
            let fields = FieldTokens::of(node);
            let unique: HashSet<&String> = fields.all_tokens().collect();
            for token in unique {
                *document_frequency.entry(token.clone()).or_insert(0) += 1;
            }
        }
        Self {
            document_count: candidates.len(),
            document_frequency,
        }
    }

    /// BM25 rarity component; strictly positive, higher for rarer tokens.
    fn rarity(&self, term: &str) -> f64 {
        let n = self.document_count as f64;
        let df = self
            .document_frequency
            .get(term)
            .copied()
            .unwrap_or(0) as f64;
        (1.0 + (n - df + 0.5) / (df + 0.5)).ln()
    }

    /// Score one node: each query term contributes rarity × field weight for
    /// an exact hit, or a reduced credit for a Jaro-Winkler near-miss.
    /// A verbatim phrase hit in the description boosts the whole score.
    fn score(&self, node: &Node, query: &str, terms: &[&str]) -> f64 {
        let fields = FieldTokens::of(node);
        let mut score = 0.0;
        for term in terms {
            if let Some(weight) = fields.exact_weight(term) {
                score += self.rarity(term) * weight;
                continue;
            }
            let near_miss = fields
                .all_tokens()
                .any(|token| strsim::jaro_winkler(term, token) >= NEAR_MISS_SIMILARITY);
            if near_miss {
                score += self.rarity(term) * DESCRIPTION_WEIGHT * NEAR_MISS_CREDIT;
            }
        }
        if score > 0.0 && node.feature().description.to_lowercase().contains(query) {
            score *= PHRASE_BOOST;
        }
        score
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use repograph_core::{DependencyType, EntityType, SemanticFeature, StructuralMetadata};

    fn file_node(id: &str, path: &str, description: &str) -> Node {
        Node::low_level(
            id,
            SemanticFeature::new(description),
            StructuralMetadata::with_path(EntityType::File, path),
        )
    }

    #[test]
    fn removing_a_node_cascades_edges() {
        let mut store = MemoryStore::new();
        store.add_node(file_node("a", "src/a.ts", "load data")).unwrap();
        store.add_node(file_node("b", "src/b.ts", "save data")).unwrap();
        store
            .add_edge(Edge::dependency("a", "b", DependencyType::Import))
            .unwrap();
        store.remove_node("b").unwrap();
        assert_eq!(store.edge_count(), 0);
        assert!(matches!(store.get_node("b"), Err(RpgError::NotFound(_))));
    }

    #[test]
    fn duplicate_edge_is_a_noop() {
        let mut store = MemoryStore::new();
        store.add_node(file_node("a", "src/a.ts", "load data")).unwrap();
        store.add_node(file_node("b", "src/b.ts", "save data")).unwrap();
        assert!(store
            .add_edge(Edge::dependency("a", "b", DependencyType::Call))
            .unwrap());
        assert!(!store
            .add_edge(Edge::dependency("a", "b", DependencyType::Call))
            .unwrap());
        assert_eq!(store.edge_count(), 1);
    }

    #[test]
    fn search_scores_matching_descriptions() {
        let mut store = MemoryStore::new();
        store
            .add_node(file_node("a", "src/a.ts", "greet users warmly"))
            .unwrap();
        store
            .add_node(file_node("b", "src/b.ts", "compute checksums"))
            .unwrap();
        let hits = store.search_by_feature("greet users", &[]).unwrap();
        assert_eq!(hits[0].node.id(), "a");
    }

    #[test]
    fn empty_query_returns_nothing() {
        let store = MemoryStore::new();
        assert!(store.search_by_feature("", &[]).unwrap().is_empty());
    }
}
