//! ExploreRPG: bounded traversal along selected edge families.

use repograph_core::{EdgeFamily, RpgResult};
use repograph_store::{Direction, Rpg, Traversal, TraversalStrategy, TraverseSpec};

/// Exploration options.
#[derive(Debug, Clone)]
pub struct ExploreOptions {
    pub start: String,
    pub edge_type: EdgeFamily,
    pub direction: Direction,
    pub max_depth: usize,
    pub strategy: TraversalStrategy,
}

impl ExploreOptions {
    pub fn new(start: impl Into<String>) -> Self {
        Self {
            start: start.into(),
            edge_type: EdgeFamily::Both,
            direction: Direction::Out,
            max_depth: 3,
            strategy: TraversalStrategy::Bfs,
        }
    }
}

/// The ExploreRPG tool. Termination is guaranteed by the store's visited
/// set and depth bound; each node is visited once.
pub struct ExploreRpg;

impl ExploreRpg {
    pub fn traverse(rpg: &Rpg, options: &ExploreOptions) -> RpgResult<Traversal> {
        let mut spec = TraverseSpec::new(
            options.start.clone(),
            options.edge_type,
            options.direction,
        )
        .with_max_depth(options.max_depth);
        spec.strategy = options.strategy;
        rpg.traverse(&spec)
    }
}
