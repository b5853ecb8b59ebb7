//! Graph storage for the Repository Planning Graph.
//!
//! Provides the [`GraphStore`] trait defining the storage contract, two
//! first-class backends ([`MemoryStore`] on petgraph, [`SqliteStore`] with
//! FTS5 full-text search and recursive CTEs), and the typed [`Rpg`] façade
//! pipeline code builds against.

pub mod artifact;
pub mod facade;
pub mod memory;
pub mod schema;
pub mod sqlite;
pub mod traits;

pub use facade::{
    is_dependency, is_functional, is_high_level, is_low_level, DependencyEdgeArgs,
    FunctionalEdgeArgs, HighLevelArgs, LowLevelArgs, Rpg,
};
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use traits::{
    compile_path_glob, scope_closure, Direction, EdgeFilter, GraphStore, NodeFilter, NodePatch,
    ScoredNode, Traversal, TraversalStrategy, TraverseSpec,
};

use repograph_core::{RpgError, RpgResult};
use std::path::Path;

/// Open a store by location: `"memory"` yields the ephemeral native-graph
/// backend, any other value is treated as a SQLite database path.
pub fn open_store(location: &str) -> RpgResult<Box<dyn GraphStore>> {
    if location == "memory" {
        return Ok(Box::new(MemoryStore::new()));
    }
    if location.ends_with(".json") {
        return Err(RpgError::Config(format!(
            "{location} is a graph artifact, not a store; import it via the document API"
        )));
    }
    Ok(Box::new(SqliteStore::open(Path::new(location))?))
}
