//! Query tools over the Repository Planning Graph.
//!
//! Three tool surfaces: [`SearchNode`] (feature/snippet/auto search with
//! staged fallback), [`FetchNode`] (node + source + ancestry), and
//! [`ExploreRpg`] (bounded multi-edge traversal).

pub mod explore;
pub mod fetch;
pub mod search;

pub use explore::{ExploreOptions, ExploreRpg};
pub use fetch::{FetchNode, FetchOutcome, FetchRequest, FetchedNode};
pub use search::{SearchHit, SearchMode, SearchNode, SearchOptions, SearchOutcome};
