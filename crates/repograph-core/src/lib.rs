//! Core types for the Repository Planning Graph (RPG).
//!
//! Provides the dual-view data model (high-level functional centroids and
//! low-level code entities over a shared node set), the two edge families,
//! the error taxonomy, engine configuration, trie-based LCA directory
//! grounding, and the canonical JSON schema.

pub mod config;
pub mod edge;
pub mod error;
pub mod feature;
pub mod lca;
pub mod node;
pub mod schema;

pub use edge::{DependencyType, Edge, EdgeFamily, EdgeKey, EdgeKind};
pub use error::{RpgError, RpgResult};
pub use feature::SemanticFeature;
pub use node::{EntityType, Node, SourceLanguage, StructuralMetadata, EXTRA_PATHS_KEY};
pub use schema::{GraphConfig, RpgDocument, SCHEMA_VERSION};
