//! Canonical serialized graph format and version handling.
//!
//! Graphs are accepted when their major version matches the current schema;
//! minor/patch differences are handled by `migrate()`.

use crate::edge::Edge;
use crate::error::{RpgError, RpgResult};
use crate::node::Node;
use semver::Version;
use serde::{Deserialize, Serialize};

pub const SCHEMA_VERSION: &str = "1.0.0";

/// Graph-level configuration carried inside the serialized document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphConfig {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// The canonical on-disk form of an RPG: one record with version, config,
/// and flat node/edge sequences.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpgDocument {
    pub version: String,
    pub config: GraphConfig,
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
}

impl RpgDocument {
    pub fn new(config: GraphConfig) -> Self {
        Self {
            version: SCHEMA_VERSION.to_string(),
            config,
            nodes: Vec::new(),
            edges: Vec::new(),
        }
    }
}

/// Accept any document whose major version matches the current schema.
pub fn validate_version(doc: &RpgDocument) -> RpgResult<()> {
    let current = Version::parse(SCHEMA_VERSION)
        .map_err(|e| RpgError::Validation(format!("invalid SCHEMA_VERSION constant: {e}")))?;
    let found = Version::parse(&doc.version)
        .map_err(|e| RpgError::Validation(format!("invalid document version {}: {e}", doc.version)))?;
    if found.major != current.major {
        return Err(RpgError::Validation(format!(
            "schema major version mismatch: requires {}.x.x, found {}",
            current.major, doc.version
        )));
    }
    Ok(())
}

/// Bring a version-compatible document up to the current schema.
pub fn migrate(doc: &mut RpgDocument) -> RpgResult<()> {
    let current = Version::parse(SCHEMA_VERSION)
        .map_err(|e| RpgError::Validation(e.to_string()))?;
    let found = Version::parse(&doc.version).map_err(|e| RpgError::Validation(e.to_string()))?;
    if found < current {
        // Field-level transformations go here when the schema changes.
        doc.version = SCHEMA_VERSION.to_string();
    }
    Ok(())
}

/// Serialize with edges sorted by (source, target, kind) so re-saves produce
/// minimal diffs.
pub fn to_json(doc: &RpgDocument) -> RpgResult<String> {
    let mut doc = doc.clone();
    doc.edges.sort_by_key(|e| e.sort_key());
    serde_json::to_string_pretty(&doc)
        .map_err(|e| RpgError::Store(format!("failed to serialize graph: {e}")))
}

pub fn from_json(json: &str) -> RpgResult<RpgDocument> {
    let mut doc: RpgDocument = serde_json::from_str(json)
        .map_err(|e| RpgError::Validation(format!("failed to deserialize graph: {e}")))?;
    validate_version(&doc)?;
    migrate(&mut doc)?;
    Ok(doc)
}
