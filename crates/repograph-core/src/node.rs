//! Graph nodes: high-level functional centroids and low-level code entities.

use crate::feature::SemanticFeature;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Well-known `metadata.extra` key holding the sorted multi-LCA path set of a
/// grounded high-level node.
pub const EXTRA_PATHS_KEY: &str = "paths";

/// The kind of artifact a node is anchored to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Module,
    File,
    Class,
    Function,
    Method,
}

impl EntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Module => "module",
            EntityType::File => "file",
            EntityType::Class => "class",
            EntityType::Function => "function",
            EntityType::Method => "method",
        }
    }
}

/// Source languages the AST surface understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceLanguage {
    TypeScript,
    JavaScript,
    Python,
    Rust,
    Go,
    Java,
}

impl SourceLanguage {
    pub fn name(&self) -> &'static str {
        match self {
            SourceLanguage::TypeScript => "typescript",
            SourceLanguage::JavaScript => "javascript",
            SourceLanguage::Python => "python",
            SourceLanguage::Rust => "rust",
            SourceLanguage::Go => "go",
            SourceLanguage::Java => "java",
        }
    }
}

/// Structural half of a node: where the artifact lives in the repository.
/// Paths are repository-relative with POSIX separators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StructuralMetadata {
    pub entity_type: EntityType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qualified_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<SourceLanguage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_line: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_line: Option<usize>,
    /// Open key/value bag; see [`EXTRA_PATHS_KEY`].
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl StructuralMetadata {
    pub fn new(entity_type: EntityType) -> Self {
        Self {
            entity_type,
            path: None,
            qualified_name: None,
            language: None,
            start_line: None,
            end_line: None,
            extra: BTreeMap::new(),
        }
    }

    pub fn with_path(entity_type: EntityType, path: impl Into<String>) -> Self {
        let mut m = Self::new(entity_type);
        m.path = Some(path.into());
        m
    }

    /// The sorted multi-LCA path set from `extra.paths`, if present.
    pub fn extra_paths(&self) -> Vec<String> {
        self.extra
            .get(EXTRA_PATHS_KEY)
            .and_then(|v| v.as_array())
            .map(|arr| {
                arr.iter()
                    .filter_map(|p| p.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Every path this metadata answers to: `path` plus `extra.paths`.
    pub fn all_paths(&self) -> Vec<String> {
        let mut out = Vec::new();
        if let Some(p) = &self.path {
            out.push(p.clone());
        }
        for p in self.extra_paths() {
            if !out.contains(&p) {
                out.push(p);
            }
        }
        out
    }
}

/// A graph node. `HighLevel` nodes are abstract functional centroids created
/// by reorganization; `LowLevel` nodes are concrete code entities created by
/// the encoder, one per file and one per extracted entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Node {
    #[serde(rename_all = "camelCase")]
    HighLevel {
        id: String,
        feature: SemanticFeature,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        metadata: Option<StructuralMetadata>,
        /// Deprecated: overlaps with `metadata.path` after grounding.
        /// Preserved on round-trip, never written by new code paths.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        directory_path: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    LowLevel {
        id: String,
        feature: SemanticFeature,
        metadata: StructuralMetadata,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        source_code: Option<String>,
    },
}

impl Node {
    pub fn high_level(id: impl Into<String>, feature: SemanticFeature) -> Self {
        Node::HighLevel {
            id: id.into(),
            feature,
            metadata: None,
            directory_path: None,
        }
    }

    pub fn low_level(
        id: impl Into<String>,
        feature: SemanticFeature,
        metadata: StructuralMetadata,
    ) -> Self {
        Node::LowLevel {
            id: id.into(),
            feature,
            metadata,
            source_code: None,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Node::HighLevel { id, .. } | Node::LowLevel { id, .. } => id,
        }
    }

    pub fn feature(&self) -> &SemanticFeature {
        match self {
            Node::HighLevel { feature, .. } | Node::LowLevel { feature, .. } => feature,
        }
    }

    pub fn feature_mut(&mut self) -> &mut SemanticFeature {
        match self {
            Node::HighLevel { feature, .. } | Node::LowLevel { feature, .. } => feature,
        }
    }

    pub fn metadata(&self) -> Option<&StructuralMetadata> {
        match self {
            Node::HighLevel { metadata, .. } => metadata.as_ref(),
            Node::LowLevel { metadata, .. } => Some(metadata),
        }
    }

    pub fn metadata_mut(&mut self) -> Option<&mut StructuralMetadata> {
        match self {
            Node::HighLevel { metadata, .. } => metadata.as_mut(),
            Node::LowLevel { metadata, .. } => Some(metadata),
        }
    }

    pub fn source_code(&self) -> Option<&str> {
        match self {
            Node::HighLevel { .. } => None,
            Node::LowLevel { source_code, .. } => source_code.as_deref(),
        }
    }

    pub fn is_high_level(&self) -> bool {
        matches!(self, Node::HighLevel { .. })
    }

    pub fn is_low_level(&self) -> bool {
        matches!(self, Node::LowLevel { .. })
    }

    /// All paths this node is grounded to (for path-glob search).
    pub fn grounded_paths(&self) -> Vec<String> {
        self.metadata().map(|m| m.all_paths()).unwrap_or_default()
    }
}
