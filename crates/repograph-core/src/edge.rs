//! Graph edges: functional hierarchy and AST-recovered dependencies.

use serde::{Deserialize, Serialize};

/// The relation a dependency edge encodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DependencyType {
    Import,
    Call,
    Inherit,
    Implement,
    Use,
}

impl DependencyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DependencyType::Import => "import",
            DependencyType::Call => "call",
            DependencyType::Inherit => "inherit",
            DependencyType::Implement => "implement",
            DependencyType::Use => "use",
        }
    }
}

/// An edge between two nodes. `Functional` edges form the parent→child
/// hierarchy forest; `Dependency` edges may cross branches freely.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Edge {
    #[serde(rename_all = "camelCase")]
    Functional {
        source: String,
        target: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        level: Option<u32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        sibling_order: Option<u32>,
    },
    #[serde(rename_all = "camelCase")]
    Dependency {
        source: String,
        target: String,
        dependency_type: DependencyType,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        is_runtime: Option<bool>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        line: Option<usize>,
    },
}

/// Discriminates edge kinds for identity and filtering. A dependency edge's
/// kind includes its dependency type, so `import` and `call` edges between
/// the same pair coexist while duplicates of either are rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EdgeKind {
    Functional,
    Dependency(DependencyType),
}

/// The `(source, target, kind)` identity an edge is keyed by.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EdgeKey {
    pub source: String,
    pub target: String,
    pub kind: EdgeKind,
}

/// Coarse edge-family selector used by traversal and filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeFamily {
    Functional,
    Dependency,
    Both,
}

impl Edge {
    pub fn functional(source: impl Into<String>, target: impl Into<String>) -> Self {
        Edge::Functional {
            source: source.into(),
            target: target.into(),
            level: None,
            sibling_order: None,
        }
    }

    pub fn dependency(
        source: impl Into<String>,
        target: impl Into<String>,
        dependency_type: DependencyType,
    ) -> Self {
        Edge::Dependency {
            source: source.into(),
            target: target.into(),
            dependency_type,
            is_runtime: None,
            line: None,
        }
    }

    pub fn source(&self) -> &str {
        match self {
            Edge::Functional { source, .. } | Edge::Dependency { source, .. } => source,
        }
    }

    pub fn target(&self) -> &str {
        match self {
            Edge::Functional { target, .. } | Edge::Dependency { target, .. } => target,
        }
    }

    pub fn kind(&self) -> EdgeKind {
        match self {
            Edge::Functional { .. } => EdgeKind::Functional,
            Edge::Dependency {
                dependency_type, ..
            } => EdgeKind::Dependency(*dependency_type),
        }
    }

    pub fn key(&self) -> EdgeKey {
        EdgeKey {
            source: self.source().to_string(),
            target: self.target().to_string(),
            kind: self.kind(),
        }
    }

    pub fn is_functional(&self) -> bool {
        matches!(self, Edge::Functional { .. })
    }

    pub fn is_dependency(&self) -> bool {
        matches!(self, Edge::Dependency { .. })
    }

    pub fn in_family(&self, family: EdgeFamily) -> bool {
        match family {
            EdgeFamily::Functional => self.is_functional(),
            EdgeFamily::Dependency => self.is_dependency(),
            EdgeFamily::Both => true,
        }
    }

    /// Ordering key for deterministic serialization.
    pub fn sort_key(&self) -> (String, String, u8, u8) {
        let (family, dep) = match self.kind() {
            EdgeKind::Functional => (0u8, 0u8),
            EdgeKind::Dependency(d) => (1u8, d as u8),
        };
        (
            self.source().to_string(),
            self.target().to_string(),
            family,
            dep,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn edge_serializes_with_variant_tag() {
        let e = Edge::dependency("a", "b", DependencyType::Import);
        let json = serde_json::to_value(&e).unwrap();
        assert_eq!(json["type"], "dependency");
        assert_eq!(json["dependencyType"], "import");
    }

    #[test]
    fn identity_distinguishes_dependency_types() {
        let imp = Edge::dependency("a", "b", DependencyType::Import);
        let call = Edge::dependency("a", "b", DependencyType::Call);
        assert_ne!(imp.key(), call.key());
        assert_eq!(imp.key(), Edge::dependency("a", "b", DependencyType::Import).key());
    }

    #[test]
    fn functional_round_trip_keeps_ordinals() {
        let e = Edge::Functional {
            source: "p".into(),
            target: "c".into(),
            level: Some(2),
            sibling_order: Some(1),
        };
        let json = serde_json::to_string(&e).unwrap();
        let back: Edge = serde_json::from_str(&json).unwrap();
        assert_eq!(e, back);
    }
}
