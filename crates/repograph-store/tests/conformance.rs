//! Backend conformance: every invariant here must hold for both the
//! native-graph and the relational store.

use repograph_core::{
    DependencyType, Edge, EdgeFamily, EntityType, GraphConfig, Node, SemanticFeature,
    StructuralMetadata,
};
use repograph_store::{
    Direction, EdgeFilter, GraphStore, MemoryStore, NodeFilter, NodePatch, SqliteStore,
    TraverseSpec,
};

fn backends() -> Vec<(&'static str, Box<dyn GraphStore>)> {
    vec![
        ("memory", Box::new(MemoryStore::new()) as Box<dyn GraphStore>),
        (
            "sqlite",
            Box::new(SqliteStore::open_in_memory().unwrap()) as Box<dyn GraphStore>,
        ),
    ]
}

fn file_node(id: &str, path: &str, description: &str) -> Node {
    Node::low_level(
        id,
        SemanticFeature::with_keywords(
            description,
            description.split_whitespace().map(String::from).collect(),
        ),
        StructuralMetadata::with_path(EntityType::File, path),
    )
}

fn high_node(id: &str, description: &str) -> Node {
    Node::high_level(id, SemanticFeature::new(description))
}

/// A small two-area hierarchy with one dependency edge:
///
///   domain:Data -> a -> (dep import) b <- domain:Auth
fn seed(store: &mut dyn GraphStore) {
    store.add_node(high_node("domain:Data", "process data")).unwrap();
    store.add_node(high_node("domain:Auth", "validate credentials")).unwrap();
    store.add_node(file_node("a", "src/data/a.ts", "load records")).unwrap();
    store.add_node(file_node("b", "src/auth/b.ts", "check tokens")).unwrap();
    store.add_edge(Edge::functional("domain:Data", "a")).unwrap();
    store.add_edge(Edge::functional("domain:Auth", "b")).unwrap();
    store
        .add_edge(Edge::dependency("a", "b", DependencyType::Import))
        .unwrap();
}

#[test]
fn insert_then_get_returns_same_id() {
    for (name, mut store) in backends() {
        store.add_node(file_node("n1", "src/n1.rs", "emit metrics")).unwrap();
        let node = store.get_node("n1").unwrap();
        assert_eq!(node.id(), "n1", "backend {name}");
    }
}

#[test]
fn removed_node_is_not_found_and_edges_cascade() {
    for (name, mut store) in backends() {
        seed(store.as_mut());
        store.remove_node("b").unwrap();
        assert!(store.get_node("b").is_err(), "backend {name}");
        let remaining = store.edges(&EdgeFilter::default()).unwrap();
        assert!(
            remaining.iter().all(|e| e.source() != "b" && e.target() != "b"),
            "backend {name}: cascade left edges {remaining:?}"
        );
    }
}

#[test]
fn duplicate_edge_insert_keeps_one() {
    for (name, mut store) in backends() {
        seed(store.as_mut());
        let before = store.edge_count();
        let inserted = store
            .add_edge(Edge::dependency("a", "b", DependencyType::Import))
            .unwrap();
        assert!(!inserted, "backend {name}");
        assert_eq!(store.edge_count(), before, "backend {name}");
    }
}

#[test]
fn duplicate_functional_edge_insert_keeps_one() {
    // Functional edges have no dependency type; their identity column must
    // still dedup (the relational backend keys them with a non-NULL
    // sentinel, since a NULL in the primary key would never compare equal).
    for (name, mut store) in backends() {
        seed(store.as_mut());
        let before = store.edge_count();
        let inserted = store
            .add_edge(Edge::functional("domain:Data", "a"))
            .unwrap();
        assert!(!inserted, "backend {name}: functional re-insert must be a no-op");
        assert_eq!(store.edge_count(), before, "backend {name}");
        let functional: Vec<_> = store
            .edges(&EdgeFilter {
                source: Some("domain:Data".into()),
                target: Some("a".into()),
                family: Some(EdgeFamily::Functional),
                ..EdgeFilter::default()
            })
            .unwrap();
        assert_eq!(functional.len(), 1, "backend {name}");
    }
}

#[test]
fn edge_to_missing_endpoint_is_rejected() {
    for (name, mut store) in backends() {
        store.add_node(file_node("a", "a.ts", "load records")).unwrap();
        let err = store
            .add_edge(Edge::dependency("a", "ghost", DependencyType::Call))
            .unwrap_err();
        assert_eq!(err.code(), "validation", "backend {name}");
    }
}

#[test]
fn update_node_merges_feature_and_extra() {
    for (name, mut store) in backends() {
        seed(store.as_mut());
        let mut patch = NodePatch {
            description: Some("load csv records".into()),
            ..NodePatch::default()
        };
        patch
            .extra
            .insert("paths".into(), serde_json::json!(["src/data"]));
        let updated = store.update_node("a", &patch).unwrap();
        assert_eq!(updated.feature().description, "load csv records");
        // Untouched fields survive the merge
        assert!(!updated.feature().keywords.is_empty(), "backend {name}");
        assert_eq!(
            updated.metadata().unwrap().extra_paths(),
            vec!["src/data".to_string()],
            "backend {name}"
        );
        // Scalar metadata replaced atomically, path untouched
        assert_eq!(
            updated.metadata().unwrap().path.as_deref(),
            Some("src/data/a.ts"),
            "backend {name}"
        );
    }
}

#[test]
fn children_and_parent_follow_functional_edges() {
    for (name, mut store) in backends() {
        seed(store.as_mut());
        let children = store.children("domain:Data").unwrap();
        assert_eq!(children.len(), 1, "backend {name}");
        assert_eq!(children[0].id(), "a");
        let parent = store.parent("a").unwrap().unwrap();
        assert_eq!(parent.id(), "domain:Data", "backend {name}");
        assert!(store.parent("domain:Data").unwrap().is_none());
    }
}

#[test]
fn dependencies_and_dependents() {
    for (name, mut store) in backends() {
        seed(store.as_mut());
        let deps: Vec<String> = store
            .dependencies("a")
            .unwrap()
            .iter()
            .map(|n| n.id().to_string())
            .collect();
        assert_eq!(deps, vec!["b".to_string()], "backend {name}");
        let dependents: Vec<String> = store
            .dependents("b")
            .unwrap()
            .iter()
            .map(|n| n.id().to_string())
            .collect();
        assert_eq!(dependents, vec!["a".to_string()], "backend {name}");
    }
}

#[test]
fn traverse_depth_zero_returns_only_start() {
    for (name, mut store) in backends() {
        seed(store.as_mut());
        let spec = TraverseSpec::new("domain:Data", EdgeFamily::Both, Direction::Out)
            .with_max_depth(0);
        let result = store.traverse(&spec).unwrap();
        assert_eq!(result.nodes.len(), 1, "backend {name}");
        assert_eq!(result.nodes[0].id(), "domain:Data");
        assert_eq!(result.max_depth_reached, 0);
    }
}

#[test]
fn traverse_crosses_edge_families_when_asked() {
    for (name, mut store) in backends() {
        seed(store.as_mut());
        let spec =
            TraverseSpec::new("domain:Data", EdgeFamily::Both, Direction::Out).with_max_depth(3);
        let result = store.traverse(&spec).unwrap();
        let ids: Vec<&str> = result.nodes.iter().map(|n| n.id()).collect();
        assert!(ids.contains(&"a"), "backend {name}");
        assert!(ids.contains(&"b"), "backend {name}: {ids:?}");
        assert_eq!(result.max_depth_reached, 2, "backend {name}");
    }
}

#[test]
fn traverse_dependency_only_skips_hierarchy() {
    for (name, mut store) in backends() {
        seed(store.as_mut());
        let spec =
            TraverseSpec::new("a", EdgeFamily::Dependency, Direction::Out).with_max_depth(1);
        let result = store.traverse(&spec).unwrap();
        let ids: Vec<&str> = result.nodes.iter().map(|n| n.id()).collect();
        assert_eq!(ids, vec!["a", "b"], "backend {name}");
        assert_eq!(result.edges.len(), 1);
        assert!(result.edges[0].is_dependency());
    }
}

#[test]
fn search_by_feature_respects_scopes() {
    for (name, mut store) in backends() {
        seed(store.as_mut());
        let all = store.search_by_feature("records tokens", &[]).unwrap();
        assert!(all.len() >= 2, "backend {name}");

        let scoped = store
            .search_by_feature("records tokens", &["domain:Auth".to_string()])
            .unwrap();
        assert!(
            scoped.iter().all(|s| s.node.id() == "b" || s.node.id() == "domain:Auth"),
            "backend {name}: {:?}",
            scoped.iter().map(|s| s.node.id().to_string()).collect::<Vec<_>>()
        );
    }
}

#[test]
fn empty_feature_query_returns_empty() {
    for (name, mut store) in backends() {
        seed(store.as_mut());
        assert!(
            store.search_by_feature("", &[]).unwrap().is_empty(),
            "backend {name}"
        );
    }
}

#[test]
fn search_by_path_matches_metadata_and_extra_paths() {
    for (name, mut store) in backends() {
        seed(store.as_mut());
        let mut patch = NodePatch {
            path: Some("src/utils".into()),
            entity_type: Some(EntityType::Module),
            ..NodePatch::default()
        };
        patch.extra.insert(
            "paths".into(),
            serde_json::json!(["src/utils", "tests/utils"]),
        );
        store.update_node("domain:Data", &patch).unwrap();

        let hits = store.search_by_path("tests/utils*").unwrap();
        let ids: Vec<&str> = hits.iter().map(|n| n.id()).collect();
        assert_eq!(ids, vec!["domain:Data"], "backend {name}");

        let single_star = store.search_by_path("src/*/a.ts").unwrap();
        assert_eq!(single_star.len(), 1, "backend {name}");
        // `*` must not cross segments
        assert!(store.search_by_path("src/*.ts").unwrap().is_empty());
        assert_eq!(store.search_by_path("src/**").unwrap().len(), 3, "backend {name}");
    }
}

#[test]
fn topological_order_puts_sources_before_dependencies() {
    for (name, mut store) in backends() {
        seed(store.as_mut());
        let order = store.topological_order().unwrap();
        let pos_a = order.iter().position(|id| id == "a").unwrap();
        let pos_b = order.iter().position(|id| id == "b").unwrap();
        assert!(pos_a < pos_b, "backend {name}: {order:?}");
    }
}

#[test]
fn document_round_trip_is_structurally_equal() {
    for (name, mut store) in backends() {
        seed(store.as_mut());
        let config = GraphConfig {
            name: "conformance".into(),
            root_path: None,
            description: None,
        };
        let doc = store.export_document(config).unwrap();
        let json = repograph_core::schema::to_json(&doc).unwrap();
        let parsed = repograph_core::schema::from_json(&json).unwrap();

        let mut fresh: Box<dyn GraphStore> = if name == "memory" {
            Box::new(MemoryStore::new())
        } else {
            Box::new(SqliteStore::open_in_memory().unwrap())
        };
        fresh.import_document(&parsed).unwrap();
        let doc2 = fresh
            .export_document(parsed.config.clone())
            .unwrap();
        assert_eq!(doc.nodes, doc2.nodes, "backend {name}");
        assert_eq!(doc.edges, doc2.edges, "backend {name}");
    }
}

#[test]
fn low_level_nodes_always_have_a_path() {
    for (name, mut store) in backends() {
        seed(store.as_mut());
        for node in store
            .nodes(&NodeFilter {
                high_level: Some(false),
                ..NodeFilter::default()
            })
            .unwrap()
        {
            let path = node.metadata().and_then(|m| m.path.clone());
            assert!(path.is_some_and(|p| !p.is_empty()), "backend {name}");
        }
    }
}
