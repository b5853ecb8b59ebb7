//! Tool-surface scenarios: staged-fallback search, fetch with ancestry,
//! bounded exploration.

use repograph_core::{
    DependencyType, EntityType, GraphConfig, SemanticFeature, StructuralMetadata,
};
use repograph_nav::{
    ExploreOptions, ExploreRpg, FetchNode, FetchRequest, SearchMode, SearchNode, SearchOptions,
};
use repograph_store::{
    DependencyEdgeArgs, Direction, FunctionalEdgeArgs, HighLevelArgs, LowLevelArgs, Rpg,
};

/// domain:Auth -> src/auth.ts:file -> login(); a second unrelated file under
/// domain:Data with an import edge from auth to it.
fn sample_rpg() -> Rpg {
    let mut rpg = Rpg::in_memory(GraphConfig {
        name: "tools".into(),
        root_path: None,
        description: None,
    });

    for (id, description) in [
        ("domain:Auth", "validate user credentials"),
        ("domain:Data", "process stored records"),
    ] {
        rpg.add_high_level_node(HighLevelArgs {
            id: id.into(),
            feature: SemanticFeature::with_keywords(
                description,
                description.split_whitespace().map(String::from).collect(),
            ),
            metadata: None,
        })
        .unwrap();
    }

    let mut file_meta = StructuralMetadata::with_path(EntityType::File, "src/auth.ts");
    file_meta.language = Some(repograph_core::SourceLanguage::TypeScript);
    rpg.add_low_level_node(LowLevelArgs {
        id: "src/auth.ts:file".into(),
        feature: SemanticFeature::with_keywords(
            "check authentication tokens",
            vec!["authentication".into(), "tokens".into()],
        ),
        metadata: file_meta,
        source_code: None,
    })
    .unwrap();

    let mut login_meta = StructuralMetadata::with_path(EntityType::Function, "src/auth.ts");
    login_meta.qualified_name = Some("login".into());
    login_meta.start_line = Some(1);
    login_meta.end_line = Some(4);
    rpg.add_low_level_node(LowLevelArgs {
        id: "src/auth.ts:function:login".into(),
        feature: SemanticFeature::with_keywords(
            "verify login credentials",
            vec!["login".into(), "credentials".into()],
        ),
        metadata: login_meta,
        source_code: Some("function login() { return true; }".into()),
    })
    .unwrap();

    rpg.add_low_level_node(LowLevelArgs {
        id: "src/store.ts:file".into(),
        feature: SemanticFeature::new("persist session records"),
        metadata: StructuralMetadata::with_path(EntityType::File, "src/store.ts"),
        source_code: None,
    })
    .unwrap();

    for (source, target) in [
        ("domain:Auth", "src/auth.ts:file"),
        ("src/auth.ts:file", "src/auth.ts:function:login"),
        ("domain:Data", "src/store.ts:file"),
    ] {
        rpg.add_functional_edge(FunctionalEdgeArgs {
            source: source.into(),
            target: target.into(),
            level: None,
            sibling_order: None,
        })
        .unwrap();
    }
    rpg.add_dependency_edge(DependencyEdgeArgs {
        source: "src/auth.ts:file".into(),
        target: "src/store.ts:file".into(),
        dependency_type: DependencyType::Import,
        is_runtime: None,
        line: Some(1),
    })
    .unwrap();

    rpg
}

#[test]
fn auto_mode_skips_snippets_when_features_hit() {
    let rpg = sample_rpg();
    let outcome = SearchNode::query(
        &rpg,
        &SearchOptions {
            mode: SearchMode::Auto,
            feature_terms: vec!["authentication".into()],
            file_pattern: Some("src/**/*.ts".into()),
            ..SearchOptions::default()
        },
    )
    .unwrap();
    assert!(!outcome.hits.is_empty());
    assert!(!outcome.used_snippet_fallback);
    assert!(outcome
        .hits
        .iter()
        .any(|h| h.node.id() == "src/auth.ts:file"));
}

#[test]
fn auto_mode_falls_back_to_snippets_on_zero_feature_hits() {
    let rpg = sample_rpg();
    let outcome = SearchNode::query(
        &rpg,
        &SearchOptions {
            mode: SearchMode::Auto,
            feature_terms: vec!["blockchain".into()],
            file_pattern: Some("src/*.ts".into()),
            ..SearchOptions::default()
        },
    )
    .unwrap();
    assert!(outcome.used_snippet_fallback);
    let ids: Vec<&str> = outcome.hits.iter().map(|h| h.node.id()).collect();
    assert!(ids.contains(&"src/auth.ts:file"));
    assert!(ids.contains(&"src/store.ts:file"));
}

#[test]
fn auto_mode_without_pattern_never_falls_back() {
    let rpg = sample_rpg();
    let outcome = SearchNode::query(
        &rpg,
        &SearchOptions {
            mode: SearchMode::Auto,
            feature_terms: vec!["blockchain".into()],
            ..SearchOptions::default()
        },
    )
    .unwrap();
    assert!(outcome.hits.is_empty());
    assert!(!outcome.used_snippet_fallback);
}

#[test]
fn feature_search_respects_scopes_and_dedups() {
    let rpg = sample_rpg();
    let outcome = SearchNode::query(
        &rpg,
        &SearchOptions {
            mode: SearchMode::Features,
            feature_terms: vec!["credentials".into(), "login".into()],
            search_scopes: vec!["domain:Auth".into()],
            ..SearchOptions::default()
        },
    )
    .unwrap();
    let ids: Vec<&str> = outcome.hits.iter().map(|h| h.node.id()).collect();
    // Both terms match the login node; it appears once.
    assert_eq!(
        ids.iter()
            .filter(|&&id| id == "src/auth.ts:function:login")
            .count(),
        1
    );
    assert!(!ids.contains(&"src/store.ts:file"));
}

#[test]
fn empty_query_returns_empty() {
    let rpg = sample_rpg();
    let outcome = SearchNode::query(
        &rpg,
        &SearchOptions {
            mode: SearchMode::Features,
            feature_terms: vec!["".into()],
            ..SearchOptions::default()
        },
    )
    .unwrap();
    assert!(outcome.hits.is_empty());
}

#[test]
fn fetch_returns_source_ancestry_and_not_found() {
    let rpg = sample_rpg();
    let outcome = FetchNode::get(
        &rpg,
        &FetchRequest {
            code_entities: vec![
                "src/auth.ts:function:login".into(),
                "ghost:function:nope".into(),
            ],
            feature_entities: vec!["domain:Auth".into()],
        },
    )
    .unwrap();

    assert_eq!(outcome.nodes.len(), 2);
    assert_eq!(outcome.not_found, vec!["ghost:function:nope".to_string()]);

    let login = &outcome.nodes[0];
    assert_eq!(
        login.ancestry,
        "domain:Auth / src/auth.ts:file / src/auth.ts:function:login"
    );
    assert!(login.source.as_deref().unwrap().contains("function login"));

    let auth = &outcome.nodes[1];
    assert_eq!(auth.ancestry, "domain:Auth");
    assert!(auth.source.is_none());
}

#[test]
fn explore_depth_zero_is_only_the_start() {
    let rpg = sample_rpg();
    let mut options = ExploreOptions::new("domain:Auth");
    options.max_depth = 0;
    let traversal = ExploreRpg::traverse(&rpg, &options).unwrap();
    assert_eq!(traversal.nodes.len(), 1);
    assert_eq!(traversal.max_depth_reached, 0);
}

#[test]
fn explore_dependency_out_finds_import() {
    let rpg = sample_rpg();
    let mut options = ExploreOptions::new("src/auth.ts:file");
    options.edge_type = repograph_core::EdgeFamily::Dependency;
    options.direction = Direction::Out;
    options.max_depth = 1;
    let traversal = ExploreRpg::traverse(&rpg, &options).unwrap();
    let ids: Vec<&str> = traversal.nodes.iter().map(|n| n.id()).collect();
    assert_eq!(ids, vec!["src/auth.ts:file", "src/store.ts:file"]);
    assert_eq!(traversal.edges.len(), 1);
    assert!(traversal.edges[0].is_dependency());
}

#[test]
fn explore_visits_each_node_once() {
    let rpg = sample_rpg();
    let mut options = ExploreOptions::new("domain:Auth");
    options.direction = Direction::Both;
    options.max_depth = 10;
    let traversal = ExploreRpg::traverse(&rpg, &options).unwrap();
    let mut ids: Vec<&str> = traversal.nodes.iter().map(|n| n.id()).collect();
    let before = ids.len();
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), before);
}
