//! Reorganization scenarios with a deterministic solution-tag fake.

mod common;

use common::ScriptedModel;
use repograph_core::{EntityType, GraphConfig, SemanticFeature, StructuralMetadata};
use repograph_encoder::reorganize::{reorganize, UNCATEGORIZED_ID};
use repograph_store::{LowLevelArgs, Rpg};
use std::time::Duration;

fn rpg_with_files(files: &[(&str, &str)]) -> Rpg {
    let mut rpg = Rpg::in_memory(GraphConfig {
        name: "reorg".into(),
        root_path: None,
        description: None,
    });
    for (path, description) in files {
        rpg.add_low_level_node(LowLevelArgs {
            id: format!("{path}:file"),
            feature: SemanticFeature::new(*description),
            metadata: StructuralMetadata::with_path(EntityType::File, *path),
            source_code: None,
        })
        .unwrap();
    }
    rpg
}

#[tokio::test]
async fn builds_three_level_chains_and_links_files() {
    let mut rpg = rpg_with_files(&[
        ("loader/csv.py", "load csv records"),
        ("loader/json.py", "load json records"),
        ("scheduler/cron.py", "schedule recurring tasks"),
        ("auth/token.py", "check access tokens"),
        ("docs/readme.py", "describe the project"),
    ]);

    let model = ScriptedModel::new([
        r#"<solution>["DataProcessing", "Auth"]</solution>"#,
        r#"<solution>{"DataProcessing/pipeline orchestration/task scheduling": ["loader", "scheduler"], "Auth/credential validation/token check": ["auth"]}</solution>"#,
    ]);

    let report = reorganize(&mut rpg, &model, Duration::from_secs(5))
        .await
        .unwrap();
    assert_eq!(report.areas, vec!["DataProcessing".to_string(), "Auth".to_string()]);
    assert_eq!(report.llm_calls, 2);

    for id in [
        "domain:DataProcessing",
        "domain:DataProcessing/pipeline orchestration",
        "domain:DataProcessing/pipeline orchestration/task scheduling",
        "domain:Auth",
        "domain:Auth/credential validation",
        "domain:Auth/credential validation/token check",
    ] {
        assert!(rpg.has_node(id), "missing {id}");
    }

    // The chains are linked area → category → subcategory.
    let area_children: Vec<String> = rpg
        .children("domain:DataProcessing")
        .unwrap()
        .iter()
        .map(|n| n.id().to_string())
        .collect();
    assert_eq!(
        area_children,
        vec!["domain:DataProcessing/pipeline orchestration".to_string()]
    );

    // Every file in an assigned group hangs under the subcategory.
    for file in ["loader/csv.py:file", "loader/json.py:file", "scheduler/cron.py:file"] {
        let parent = rpg.parent(file).unwrap().unwrap();
        assert_eq!(
            parent.id(),
            "domain:DataProcessing/pipeline orchestration/task scheduling"
        );
    }
    let auth_parent = rpg.parent("auth/token.py:file").unwrap().unwrap();
    assert_eq!(auth_parent.id(), "domain:Auth/credential validation/token check");

    // The unassigned group lands under the synthetic bucket.
    let docs_parent = rpg.parent("docs/readme.py:file").unwrap().unwrap();
    assert_eq!(docs_parent.id(), UNCATEGORIZED_ID);
    assert_eq!(report.files_uncategorized, 1);
}

#[tokio::test]
async fn reasks_once_on_invalid_hierarchy_paths() {
    let mut rpg = rpg_with_files(&[("loader/csv.py", "load csv records")]);

    let model = ScriptedModel::new([
        r#"<solution>["DataProcessing"]</solution>"#,
        // First construction answer: two-level path, rejected.
        r#"<solution>{"DataProcessing/loading": ["loader"]}</solution>"#,
        // Corrective re-ask succeeds.
        r#"<solution>{"DataProcessing/record loading/file parsing": ["loader"]}</solution>"#,
    ]);

    reorganize(&mut rpg, &model, Duration::from_secs(5))
        .await
        .unwrap();
    assert!(rpg.has_node("domain:DataProcessing/record loading/file parsing"));
}

#[tokio::test]
async fn second_invalid_construction_is_fatal() {
    let mut rpg = rpg_with_files(&[("loader/csv.py", "load csv records")]);

    let model = ScriptedModel::new([
        r#"<solution>["DataProcessing"]</solution>"#,
        r#"<solution>{"DataProcessing/loading": ["loader"]}</solution>"#,
        r#"<solution>{"DataProcessing/still/Not Lowercase": ["loader"]}</solution>"#,
    ]);

    let err = reorganize(&mut rpg, &model, Duration::from_secs(5))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "validation");
}

#[tokio::test]
async fn unparseable_discovery_retries_then_fails() {
    let mut rpg = rpg_with_files(&[("loader/csv.py", "load csv records")]);

    let model = ScriptedModel::new(["not json at all", "still not json"]);
    let err = reorganize(&mut rpg, &model, Duration::from_secs(5))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "llm");
}
