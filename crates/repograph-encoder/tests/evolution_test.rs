//! Evolution scenarios with fake VCS and LLM backends.

mod common;

use common::{FakeVcs, ScriptedModel};
use repograph_core::config::{InjectorConfig, SemanticConfig};
use repograph_core::{
    EntityType, GraphConfig, SemanticFeature, StructuralMetadata,
};
use repograph_encoder::extract::SemanticExtractor;
use repograph_encoder::vcs::{ChangeStatus, ChangedFile};
use repograph_encoder::{EvolutionEngine, EvolutionOptions};
use repograph_store::{FunctionalEdgeArgs, HighLevelArgs, LowLevelArgs, Rpg};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

const OLD_SOURCE: &str = "def parse_args():\n    return read_flags()\n";
const NEW_SOURCE: &str = "def parse_args():\n    return render(template)\n";

/// Graph state after an encode: two areas, one file with one function.
fn seeded_rpg() -> Rpg {
    let mut rpg = Rpg::in_memory(GraphConfig {
        name: "evolve".into(),
        root_path: None,
        description: None,
    });
    for (id, description) in [
        ("domain:Cli", "provide cli capabilities"),
        ("domain:Render", "provide render capabilities"),
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

    rpg.add_low_level_node(LowLevelArgs {
        id: "src/a.py:file".into(),
        feature: SemanticFeature::new("parse command input"),
        metadata: StructuralMetadata::with_path(EntityType::File, "src/a.py"),
        source_code: None,
    })
    .unwrap();
    let mut meta = StructuralMetadata::with_path(EntityType::Function, "src/a.py");
    meta.qualified_name = Some("parse_args".into());
    meta.start_line = Some(1);
    meta.end_line = Some(2);
    rpg.add_low_level_node(LowLevelArgs {
        id: "src/a.py:function:parse_args".into(),
        feature: SemanticFeature::with_keywords(
            "parse arguments",
            vec!["parse".into(), "arguments".into()],
        ),
        metadata: meta,
        source_code: None,
    })
    .unwrap();

    for (source, target) in [
        ("domain:Cli", "src/a.py:file"),
        ("src/a.py:file", "src/a.py:function:parse_args"),
    ] {
        rpg.add_functional_edge(FunctionalEdgeArgs {
            source: source.into(),
            target: target.into(),
            level: None,
            sibling_order: None,
        })
        .unwrap();
    }
    rpg
}

fn engine_parts(
    responses: Vec<&str>,
) -> (Arc<ScriptedModel>, SemanticExtractor, InjectorConfig) {
    let model = Arc::new(ScriptedModel::new(responses));
    let extractor = SemanticExtractor::with_model(
        model.clone(),
        SemanticConfig::default(),
        Duration::from_secs(5),
    );
    (model, extractor, InjectorConfig::default())
}

fn modified_change() -> ChangedFile {
    ChangedFile {
        path: PathBuf::from("src/a.py"),
        status: ChangeStatus::Modified,
        old_content: Some(OLD_SOURCE.to_string()),
        new_content: Some(NEW_SOURCE.to_string()),
    }
}

#[tokio::test]
async fn drift_above_threshold_reroutes() {
    let mut rpg = seeded_rpg();
    // Call order: extract (modify), extract (insert after reroute), router.
    let (model, extractor, injector) = engine_parts(vec![
        "parse_args | render template | render, template",
        "parse_args | render template | render, template",
        r#"<solution>"domain:Render"</solution>"#,
    ]);
    let engine = EvolutionEngine {
        extractor: &extractor,
        model: Some(model.as_ref()),
        embedder: None,
        injector_config: &injector,
        deadline: Duration::from_secs(5),
        include_source: false,
    };
    let vcs = FakeVcs {
        changes: vec![modified_change()],
    };

    let report = engine
        .evolve(
            &mut rpg,
            std::path::Path::new("/tmp/project"),
            &vcs,
            &EvolutionOptions::new("HEAD~1..HEAD"),
        )
        .await
        .unwrap();

    // Keyword overlap is zero, so distance 1.0 > 0.3: one reroute, not a
    // modify, and the churn is not double-counted.
    assert_eq!(report.rerouted, 1);
    assert_eq!(report.modified, 0);
    assert_eq!(report.deleted, 0);
    assert_eq!(report.inserted, 0);

    let node = rpg.get_node("src/a.py:function:parse_args").unwrap();
    assert_eq!(node.feature().description, "render template");
    let parent = rpg.parent("src/a.py:function:parse_args").unwrap().unwrap();
    assert_eq!(parent.id(), "domain:Render");
}

#[tokio::test]
async fn drift_below_threshold_updates_in_place() {
    let mut rpg = seeded_rpg();
    let (model, extractor, injector) = engine_parts(vec![
        // Identical keyword set: distance 0, well under the threshold.
        "parse_args | parse arguments | parse, arguments",
    ]);
    let engine = EvolutionEngine {
        extractor: &extractor,
        model: Some(model.as_ref()),
        embedder: None,
        injector_config: &injector,
        deadline: Duration::from_secs(5),
        include_source: false,
    };
    let vcs = FakeVcs {
        changes: vec![modified_change()],
    };

    let report = engine
        .evolve(
            &mut rpg,
            std::path::Path::new("/tmp/project"),
            &vcs,
            &EvolutionOptions::new("HEAD~1..HEAD"),
        )
        .await
        .unwrap();

    assert_eq!(report.modified, 1);
    assert_eq!(report.rerouted, 0);
    let parent = rpg.parent("src/a.py:function:parse_args").unwrap().unwrap();
    assert_eq!(parent.id(), "src/a.py:file");
}

#[tokio::test]
async fn empty_diff_is_a_noop() {
    let mut rpg = seeded_rpg();
    let before = rpg.export_document().unwrap();

    let (model, extractor, injector) = engine_parts(vec![]);
    let engine = EvolutionEngine {
        extractor: &extractor,
        model: Some(model.as_ref()),
        embedder: None,
        injector_config: &injector,
        deadline: Duration::from_secs(5),
        include_source: false,
    };
    let vcs = FakeVcs { changes: vec![] };

    let report = engine
        .evolve(
            &mut rpg,
            std::path::Path::new("/tmp/project"),
            &vcs,
            &EvolutionOptions::new("HEAD~1..HEAD"),
        )
        .await
        .unwrap();

    assert_eq!(report.inserted + report.deleted + report.modified + report.rerouted, 0);
    let after = rpg.export_document().unwrap();
    assert_eq!(before.nodes, after.nodes);
    assert_eq!(before.edges, after.edges);
}

#[tokio::test]
async fn applying_the_same_diff_twice_converges() {
    let mut rpg = seeded_rpg();
    let (model, extractor, injector) = engine_parts(vec![
        "parse_args | render template | render, template",
        "parse_args | render template | render, template",
        r#"<solution>"domain:Render"</solution>"#,
        // Second application: one extraction, zero drift.
        "parse_args | render template | render, template",
    ]);
    let engine = EvolutionEngine {
        extractor: &extractor,
        model: Some(model.as_ref()),
        embedder: None,
        injector_config: &injector,
        deadline: Duration::from_secs(5),
        include_source: false,
    };
    let vcs = FakeVcs {
        changes: vec![modified_change()],
    };
    let options = EvolutionOptions::new("HEAD~1..HEAD");

    engine
        .evolve(&mut rpg, std::path::Path::new("/tmp/project"), &vcs, &options)
        .await
        .unwrap();
    let first = rpg.export_document().unwrap();

    let report = engine
        .evolve(&mut rpg, std::path::Path::new("/tmp/project"), &vcs, &options)
        .await
        .unwrap();
    assert_eq!(report.rerouted, 0);
    let second = rpg.export_document().unwrap();
    assert_eq!(first.nodes, second.nodes);
    assert_eq!(first.edges, second.edges);
}

#[tokio::test]
async fn file_deletion_prunes_empty_ancestors() {
    let mut rpg = seeded_rpg();
    let (model, extractor, injector) = engine_parts(vec![]);
    let engine = EvolutionEngine {
        extractor: &extractor,
        model: Some(model.as_ref()),
        embedder: None,
        injector_config: &injector,
        deadline: Duration::from_secs(5),
        include_source: false,
    };
    let vcs = FakeVcs {
        changes: vec![ChangedFile {
            path: PathBuf::from("src/a.py"),
            status: ChangeStatus::Deleted,
            old_content: Some(OLD_SOURCE.to_string()),
            new_content: None,
        }],
    };

    let report = engine
        .evolve(
            &mut rpg,
            std::path::Path::new("/tmp/project"),
            &vcs,
            &EvolutionOptions::new("HEAD~1..HEAD"),
        )
        .await
        .unwrap();

    assert_eq!(report.deleted, 2);
    assert!(!rpg.has_node("src/a.py:file"));
    assert!(!rpg.has_node("src/a.py:function:parse_args"));
    // domain:Cli lost its only child and was pruned; domain:Render remains.
    assert!(!rpg.has_node("domain:Cli"));
    assert!(rpg.has_node("domain:Render"));
    assert_eq!(report.pruned_nodes, 1);
}

#[tokio::test]
async fn new_entity_without_drift_metadata_is_inserted_under_its_file() {
    let mut rpg = seeded_rpg();
    let new_content = format!("{OLD_SOURCE}\ndef save_output():\n    pass\n");
    let (model, extractor, injector) = engine_parts(vec![
        // parse_args unchanged
        "parse_args | parse arguments | parse, arguments",
        // the new entity
        "save_output | save output file | save, output",
        // router declines every root, so the file node catches it
        r#"<solution>"none"</solution>"#,
    ]);
    let engine = EvolutionEngine {
        extractor: &extractor,
        model: Some(model.as_ref()),
        embedder: None,
        injector_config: &injector,
        deadline: Duration::from_secs(5),
        include_source: false,
    };
    let vcs = FakeVcs {
        changes: vec![ChangedFile {
            path: PathBuf::from("src/a.py"),
            status: ChangeStatus::Modified,
            old_content: Some(OLD_SOURCE.to_string()),
            new_content: Some(new_content),
        }],
    };

    let report = engine
        .evolve(
            &mut rpg,
            std::path::Path::new("/tmp/project"),
            &vcs,
            &EvolutionOptions::new("HEAD~1..HEAD"),
        )
        .await
        .unwrap();

    assert_eq!(report.inserted, 1);
    assert_eq!(report.modified, 1);
    let parent = rpg
        .parent("src/a.py:function:save_output")
        .unwrap()
        .unwrap();
    assert_eq!(parent.id(), "src/a.py:file");
}
