//! Evolution: apply a commit delta to an existing graph as three atomic
//! operation classes, scheduled strictly Delete → Modify → Insert.
//!
//! Modified entities are matched by qualified name (line numbers ignored),
//! scored for semantic drift, and either updated in place or re-routed
//! through the semantic router. Empty ancestors are pruned on deletion.
//! Dependency edges of touched files are recomputed.

use crate::embeddings::{cosine_similarity, Embedder};
use crate::extract::SemanticExtractor;
use crate::ids;
use crate::inject;
use crate::llm::LanguageModel;
use crate::router::SemanticRouter;
use crate::vcs::{ChangeStatus, ChangedFile, VersionControl};
use repograph_core::config::InjectorConfig;
use repograph_core::{
    EntityType, Node, RpgError, RpgResult, SemanticFeature, SourceLanguage, StructuralMetadata,
};
use repograph_store::{
    EdgeFilter, FunctionalEdgeArgs, LowLevelArgs, NodeFilter, NodePatch, Rpg,
};
use repograph_parser::{CodeEntity, Language};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Evolution run options.
#[derive(Debug, Clone)]
pub struct EvolutionOptions {
    pub commit_range: String,
    pub drift_threshold: f64,
    pub use_llm: bool,
}

impl EvolutionOptions {
    pub fn new(commit_range: impl Into<String>) -> Self {
        Self {
            commit_range: commit_range.into(),
            drift_threshold: 0.3,
            use_llm: true,
        }
    }
}

/// Counters for one evolution run.
#[derive(Debug, Default)]
pub struct EvolutionReport {
    pub inserted: usize,
    pub deleted: usize,
    pub modified: usize,
    pub rerouted: usize,
    pub pruned_nodes: usize,
    pub llm_calls: usize,
    pub duration: Duration,
}

/// The evolution engine with its injected collaborators.
pub struct EvolutionEngine<'a> {
    pub extractor: &'a SemanticExtractor,
    pub model: Option<&'a dyn LanguageModel>,
    pub embedder: Option<&'a dyn Embedder>,
    pub injector_config: &'a InjectorConfig,
    pub deadline: Duration,
    pub include_source: bool,
}

/// A pending insert: either a whole new file or a new entity in an
/// existing file.
#[derive(Debug)]
enum PendingInsert {
    File {
        path: String,
        language: SourceLanguage,
        entities: Vec<CodeEntity>,
    },
    Entity {
        path: String,
        language: SourceLanguage,
        entity: CodeEntity,
    },
}

impl EvolutionEngine<'_> {
    /// Apply the delta for `options.commit_range` to the graph.
    pub async fn evolve(
        &self,
        rpg: &mut Rpg,
        project_root: &Path,
        vcs: &dyn VersionControl,
        options: &EvolutionOptions,
    ) -> RpgResult<EvolutionReport> {
        let started = Instant::now();
        let mut report = EvolutionReport::default();

        let mut changes: Vec<ChangedFile> = vcs
            .list_changes(project_root, &options.commit_range)?
            .into_iter()
            .filter(|c| Language::from_path(&c.path.to_string_lossy()).is_some())
            .collect();
        changes.sort_by(|a, b| a.path.cmp(&b.path));

        if changes.is_empty() {
            report.duration = started.elapsed();
            return Ok(report);
        }

        // Partition the delta into the three operation classes.
        let mut deletions: Vec<(String, usize, String)> = Vec::new(); // (path, line, node id)
        let mut modifications: Vec<(String, CodeEntity)> = Vec::new(); // (node id, new entity)
        let mut insertions: Vec<PendingInsert> = Vec::new();
        let mut touched_files: Vec<(PathBuf, String)> = Vec::new();

        for change in &changes {
            let rel = change.path.to_string_lossy().replace('\\', "/");
            let language = Language::from_path(&rel).expect("filtered above");
            match change.status {
                ChangeStatus::Deleted => {
                    for node in self.nodes_of_file(rpg, &rel)? {
                        let line = node
                            .metadata()
                            .and_then(|m| m.start_line)
                            .unwrap_or(usize::MAX);
                        deletions.push((rel.clone(), line, node.id().to_string()));
                    }
                }
                ChangeStatus::Modified => {
                    let Some(new_content) = &change.new_content else {
                        continue;
                    };
                    let result =
                        repograph_parser::parse_source(new_content, language, &change.path);
                    let new_ids: HashSet<String> = result
                        .entities
                        .iter()
                        .filter_map(|e| ids::entity_id(&rel, e))
                        .collect();

                    for node in self.nodes_of_file(rpg, &rel)? {
                        let is_file = node
                            .metadata()
                            .is_some_and(|m| m.entity_type == EntityType::File);
                        if !is_file && !new_ids.contains(node.id()) {
                            let line = node
                                .metadata()
                                .and_then(|m| m.start_line)
                                .unwrap_or(usize::MAX);
                            deletions.push((rel.clone(), line, node.id().to_string()));
                        }
                    }
                    for entity in result.entities {
                        let Some(id) = ids::entity_id(&rel, &entity) else {
                            continue;
                        };
                        if rpg.has_node(&id) {
                            modifications.push((id, entity));
                        } else {
                            insertions.push(PendingInsert::Entity {
                                path: rel.clone(),
                                language: language.source_language(),
                                entity,
                            });
                        }
                    }
                    touched_files.push((change.path.clone(), new_content.clone()));
                }
                ChangeStatus::Added => {
                    let Some(new_content) = &change.new_content else {
                        continue;
                    };
                    let result =
                        repograph_parser::parse_source(new_content, language, &change.path);
                    insertions.push(PendingInsert::File {
                        path: rel.clone(),
                        language: language.source_language(),
                        entities: result.entities,
                    });
                    touched_files.push((change.path.clone(), new_content.clone()));
                }
            }
        }

        // Stable in-class ordering by (filePath, startLine).
        deletions.sort_by(|a, b| (&a.0, a.1).cmp(&(&b.0, b.1)));
        modifications.sort_by_key(|(_, e)| (e.file.clone(), e.start_line));
        insertions.sort_by_key(|p| match p {
            PendingInsert::File { path, .. } => (path.clone(), 0),
            PendingInsert::Entity { path, entity, .. } => (path.clone(), entity.start_line),
        });

        // Delete → Modify → Insert, strictly.
        for (_, _, id) in &deletions {
            self.delete_with_prune(rpg, id, &mut report)?;
        }

        let mut invalidated: HashSet<String> = HashSet::new();
        for (id, entity) in &modifications {
            self.process_modification(rpg, id, entity, options, &mut report, &mut invalidated)
                .await?;
        }

        for pending in insertions {
            match pending {
                PendingInsert::File {
                    path,
                    language,
                    entities,
                } => {
                    self.insert_file(rpg, &path, language, entities, &mut report)
                        .await?;
                }
                PendingInsert::Entity {
                    path,
                    language,
                    entity,
                } => {
                    self.insert_entity(rpg, &path, language, &entity, &mut report)
                        .await?;
                }
            }
        }

        // Recompute dependency edges for touched files.
        for (path, _) in &touched_files {
            let rel = path.to_string_lossy().replace('\\', "/");
            let file_id = ids::file_id(&rel);
            if rpg.has_node(&file_id) {
                for edge in rpg.edges(&EdgeFilter {
                    source: Some(file_id.clone()),
                    family: Some(repograph_core::EdgeFamily::Dependency),
                    ..EdgeFilter::default()
                })? {
                    rpg.remove_edge(&edge.key())?;
                }
            }
        }
        inject::inject(rpg, &touched_files, self.injector_config)?;

        self.extractor.save_cache()?;
        report.duration = started.elapsed();
        info!(
            inserted = report.inserted,
            deleted = report.deleted,
            modified = report.modified,
            rerouted = report.rerouted,
            pruned = report.pruned_nodes,
            "evolution complete"
        );
        Ok(report)
    }

    fn nodes_of_file(&self, rpg: &Rpg, rel: &str) -> RpgResult<Vec<Node>> {
        let candidates = rpg.nodes(&NodeFilter {
            high_level: Some(false),
            path_prefix: Some(rel.to_string()),
            ..NodeFilter::default()
        })?;
        Ok(candidates
            .into_iter()
            .filter(|n| n.metadata().and_then(|m| m.path.as_deref()) == Some(rel))
            .collect())
    }

    /// Idempotent delete with empty-ancestor pruning up the functional
    /// parent chain. Only high-level ancestors are pruned.
    fn delete_with_prune(
        &self,
        rpg: &mut Rpg,
        id: &str,
        report: &mut EvolutionReport,
    ) -> RpgResult<()> {
        if !rpg.has_node(id) {
            return Ok(());
        }
        let mut cursor = rpg.parent(id)?.map(|n| n.id().to_string());
        rpg.remove_node(id)?;
        report.deleted += 1;

        while let Some(parent_id) = cursor {
            let parent = rpg.get_node(&parent_id)?;
            if !parent.is_high_level() || !rpg.children(&parent_id)?.is_empty() {
                break;
            }
            cursor = rpg.parent(&parent_id)?.map(|n| n.id().to_string());
            rpg.remove_node(&parent_id)?;
            report.pruned_nodes += 1;
        }
        Ok(())
    }

    async fn process_modification(
        &self,
        rpg: &mut Rpg,
        id: &str,
        entity: &CodeEntity,
        options: &EvolutionOptions,
        report: &mut EvolutionReport,
        invalidated: &mut HashSet<String>,
    ) -> RpgResult<()> {
        if !rpg.has_node(id) {
            return Ok(());
        }
        let rel = entity.file.to_string_lossy().replace('\\', "/");
        if invalidated.insert(rel.clone()) {
            self.extractor.invalidate_cached_file(&rel);
        }

        let old_feature = rpg.get_node(id)?.feature().clone();
        if self.extractor.has_model() {
            report.llm_calls += 1;
        }
        let new_feature = self.extractor.extract(entity).await;

        let drift = match self
            .compute_drift(&old_feature, &new_feature)
            .await
        {
            Ok(d) => d,
            Err(RpgError::DriftUnavailable(msg)) => {
                warn!(node = id, %msg, "drift unavailable, updating in place");
                self.update_in_place(rpg, id, entity, &new_feature)?;
                report.modified += 1;
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        if drift > options.drift_threshold {
            self.delete_with_prune(rpg, id, report)?;
            // The delete/insert pair counts as one reroute, not as churn.
            report.deleted = report.deleted.saturating_sub(1);
            let language = Language::from_path(&rel)
                .map(|l| l.source_language())
                .unwrap_or(SourceLanguage::Python);
            let inserted = self
                .insert_entity(rpg, &rel, language, entity, report)
                .await?;
            if inserted {
                report.inserted -= 1;
            }
            report.rerouted += 1;
        } else {
            self.update_in_place(rpg, id, entity, &new_feature)?;
            report.modified += 1;
        }
        Ok(())
    }

    fn update_in_place(
        &self,
        rpg: &mut Rpg,
        id: &str,
        entity: &CodeEntity,
        feature: &SemanticFeature,
    ) -> RpgResult<()> {
        let mut patch = NodePatch::feature(feature);
        patch.start_line = Some(entity.start_line);
        patch.end_line = Some(entity.end_line);
        if self.include_source {
            patch.source_code = Some(entity.source_text.clone());
        }
        rpg.update_node(id, &patch)?;
        Ok(())
    }

    /// Semantic distance: embedding cosine when available, keyword Jaccard
    /// otherwise. Neither available is a `DriftUnavailable` error.
    async fn compute_drift(
        &self,
        old: &SemanticFeature,
        new: &SemanticFeature,
    ) -> RpgResult<f64> {
        if let Some(embedder) = self.embedder {
            let texts = vec![
                format!("{} {}", old.description, old.keywords.join(" ")),
                format!("{} {}", new.description, new.keywords.join(" ")),
            ];
            match embedder.embed(&texts, self.deadline).await {
                Ok(vectors) if vectors.len() == 2 => {
                    return Ok(1.0 - cosine_similarity(&vectors[0], &vectors[1]) as f64);
                }
                Ok(_) => {}
                Err(e) => warn!(error = %e, "embedding drift failed, trying keywords"),
            }
        }
        if old.keywords.is_empty() && new.keywords.is_empty() {
            return Err(RpgError::DriftUnavailable(
                "no embeddings and both keyword sets are empty".into(),
            ));
        }
        Ok(1.0 - jaccard(&old.keywords, &new.keywords))
    }

    async fn insert_file(
        &self,
        rpg: &mut Rpg,
        path: &str,
        language: SourceLanguage,
        entities: Vec<CodeEntity>,
        report: &mut EvolutionReport,
    ) -> RpgResult<()> {
        let file_id = ids::file_id(path);
        if rpg.has_node(&file_id) {
            return Ok(());
        }

        if self.extractor.has_model() && !entities.is_empty() {
            report.llm_calls += 1;
        }
        let features = self.extractor.extract_batch(&entities).await?;

        // Direct children only feed the file synthesis.
        let direct: Vec<SemanticFeature> = entities
            .iter()
            .zip(features.iter())
            .filter(|(e, _)| e.parent.is_none())
            .map(|(_, f)| f.clone())
            .collect();
        let file_name = path.rsplit('/').next().unwrap_or(path);
        let file_feature =
            SemanticExtractor::aggregate_file_features(&direct, file_name, path);

        let mut metadata = StructuralMetadata::with_path(EntityType::File, path);
        metadata.language = Some(language);
        rpg.add_low_level_node(LowLevelArgs {
            id: file_id.clone(),
            feature: file_feature.clone(),
            metadata,
            source_code: None,
        })?;
        report.inserted += 1;

        // Route the file into the hierarchy; entities hang under the file.
        if let Some(parent) = self.route(rpg, &file_feature, report).await? {
            rpg.add_functional_edge(FunctionalEdgeArgs {
                source: parent,
                target: file_id.clone(),
                level: None,
                sibling_order: None,
            })?;
        }

        for (entity, feature) in entities.iter().zip(features.into_iter()) {
            let Some(id) = ids::entity_id(path, entity) else {
                continue;
            };
            if rpg.has_node(&id) {
                continue;
            }
            self.add_entity_node(rpg, path, language, entity, feature, &id)?;
            rpg.add_functional_edge(FunctionalEdgeArgs {
                source: file_id.clone(),
                target: id,
                level: None,
                sibling_order: None,
            })?;
            report.inserted += 1;
        }
        Ok(())
    }

    /// Insert one entity: extract, route via the semantic router, link.
    /// When no route is found, the entity hangs under its file node.
    async fn insert_entity(
        &self,
        rpg: &mut Rpg,
        path: &str,
        language: SourceLanguage,
        entity: &CodeEntity,
        report: &mut EvolutionReport,
    ) -> RpgResult<bool> {
        let Some(id) = ids::entity_id(path, entity) else {
            return Ok(false);
        };
        if rpg.has_node(&id) {
            return Ok(false);
        }
        if self.extractor.has_model() {
            report.llm_calls += 1;
        }
        let feature = self.extractor.extract(entity).await;

        self.add_entity_node(rpg, path, language, entity, feature.clone(), &id)?;
        report.inserted += 1;

        let parent = match self.route(rpg, &feature, report).await? {
            Some(parent) => Some(parent),
            None => {
                let file_id = ids::file_id(path);
                rpg.has_node(&file_id).then_some(file_id)
            }
        };
        if let Some(parent) = parent {
            rpg.add_functional_edge(FunctionalEdgeArgs {
                source: parent,
                target: id,
                level: None,
                sibling_order: None,
            })?;
        }
        Ok(true)
    }

    fn add_entity_node(
        &self,
        rpg: &mut Rpg,
        path: &str,
        language: SourceLanguage,
        entity: &CodeEntity,
        feature: SemanticFeature,
        id: &str,
    ) -> RpgResult<()> {
        let entity_type =
            ids::entity_type_of(entity.kind).expect("entity id implies a node type");
        let mut metadata = StructuralMetadata::with_path(entity_type, path);
        metadata.qualified_name = Some(entity.qualified_name());
        metadata.language = Some(language);
        metadata.start_line = Some(entity.start_line);
        metadata.end_line = Some(entity.end_line);
        rpg.add_low_level_node(LowLevelArgs {
            id: id.to_string(),
            feature,
            metadata,
            source_code: self.include_source.then(|| entity.source_text.clone()),
        })
    }

    async fn route(
        &self,
        rpg: &Rpg,
        feature: &SemanticFeature,
        report: &mut EvolutionReport,
    ) -> RpgResult<Option<String>> {
        let roots = rpg.roots()?;
        let high_roots: Vec<Node> = roots.into_iter().filter(|n| n.is_high_level()).collect();
        if high_roots.is_empty() {
            return Ok(None);
        }
        if self.model.is_some() {
            report.llm_calls += 1;
        }
        let router = SemanticRouter::new(self.model, self.embedder, self.deadline);
        router.route_from_roots(rpg, feature, &high_roots).await
    }
}

/// Jaccard similarity over keyword sets.
pub fn jaccard(a: &[String], b: &[String]) -> f64 {
    let sa: HashSet<&str> = a.iter().map(String::as_str).collect();
    let sb: HashSet<&str> = b.iter().map(String::as_str).collect();
    if sa.is_empty() && sb.is_empty() {
        return 1.0;
    }
    let intersection = sa.intersection(&sb).count() as f64;
    let union = sa.union(&sb).count() as f64;
    if union == 0.0 { 1.0 } else { intersection / union }
}
