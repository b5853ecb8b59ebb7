//! The encoding pipeline: lift a codebase into the graph.
//!
//! Phases run strictly in order: discovery, semantic lifting (all low-level
//! persistence completes here), structural reorganization, artifact
//! grounding, dependency injection. Parsing is parallel at the file level;
//! LLM batches are bounded by the extractor's in-flight cap.

use crate::cache::FeatureCache;
use crate::extract::SemanticExtractor;
use crate::ground;
use crate::ids;
use crate::inject;
use crate::llm::LanguageModel;
use crate::reorganize;
use repograph_core::config::{cache_dir, RepographConfig};
use repograph_core::{EntityType, RpgError, RpgResult, SemanticFeature, StructuralMetadata};
use repograph_store::{FunctionalEdgeArgs, LowLevelArgs, Rpg};
use repograph_parser::{CodeEntity, Language};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Outcome of one encode run.
#[derive(Debug, Default)]
pub struct EncodeReport {
    pub files_processed: usize,
    pub entities_extracted: usize,
    pub duration: Duration,
}

/// The encoder with its injected collaborators.
pub struct Encoder {
    root: PathBuf,
    config: RepographConfig,
    model: Option<Arc<dyn LanguageModel>>,
}

impl Encoder {
    pub fn new(root: impl Into<PathBuf>, config: RepographConfig) -> Self {
        Self {
            root: root.into(),
            config,
            model: None,
        }
    }

    pub fn with_model(mut self, model: Arc<dyn LanguageModel>) -> Self {
        self.model = Some(model);
        self
    }

    fn deadline(&self) -> Duration {
        Duration::from_millis(self.config.llm.timeout_ms)
    }

    fn build_extractor(&self) -> SemanticExtractor {
        let semantic = self.config.encoder.semantic.clone();
        let mut extractor = match (&self.model, semantic.use_llm) {
            (Some(model), true) => {
                SemanticExtractor::with_model(model.clone(), semantic, self.deadline())
            }
            _ => SemanticExtractor::heuristic(semantic),
        };
        if self.config.encoder.cache.enabled {
            let dir = self
                .config
                .encoder
                .cache
                .dir
                .clone()
                .unwrap_or_else(|| cache_dir(&self.root));
            extractor = extractor.with_cache(FeatureCache::load(&dir));
        }
        extractor
    }

    /// Run the full pipeline against the graph.
    pub async fn encode(&self, rpg: &mut Rpg) -> RpgResult<EncodeReport> {
        let started = Instant::now();
        let mut report = EncodeReport::default();

        // Phase 1: discovery. A non-existent root yields an empty result.
        let files = self.discover()?;
        if files.is_empty() {
            info!(root = %self.root.display(), "nothing to encode");
            report.duration = started.elapsed();
            return Ok(report);
        }
        info!(files = files.len(), "discovered source files");

        // Phase 2: semantic lifting. Parse in parallel, extract features in
        // token-aware batches, persist every low-level node and file→entity
        // edge before reorganization runs.
        let parsed = repograph_parser::parse_files_parallel(files.clone());
        let extractor = self.build_extractor();

        let mut all_entities: Vec<(usize, CodeEntity)> = Vec::new();
        for (file_idx, (_, result)) in parsed.iter().enumerate() {
            for error in &result.errors {
                warn!(%error, "parse error");
            }
            for entity in &result.entities {
                if ids::entity_type_of(entity.kind).is_some() {
                    all_entities.push((file_idx, entity.clone()));
                }
            }
        }

        let flat: Vec<CodeEntity> = all_entities.iter().map(|(_, e)| e.clone()).collect();
        let features = extractor.extract_batch(&flat).await?;

        for (file_idx, (path, result)) in parsed.iter().enumerate() {
            let rel = path.to_string_lossy().replace('\\', "/");
            let Some(language) = Language::from_path(&rel) else {
                continue;
            };
            let file_entities: Vec<(&CodeEntity, &SemanticFeature)> = all_entities
                .iter()
                .zip(features.iter())
                .filter(|((idx, _), _)| *idx == file_idx)
                .map(|((_, e), f)| (e, f))
                .collect();

            // File feature synthesizes direct (non-nested) children only.
            let direct: Vec<SemanticFeature> = file_entities
                .iter()
                .filter(|(e, _)| e.parent.is_none())
                .map(|(_, f)| (*f).clone())
                .collect();
            let file_name = rel.rsplit('/').next().unwrap_or(&rel);
            let file_feature =
                SemanticExtractor::aggregate_file_features(&direct, file_name, &rel);

            let file_id = ids::file_id(&rel);
            let mut metadata = StructuralMetadata::with_path(EntityType::File, &rel);
            metadata.language = Some(language.source_language());
            rpg.add_low_level_node(LowLevelArgs {
                id: file_id.clone(),
                feature: file_feature,
                metadata,
                source_code: None,
            })?;
            report.files_processed += 1;

            for (entity, feature) in &file_entities {
                let Some(id) = ids::entity_id(&rel, entity) else {
                    continue;
                };
                if rpg.has_node(&id) {
                    // Overload sets (same qualified name twice) keep the
                    // first occurrence.
                    continue;
                }
                let entity_type = ids::entity_type_of(entity.kind)
                    .expect("filtered to node-producing kinds");
                let mut metadata = StructuralMetadata::with_path(entity_type, &rel);
                metadata.qualified_name = Some(entity.qualified_name());
                metadata.language = Some(language.source_language());
                metadata.start_line = Some(entity.start_line);
                metadata.end_line = Some(entity.end_line);
                rpg.add_low_level_node(LowLevelArgs {
                    id: id.clone(),
                    feature: (*feature).clone(),
                    metadata,
                    source_code: self
                        .config
                        .encoder
                        .include_source
                        .then(|| entity.source_text.clone()),
                })?;
                rpg.add_functional_edge(FunctionalEdgeArgs {
                    source: file_id.clone(),
                    target: id,
                    level: None,
                    sibling_order: None,
                })?;
                report.entities_extracted += 1;
            }
        }
        extractor.save_cache()?;

        // Phase 3: structural reorganization. No heuristic fallback exists
        // that would satisfy the non-directory-mirroring contract.
        match &self.model {
            Some(model) => {
                reorganize::reorganize(rpg, model.as_ref(), self.deadline()).await?;
            }
            None => {
                return Err(RpgError::Config(
                    "structural reorganization requires an LLM backend; configure llm.provider \
                     and retry".into(),
                ));
            }
        }

        // Phase 4: artifact grounding.
        ground::ground(rpg)?;

        // Phase 5: dependency injection.
        inject::inject(rpg, &files, &self.config.injector)?;

        report.duration = started.elapsed();
        info!(
            files = report.files_processed,
            entities = report.entities_extracted,
            "encode complete"
        );
        Ok(report)
    }

    /// Walk the root, honoring include/exclude globs and the depth cap.
    fn discover(&self) -> RpgResult<Vec<(PathBuf, String)>> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }

        let include = build_globset(&self.config.encoder.include)?;
        let exclude = build_globset(&self.config.encoder.exclude)?;

        let walker = ignore::WalkBuilder::new(&self.root)
            .hidden(true)
            .git_ignore(true)
            .max_depth(Some(self.config.encoder.max_depth))
            .build();

        let mut files = Vec::new();
        for entry in walker.flatten() {
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let Ok(rel) = path.strip_prefix(&self.root) else {
                continue;
            };
            let rel_str = rel.to_string_lossy().replace('\\', "/");
            if Language::from_path(&rel_str).is_none() {
                continue;
            }
            if let Some(include) = &include
                && !include.is_match(rel_str.as_str())
            {
                continue;
            }
            if let Some(exclude) = &exclude
                && exclude.is_match(rel_str.as_str())
            {
                continue;
            }
            match std::fs::read_to_string(path) {
                Ok(source) => files.push((PathBuf::from(rel_str), source)),
                Err(e) => warn!(file = %path.display(), error = %e, "unreadable file skipped"),
            }
        }
        files.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(files)
    }
}

fn build_globset(patterns: &[String]) -> RpgResult<Option<globset::GlobSet>> {
    if patterns.is_empty() {
        return Ok(None);
    }
    let mut builder = globset::GlobSetBuilder::new();
    for pattern in patterns {
        let glob = globset::GlobBuilder::new(pattern)
            .literal_separator(true)
            .build()
            .map_err(|e| RpgError::Config(format!("invalid glob {pattern:?}: {e}")))?;
        builder.add(glob);
    }
    builder
        .build()
        .map(Some)
        .map_err(|e| RpgError::Config(format!("invalid glob set: {e}")))
}
