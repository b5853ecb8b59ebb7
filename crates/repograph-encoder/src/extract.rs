//! Semantic extraction: one behavioral feature per code entity.
//!
//! Two operating modes share one surface: LLM-backed (pipe-delimited line
//! responses, resilient to partial corruption) and heuristic (name-derived
//! verb+object). Batches are token-aware and suspend once per batch, not per
//! entity.

use crate::cache::FeatureCache;
use crate::llm::{CompletionRequest, LanguageModel};
use futures::stream::{self, StreamExt};
use repograph_core::config::SemanticConfig;
use repograph_core::{RpgResult, SemanticFeature};
use repograph_parser::{CodeEntity, CodeEntityKind};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, warn};

/// System prompt enforcing the feature naming rules.
pub const SEMANTIC_PARSING_SYSTEM: &str = include_str!("prompts/semantic_parsing.md");

/// Fixed per-entity token overhead on top of source bytes.
const PER_ENTITY_OVERHEAD: usize = 16;

/// Semantic feature extractor over an optional LLM backend.
pub struct SemanticExtractor {
    model: Option<Arc<dyn LanguageModel>>,
    cache: Option<Mutex<FeatureCache>>,
    config: SemanticConfig,
    deadline: Duration,
}

impl SemanticExtractor {
    /// Heuristic-only extractor (no LLM configured).
    pub fn heuristic(config: SemanticConfig) -> Self {
        Self {
            model: None,
            cache: None,
            config,
            deadline: Duration::from_secs(60),
        }
    }

    pub fn with_model(
        model: Arc<dyn LanguageModel>,
        config: SemanticConfig,
        deadline: Duration,
    ) -> Self {
        Self {
            model: Some(model),
            cache: None,
            config,
            deadline,
        }
    }

    pub fn with_cache(mut self, cache: FeatureCache) -> Self {
        self.cache = Some(Mutex::new(cache));
        self
    }

    pub fn has_model(&self) -> bool {
        self.model.is_some()
    }

    /// Extract a feature for a single entity.
    pub async fn extract(&self, entity: &CodeEntity) -> SemanticFeature {
        let mut features = self
            .extract_batch(std::slice::from_ref(entity))
            .await
            .unwrap_or_default();
        features
            .pop()
            .unwrap_or_else(|| heuristic_feature(entity))
    }

    /// Extract features for all entities, preserving input order. One LLM
    /// suspension per token-aware batch; bounded concurrent batches.
    pub async fn extract_batch(&self, entities: &[CodeEntity]) -> RpgResult<Vec<SemanticFeature>> {
        if entities.is_empty() {
            return Ok(Vec::new());
        }

        let ranges = partition_batches(
            entities,
            self.config.min_batch_tokens,
            self.config.max_batch_tokens,
        );
        debug!(entities = entities.len(), batches = ranges.len(), "token-aware batching");

        let batch_results: Vec<Vec<SemanticFeature>> = stream::iter(ranges)
            .map(|(start, end)| {
                let slice = &entities[start..end];
                async move { self.features_for_batch(slice).await }
            })
            .buffered(self.config.max_in_flight.max(1))
            .collect()
            .await;

        let mut out = Vec::with_capacity(entities.len());
        for batch in batch_results {
            out.extend(batch);
        }
        Ok(out)
    }

    /// Synthesize a file-level feature from its direct (non-nested) children.
    /// The result describes what the children collectively do, not the file
    /// name; an empty child list falls back to a name-derived default.
    pub fn aggregate_file_features(
        children: &[SemanticFeature],
        file_name: &str,
        _file_path: &str,
    ) -> SemanticFeature {
        if children.is_empty() {
            let stem = file_name.rsplit_once('.').map_or(file_name, |(s, _)| s);
            let words = split_identifier(stem).join(" ");
            return SemanticFeature::new(format!("provide {words} helpers")).normalized();
        }

        // Most frequent leading verb + most frequent object tokens.
        let mut verb_counts: HashMap<&str, usize> = HashMap::new();
        let mut token_counts: HashMap<String, usize> = HashMap::new();
        let mut order: Vec<String> = Vec::new();
        for child in children {
            if let Some(verb) = child.description.split_whitespace().next() {
                *verb_counts.entry(verb).or_insert(0) += 1;
            }
            for token in child.description.split_whitespace().skip(1) {
                let token = token.to_string();
                if !token_counts.contains_key(&token) {
                    order.push(token.clone());
                }
                *token_counts.entry(token).or_insert(0) += 1;
            }
        }
        let mut ranked_verbs: Vec<(&str, usize)> = verb_counts.into_iter().collect();
        ranked_verbs.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        let verb = ranked_verbs
            .first()
            .map(|(v, _)| v.to_string())
            .unwrap_or_else(|| "provide".to_string());
        let mut objects: Vec<&String> = order
            .iter()
            .filter(|t| **t != verb)
            .collect();
        objects.sort_by_key(|t| std::cmp::Reverse(token_counts[*t]));
        let object = objects
            .iter()
            .take(3)
            .map(|s| s.as_str())
            .collect::<Vec<_>>()
            .join(" ");

        let mut keywords: Vec<String> = Vec::new();
        for child in children {
            for kw in &child.keywords {
                if !keywords.contains(kw) {
                    keywords.push(kw.clone());
                }
            }
        }

        let mut sub_features: Vec<String> = Vec::new();
        for child in children {
            if !child.description.is_empty() && !sub_features.contains(&child.description) {
                sub_features.push(child.description.clone());
            }
        }

        let mut feature = SemanticFeature {
            description: if object.is_empty() {
                verb
            } else {
                format!("{verb} {object}")
            },
            keywords,
            sub_features,
        };
        feature.normalize();
        feature
    }

    /// Persist the cache at an explicit save point.
    pub fn save_cache(&self) -> RpgResult<()> {
        if let Some(cache) = &self.cache {
            cache
                .lock()
                .expect("cache lock poisoned")
                .save()?;
        }
        Ok(())
    }

    /// Drop cache entries for a file touched by a commit delta.
    pub fn invalidate_cached_file(&self, file_path: &str) {
        if let Some(cache) = &self.cache {
            cache
                .lock()
                .expect("cache lock poisoned")
                .invalidate_file(file_path);
        }
    }

    async fn features_for_batch(&self, entities: &[CodeEntity]) -> Vec<SemanticFeature> {
        // Read-through cache: only uncached entities reach the LLM.
        let mut resolved: Vec<Option<SemanticFeature>> = vec![None; entities.len()];
        if let Some(cache) = &self.cache {
            let cache = cache.lock().expect("cache lock poisoned");
            for (i, entity) in entities.iter().enumerate() {
                resolved[i] = cache.get(
                    &entity.file.display().to_string(),
                    &entity.qualified_name(),
                    &entity.source_text,
                );
            }
        }

        let pending: Vec<usize> = (0..entities.len()).filter(|i| resolved[*i].is_none()).collect();

        if !pending.is_empty() {
            let extracted = match &self.model {
                Some(model) => {
                    let subset: Vec<&CodeEntity> = pending.iter().map(|&i| &entities[i]).collect();
                    self.llm_batch(model.as_ref(), &subset).await
                }
                None => HashMap::new(),
            };

            let mut cache_guard = self
                .cache
                .as_ref()
                .map(|c| c.lock().expect("cache lock poisoned"));
            for &i in &pending {
                let entity = &entities[i];
                let feature = extracted
                    .get(&entity.qualified_name())
                    .cloned()
                    .filter(|f| !f.description.is_empty())
                    .unwrap_or_else(|| heuristic_feature(entity));
                if let Some(cache) = cache_guard.as_deref_mut() {
                    cache.set(
                        &entity.file.display().to_string(),
                        &entity.qualified_name(),
                        &entity.source_text,
                        feature.clone(),
                    );
                }
                resolved[i] = Some(feature);
            }
        }

        resolved
            .into_iter()
            .map(|f| f.expect("every entity resolved"))
            .collect()
    }

    /// One suspension for the whole batch. On an unparseable response, retry
    /// once with a corrective suffix; entities still missing fall back to the
    /// heuristic in the caller.
    async fn llm_batch(
        &self,
        model: &dyn LanguageModel,
        entities: &[&CodeEntity],
    ) -> HashMap<String, SemanticFeature> {
        let prompt = build_batch_prompt(entities);
        let request = CompletionRequest::new(SEMANTIC_PARSING_SYSTEM, &prompt)
            .with_deadline(self.deadline);

        let mut features = match model.complete(request).await {
            Ok(response) => parse_line_features(&response),
            Err(e) => {
                warn!(error = %e, "llm batch failed; falling back to heuristic features");
                return HashMap::new();
            }
        };

        if features.is_empty() {
            let corrective = format!(
                "{prompt}\n\nYour previous response could not be parsed. Output ONLY \
                 pipe-delimited lines in the format `qualified_name | description | keywords`."
            );
            let retry = CompletionRequest::new(SEMANTIC_PARSING_SYSTEM, &corrective)
                .with_deadline(self.deadline);
            match model.complete(retry).await {
                Ok(response) => features = parse_line_features(&response),
                Err(e) => {
                    warn!(error = %e, "llm batch retry failed");
                }
            }
        }

        features
    }
}

/// Estimate the token cost of one entity: ~1 token per 4 bytes of source
/// plus a fixed overhead.
pub fn estimate_tokens(entity: &CodeEntity) -> usize {
    entity.source_text.len() / 4 + PER_ENTITY_OVERHEAD
}

/// Partition entities into contiguous token-aware batches.
///
/// - Empty input yields no batches.
/// - An entity exceeding `max_tokens` on its own is placed alone.
/// - Entities append to the current batch in input order while within budget.
/// - A final batch below `min_tokens` merges into its predecessor when the
///   combined size stays within `max_tokens`; otherwise it stays separate.
pub fn partition_batches(
    entities: &[CodeEntity],
    min_tokens: usize,
    max_tokens: usize,
) -> Vec<(usize, usize)> {
    let mut batches: Vec<(usize, usize)> = Vec::new();
    let mut sizes: Vec<usize> = Vec::new();
    let mut start = 0;
    let mut tokens = 0usize;

    for (i, entity) in entities.iter().enumerate() {
        let est = estimate_tokens(entity);
        if est > max_tokens {
            if i > start {
                batches.push((start, i));
                sizes.push(tokens);
            }
            batches.push((i, i + 1));
            sizes.push(est);
            start = i + 1;
            tokens = 0;
            continue;
        }
        if i > start && tokens + est > max_tokens {
            batches.push((start, i));
            sizes.push(tokens);
            start = i;
            tokens = 0;
        }
        tokens += est;
    }
    if start < entities.len() {
        batches.push((start, entities.len()));
        sizes.push(tokens);
    }

    // Merge an undersized final batch into its predecessor when it fits.
    if batches.len() >= 2 {
        let last = batches.len() - 1;
        let prev = last - 1;
        let contiguous = batches[prev].1 == batches[last].0;
        if contiguous
            && sizes[last] < min_tokens
            && sizes[prev] + sizes[last] <= max_tokens
        {
            batches[prev].1 = batches[last].1;
            batches.pop();
        }
    }

    batches
}

fn build_batch_prompt(entities: &[&CodeEntity]) -> String {
    let mut prompt = String::from("### Code to Analyze\n\n");
    for entity in entities {
        prompt.push_str(&format!(
            "#### {} ({:?}) in {}\n```\n{}\n```\n\n",
            entity.qualified_name(),
            entity.kind,
            entity.file.display(),
            entity.source_text
        ));
    }
    prompt
}

/// Parse pipe-delimited feature lines:
/// `qualified_name | description | keyword1, keyword2`.
/// Partial corruption only loses individual lines, never the whole batch.
pub fn parse_line_features(text: &str) -> HashMap<String, SemanticFeature> {
    let text = crate::llm::strip_think_blocks(text);
    let mut features = HashMap::new();

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with("```") {
            continue;
        }
        if !line.contains('|') {
            continue;
        }
        let mut parts = line.splitn(3, '|');
        let name = parts.next().unwrap_or("").trim().to_string();
        if name.is_empty() {
            continue;
        }
        let description = parts.next().unwrap_or("").trim().to_string();
        let keywords: Vec<String> = parts
            .next()
            .unwrap_or("")
            .split(',')
            .map(|k| k.trim().to_lowercase())
            .filter(|k| !k.is_empty())
            .collect();

        let feature = SemanticFeature {
            description,
            keywords,
            sub_features: Vec::new(),
        }
        .normalized();
        features.insert(name, feature);
    }

    features
}

const VERB_PREFIXES: &[(&str, &str)] = &[
    ("get", "get"),
    ("fetch", "fetch"),
    ("load", "load"),
    ("read", "read"),
    ("parse", "parse"),
    ("build", "build"),
    ("make", "create"),
    ("create", "create"),
    ("new", "create"),
    ("init", "initialize"),
    ("setup", "initialize"),
    ("is", "check"),
    ("has", "check"),
    ("can", "check"),
    ("should", "check"),
    ("validate", "validate"),
    ("verify", "verify"),
    ("check", "check"),
    ("compute", "compute"),
    ("calc", "calculate"),
    ("calculate", "calculate"),
    ("handle", "handle"),
    ("process", "process"),
    ("render", "render"),
    ("format", "format"),
    ("save", "save"),
    ("write", "write"),
    ("store", "store"),
    ("send", "send"),
    ("emit", "emit"),
    ("recv", "receive"),
    ("receive", "receive"),
    ("update", "update"),
    ("set", "set"),
    ("delete", "delete"),
    ("remove", "remove"),
    ("drop", "remove"),
    ("find", "find"),
    ("search", "search"),
    ("list", "list"),
    ("apply", "apply"),
    ("run", "run"),
    ("exec", "execute"),
    ("convert", "convert"),
    ("to", "convert"),
    ("merge", "merge"),
    ("split", "split"),
    ("resolve", "resolve"),
    ("extract", "extract"),
];

/// Name-derived verb+object feature: split camel/snake case, map known verb
/// prefixes, and fall back to a kind-based verb.
pub fn heuristic_feature(entity: &CodeEntity) -> SemanticFeature {
    let words = split_identifier(&entity.name);
    let mut keywords: Vec<String> = words.clone();
    if let Some(parent) = &entity.parent {
        keywords.extend(split_identifier(parent));
    }

    let description = match entity.kind {
        CodeEntityKind::Class => format!("model {}", words.join(" ")),
        _ => {
            let first = words.first().map(String::as_str).unwrap_or("");
            match VERB_PREFIXES.iter().find(|(p, _)| *p == first) {
                Some((_, verb)) => {
                    let rest = words[1..].join(" ");
                    if rest.is_empty() {
                        format!("{verb} {}", entity.parent.as_deref().map(|p| split_identifier(p).join(" ")).unwrap_or_else(|| "value".into()))
                    } else {
                        format!("{verb} {rest}")
                    }
                }
                None => format!("perform {}", words.join(" ")),
            }
        }
    };

    SemanticFeature {
        description,
        keywords,
        sub_features: Vec::new(),
    }
    .normalized()
}

/// Split `camelCase`, `PascalCase`, and `snake_case` identifiers into
/// lowercase words.
pub fn split_identifier(name: &str) -> Vec<String> {
    let mut words = Vec::new();
    for chunk in name.split(['_', '-', '.']) {
        let mut current = String::new();
        let chars: Vec<char> = chunk.chars().collect();
        for (i, &c) in chars.iter().enumerate() {
            let boundary = c.is_uppercase()
                && i > 0
                && (chars[i - 1].is_lowercase()
                    || chars.get(i + 1).is_some_and(|n| n.is_lowercase()));
            if boundary && !current.is_empty() {
                words.push(current.to_lowercase());
                current = String::new();
            }
            current.push(c);
        }
        if !current.is_empty() {
            words.push(current.to_lowercase());
        }
    }
    words.retain(|w| !w.is_empty());
    words
}
