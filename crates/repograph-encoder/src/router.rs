//! Semantic router: descend the high-level hierarchy to find the best parent
//! for a feature. Used by reorganization repairs and by evolution inserts.

use crate::embeddings::{cosine_similarity, Embedder};
use crate::llm::{complete_and_parse, CompletionRequest, LanguageModel};
use repograph_core::{Node, RpgResult, SemanticFeature};
use repograph_store::Rpg;
use std::time::Duration;
use tracing::debug;

const BEST_PARENT_SYSTEM: &str = include_str!("prompts/best_parent.md");

/// Minimum cosine similarity for the embedding fallback to descend.
const EMBED_DESCEND_THRESHOLD: f32 = 0.5;
/// Minimum keyword overlap for the keyword fallback to descend.
const KEYWORD_DESCEND_THRESHOLD: f64 = 0.1;

/// Routing backends, in preference order: LLM, then embeddings, then
/// keyword overlap.
pub struct SemanticRouter<'a> {
    pub model: Option<&'a dyn LanguageModel>,
    pub embedder: Option<&'a dyn Embedder>,
    pub deadline: Duration,
}

impl<'a> SemanticRouter<'a> {
    pub fn new(
        model: Option<&'a dyn LanguageModel>,
        embedder: Option<&'a dyn Embedder>,
        deadline: Duration,
    ) -> Self {
        Self {
            model,
            embedder,
            deadline,
        }
    }

    /// Descend from `root`, considering only high-level children at each
    /// step. Returns the id of the node under which the feature belongs;
    /// when no child is compatible, that is the current node.
    pub async fn find_best_parent(
        &self,
        rpg: &Rpg,
        feature: &SemanticFeature,
        root: &str,
    ) -> RpgResult<String> {
        let mut current = root.to_string();
        loop {
            let children: Vec<Node> = rpg
                .children(&current)?
                .into_iter()
                .filter(|n| n.is_high_level())
                .collect();
            if children.is_empty() {
                return Ok(current);
            }

            let choice = match self.choose_child(feature, &children).await {
                Some(id) => id,
                None => return Ok(current),
            };
            debug!(from = %current, to = %choice, "router descending");
            current = choice;
        }
    }

    /// Route across a multi-root hierarchy: choose the best root the same
    /// way a child is chosen, then descend. `None` when no root fits.
    pub async fn route_from_roots(
        &self,
        rpg: &Rpg,
        feature: &SemanticFeature,
        roots: &[Node],
    ) -> RpgResult<Option<String>> {
        let high_roots: Vec<Node> = roots.iter().filter(|n| n.is_high_level()).cloned().collect();
        if high_roots.is_empty() {
            return Ok(None);
        }
        let Some(chosen) = self.choose_child(feature, &high_roots).await else {
            return Ok(None);
        };
        Ok(Some(self.find_best_parent(rpg, feature, &chosen).await?))
    }

    async fn choose_child(&self, feature: &SemanticFeature, children: &[Node]) -> Option<String> {
        if let Some(model) = self.model {
            match self.ask_model(model, feature, children).await {
                Ok(choice) => return choice,
                Err(e) => {
                    debug!(error = %e, "llm routing failed, using similarity fallback");
                }
            }
        }
        self.similarity_choice(feature, children).await
    }

    async fn ask_model(
        &self,
        model: &dyn LanguageModel,
        feature: &SemanticFeature,
        children: &[Node],
    ) -> RpgResult<Option<String>> {
        let mut user = format!(
            "### Entity feature\n{} [{}]\n\n### Candidate children\n",
            feature.description,
            feature.keywords.join(", ")
        );
        for child in children {
            user.push_str(&format!(
                "- {}: {}\n",
                child.id(),
                child.feature().description
            ));
        }

        let answer: String = complete_and_parse(
            model,
            CompletionRequest::new(BEST_PARENT_SYSTEM, &user).with_deadline(self.deadline),
        )
        .await?;
        let answer = answer.trim();
        if answer.eq_ignore_ascii_case("none") {
            return Ok(None);
        }
        // Only accept ids that actually name a candidate.
        Ok(children
            .iter()
            .find(|c| c.id() == answer)
            .map(|c| c.id().to_string()))
    }

    /// Cosine similarity over feature embeddings when an embedder is
    /// available; keyword overlap otherwise.
    async fn similarity_choice(
        &self,
        feature: &SemanticFeature,
        children: &[Node],
    ) -> Option<String> {
        if let Some(embedder) = self.embedder {
            let mut texts = vec![feature_text(feature)];
            texts.extend(children.iter().map(|c| feature_text(c.feature())));
            if let Ok(vectors) = embedder.embed(&texts, self.deadline).await
                && vectors.len() == children.len() + 1
            {
                let target = &vectors[0];
                let best = children
                    .iter()
                    .zip(vectors[1..].iter())
                    .map(|(child, v)| (child, cosine_similarity(target, v)))
                    .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
                if let Some((child, score)) = best
                    && score >= EMBED_DESCEND_THRESHOLD
                {
                    return Some(child.id().to_string());
                }
                return None;
            }
        }

        let target = feature.keyword_set();
        let best = children
            .iter()
            .map(|child| {
                let child_set = child.feature().keyword_set();
                let intersection = target.intersection(&child_set).count() as f64;
                let union = target.union(&child_set).count() as f64;
                let score = if union == 0.0 { 0.0 } else { intersection / union };
                (child, score)
            })
            .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
        match best {
            Some((child, score)) if score >= KEYWORD_DESCEND_THRESHOLD => {
                Some(child.id().to_string())
            }
            _ => None,
        }
    }
}

fn feature_text(feature: &SemanticFeature) -> String {
    if feature.keywords.is_empty() {
        feature.description.clone()
    } else {
        format!("{} ({})", feature.description, feature.keywords.join(", "))
    }
}
