//! SearchNode: intent-based node discovery with staged-fallback auto mode.

use repograph_core::{Node, RpgResult};
use repograph_store::Rpg;
use std::collections::HashSet;
use tracing::debug;

/// Search mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SearchMode {
    /// Match feature descriptions and keywords.
    Features,
    /// Match grounded paths by glob.
    Snippets,
    /// Feature search first; snippet search only when it returns nothing.
    #[default]
    Auto,
}

/// Query options.
#[derive(Debug, Clone, Default)]
pub struct SearchOptions {
    pub mode: SearchMode,
    /// One feature query per term.
    pub feature_terms: Vec<String>,
    /// Subtree roots restricting feature-search candidates.
    pub search_scopes: Vec<String>,
    /// Path glob for snippet search (`*` = one segment, `**` = any number).
    pub file_pattern: Option<String>,
    /// Keep only nodes overlapping this 1-indexed inclusive line range.
    pub line_range: Option<(usize, usize)>,
    /// Maximum results; zero means unlimited.
    pub limit: usize,
}

/// One search hit. Score is zero for snippet hits.
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub node: Node,
    pub score: f64,
}

/// Search outcome, deduplicated by id in first-seen order.
#[derive(Debug, Clone, Default)]
pub struct SearchOutcome {
    pub hits: Vec<SearchHit>,
    /// Whether auto mode fell back to snippet search.
    pub used_snippet_fallback: bool,
}

/// The SearchNode tool.
pub struct SearchNode;

impl SearchNode {
    pub fn query(rpg: &Rpg, options: &SearchOptions) -> RpgResult<SearchOutcome> {
        let mut outcome = SearchOutcome::default();
        let mut seen: HashSet<String> = HashSet::new();

        match options.mode {
            SearchMode::Features => {
                Self::feature_search(rpg, options, &mut outcome, &mut seen)?;
            }
            SearchMode::Snippets => {
                Self::snippet_search(rpg, options, &mut outcome, &mut seen)?;
            }
            SearchMode::Auto => {
                // Staged fallback: snippet search runs only when feature
                // search yields nothing and a pattern exists to run it with.
                Self::feature_search(rpg, options, &mut outcome, &mut seen)?;
                if outcome.hits.is_empty() && options.file_pattern.is_some() {
                    debug!("auto mode: feature search empty, falling back to snippets");
                    outcome.used_snippet_fallback = true;
                    Self::snippet_search(rpg, options, &mut outcome, &mut seen)?;
                }
            }
        }

        if let Some((start, end)) = options.line_range {
            outcome.hits.retain(|hit| {
                let meta = hit.node.metadata();
                let node_start = meta.and_then(|m| m.start_line);
                let node_end = meta.and_then(|m| m.end_line);
                match (node_start, node_end) {
                    (Some(s), Some(e)) => e >= start && s <= end,
                    // Nodes without line spans (files, high-level) pass.
                    _ => true,
                }
            });
        }
        if options.limit > 0 {
            outcome.hits.truncate(options.limit);
        }
        Ok(outcome)
    }

    /// One store query per term; results merge in term order.
    fn feature_search(
        rpg: &Rpg,
        options: &SearchOptions,
        outcome: &mut SearchOutcome,
        seen: &mut HashSet<String>,
    ) -> RpgResult<()> {
        for term in &options.feature_terms {
            for scored in rpg.search_by_feature(term, &options.search_scopes)? {
                if seen.insert(scored.node.id().to_string()) {
                    outcome.hits.push(SearchHit {
                        node: scored.node,
                        score: scored.score,
                    });
                }
            }
        }
        Ok(())
    }

    fn snippet_search(
        rpg: &Rpg,
        options: &SearchOptions,
        outcome: &mut SearchOutcome,
        seen: &mut HashSet<String>,
    ) -> RpgResult<()> {
        let Some(pattern) = &options.file_pattern else {
            return Ok(());
        };
        for node in rpg.search_by_path(pattern)? {
            if seen.insert(node.id().to_string()) {
                outcome.hits.push(SearchHit { node, score: 0.0 });
            }
        }
        Ok(())
    }
}
