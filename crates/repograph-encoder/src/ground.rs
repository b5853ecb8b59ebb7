//! Artifact grounding: bottom-up LCA propagation of directory paths onto
//! high-level nodes.
//!
//! Leaves contribute their file's directory; each high-level node receives
//! the trie-LCA of its descendants' directories. Single LCA → `metadata.path`
//! and `entityType = module`; multiple LCAs → the lexicographically smallest
//! in `metadata.path` plus the full sorted set in `metadata.extra.paths`.
//! Idempotent and stable under permutation of the leaf set.

use repograph_core::lca::{compute_lca, dir_of};
use repograph_core::{EntityType, Node, RpgResult, EXTRA_PATHS_KEY};
use repograph_store::{NodePatch, Rpg};
use std::collections::BTreeSet;
use tracing::debug;

/// Outcome counts for one grounding pass.
#[derive(Debug, Default)]
pub struct GroundReport {
    pub grounded_nodes: usize,
}

/// Ground every hierarchy root in the graph.
pub fn ground(rpg: &mut Rpg) -> RpgResult<GroundReport> {
    let mut report = GroundReport::default();
    let roots: Vec<String> = rpg
        .roots()?
        .iter()
        .filter(|n| n.is_high_level())
        .map(|n| n.id().to_string())
        .collect();
    for root in roots {
        propagate(rpg, &root, &mut report)?;
    }
    Ok(report)
}

/// Post-order propagation; returns the set of leaf directories under `id`.
fn propagate(rpg: &mut Rpg, id: &str, report: &mut GroundReport) -> RpgResult<BTreeSet<String>> {
    let node = rpg.get_node(id)?;

    if let Node::LowLevel { metadata, .. } = &node {
        // Leaves with a missing path are skipped silently.
        return Ok(match &metadata.path {
            Some(path) if !path.is_empty() => BTreeSet::from([dir_of(path)]),
            _ => BTreeSet::new(),
        });
    }

    let children: Vec<String> = rpg
        .children(id)?
        .iter()
        .map(|c| c.id().to_string())
        .collect();
    let mut dirs = BTreeSet::new();
    for child in children {
        dirs.extend(propagate(rpg, &child, report)?);
    }

    if !dirs.is_empty() {
        let inputs: Vec<String> = dirs.iter().cloned().collect();
        let lca = compute_lca(&inputs);
        if let Some(smallest) = lca.first() {
            let mut patch = NodePatch {
                path: Some(smallest.clone()),
                entity_type: Some(EntityType::Module),
                ..NodePatch::default()
            };
            if lca.len() > 1 {
                patch
                    .extra
                    .insert(EXTRA_PATHS_KEY.to_string(), serde_json::json!(lca));
            }
            rpg.update_node(id, &patch)?;
            report.grounded_nodes += 1;
            debug!(node = id, path = %smallest, lcas = lca.len(), "grounded");
        }
    }

    Ok(dirs)
}
