//! FetchNode: precise node retrieval with source and ancestry context.

use repograph_core::{Node, RpgError, RpgResult};
use repograph_store::Rpg;

/// Ids to fetch, split by family the way tool callers address them.
#[derive(Debug, Clone, Default)]
pub struct FetchRequest {
    pub code_entities: Vec<String>,
    pub feature_entities: Vec<String>,
}

/// One fetched node with its context.
#[derive(Debug, Clone)]
pub struct FetchedNode {
    pub node: Node,
    /// Stored source snippet, when the node carries one.
    pub source: Option<String>,
    /// Functional ancestry as one string: `root / … / node`.
    pub ancestry: String,
}

/// Fetch outcome; unresolved ids land in `not_found`.
#[derive(Debug, Clone, Default)]
pub struct FetchOutcome {
    pub nodes: Vec<FetchedNode>,
    pub not_found: Vec<String>,
}

/// The FetchNode tool.
pub struct FetchNode;

impl FetchNode {
    pub fn get(rpg: &Rpg, request: &FetchRequest) -> RpgResult<FetchOutcome> {
        let mut outcome = FetchOutcome::default();
        for id in request
            .code_entities
            .iter()
            .chain(request.feature_entities.iter())
        {
            match Self::fetch_one(rpg, id) {
                Ok(fetched) => outcome.nodes.push(fetched),
                Err(RpgError::NotFound(_)) => outcome.not_found.push(id.clone()),
                Err(e) => return Err(e),
            }
        }
        Ok(outcome)
    }

    fn fetch_one(rpg: &Rpg, id: &str) -> RpgResult<FetchedNode> {
        let node = rpg.get_node(id)?;
        let ancestry = rpg
            .ancestry(id)?
            .iter()
            .map(|n| n.id().to_string())
            .collect::<Vec<_>>()
            .join(" / ");
        let source = node.source_code().map(str::to_string);
        Ok(FetchedNode {
            node,
            source,
            ancestry,
        })
    }
}
