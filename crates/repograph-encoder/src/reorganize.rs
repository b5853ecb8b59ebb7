//! Structural reorganization: Domain Discovery and Hierarchical Construction.
//!
//! Consumes only file-level features (granularity-based compression), asks
//! the LLM for functional areas and exactly-three-level semantic paths, and
//! replaces any directory-mirroring hierarchy with the result. There is no
//! heuristic fallback here: without an LLM this phase is a configuration
//! error.

use crate::llm::{complete_and_parse, CompletionRequest, LanguageModel};
use repograph_core::{EntityType, RpgError, RpgResult, SemanticFeature};
use repograph_store::{FunctionalEdgeArgs, NodeFilter, Rpg};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{info, warn};

pub const DOMAIN_DISCOVERY_SYSTEM: &str = include_str!("prompts/domain_discovery.md");
pub const HIERARCHY_CONSTRUCTION_SYSTEM: &str = include_str!("prompts/hierarchy_construction.md");

/// Id of the synthetic bucket for files no assignment covers.
pub const UNCATEGORIZED_ID: &str = "domain:Uncategorized";

/// One file's feature summary inside a group.
#[derive(Debug, Clone)]
pub struct FileFeature {
    pub file_id: String,
    pub file_path: String,
    pub description: String,
    pub keywords: Vec<String>,
}

/// Files grouped by top-level directory.
#[derive(Debug, Clone)]
pub struct FileFeatureGroup {
    pub label: String,
    pub files: Vec<FileFeature>,
}

/// Outcome counts for one reorganization pass.
#[derive(Debug, Default)]
pub struct ReorganizeReport {
    pub areas: Vec<String>,
    pub chains_created: usize,
    pub files_linked: usize,
    pub files_uncategorized: usize,
    pub llm_calls: usize,
}

/// Group file-level low-level nodes by their top-level directory.
pub fn group_files_by_top_dir(rpg: &Rpg) -> RpgResult<Vec<FileFeatureGroup>> {
    let files = rpg.nodes(&NodeFilter {
        high_level: Some(false),
        entity_type: Some(EntityType::File),
        ..NodeFilter::default()
    })?;

    let mut groups: BTreeMap<String, Vec<FileFeature>> = BTreeMap::new();
    for node in files {
        let Some(path) = node.metadata().and_then(|m| m.path.clone()) else {
            continue;
        };
        let label = path.split('/').next().unwrap_or(&path).to_string();
        let feature = node.feature();
        groups.entry(label).or_default().push(FileFeature {
            file_id: node.id().to_string(),
            file_path: path,
            description: feature.description.clone(),
            keywords: feature.keywords.clone(),
        });
    }

    Ok(groups
        .into_iter()
        .map(|(label, files)| FileFeatureGroup { label, files })
        .collect())
}

fn render_groups(groups: &[FileFeatureGroup]) -> String {
    let mut out = String::new();
    for group in groups {
        out.push_str(&format!("## group: {}\n", group.label));
        for file in &group.files {
            out.push_str(&format!(
                "- {}: {} [{}]\n",
                file.file_path,
                file.description,
                file.keywords.join(", ")
            ));
        }
        out.push('\n');
    }
    out
}

/// Normalize a candidate area name to PascalCase.
fn pascal_case(name: &str) -> String {
    name.split(|c: char| !c.is_alphanumeric())
        .filter(|s| !s.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect()
}

/// Ask for an ordered list of PascalCase functional-area names.
/// The shared parser re-asks once on unparseable output; an empty list after
/// validation is re-asked once more, then fatal.
pub async fn discover_domains(
    model: &dyn LanguageModel,
    groups: &[FileFeatureGroup],
    deadline: Duration,
    report: &mut ReorganizeReport,
) -> RpgResult<Vec<String>> {
    let user = format!(
        "### File groups (by top-level directory)\n\n{}",
        render_groups(groups)
    );

    for attempt in 0..2 {
        report.llm_calls += 1;
        let raw: Vec<String> = complete_and_parse(
            model,
            CompletionRequest::new(DOMAIN_DISCOVERY_SYSTEM, &user).with_deadline(deadline),
        )
        .await?;

        let mut areas: Vec<String> = Vec::new();
        for name in raw {
            let normalized = pascal_case(&name);
            if !normalized.is_empty() && !areas.contains(&normalized) {
                areas.push(normalized);
            }
        }
        if !areas.is_empty() {
            return Ok(areas);
        }
        if attempt == 0 {
            warn!("domain discovery returned no valid areas, re-asking");
        }
    }
    Err(RpgError::Llm(
        "domain discovery produced no valid functional areas after retry".into(),
    ))
}

/// Validate a hierarchical-construction response: every key must have
/// exactly three `/`-separated segments with lowercase category and
/// subcategory.
fn validate_assignments(
    assignments: &BTreeMap<String, Vec<String>>,
) -> Result<(), String> {
    if assignments.is_empty() {
        return Err("assignment map is empty".into());
    }
    for path in assignments.keys() {
        let segments: Vec<&str> = path.split('/').collect();
        if segments.len() != 3 {
            return Err(format!("path {path:?} does not have exactly three levels"));
        }
        for segment in &segments[1..] {
            if segment.is_empty() || segment.chars().any(|c| c.is_uppercase()) {
                return Err(format!(
                    "category segment {segment:?} in {path:?} must be lowercase"
                ));
            }
        }
    }
    Ok(())
}

/// Ask for the mapping from three-level semantic paths to group labels.
/// One corrective re-ask on violation; the second violation is a
/// `Validation` error.
pub async fn construct_hierarchy(
    model: &dyn LanguageModel,
    areas: &[String],
    groups: &[FileFeatureGroup],
    deadline: Duration,
    report: &mut ReorganizeReport,
) -> RpgResult<BTreeMap<String, Vec<String>>> {
    let base_user = format!(
        "### Functional areas\n{}\n\n### File groups\n\n{}",
        areas.join(", "),
        render_groups(groups)
    );

    let mut correction: Option<String> = None;
    for _ in 0..2 {
        let user = match &correction {
            Some(problem) => format!(
                "{base_user}\n\nYour previous assignment was invalid: {problem}. \
                 Every key must have EXACTLY three `/`-separated levels \
                 `Area/category/subcategory` with lowercase verb+object categories."
            ),
            None => base_user.clone(),
        };
        report.llm_calls += 1;
        let assignments: BTreeMap<String, Vec<String>> = complete_and_parse(
            model,
            CompletionRequest::new(HIERARCHY_CONSTRUCTION_SYSTEM, &user).with_deadline(deadline),
        )
        .await?;

        match validate_assignments(&assignments) {
            Ok(()) => return Ok(assignments),
            Err(problem) => {
                warn!(%problem, "hierarchical construction violated path rules");
                correction = Some(problem);
            }
        }
    }
    Err(RpgError::Validation(
        "hierarchical construction produced non-three-level paths after retry".into(),
    ))
}

/// Materialize the assignments: chain nodes, functional edges, and
/// subcategory→file links. Unassigned files land under `Uncategorized`.
pub fn apply_assignments(
    rpg: &mut Rpg,
    assignments: &BTreeMap<String, Vec<String>>,
    groups: &[FileFeatureGroup],
    report: &mut ReorganizeReport,
) -> RpgResult<()> {
    let by_label: BTreeMap<&str, &FileFeatureGroup> =
        groups.iter().map(|g| (g.label.as_str(), g)).collect();
    let mut assigned_labels: Vec<&str> = Vec::new();

    for (path, labels) in assignments {
        let segments: Vec<&str> = path.split('/').collect();
        let [area, category, subcategory] = segments[..] else {
            continue;
        };

        let area_id = format!("domain:{area}");
        let category_id = format!("domain:{area}/{category}");
        let subcategory_id = format!("domain:{area}/{category}/{subcategory}");

        rpg.ensure_high_level_node(&area_id, area_feature(area))?;
        rpg.ensure_high_level_node(&category_id, SemanticFeature::new(category).normalized())?;
        rpg.ensure_high_level_node(
            &subcategory_id,
            SemanticFeature::new(subcategory).normalized(),
        )?;
        link(rpg, &area_id, &category_id, 1)?;
        link(rpg, &category_id, &subcategory_id, 2)?;
        report.chains_created += 1;

        for label in labels {
            let Some(group) = by_label.get(label.as_str()) else {
                warn!(label = %label, "assignment references an unknown group label");
                continue;
            };
            assigned_labels.push(group.label.as_str());
            for file in &group.files {
                if link(rpg, &subcategory_id, &file.file_id, 3)? {
                    report.files_linked += 1;
                }
            }
        }
    }

    // Synthetic bucket for everything the assignments missed.
    for group in groups {
        if assigned_labels.contains(&group.label.as_str()) {
            continue;
        }
        for file in &group.files {
            if rpg.parent(&file.file_id)?.is_some() {
                continue;
            }
            rpg.ensure_high_level_node(
                UNCATEGORIZED_ID,
                SemanticFeature::new("collect unassigned files"),
            )?;
            if link(rpg, UNCATEGORIZED_ID, &file.file_id, 1)? {
                report.files_uncategorized += 1;
            }
        }
    }

    Ok(())
}

fn link(rpg: &mut Rpg, source: &str, target: &str, level: u32) -> RpgResult<bool> {
    rpg.add_functional_edge(FunctionalEdgeArgs {
        source: source.to_string(),
        target: target.to_string(),
        level: Some(level),
        sibling_order: None,
    })
}

fn area_feature(area: &str) -> SemanticFeature {
    let words = crate::extract::split_identifier(area).join(" ");
    SemanticFeature::with_keywords(
        format!("provide {words} capabilities"),
        crate::extract::split_identifier(area),
    )
    .normalized()
}

/// Run the full reorganization: discovery, construction, application.
pub async fn reorganize(
    rpg: &mut Rpg,
    model: &dyn LanguageModel,
    deadline: Duration,
) -> RpgResult<ReorganizeReport> {
    let mut report = ReorganizeReport::default();
    let groups = group_files_by_top_dir(rpg)?;
    if groups.is_empty() {
        info!("no file-level nodes to reorganize");
        return Ok(report);
    }

    let areas = discover_domains(model, &groups, deadline, &mut report).await?;
    info!(areas = ?areas, "discovered functional areas");
    let assignments = construct_hierarchy(model, &areas, &groups, deadline, &mut report).await?;
    apply_assignments(rpg, &assignments, &groups, &mut report)?;
    report.areas = areas;
    Ok(report)
}
