//! Node id conventions shared by the encoder, injector, and evolution.
//!
//! File nodes: `{relativePath}:file`. Entity nodes:
//! `{relativePath}:{entityType}:{qualifiedName}` — no line numbers, so
//! diffs that only shift lines still match during evolution.

use repograph_core::EntityType;
use repograph_parser::{CodeEntity, CodeEntityKind};

pub fn file_id(path: &str) -> String {
    format!("{path}:file")
}

/// Core entity type for a parser entity kind. Variables and import
/// pseudo-entities do not become graph nodes.
pub fn entity_type_of(kind: CodeEntityKind) -> Option<EntityType> {
    match kind {
        CodeEntityKind::Function => Some(EntityType::Function),
        CodeEntityKind::Class => Some(EntityType::Class),
        CodeEntityKind::Method => Some(EntityType::Method),
        CodeEntityKind::Variable | CodeEntityKind::Import => None,
    }
}

pub fn entity_id(path: &str, entity: &CodeEntity) -> Option<String> {
    let entity_type = entity_type_of(entity.kind)?;
    Some(format!(
        "{path}:{}:{}",
        entity_type.as_str(),
        entity.qualified_name()
    ))
}
