//! Error taxonomy for the RPG engine.
//!
//! Every public operation surfaces one of these variants. Each carries a
//! human-readable message and maps to a stable machine code via [`RpgError::code`],
//! so callers (CLIs, tool transports) can report `code + one-line message`
//! while details stay in logs.

use thiserror::Error;

/// Result alias used across the workspace.
pub type RpgResult<T> = Result<T, RpgError>;

/// Errors produced by RPG operations.
#[derive(Debug, Error)]
pub enum RpgError {
    /// Invalid or missing configuration (e.g. reorganization without an LLM).
    /// Fatal at phase entry.
    #[error("configuration error: {0}")]
    Config(String),

    /// A graph id, file path, or entity is not present.
    #[error("not found: {0}")]
    NotFound(String),

    /// Malformed input to a public operation (duplicate id, bad hierarchy path, ...).
    #[error("validation error: {0}")]
    Validation(String),

    /// The AST parser could not recover. Non-fatal per file; recorded in
    /// `ParseResult::errors` rather than propagated.
    #[error("parse error in {file}: {message}")]
    Parse { file: String, message: String },

    /// LLM transport failure, deadline expiry, or unparseable output after retry.
    #[error("llm error: {0}")]
    Llm(String),

    /// The version-control diff could not be produced.
    #[error("vcs error: {0}")]
    Vcs(String),

    /// Storage backend failure (I/O, constraint violation other than
    /// de-duplication). Fatal for the enclosing operation.
    #[error("store error: {0}")]
    Store(String),

    /// Neither embeddings nor keyword sets are available to score a
    /// modification; callers fall back to an in-place update with a warning.
    #[error("drift unavailable: {0}")]
    DriftUnavailable(String),
}

impl RpgError {
    /// Stable machine-readable code for this error class.
    pub fn code(&self) -> &'static str {
        match self {
            RpgError::Config(_) => "config",
            RpgError::NotFound(_) => "not_found",
            RpgError::Validation(_) => "validation",
            RpgError::Parse { .. } => "parse",
            RpgError::Llm(_) => "llm",
            RpgError::Vcs(_) => "vcs",
            RpgError::Store(_) => "store",
            RpgError::DriftUnavailable(_) => "drift_unavailable",
        }
    }

    /// Shorthand for a not-found node id.
    pub fn node_not_found(id: &str) -> Self {
        RpgError::NotFound(format!("node {id}"))
    }
}

impl From<serde_json::Error> for RpgError {
    fn from(e: serde_json::Error) -> Self {
        RpgError::Store(format!("serialization: {e}"))
    }
}

impl From<std::io::Error> for RpgError {
    fn from(e: std::io::Error) -> Self {
        RpgError::Store(format!("io: {e}"))
    }
}
