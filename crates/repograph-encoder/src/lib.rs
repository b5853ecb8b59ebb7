//! RPG encoding pipeline: semantic lifting, structural reorganization,
//! artifact grounding, dependency injection, and incremental evolution.
//!
//! The LLM, embedding, and version-control backends are interfaces injected
//! per construction; tests use deterministic fakes honoring the
//! `<solution>`-tag protocol.

pub mod cache;
pub mod embeddings;
pub mod encode;
pub mod evolve;
pub mod extract;
pub mod ground;
pub mod ids;
pub mod inject;
pub mod llm;
pub mod reorganize;
pub mod router;
pub mod vcs;

pub use cache::FeatureCache;
pub use embeddings::{cosine_similarity, Embedder, EmbeddingClient};
pub use encode::{EncodeReport, Encoder};
pub use evolve::{EvolutionEngine, EvolutionOptions, EvolutionReport};
pub use extract::SemanticExtractor;
pub use ground::ground;
pub use inject::inject;
pub use llm::{CompletionRequest, LanguageModel, LlmClient};
pub use reorganize::reorganize;
pub use router::SemanticRouter;
pub use vcs::{ChangeStatus, ChangedFile, GitVersionControl, VersionControl};
