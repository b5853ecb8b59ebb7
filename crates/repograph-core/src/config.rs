//! Engine configuration.
//!
//! Load order: `.repograph/config.toml` → environment variables → defaults.

use crate::error::{RpgError, RpgResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const WORKSPACE_DIR: &str = ".repograph";
const GRAPH_FILE: &str = "graph.json";
const CACHE_DIR: &str = "cache";

/// Directory holding persisted engine state for a project root.
pub fn workspace_dir(project_root: &Path) -> PathBuf {
    project_root.join(WORKSPACE_DIR)
}

/// Path of the serialized graph artifact.
pub fn graph_file(project_root: &Path) -> PathBuf {
    workspace_dir(project_root).join(GRAPH_FILE)
}

/// Directory of the semantic feature cache.
pub fn cache_dir(project_root: &Path) -> PathBuf {
    workspace_dir(project_root).join(CACHE_DIR)
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RepographConfig {
    pub encoder: EncoderConfig,
    pub evolution: EvolutionConfig,
    pub llm: LlmConfig,
    pub embedding: EmbeddingConfig,
    pub injector: InjectorConfig,
    pub storage: StorageConfig,
}

/// Encoding pipeline configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EncoderConfig {
    /// Attach entity source bodies to low-level nodes.
    pub include_source: bool,
    /// Include globs; empty means all supported source files.
    pub include: Vec<String>,
    /// Exclude globs, applied after includes.
    pub exclude: Vec<String>,
    /// Maximum directory depth below the root during discovery.
    pub max_depth: usize,
    pub semantic: SemanticConfig,
    pub cache: CacheConfig,
}

/// Semantic extraction configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SemanticConfig {
    pub use_llm: bool,
    /// A final batch below this budget merges into its predecessor.
    pub min_batch_tokens: usize,
    /// Token budget per extraction batch.
    pub max_batch_tokens: usize,
    /// Maximum concurrent in-flight LLM batches.
    pub max_in_flight: usize,
}

/// Semantic cache configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    /// Override for the cache directory; defaults to `.repograph/cache`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,
}

/// Evolution configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EvolutionConfig {
    /// Version-control range syntax, e.g. `HEAD~3..HEAD`.
    pub commit_range: String,
    /// Semantic distance above which a modified entity is re-routed.
    pub drift_threshold: f64,
    pub use_llm: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_path: Option<PathBuf>,
}

/// LLM transport configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Provider id: `anthropic`, `openai`, `openai-compatible`, or `ollama`.
    pub provider: String,
    pub model: String,
    pub max_tokens: u32,
    pub retry_attempts: u32,
    pub retry_delays_ms: Vec<u64>,
    /// Per-call deadline.
    pub timeout_ms: u64,
}

/// Embedding backend configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Provider id: `openai`, `ollama`, or empty for none.
    pub provider: String,
    pub model: String,
}

/// Dependency injection configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InjectorConfig {
    /// Unqualified names too common to resolve by repository-wide fuzzy match.
    pub common_name_blocklist: Vec<String>,
}

/// Storage backend selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// `memory` or `sqlite`.
    pub backend: String,
    /// Compress the graph artifact with zstd; decompression on load is
    /// automatic (magic-byte detection).
    pub compress: bool,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            include_source: false,
            include: Vec::new(),
            exclude: Vec::new(),
            max_depth: 10,
            semantic: SemanticConfig::default(),
            cache: CacheConfig::default(),
        }
    }
}

impl Default for SemanticConfig {
    fn default() -> Self {
        Self {
            use_llm: true,
            min_batch_tokens: 10_000,
            max_batch_tokens: 50_000,
            max_in_flight: 4,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: None,
        }
    }
}

impl Default for EvolutionConfig {
    fn default() -> Self {
        Self {
            commit_range: String::new(),
            drift_threshold: 0.3,
            use_llm: true,
            output_path: None,
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: String::new(),
            model: String::new(),
            max_tokens: 4096,
            retry_attempts: 3,
            retry_delays_ms: vec![1000, 2000, 4000],
            timeout_ms: 60_000,
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: String::new(),
            model: String::new(),
        }
    }
}

impl Default for InjectorConfig {
    fn default() -> Self {
        Self {
            common_name_blocklist: [
                "get", "set", "init", "new", "main", "run", "create", "update", "delete", "build",
                "parse",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: "memory".to_string(),
            compress: false,
        }
    }
}

/// Parse an env var and apply it to a config field.
fn env_override<T: std::str::FromStr>(var: &str, target: &mut T) {
    if let Ok(v) = std::env::var(var)
        && let Ok(n) = v.parse()
    {
        *target = n;
    }
}

impl RepographConfig {
    /// Load config from `.repograph/config.toml` under the project root,
    /// with env var overrides. Falls back to defaults when no file exists.
    pub fn load(project_root: &Path) -> RpgResult<Self> {
        let config_path = workspace_dir(project_root).join("config.toml");

        let mut config = if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            toml::from_str(&content)
                .map_err(|e| RpgError::Config(format!("invalid config.toml: {e}")))?
        } else {
            Self::default()
        };

        env_override("REPOGRAPH_MAX_DEPTH", &mut config.encoder.max_depth);
        env_override(
            "REPOGRAPH_MIN_BATCH_TOKENS",
            &mut config.encoder.semantic.min_batch_tokens,
        );
        env_override(
            "REPOGRAPH_MAX_BATCH_TOKENS",
            &mut config.encoder.semantic.max_batch_tokens,
        );
        env_override(
            "REPOGRAPH_DRIFT_THRESHOLD",
            &mut config.evolution.drift_threshold,
        );
        env_override("REPOGRAPH_LLM_PROVIDER", &mut config.llm.provider);
        env_override("REPOGRAPH_LLM_MODEL", &mut config.llm.model);
        env_override("REPOGRAPH_STORAGE_BACKEND", &mut config.storage.backend);

        config.validate()?;
        Ok(config)
    }

    /// Reject out-of-range values at load time rather than at phase entry.
    pub fn validate(&self) -> RpgResult<()> {
        if !(0.0..=1.0).contains(&self.evolution.drift_threshold) {
            return Err(RpgError::Config(format!(
                "drift_threshold must be within [0, 1], got {}",
                self.evolution.drift_threshold
            )));
        }
        if self.encoder.max_depth == 0 {
            return Err(RpgError::Config("max_depth must be at least 1".into()));
        }
        if self.encoder.semantic.min_batch_tokens > self.encoder.semantic.max_batch_tokens {
            return Err(RpgError::Config(format!(
                "min_batch_tokens ({}) must not exceed max_batch_tokens ({})",
                self.encoder.semantic.min_batch_tokens, self.encoder.semantic.max_batch_tokens
            )));
        }
        Ok(())
    }
}
