//! Embedding boundary for semantic similarity: the [`Embedder`] interface
//! plus OpenAI-style and Ollama-style HTTP providers.

use async_trait::async_trait;
use repograph_core::config::EmbeddingConfig;
use repograph_core::{RpgError, RpgResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// The abstract embedding backend.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed a batch of texts, preserving input order.
    async fn embed(&self, texts: &[String], deadline: Duration) -> RpgResult<Vec<Vec<f32>>>;

    async fn embed_one(&self, text: &str, deadline: Duration) -> RpgResult<Vec<f32>> {
        let mut vectors = self.embed(&[text.to_string()], deadline).await?;
        vectors
            .pop()
            .ok_or_else(|| RpgError::Llm("embedding backend returned no vectors".into()))
    }
}

/// Cosine similarity; zero when lengths differ or either vector is empty.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom == 0.0 { 0.0 } else { dot / denom }
}

/// Embedding provider selection.
#[derive(Debug, Clone)]
enum EmbeddingProvider {
    OpenAi { api_key: String, model: String },
    Ollama { base_url: String, model: String },
}

/// HTTP-backed [`Embedder`].
pub struct EmbeddingClient {
    provider: EmbeddingProvider,
    http: reqwest::Client,
}

#[derive(Serialize)]
struct EmbeddingRequest {
    model: String,
    input: Vec<String>,
}

#[derive(Deserialize)]
struct OpenAiEmbeddingResponse {
    data: Vec<OpenAiEmbeddingData>,
}

#[derive(Deserialize)]
struct OpenAiEmbeddingData {
    embedding: Vec<f32>,
}

#[derive(Deserialize)]
struct OllamaEmbeddingResponse {
    embeddings: Vec<Vec<f32>>,
}

impl EmbeddingClient {
    /// Resolve from config; `None` when no provider is configured (the
    /// engine then falls back to keyword-based similarity).
    pub fn from_config(config: &EmbeddingConfig) -> RpgResult<Option<Self>> {
        let provider = match config.provider.as_str() {
            "" => return Ok(None),
            "openai" => EmbeddingProvider::OpenAi {
                api_key: std::env::var("OPENAI_API_KEY")
                    .map_err(|_| RpgError::Config("OPENAI_API_KEY is not set".into()))?,
                model: if config.model.is_empty() {
                    "text-embedding-3-small".to_string()
                } else {
                    config.model.clone()
                },
            },
            "ollama" => EmbeddingProvider::Ollama {
                base_url: std::env::var("OLLAMA_HOST")
                    .unwrap_or_else(|_| "http://localhost:11434".to_string()),
                model: if config.model.is_empty() {
                    "nomic-embed-text".to_string()
                } else {
                    config.model.clone()
                },
            },
            other => {
                return Err(RpgError::Config(format!(
                    "unknown embedding provider: {other}"
                )))
            }
        };
        Ok(Some(Self {
            provider,
            http: reqwest::Client::new(),
        }))
    }
}

#[async_trait]
impl Embedder for EmbeddingClient {
    async fn embed(&self, texts: &[String], deadline: Duration) -> RpgResult<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let call = async {
            match &self.provider {
                EmbeddingProvider::OpenAi { api_key, model } => {
                    let body = EmbeddingRequest {
                        model: model.clone(),
                        input: texts.to_vec(),
                    };
                    let resp = self
                        .http
                        .post("https://api.openai.com/v1/embeddings")
                        .header("Authorization", format!("Bearer {api_key}"))
                        .json(&body)
                        .send()
                        .await
                        .map_err(|e| RpgError::Llm(format!("embedding transport: {e}")))?;
                    let status = resp.status();
                    if !status.is_success() {
                        let text = resp.text().await.unwrap_or_default();
                        return Err(RpgError::Llm(format!(
                            "embedding API returned {status}: {text}"
                        )));
                    }
                    let body: OpenAiEmbeddingResponse = resp
                        .json()
                        .await
                        .map_err(|e| RpgError::Llm(format!("embedding decode: {e}")))?;
                    Ok(body.data.into_iter().map(|d| d.embedding).collect())
                }
                EmbeddingProvider::Ollama { base_url, model } => {
                    let url = format!("{}/api/embed", base_url.trim_end_matches('/'));
                    let body = EmbeddingRequest {
                        model: model.clone(),
                        input: texts.to_vec(),
                    };
                    let resp = self
                        .http
                        .post(&url)
                        .json(&body)
                        .send()
                        .await
                        .map_err(|e| RpgError::Llm(format!("embedding transport: {e}")))?;
                    let status = resp.status();
                    if !status.is_success() {
                        let text = resp.text().await.unwrap_or_default();
                        return Err(RpgError::Llm(format!(
                            "embedding API returned {status}: {text}"
                        )));
                    }
                    let body: OllamaEmbeddingResponse = resp
                        .json()
                        .await
                        .map_err(|e| RpgError::Llm(format!("embedding decode: {e}")))?;
                    Ok(body.embeddings)
                }
            }
        };
        match tokio::time::timeout(deadline, call).await {
            Ok(result) => result,
            Err(_) => Err(RpgError::Llm(format!(
                "embedding call exceeded deadline of {deadline:?}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cosine_of_identical_vectors_is_one() {
        let v = vec![0.5, 0.5, 0.7];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_of_orthogonal_vectors_is_zero() {
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]), 0.0);
    }

    #[test]
    fn cosine_handles_length_mismatch() {
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 2.0]), 0.0);
    }

    #[test]
    fn empty_embedding_provider_resolves_to_none() {
        let config = EmbeddingConfig::default();
        assert!(EmbeddingClient::from_config(&config).unwrap().is_none());
    }
}
