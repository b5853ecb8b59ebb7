//! HTTP completion providers: Anthropic, OpenAI, OpenAI-compatible, Ollama.

use super::{CompletionRequest, LanguageModel};
use async_trait::async_trait;
use repograph_core::config::LlmConfig;
use repograph_core::{RpgError, RpgResult};
use serde::{Deserialize, Serialize};

/// Provider selection with credentials.
#[derive(Debug, Clone)]
pub enum Provider {
    Anthropic { api_key: String, model: String },
    OpenAi { api_key: String, model: String },
    OpenAiCompatible {
        api_key: String,
        base_url: String,
        model: String,
    },
    Ollama { base_url: String, model: String },
}

#[derive(Serialize)]
struct AnthropicRequest {
    model: String,
    max_tokens: u32,
    system: String,
    messages: Vec<Message>,
}

#[derive(Serialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicContent>,
}

#[derive(Deserialize)]
struct AnthropicContent {
    text: String,
}

#[derive(Serialize)]
struct OpenAiRequest {
    model: String,
    max_tokens: u32,
    messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Deserialize)]
struct OpenAiResponse {
    choices: Vec<OpenAiChoice>,
}

#[derive(Deserialize)]
struct OpenAiChoice {
    message: OpenAiMessage,
}

#[derive(Deserialize)]
struct OpenAiMessage {
    content: String,
}

/// HTTP-backed [`LanguageModel`] with retry and per-call deadlines.
#[derive(Debug)]
pub struct LlmClient {
    provider: Provider,
    http: reqwest::Client,
    retry_attempts: u32,
    retry_delays_ms: Vec<u64>,
}

impl LlmClient {
    pub fn new(provider: Provider) -> Self {
        Self {
            provider,
            http: reqwest::Client::new(),
            retry_attempts: 3,
            retry_delays_ms: vec![1000, 2000, 4000],
        }
    }

    /// Resolve a provider from config, with env vars supplying credentials.
    pub fn from_config(config: &LlmConfig) -> RpgResult<Self> {
        let provider = match config.provider.as_str() {
            "anthropic" => Provider::Anthropic {
                api_key: require_env("ANTHROPIC_API_KEY")?,
                model: default_model(&config.model, "claude-sonnet-4-20250514"),
            },
            "openai" => Provider::OpenAi {
                api_key: require_env("OPENAI_API_KEY")?,
                model: default_model(&config.model, "gpt-4o-mini"),
            },
            "openai-compatible" => Provider::OpenAiCompatible {
                api_key: std::env::var("REPOGRAPH_API_KEY").unwrap_or_default(),
                base_url: require_env("REPOGRAPH_BASE_URL")?,
                model: config.model.clone(),
            },
            "ollama" => Provider::Ollama {
                base_url: std::env::var("OLLAMA_HOST")
                    .unwrap_or_else(|_| "http://localhost:11434".to_string()),
                model: default_model(&config.model, "qwen3:8b"),
            },
            "" => {
                return Err(RpgError::Config(
                    "llm.provider is not set; reorganization and LLM lifting require one".into(),
                ))
            }
            other => return Err(RpgError::Config(format!("unknown llm provider: {other}"))),
        };
        Ok(Self {
            provider,
            http: reqwest::Client::new(),
            retry_attempts: config.retry_attempts.max(1),
            retry_delays_ms: config.retry_delays_ms.clone(),
        })
    }

    async fn complete_once(&self, request: &CompletionRequest<'_>) -> RpgResult<String> {
        match &self.provider {
            Provider::Anthropic { api_key, model } => {
                let body = AnthropicRequest {
                    model: model.clone(),
                    max_tokens: request.max_tokens,
                    system: request.system.to_string(),
                    messages: vec![Message {
                        role: "user".to_string(),
                        content: request.user.to_string(),
                    }],
                };
                let resp = self
                    .http
                    .post("https://api.anthropic.com/v1/messages")
                    .header("x-api-key", api_key)
                    .header("anthropic-version", "2023-06-01")
                    .header("content-type", "application/json")
                    .json(&body)
                    .send()
                    .await
                    .map_err(transport_err)?;
                let status = resp.status();
                if !status.is_success() {
                    let text = resp.text().await.unwrap_or_default();
                    return Err(RpgError::Llm(format!("anthropic returned {status}: {text}")));
                }
                let body: AnthropicResponse = resp.json().await.map_err(transport_err)?;
                body.content
                    .first()
                    .map(|c| c.text.clone())
                    .ok_or_else(|| RpgError::Llm("empty response from anthropic".into()))
            }
            Provider::OpenAi { api_key, model } => {
                self.openai_style(
                    "https://api.openai.com/v1/chat/completions",
                    Some(api_key),
                    model,
                    request,
                    None,
                )
                .await
            }
            Provider::OpenAiCompatible {
                api_key,
                base_url,
                model,
            } => {
                let url = format!("{}/chat/completions", base_url.trim_end_matches('/'));
                let key = if api_key.is_empty() { None } else { Some(api_key.as_str()) };
                self.openai_style(&url, key, model, request, None).await
            }
            Provider::Ollama { base_url, model } => {
                let url = format!("{}/v1/chat/completions", base_url.trim_end_matches('/'));
                // Deterministic output for structured extraction
                self.openai_style(&url, None, model, request, Some(0.0)).await
            }
        }
    }

    async fn openai_style(
        &self,
        url: &str,
        api_key: Option<&str>,
        model: &str,
        request: &CompletionRequest<'_>,
        temperature: Option<f32>,
    ) -> RpgResult<String> {
        let body = OpenAiRequest {
            model: model.to_string(),
            max_tokens: request.max_tokens,
            messages: vec![
                Message {
                    role: "system".to_string(),
                    content: request.system.to_string(),
                },
                Message {
                    role: "user".to_string(),
                    content: request.user.to_string(),
                },
            ],
            temperature,
        };
        let mut req = self
            .http
            .post(url)
            .header("content-type", "application/json")
            .json(&body);
        if let Some(key) = api_key {
            req = req.header("Authorization", format!("Bearer {key}"));
        }
        let resp = req.send().await.map_err(transport_err)?;
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(RpgError::Llm(format!("{url} returned {status}: {text}")));
        }
        let body: OpenAiResponse = resp.json().await.map_err(transport_err)?;
        body.choices
            .first()
            .map(|c| c.message.content.clone())
            .ok_or_else(|| RpgError::Llm(format!("empty response from {url}")))
    }
}

#[async_trait]
impl LanguageModel for LlmClient {
    /// Complete with exponential-backoff retry inside the caller's deadline.
    async fn complete(&self, request: CompletionRequest<'_>) -> RpgResult<String> {
        let attempt_call = async {
            let mut last_err = None;
            for attempt in 0..self.retry_attempts as usize {
                match self.complete_once(&request).await {
                    Ok(response) => return Ok(response),
                    Err(e) => {
                        if attempt + 1 < self.retry_attempts as usize {
                            let delay_idx =
                                attempt.min(self.retry_delays_ms.len().saturating_sub(1));
                            let delay =
                                self.retry_delays_ms.get(delay_idx).copied().unwrap_or(4000);
                            tracing::warn!(
                                attempt = attempt + 1,
                                error = %e,
                                "llm request failed, retrying in {delay}ms"
                            );
                            tokio::time::sleep(std::time::Duration::from_millis(delay)).await;
                        }
                        last_err = Some(e);
                    }
                }
            }
            Err(last_err.unwrap_or_else(|| RpgError::Llm("llm request never ran".into())))
        };

        match tokio::time::timeout(request.deadline, attempt_call).await {
            Ok(result) => result,
            Err(_) => Err(RpgError::Llm(format!(
                "llm call exceeded deadline of {:?}",
                request.deadline
            ))),
        }
    }

    fn name(&self) -> &str {
        match &self.provider {
            Provider::Anthropic { .. } => "anthropic",
            Provider::OpenAi { .. } => "openai",
            Provider::OpenAiCompatible { .. } => "openai-compatible",
            Provider::Ollama { .. } => "ollama",
        }
    }
}

fn default_model(configured: &str, fallback: &str) -> String {
    if configured.is_empty() {
        fallback.to_string()
    } else {
        configured.to_string()
    }
}

fn require_env(var: &str) -> RpgResult<String> {
    std::env::var(var).map_err(|_| RpgError::Config(format!("{var} is not set")))
}

fn transport_err(e: reqwest::Error) -> RpgError {
    RpgError::Llm(format!("transport failure: {e}"))
}
