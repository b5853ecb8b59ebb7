//! LLM boundary: the [`LanguageModel`] interface, HTTP providers, and the
//! shared `<solution>`-tag response parser.
//!
//! The engine never talks to a concrete client directly; it is injected at
//! construction. Tests use deterministic fakes that honor the same protocol.

mod providers;

pub use providers::LlmClient;

use async_trait::async_trait;
use repograph_core::{RpgError, RpgResult};
use std::time::Duration;

/// A single completion request with an explicit deadline. Cancellation
/// (deadline expiry) surfaces as an [`RpgError::Llm`].
#[derive(Debug, Clone)]
pub struct CompletionRequest<'a> {
    pub system: &'a str,
    pub user: &'a str,
    pub max_tokens: u32,
    pub deadline: Duration,
}

impl<'a> CompletionRequest<'a> {
    pub fn new(system: &'a str, user: &'a str) -> Self {
        Self {
            system,
            user,
            max_tokens: 4096,
            deadline: Duration::from_secs(60),
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }
}

/// The abstract LLM backend.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn complete(&self, request: CompletionRequest<'_>) -> RpgResult<String>;

    /// Human-readable backend name for logs.
    fn name(&self) -> &str {
        "llm"
    }
}

/// Strip `<think>...</think>` blocks some local models emit before output.
pub fn strip_think_blocks(text: &str) -> String {
    let mut result = text.to_string();
    while let Some(start) = result.find("<think>") {
        if let Some(end_offset) = result[start..].find("</think>") {
            let end = start + end_offset + "</think>".len();
            result = format!("{}{}", &result[..start], &result[end..]);
        } else {
            // Unclosed think block: drop everything from <think> onward
            result.truncate(start);
            break;
        }
    }
    result
}

/// Extract the JSON payload from a response: `<solution>` tags first, then
/// a bare JSON value, then a markdown code fence.
pub fn extract_payload(text: &str) -> String {
    let text = strip_think_blocks(text);
    let text = text.as_str();

    if let Some(start) = text.find("<solution>") {
        let after = &text[start + "<solution>".len()..];
        if let Some(end) = after.find("</solution>") {
            return after[..end].trim().to_string();
        }
        return after.trim().to_string();
    }

    let trimmed = text.trim();
    if trimmed.starts_with('{') || trimmed.starts_with('[') {
        return trimmed.to_string();
    }

    for fence in ["```json", "```"] {
        if let Some(start) = text.find(fence) {
            let after = &text[start + fence.len()..];
            if let Some(end) = after.find("```") {
                return after[..end].trim().to_string();
            }
        }
    }

    trimmed.to_string()
}

/// Parse a tagged JSON response into `T`.
pub fn parse_solution_json<T: serde::de::DeserializeOwned>(text: &str) -> RpgResult<T> {
    let payload = extract_payload(text);
    serde_json::from_str(&payload)
        .map_err(|e| RpgError::Llm(format!("unparseable solution payload: {e}")))
}

/// Ask, parse, and on parse failure re-ask once with a corrective suffix.
/// The second failure is final.
pub async fn complete_and_parse<T: serde::de::DeserializeOwned>(
    model: &dyn LanguageModel,
    request: CompletionRequest<'_>,
) -> RpgResult<T> {
    let response = model.complete(request.clone()).await?;
    match parse_solution_json::<T>(&response) {
        Ok(parsed) => Ok(parsed),
        Err(first_err) => {
            tracing::warn!(error = %first_err, "solution parse failed, re-asking once");
            let corrective = format!(
                "{}\n\nYour previous response could not be parsed. Return the SAME analysis as \
                 valid JSON inside <solution></solution> tags. No explanation, no markdown.",
                request.user
            );
            let retry = CompletionRequest {
                system: request.system,
                user: &corrective,
                max_tokens: request.max_tokens,
                deadline: request.deadline,
            };
            let response = model.complete(retry).await?;
            parse_solution_json::<T>(&response)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_solution_tags() {
        let text = "thoughts...\n<solution>[\"Auth\"]</solution>\ntrailing";
        let parsed: Vec<String> = parse_solution_json(text).unwrap();
        assert_eq!(parsed, vec!["Auth".to_string()]);
    }

    #[test]
    fn extracts_bare_json() {
        let parsed: Vec<u32> = parse_solution_json("[1, 2, 3]").unwrap();
        assert_eq!(parsed, vec![1, 2, 3]);
    }

    #[test]
    fn extracts_code_fence() {
        let text = "Here you go:\n```json\n{\"a\": 1}\n```";
        let parsed: std::collections::HashMap<String, u32> = parse_solution_json(text).unwrap();
        assert_eq!(parsed.get("a"), Some(&1));
    }

    #[test]
    fn strips_think_blocks() {
        let text = "<think>internal</think><solution>[]</solution>";
        let parsed: Vec<String> = parse_solution_json(text).unwrap();
        assert!(parsed.is_empty());
    }

    #[test]
    fn unclosed_think_block_truncates() {
        assert_eq!(strip_think_blocks("abc<think>oops"), "abc");
    }

    #[test]
    fn garbage_is_an_llm_error() {
        let err = parse_solution_json::<Vec<String>>("no json here").unwrap_err();
        assert_eq!(err.code(), "llm");
    }
}
