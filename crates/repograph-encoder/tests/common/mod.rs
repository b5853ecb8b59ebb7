//! Deterministic fakes shared by the encoder integration tests.
#![allow(dead_code)] // each test binary uses a different subset

use async_trait::async_trait;
use repograph_core::{RpgError, RpgResult};
use repograph_encoder::llm::{CompletionRequest, LanguageModel};
use repograph_encoder::vcs::{ChangedFile, VersionControl};
use std::collections::VecDeque;
use std::path::Path;
use std::sync::Mutex;

/// An LLM fake that replays scripted responses in order. Responses follow
/// the real protocol (`<solution>` tags, pipe-delimited feature lines).
pub struct ScriptedModel {
    responses: Mutex<VecDeque<String>>,
}

impl ScriptedModel {
    pub fn new<S: Into<String>>(responses: impl IntoIterator<Item = S>) -> Self {
        Self {
            responses: Mutex::new(responses.into_iter().map(Into::into).collect()),
        }
    }

    pub fn remaining(&self) -> usize {
        self.responses.lock().unwrap().len()
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn complete(&self, _request: CompletionRequest<'_>) -> RpgResult<String> {
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| RpgError::Llm("scripted model ran out of responses".into()))
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// A version-control fake serving a fixed change list.
pub struct FakeVcs {
    pub changes: Vec<ChangedFile>,
}

impl VersionControl for FakeVcs {
    fn list_changes(&self, _root: &Path, _range: &str) -> RpgResult<Vec<ChangedFile>> {
        Ok(self.changes.clone())
    }
}
