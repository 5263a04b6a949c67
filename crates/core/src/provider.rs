//! Provider trait: the abstraction over the completion service.
//!
//! The engine only needs one thing from a language model: given an
//! ordered list of messages and sampling parameters, return text.
//! Transport, authentication and retries are the implementation's concern.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ProviderError;
use crate::message::Message;
use crate::state::ModelState;

/// A single completion request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionRequest {
    /// The model to use (e.g., "gpt-4")
    pub model: String,

    /// The conversation, oldest first
    pub messages: Vec<Message>,

    pub temperature: f32,

    /// Number of samples; the engine uses the first
    pub n: u32,

    /// Maximum tokens to generate
    pub max_tokens: u32,

    pub frequency_penalty: f32,

    pub presence_penalty: f32,
}

impl CompletionRequest {
    /// Build a request from the run's model parameters.
    pub fn from_model(model: &ModelState, messages: Vec<Message>, max_tokens: u32) -> Self {
        Self {
            model: model.name.clone(),
            messages,
            temperature: model.temperature,
            n: model.n,
            max_tokens,
            frequency_penalty: model.frequency_penalty,
            presence_penalty: model.presence_penalty,
        }
    }
}

/// The core Provider trait.
///
/// The completion stage calls `complete()` without knowing which service
/// answers. Calls block the cycle until they return; callers that need a
/// deadline wrap the provider (e.g. with `tokio::time::timeout`).
#[async_trait]
pub trait Provider: Send + Sync {
    /// A human-readable name for this provider (e.g., "openai").
    fn name(&self) -> &str;

    /// Send a request and get the text of the top choice.
    async fn complete(&self, request: CompletionRequest) -> Result<String, ProviderError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_copies_model_parameters() {
        let model = ModelState {
            name: "gpt-4".into(),
            temperature: 0.5,
            n: 2,
            max_tokens: 100,
            frequency_penalty: 0.1,
            presence_penalty: 0.2,
        };
        let req = CompletionRequest::from_model(&model, vec![Message::user("hi")], 42);
        assert_eq!(req.model, "gpt-4");
        assert_eq!(req.n, 2);
        assert_eq!(req.max_tokens, 42);
        assert!((req.presence_penalty - 0.2).abs() < f32::EPSILON);
        assert_eq!(req.messages.len(), 1);
    }
}
