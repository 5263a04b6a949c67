//! Shared test helpers.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use rustedloop_core::error::{ProviderError, Result};
use rustedloop_core::message::Role;
use rustedloop_core::provider::{CompletionRequest, Provider};

use crate::agent::Responder;

/// A mock provider that returns a sequence of scripted responses.
///
/// Each call to `complete` returns the next response in the queue and
/// records the request. Running out of responses is an `EmptyResponse`
/// error.
pub struct ScriptedProvider {
    responses: Mutex<VecDeque<String>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedProvider {
    pub fn new<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            responses: Mutex::new(responses.into_iter().map(Into::into).collect()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Requests received so far.
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: CompletionRequest) -> std::result::Result<String, ProviderError> {
        self.requests.lock().unwrap().push(request);
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .ok_or(ProviderError::EmptyResponse)
    }
}

/// A responder that replays scripted replies and records its prompts.
#[derive(Debug, Default)]
pub struct ScriptedResponder {
    replies: VecDeque<String>,
    pub prompts: Vec<(String, Role)>,
}

impl ScriptedResponder {
    pub fn new<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            replies: replies.into_iter().map(Into::into).collect(),
            prompts: Vec::new(),
        }
    }
}

#[async_trait]
impl Responder for ScriptedResponder {
    async fn respond(&mut self, prompt: &str, role: Role) -> Result<String> {
        self.prompts.push((prompt.to_string(), role));
        self.replies
            .pop_front()
            .ok_or_else(|| ProviderError::EmptyResponse.into())
    }
}
