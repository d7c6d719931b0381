//! Completion transport seam
//!
//! The relationship oracle only needs "send these messages, get text back".
//! [`LlmClient`](super::LlmClient) implements that against a real endpoint;
//! [`ScriptedTransport`] replays queued replies for tests and dry runs.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::{Error, Result};

use super::types::{LlmResponse, Message};

/// Sends one chat completion and returns the raw reply
#[async_trait]
pub trait CompletionTransport: Send + Sync {
    async fn complete(&self, messages: Vec<Message>) -> Result<LlmResponse>;
}

/// Transport that answers from a queue of canned replies
///
/// Each call pops the next scripted outcome. When the queue is exhausted the
/// default reply is returned, or an `LLMError` when there is none.
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    replies: Mutex<VecDeque<Result<String>>>,
    default_reply: Option<String>,
    requests: Mutex<Vec<Vec<Message>>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer every call with the same text
    pub fn always(reply: impl Into<String>) -> Self {
        Self {
            default_reply: Some(reply.into()),
            ..Self::default()
        }
    }

    /// Queue a text reply
    pub fn reply(self, text: impl Into<String>) -> Self {
        self.push(Ok(text.into()));
        self
    }

    /// Queue a failure
    pub fn fail(self, error: Error) -> Self {
        self.push(Err(error));
        self
    }

    pub fn push(&self, outcome: Result<String>) {
        if let Ok(mut replies) = self.replies.lock() {
            replies.push_back(outcome);
        }
    }

    /// Number of completions requested so far
    pub fn calls(&self) -> usize {
        self.requests.lock().map(|r| r.len()).unwrap_or(0)
    }

    /// Messages of every request, in call order
    pub fn requests(&self) -> Vec<Vec<Message>> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl CompletionTransport for ScriptedTransport {
    async fn complete(&self, messages: Vec<Message>) -> Result<LlmResponse> {
        self.requests
            .lock()
            .map_err(|_| Error::Other("scripted transport lock poisoned".to_string()))?
            .push(messages);

        let next = self
            .replies
            .lock()
            .map_err(|_| Error::Other("scripted transport lock poisoned".to_string()))?
            .pop_front();

        match next {
            Some(outcome) => outcome.map(LlmResponse::text),
            None => match &self.default_reply {
                Some(text) => Ok(LlmResponse::text(text.clone())),
                None => Err(Error::LLMError("No scripted reply left".to_string())),
            },
        }
    }
}
