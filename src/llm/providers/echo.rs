//! Deterministic backend that repeats the last user utterance.
//!
//! Used by the console harness for dry runs of the turn-taking loop without
//! a real model behind it.

use async_trait::async_trait;

use crate::llm::error::LlmError;
use crate::llm::events::{LlmEvent, Reply};
use crate::llm::provider::{LlmBackend, LlmEventStream, LlmRequest};

/// Backend that answers every request with the last user message.
#[derive(Debug, Clone)]
pub struct EchoBackend {
    prefix: String,
}

impl EchoBackend {
    /// Create an echo backend that prepends `prefix` to every reply.
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }
}

impl Default for EchoBackend {
    fn default() -> Self {
        Self::new("You said: ")
    }
}

#[async_trait]
impl LlmBackend for EchoBackend {
    fn name(&self) -> &str {
        "echo"
    }

    async fn submit(&self, request: &LlmRequest) -> Result<LlmEventStream, LlmError> {
        let Some(text) = request.last_user_text() else {
            return Err(LlmError::Request("no user message to echo".into()));
        };
        let reply_text = format!("{}{}", self.prefix, text);
        tracing::debug!(backend = "echo", tier = %request.tier, "echoing user message");

        let words: Vec<String> = reply_text
            .split_inclusive(' ')
            .map(str::to_owned)
            .collect();
        let stream = async_stream::stream! {
            for word in words {
                yield LlmEvent::TextDelta { text: word };
            }
            yield LlmEvent::Completed { reply: Reply::text(reply_text) };
        };
        Ok(Box::pin(stream))
    }
}
