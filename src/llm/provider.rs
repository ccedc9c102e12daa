//! Backend trait for LLM services.
//!
//! Defines the [`LlmBackend`] trait that every backend implementation
//! satisfies. Backends translate an [`LlmRequest`] into their own wire format
//! and normalize the reply into the shared
//! [`LlmEvent`](crate::llm::events::LlmEvent) stream.

use std::pin::Pin;

use async_trait::async_trait;
use futures_util::Stream;
use serde::{Deserialize, Serialize};

use super::error::LlmError;
use super::events::LlmEvent;
use super::message::Message;
use crate::config::ModelOptions;

/// A tool definition provided to the LLM for function calling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// The tool name (e.g. `"end_chat"`).
    pub name: String,
    /// Human-readable description of the tool's purpose.
    pub description: String,
    /// JSON Schema describing the tool's parameters.
    pub parameters: serde_json::Value,
}

impl ToolDefinition {
    /// Create a new tool definition.
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: serde_json::Value,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }
}

/// Which model tier a request should be served by.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelTier {
    /// The regular conversational model.
    #[default]
    Standard,
    /// The stronger model a toolkit can switch to on request.
    Smarter,
}

impl std::fmt::Display for ModelTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Standard => write!(f, "standard"),
            Self::Smarter => write!(f, "smarter"),
        }
    }
}

/// One fully assembled model request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmRequest {
    /// System instructions assembled from the leading standing messages.
    pub instructions: String,
    /// Conversation messages in timeline order, followed by the round's
    /// transient messages.
    pub messages: Vec<Message>,
    /// Definitions of the currently visible tools.
    pub tools: Vec<ToolDefinition>,
    /// Requested model tier.
    pub tier: ModelTier,
    /// Model options resolved for `tier`.
    pub model: ModelOptions,
    /// JSON schema the reply text must follow, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_schema: Option<serde_json::Value>,
    /// Whether the backend may run hosted web searches.
    #[serde(default)]
    pub web_search: bool,
}

impl LlmRequest {
    /// The most recent user message in the request, if any.
    pub fn last_user_text(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.is_user())
            .map(|m| m.text_content())
    }
}

/// A boxed stream of normalized LLM events.
pub type LlmEventStream = Pin<Box<dyn Stream<Item = LlmEvent> + Send>>;

/// Trait for LLM backends.
///
/// The backend is injected into the query engine as `Arc<dyn LlmBackend>`.
#[async_trait]
pub trait LlmBackend: Send + Sync {
    /// Returns the backend name (e.g. `"echo"`).
    fn name(&self) -> &str;

    /// Submit a request and return the reply as an event stream.
    ///
    /// Errors returned here happen before any event was produced. Failures
    /// after that point are reported in-stream with [`LlmEvent::Failed`].
    async fn submit(&self, request: &LlmRequest) -> Result<LlmEventStream, LlmError>;
}
