//! Normalized streaming event model for LLM backends.
//!
//! Every backend reports its reply as a stream of [`LlmEvent`]s. Deltas are
//! informational (they drive progress reporting); the authoritative reply is
//! the [`Reply`] carried by the final [`LlmEvent::Completed`] event.
//!
//! # Event Stream Lifecycle
//!
//! ```text
//! (TextDelta | RefusalDelta | ReasoningDelta | WebSearch | ToolCall)* → Completed
//! (TextDelta | ...)* → Failed
//! ```
//!
//! A stream that ends without either terminal event is a broken stream.

use serde::{Deserialize, Serialize};

use super::message::{AssistantToolCall, Message};

/// A normalized streaming event from any LLM backend.
#[derive(Debug, Clone, PartialEq)]
pub enum LlmEvent {
    /// A chunk of generated text.
    TextDelta {
        /// The text fragment.
        text: String,
    },

    /// A chunk of a refusal.
    RefusalDelta {
        /// The refusal fragment.
        text: String,
    },

    /// A chunk of reasoning output.
    ReasoningDelta {
        /// The reasoning fragment.
        text: String,
    },

    /// The backend is running a hosted web search.
    WebSearch {
        /// Backend-specific status label (e.g. `"in_progress"`).
        status: String,
    },

    /// The model started a function call.
    ToolCall {
        /// Identifier of the call.
        call_id: String,
        /// Name of the function being called.
        function_name: String,
    },

    /// The reply is complete. Terminal.
    Completed {
        /// The full reply.
        reply: Reply,
    },

    /// The backend failed to produce a reply. Terminal.
    Failed {
        /// Description of what went wrong.
        reason: String,
    },
}

/// Why a reply was cut short.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncompleteReason {
    /// The output token limit was reached.
    MaxOutputTokens,
    /// The safety filter removed part of the reply.
    ContentFilter,
    /// Any other backend-reported reason.
    Other(String),
}

impl std::fmt::Display for IncompleteReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MaxOutputTokens => write!(f, "max_output_tokens"),
            Self::ContentFilter => write!(f, "content_filter"),
            Self::Other(reason) => write!(f, "{reason}"),
        }
    }
}

/// One output item of a completed reply, in the order the backend produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReplyItem {
    /// Text meant to be spoken.
    Text {
        /// The text.
        text: String,
    },
    /// The model refused to answer.
    Refusal {
        /// Refusal explanation from the model.
        text: String,
    },
    /// Reasoning summary. Never spoken.
    Reasoning {
        /// Summary text.
        summary: String,
    },
    /// A hosted web search the backend ran on its own.
    WebSearch,
    /// A function call the model wants executed.
    FunctionCall {
        /// Identifier the tool result must answer.
        call_id: String,
        /// Requested function name.
        name: String,
        /// Raw JSON arguments.
        arguments: String,
    },
}

/// A completed model reply.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reply {
    /// Output items in backend order.
    pub items: Vec<ReplyItem>,
    /// Set when the backend truncated the reply.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub incomplete: Option<IncompleteReason>,
}

impl Reply {
    /// A reply consisting of a single text item.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            items: vec![ReplyItem::Text { text: text.into() }],
            incomplete: None,
        }
    }

    /// Append an item.
    pub fn with_item(mut self, item: ReplyItem) -> Self {
        self.items.push(item);
        self
    }

    /// Append a function call item.
    pub fn with_call(
        self,
        call_id: impl Into<String>,
        name: impl Into<String>,
        arguments: impl Into<String>,
    ) -> Self {
        self.with_item(ReplyItem::FunctionCall {
            call_id: call_id.into(),
            name: name.into(),
            arguments: arguments.into(),
        })
    }

    /// Mark the reply as truncated.
    pub fn with_incomplete(mut self, reason: IncompleteReason) -> Self {
        self.incomplete = Some(reason);
        self
    }

    /// Render the reply as the assistant message kept in the conversation.
    ///
    /// Text items are concatenated; reasoning, refusal and search items are
    /// dropped.
    pub fn to_message(&self) -> Message {
        let mut text = String::new();
        let mut tool_calls = Vec::new();
        for item in &self.items {
            match item {
                ReplyItem::Text { text: t } => text.push_str(t),
                ReplyItem::FunctionCall {
                    call_id,
                    name,
                    arguments,
                } => tool_calls.push(AssistantToolCall {
                    call_id: call_id.clone(),
                    function_name: name.clone(),
                    arguments: arguments.clone(),
                }),
                ReplyItem::Refusal { .. } | ReplyItem::Reasoning { .. } | ReplyItem::WebSearch => {}
            }
        }
        Message::assistant_with_tool_calls(Some(text), tool_calls)
    }
}
