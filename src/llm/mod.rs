//! LLM backend boundary.
//!
//! The query engine talks to models only through the [`LlmBackend`] trait,
//! which turns an assembled [`LlmRequest`] into a normalized
//! [`LlmEvent`] stream.
//!
//! # Submodules
//!
//! - [`error`]: Error types with stable error codes
//! - [`events`]: Normalized streaming event model and completed replies
//! - [`message`]: Conversation message types
//! - [`provider`]: Backend trait and request types
//! - [`providers`]: Backend implementations

pub mod error;
pub mod events;
pub mod message;
pub mod provider;
pub mod providers;

pub use error::LlmError;
pub use events::{IncompleteReason, LlmEvent, Reply, ReplyItem};
pub use message::{AssistantToolCall, Message, MessageContent, Role};
pub use provider::{LlmBackend, LlmEventStream, LlmRequest, ModelTier, ToolDefinition};
pub use providers::EchoBackend;
