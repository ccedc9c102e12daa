//! Error types for the zefira dialogue engine.

use crate::llm::error::LlmError;

/// Top-level error type for the dialogue engine.
#[derive(Debug, thiserror::Error)]
pub enum DialogError {
    /// Configuration error (bad config file, duplicate tool, unknown tool).
    #[error("config error: {0}")]
    Config(String),

    /// LLM backend error.
    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    /// Tool execution error.
    #[error("tool error: {0}")]
    Tool(String),

    /// A toolkit hook failed.
    #[error("toolkit '{toolkit}' error: {message}")]
    Toolkit {
        /// Name of the failing toolkit.
        toolkit: String,
        /// What went wrong.
        message: String,
    },

    /// The model kept asking for tool calls past the round-trip limit.
    #[error("too many request-response cycles (limit {0})")]
    RoundTripLimit(usize),

    /// Speech recognition or synthesis error.
    #[error("speech error: {0}")]
    Speech(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl DialogError {
    /// Build a [`DialogError::Toolkit`] for the named toolkit.
    pub fn toolkit(toolkit: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Toolkit {
            toolkit: toolkit.into(),
            message: message.into(),
        }
    }
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, DialogError>;
