//! Error types for the LLM backend boundary.
//!
//! Each variant carries a stable error code (SCREAMING_SNAKE_CASE) that is
//! included in the Display output and accessible via [`LlmError::code()`].

/// Stable error codes for programmatic error handling.
pub mod error_codes {
    /// Invalid request or backend configuration.
    pub const CONFIG_INVALID: &str = "CONFIG_INVALID";

    /// Submitting the request to the backend failed.
    pub const REQUEST_FAILED: &str = "REQUEST_FAILED";

    /// The reply stream broke or ended without a completion event.
    pub const STREAM_FAILED: &str = "STREAM_FAILED";

    /// The backend reported that it could not produce a reply.
    pub const RESPONSE_FAILED: &str = "RESPONSE_FAILED";

    /// The backend stopped producing events for too long.
    pub const TIMEOUT_ERROR: &str = "TIMEOUT_ERROR";
}

/// Errors produced while talking to an LLM backend.
///
/// The Display impl formats as `[CODE] message`.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    /// Invalid request or backend configuration.
    #[error("[{}] {}", error_codes::CONFIG_INVALID, .0)]
    Config(String),

    /// Submitting the request failed before any event arrived.
    #[error("[{}] {}", error_codes::REQUEST_FAILED, .0)]
    Request(String),

    /// The event stream broke or ended without a completion event.
    #[error("[{}] {}", error_codes::STREAM_FAILED, .0)]
    Stream(String),

    /// The backend reported a failed response.
    #[error("[{}] {}", error_codes::RESPONSE_FAILED, .0)]
    Response(String),

    /// No event arrived within the request timeout.
    #[error("[{}] {}", error_codes::TIMEOUT_ERROR, .0)]
    Timeout(String),
}

impl LlmError {
    /// Returns the stable error code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Config(_) => error_codes::CONFIG_INVALID,
            Self::Request(_) => error_codes::REQUEST_FAILED,
            Self::Stream(_) => error_codes::STREAM_FAILED,
            Self::Response(_) => error_codes::RESPONSE_FAILED,
            Self::Timeout(_) => error_codes::TIMEOUT_ERROR,
        }
    }

    /// Returns the inner message without the code prefix.
    pub fn message(&self) -> &str {
        match self {
            Self::Config(m)
            | Self::Request(m)
            | Self::Stream(m)
            | Self::Response(m)
            | Self::Timeout(m) => m,
        }
    }
}
