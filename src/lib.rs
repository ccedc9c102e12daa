//! Zefira: spoken-dialogue orchestration for tool-calling LLM assistants.
//!
//! The crate sits between a speech recognizer, an LLM backend and a speech
//! synthesizer:
//! Recognizer → turn-taking → query engine ⇄ LLM backend / toolkits → Speaker
//!
//! # Architecture
//!
//! - **Tool registry** ([`tools`]): tools contributed by toolkits, ordered so
//!   dynamic tools trail static ones on the first query.
//! - **Timeline** ([`timeline`]): the permanent message log, with tagged
//!   standing messages that turn into request instructions.
//! - **Query engine** ([`engine`]): request/reply rounds with tool dispatch,
//!   revert semantics and a round-trip cap.
//! - **Conversation coordinator** ([`pipeline`]): the silence-timer state
//!   machine deciding when the user has finished speaking.

pub mod config;
pub mod engine;
pub mod error;
pub mod llm;
pub mod pipeline;
pub mod progress;
pub mod speech;
pub mod timeline;
pub mod toolkit;
pub mod tools;
pub mod zefira_dirs;

pub use config::DialogConfig;
pub use engine::{QueryEngine, RoundOutcome, ToolkitStates};
pub use error::{DialogError, Result};
pub use pipeline::coordinator::{ConversationCoordinator, ConversationState, RoundResult};
pub use progress::{ProgressCallback, ProgressReporter, QueryProgress};
pub use speech::{RecognitionUpdate, SpeechSink, SpeechSource};
pub use toolkit::{Toolkit, ToolkitContext};
