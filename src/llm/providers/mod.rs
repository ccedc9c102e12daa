//! LLM backend implementations.
//!
//! Each submodule implements the [`LlmBackend`](super::provider::LlmBackend)
//! trait and normalizes its output to the shared
//! [`LlmEvent`](super::events::LlmEvent) model.
//!
//! # Available backends
//!
//! - [`echo`]: deterministic backend for dry runs

pub mod echo;

pub use echo::EchoBackend;
