//! Conversation pipeline: speech recognition in, engine rounds out.

pub mod coordinator;

pub use coordinator::{ConversationCoordinator, ConversationState, RoundResult};
