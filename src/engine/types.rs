//! Round state and result types for the query engine.

use serde::{Deserialize, Serialize};

use crate::llm::message::Message;

/// Notice spoken when the model keeps calling tools past the round-trip limit.
pub const ROUND_TRIP_LIMIT_NOTICE: &str =
    "The assistant could not finish answering. Please try asking differently.";

/// Notice spoken when a round fails.
pub const ROUND_ERROR_NOTICE: &str = "An error occurred while processing the response.";

/// Notice spoken when the model refuses to answer.
pub const REFUSAL_NOTICE: &str = "The assistant refused to answer.";

/// Notice spoken when the reply hit the output token limit.
pub const TRUNCATED_NOTICE: &str = "The answer was too long. Part of it was skipped.";

/// Notice spoken when the safety filter removed part of the reply.
pub const FILTERED_NOTICE: &str =
    "The answer contained unsafe content. Part or all of it was skipped.";

/// Notice spoken the first time a reply triggers a web search.
pub const WEB_SEARCH_NOTICE: &str = "Searching the internet.";

/// How a round ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundOutcome {
    /// The user message and the reply were committed to the timeline.
    Committed,
    /// A tool reverted the whole round. Nothing was committed.
    Reverted,
    /// The session was stopped during the round.
    Ended,
    /// The round was cancelled from outside. Nothing was committed.
    Cancelled,
}

impl RoundOutcome {
    /// Whether the conversation should keep listening afterwards.
    pub fn continue_conversation(self) -> bool {
        self != Self::Ended
    }
}

impl std::fmt::Display for RoundOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Committed => write!(f, "committed"),
            Self::Reverted => write!(f, "reverted"),
            Self::Ended => write!(f, "ended"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Transient messages of the round in progress.
///
/// Holds the user message and everything produced since it (assistant
/// replies and tool results) until the round is committed or discarded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoundState {
    query: Message,
    active: Vec<Message>,
}

impl RoundState {
    /// Start a round for a user utterance.
    pub fn new(utterance: &str) -> Self {
        Self {
            query: Message::user(utterance),
            active: Vec::new(),
        }
    }

    /// The user message of this round.
    pub fn query(&self) -> &Message {
        &self.query
    }

    /// Messages produced since the user message.
    pub fn active(&self) -> &[Message] {
        &self.active
    }

    /// Messages to append after the timeline in the next request.
    pub fn pending(&self) -> Vec<Message> {
        std::iter::once(self.query.clone())
            .chain(self.active.iter().cloned())
            .collect()
    }

    /// Append messages produced by a reply.
    pub fn extend(&mut self, messages: impl IntoIterator<Item = Message>) {
        self.active.extend(messages);
    }

    /// Forget everything produced since the user message.
    pub fn discard_active(&mut self) {
        self.active.clear();
    }

    /// Messages to commit: the user message followed by the rest.
    pub fn into_messages(self) -> Vec<Message> {
        let mut messages = Vec::with_capacity(self.active.len() + 1);
        messages.push(self.query);
        messages.extend(self.active);
        messages
    }
}
