//! Permanent conversation timeline and request assembly.
//!
//! The timeline is an append-only list of committed messages interleaved with
//! *standing messages*: instruction text owned by a toolkit (or by
//! configuration) that can be replaced in place by tag.
//!
//! Request assembly is laid out so the backend's prompt cache stays warm:
//!
//! 1. Standing messages whose content changed since the last assembly are
//!    moved right after the last entry that is not a user message, so the
//!    stable prefix of the conversation does not shift.
//! 2. The leading run of standing messages becomes the request
//!    `instructions` (sorted by priority, blank ones skipped).
//! 3. Everything else is sent in timeline order, followed by the messages of
//!    the round in progress.

use crate::llm::message::Message;

/// Priority of standing messages that do not set one.
pub const DEFAULT_STANDING_PRIORITY: i32 = 50;

/// Priority of the instructions provided by configuration.
pub const CONFIG_STANDING_PRIORITY: i32 = 25;

/// Build the tag key of a standing message owned by `owner`.
pub fn standing_tag(owner: &str, tag: &str) -> String {
    format!("{owner}::{tag}")
}

/// Instruction text contributed outside of the dialogue itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StandingMessage {
    /// Current text. Empty means logically removed.
    pub content: String,
    /// `"<owner>::<tag>"` key for in-place updates.
    pub tag: Option<String>,
    /// Lower values come first in the instructions.
    pub priority: i32,
    assembled_content: String,
}

impl StandingMessage {
    /// Whether the content changed since the last assembly.
    pub fn is_changed(&self) -> bool {
        self.content != self.assembled_content
    }
}

/// One entry of the timeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimelineEntry {
    /// Toolkit or configuration instructions.
    Standing(StandingMessage),
    /// A committed conversation message.
    Message(Message),
}

impl TimelineEntry {
    fn is_user_message(&self) -> bool {
        matches!(self, Self::Message(m) if m.is_user())
    }

    fn is_changed_standing(&self) -> bool {
        matches!(self, Self::Standing(s) if s.is_changed())
    }
}

/// Everything needed to build a backend request from the timeline.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssembledRequest {
    /// Leading standing messages joined into system instructions.
    pub instructions: String,
    /// Conversation messages followed by the pending round messages.
    pub messages: Vec<Message>,
}

/// The permanent message log of a session.
#[derive(Debug, Clone, Default)]
pub struct Timeline {
    entries: Vec<TimelineEntry>,
}

impl Timeline {
    /// Create an empty timeline.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create or update a standing message.
    ///
    /// A tagged message replaces the content of the existing message with the
    /// same tag and keeps its position and priority. Untagged messages, and
    /// tags seen for the first time, are appended.
    pub fn set_standing(&mut self, content: impl Into<String>, tag: Option<String>, priority: i32) {
        let content = content.into();
        if let Some(tag) = tag.as_deref() {
            let existing = self.entries.iter_mut().find_map(|e| match e {
                TimelineEntry::Standing(s) if s.tag.as_deref() == Some(tag) => Some(s),
                _ => None,
            });
            if let Some(standing) = existing {
                standing.content = content;
                return;
            }
        }
        tracing::trace!(?tag, priority, "new standing message");
        self.entries.push(TimelineEntry::Standing(StandingMessage {
            assembled_content: content.clone(),
            content,
            tag,
            priority,
        }));
    }

    /// Append the messages of a finished round.
    pub fn commit(&mut self, messages: impl IntoIterator<Item = Message>) {
        self.entries
            .extend(messages.into_iter().map(TimelineEntry::Message));
    }

    /// Build the instructions and message list for the next request.
    ///
    /// Relocates changed standing messages first; calling it again without
    /// any mutation in between returns the same result.
    pub fn assemble(&mut self, pending: &[Message]) -> AssembledRequest {
        self.relocate_changed();

        let prefix_len = self
            .entries
            .iter()
            .position(|e| !matches!(e, TimelineEntry::Standing(_)))
            .unwrap_or(self.entries.len());

        let mut prefix: Vec<&StandingMessage> = self.entries[..prefix_len]
            .iter()
            .filter_map(|e| match e {
                TimelineEntry::Standing(s) => Some(s),
                TimelineEntry::Message(_) => None,
            })
            .collect();
        prefix.sort_by_key(|s| s.priority);
        let instructions = prefix
            .iter()
            .map(|s| s.content.as_str())
            .filter(|c| !c.is_empty())
            .collect::<Vec<_>>()
            .join("\n\n")
            .trim()
            .to_owned();

        let mut messages: Vec<Message> = self.entries[prefix_len..]
            .iter()
            .filter_map(|e| match e {
                TimelineEntry::Standing(s) if s.content.is_empty() => None,
                TimelineEntry::Standing(s) => Some(Message::developer(s.content.clone())),
                TimelineEntry::Message(m) => Some(m.clone()),
            })
            .collect();
        messages.extend_from_slice(pending);

        AssembledRequest {
            instructions,
            messages,
        }
    }

    fn relocate_changed(&mut self) {
        if !self.entries.iter().any(TimelineEntry::is_changed_standing) {
            return;
        }
        let (mut changed, mut kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.entries)
            .into_iter()
            .partition(TimelineEntry::is_changed_standing);
        for entry in &mut changed {
            if let TimelineEntry::Standing(s) = entry {
                s.assembled_content = s.content.clone();
            }
        }
        let insert_at = kept
            .iter()
            .rposition(|e| !e.is_user_message())
            .map_or(0, |i| i + 1);
        tracing::debug!(
            moved = changed.len(),
            position = insert_at,
            "relocating changed standing messages"
        );
        let tail = kept.split_off(insert_at);
        kept.extend(changed);
        kept.extend(tail);
        self.entries = kept;
    }

    /// Find a standing message by tag.
    pub fn standing(&self, tag: &str) -> Option<&StandingMessage> {
        self.entries.iter().find_map(|e| match e {
            TimelineEntry::Standing(s) if s.tag.as_deref() == Some(tag) => Some(s),
            _ => None,
        })
    }

    /// All entries in order.
    pub fn entries(&self) -> &[TimelineEntry] {
        &self.entries
    }

    /// Number of committed conversation messages, standing messages excluded.
    pub fn message_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| matches!(e, TimelineEntry::Message(_)))
            .count()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the timeline has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
