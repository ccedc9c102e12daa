//! Query progress milestones.
//!
//! Provides callback-based progress reporting that decouples the query
//! engine from whoever displays or reacts to it (UI feedback, the
//! turn-taking state machine).

use std::sync::Arc;

use tokio::sync::mpsc;

/// Milestones of one query, in the order they are reported.
///
/// `Querying` through `Processing` repeat once per backend round-trip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryProgress {
    /// The engine accepted the utterance.
    Starting,
    /// A request is being assembled and submitted.
    Querying,
    /// The request was submitted; no event has arrived yet.
    Waiting,
    /// The first event of the reply arrived.
    Receiving,
    /// The completed reply is being processed.
    Processing,
    /// The round finished.
    Done,
    /// The round failed.
    Error,
}

impl QueryProgress {
    /// Whether the backend has started answering.
    ///
    /// Once this is true the query is no longer cancelled by new speech.
    pub fn is_response(self) -> bool {
        matches!(self, Self::Receiving | Self::Processing | Self::Done)
    }
}

impl std::fmt::Display for QueryProgress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Starting => "starting",
            Self::Querying => "querying",
            Self::Waiting => "waiting",
            Self::Receiving => "receiving",
            Self::Processing => "processing",
            Self::Done => "done",
            Self::Error => "error",
        };
        f.write_str(label)
    }
}

/// Callback type for progress reporting.
pub type ProgressCallback = Arc<dyn Fn(QueryProgress) + Send + Sync>;

/// Fans one progress milestone out to an optional callback and an optional
/// channel.
#[derive(Clone, Default)]
pub struct ProgressReporter {
    callback: Option<ProgressCallback>,
    channel: Option<mpsc::UnboundedSender<QueryProgress>>,
}

impl ProgressReporter {
    /// Reporter that drops every milestone.
    pub fn silent() -> Self {
        Self::default()
    }

    /// Deliver milestones to `callback`.
    pub fn with_callback(mut self, callback: ProgressCallback) -> Self {
        self.callback = Some(callback);
        self
    }

    /// Also deliver milestones to `channel`.
    pub fn with_channel(mut self, channel: mpsc::UnboundedSender<QueryProgress>) -> Self {
        self.channel = Some(channel);
        self
    }

    /// Report a milestone.
    pub fn report(&self, progress: QueryProgress) {
        tracing::trace!(%progress, "query progress");
        if let Some(callback) = &self.callback {
            callback(progress);
        }
        if let Some(channel) = &self.channel {
            // a closed receiver only means nobody is listening anymore
            let _ = channel.send(progress);
        }
    }
}

impl std::fmt::Debug for ProgressReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressReporter")
            .field("callback", &self.callback.is_some())
            .field("channel", &self.channel.is_some())
            .finish()
    }
}
