//! Speech recognition and synthesis boundaries.
//!
//! The dialogue engine does not capture or play audio itself. It consumes
//! recognized text from a [`SpeechSource`] and hands reply text to a
//! [`SpeechSink`].

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::{DialogError, Result};

/// One result from the speech recognizer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecognitionUpdate {
    /// Recognized text.
    pub text: String,
    /// Final results are settled; non-final ones may still change.
    pub is_final: bool,
}

impl RecognitionUpdate {
    /// Final recognition result.
    pub fn final_text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_final: true,
        }
    }

    /// Interim recognition result.
    pub fn partial(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_final: false,
        }
    }
}

/// Audio captured before recognition started (e.g. while a wake word was
/// being detected). Replayed into the recognizer so nothing is lost.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AudioBacklog {
    /// Mono PCM samples.
    pub samples: Vec<i16>,
    /// Sample rate of `samples` in Hz.
    pub sample_rate: u32,
}

/// Streaming speech recognizer.
#[async_trait]
pub trait SpeechSource: Send {
    /// Begin recognizing, feeding `backlog` first if present.
    async fn start(&mut self, backlog: Option<AudioBacklog>) -> Result<()>;

    /// Next recognition result, or `None` once the source is closed.
    ///
    /// Must be cancel-safe: it is raced against timers and the query engine.
    async fn read(&mut self) -> Result<Option<RecognitionUpdate>>;

    /// Stop recognizing. Results arriving afterwards belong to the next
    /// [`start`](Self::start).
    async fn cancel(&mut self);
}

/// Speech synthesis output.
pub trait SpeechSink: Send + Sync {
    /// Queue text for playback. System notices are spoken in a distinct
    /// voice or style.
    fn speak(&self, text: &str, is_system_notice: bool);

    /// Short audible cue while the backend is busy (e.g. searching the web).
    fn progress_tick(&self) {}
}

/// Accumulated recognizer output for the utterance in progress.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecognitionState {
    final_text: String,
    non_final_text: String,
}

impl RecognitionState {
    /// Empty state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one recognizer result. Returns whether the text changed.
    ///
    /// Final text is appended to the settled text and clears the interim
    /// text. Interim text replaces the previous interim text.
    pub fn apply(&mut self, update: &RecognitionUpdate) -> bool {
        let text = update.text.trim();
        let mut final_text = self.final_text.clone();
        let mut non_final_text;

        if update.is_final {
            if !text.is_empty() {
                if !final_text.is_empty() {
                    final_text.push(' ');
                }
                final_text.push_str(text);
            }
            non_final_text = String::new();
        } else {
            non_final_text = text.to_owned();
            if !final_text.is_empty() {
                non_final_text.insert(0, ' ');
            }
        }

        let changed = final_text != self.final_text || non_final_text != self.non_final_text;
        if changed {
            self.final_text = final_text;
            self.non_final_text = non_final_text;
        }
        changed
    }

    /// Settled text.
    pub fn final_text(&self) -> &str {
        &self.final_text
    }

    /// Interim text, with a leading space when settled text precedes it.
    pub fn non_final_text(&self) -> &str {
        &self.non_final_text
    }

    /// Whether any settled text exists.
    pub fn has_final(&self) -> bool {
        !self.final_text.is_empty()
    }

    /// Whether there is anything at all to submit.
    pub fn has_text(&self) -> bool {
        !self.query_text().is_empty()
    }

    /// Utterance to submit: settled plus interim text.
    pub fn query_text(&self) -> String {
        format!("{}{}", self.final_text, self.non_final_text)
            .trim()
            .to_owned()
    }

    /// Forget everything.
    pub fn clear(&mut self) {
        self.final_text.clear();
        self.non_final_text.clear();
    }
}

/// [`SpeechSource`] fed from a channel. Used by the console harness and by
/// tests.
#[derive(Debug)]
pub struct ChannelSpeechSource {
    updates: mpsc::Receiver<RecognitionUpdate>,
    started: bool,
}

impl ChannelSpeechSource {
    /// Create a source and the sender that feeds it.
    pub fn new(capacity: usize) -> (Self, mpsc::Sender<RecognitionUpdate>) {
        let (tx, rx) = mpsc::channel(capacity);
        (
            Self {
                updates: rx,
                started: false,
            },
            tx,
        )
    }
}

#[async_trait]
impl SpeechSource for ChannelSpeechSource {
    async fn start(&mut self, backlog: Option<AudioBacklog>) -> Result<()> {
        if self.started {
            return Err(DialogError::Speech("recognition already started".into()));
        }
        tracing::debug!(
            backlog_samples = backlog.as_ref().map_or(0, |b| b.samples.len()),
            "channel speech source started"
        );
        self.started = true;
        Ok(())
    }

    async fn read(&mut self) -> Result<Option<RecognitionUpdate>> {
        Ok(self.updates.recv().await)
    }

    async fn cancel(&mut self) {
        self.started = false;
    }
}
