//! Turn-taking coordinator that drives the query engine from speech input.
//!
//! ```text
//! init → waiting ─[non-final]→ pre-recognition ─[5s]→ pre-query ─[response]→ query → waiting
//!           │  └──[final]────→ recognition ─────[3s]──↗     │
//!           └─[7s idle]→ exit        ↑                      │
//!                                    └──[text changed]──────┘
//! ```
//!
//! A round is one trip from Waiting through Query and back to Waiting. The
//! query is submitted as soon as the silence timer fires, but the
//! conversation only commits to it once the engine reports its first
//! response. Speech arriving before that cancels the query and goes back to
//! listening.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::time::{Instant, sleep_until};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::RecognitionConfig;
use crate::engine::{QueryEngine, ROUND_ERROR_NOTICE, ROUND_TRIP_LIMIT_NOTICE, RoundOutcome};
use crate::error::{DialogError, Result};
use crate::progress::{ProgressCallback, ProgressReporter};
use crate::speech::{AudioBacklog, RecognitionState, RecognitionUpdate, SpeechSink, SpeechSource};

/// States of the conversation state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConversationState {
    /// Session not started yet.
    Init,
    /// Listening with no text recognized.
    Waiting,
    /// Only non-final text recognized.
    PreRecognition,
    /// Final text recognized, waiting for silence.
    Recognition,
    /// Query submitted, still listening for more speech.
    PreQuery,
    /// Engine is answering.
    Query,
    /// Conversation over.
    Exit,
}

impl std::fmt::Display for ConversationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Init => "init",
            Self::Waiting => "waiting",
            Self::PreRecognition => "pre_recognition",
            Self::Recognition => "recognition",
            Self::PreQuery => "pre_query",
            Self::Query => "query",
            Self::Exit => "exit",
        };
        f.write_str(name)
    }
}

/// Result of [`ConversationCoordinator::run_round`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoundResult {
    /// Whether another round should follow.
    pub continue_conversation: bool,
}

/// What a recognition read produced.
enum Heard {
    Changed,
    Unchanged,
    Closed,
}

/// Drives a [`QueryEngine`] from a [`SpeechSource`].
pub struct ConversationCoordinator {
    engine: QueryEngine,
    source: Box<dyn SpeechSource>,
    speech: Arc<dyn SpeechSink>,
    timing: RecognitionConfig,
    progress: ProgressReporter,
    backlog: Option<AudioBacklog>,
    text: RecognitionState,
    state: ConversationState,
    stop: CancellationToken,
}

impl ConversationCoordinator {
    /// Create a coordinator. Timing comes from the engine's configuration.
    pub fn new(engine: QueryEngine, source: Box<dyn SpeechSource>) -> Self {
        let timing = engine.config().recognition.clone();
        let speech = Arc::clone(engine.speech());
        Self {
            engine,
            source,
            speech,
            timing,
            progress: ProgressReporter::silent(),
            backlog: None,
            text: RecognitionState::new(),
            state: ConversationState::Init,
            stop: CancellationToken::new(),
        }
    }

    /// Report engine progress to `callback`.
    pub fn with_progress(mut self, callback: ProgressCallback) -> Self {
        self.progress = self.progress.with_callback(callback);
        self
    }

    /// Audio captured before the first round, replayed into recognition.
    pub fn with_backlog(mut self, backlog: AudioBacklog) -> Self {
        self.backlog = Some(backlog);
        self
    }

    /// Override silence and idle timing.
    pub fn with_timing(mut self, timing: RecognitionConfig) -> Self {
        self.timing = timing;
        self
    }

    /// Token that stops the conversation when cancelled.
    pub fn stop_handle(&self) -> CancellationToken {
        self.stop.clone()
    }

    /// Stop the conversation. A running query is cancelled.
    pub fn stop(&self) {
        info!("conversation stop requested");
        self.stop.cancel();
    }

    /// Current state.
    pub fn state(&self) -> ConversationState {
        self.state
    }

    /// The engine, for inspecting the timeline and session state.
    pub fn engine(&self) -> &QueryEngine {
        &self.engine
    }

    /// Mutable access to the engine, e.g. to serialize toolkit state.
    pub fn engine_mut(&mut self) -> &mut QueryEngine {
        &mut self.engine
    }

    /// Start the session.
    ///
    /// # Errors
    ///
    /// Propagates [`QueryEngine::start`] errors, and fails if called twice.
    pub async fn start(&mut self) -> Result<()> {
        if self.state != ConversationState::Init {
            return Err(DialogError::Config("conversation already started".into()));
        }
        self.engine.start().await?;
        self.transition(ConversationState::Waiting);
        Ok(())
    }

    /// Run rounds until the conversation ends.
    ///
    /// # Errors
    ///
    /// Returns the first error from [`run_round`](Self::run_round).
    pub async fn run(&mut self) -> Result<()> {
        if self.state == ConversationState::Init {
            self.start().await?;
        }
        let mut backlog = self.backlog.take();
        let mut rounds = 0_usize;
        loop {
            rounds += 1;
            let result = self.run_round(backlog.take()).await?;
            if !result.continue_conversation {
                info!(rounds, "conversation ended");
                return Ok(());
            }
        }
    }

    /// Listen, query and answer once.
    ///
    /// Returns after the answer (`continue_conversation: true`) or when the
    /// conversation ends: idle timeout, closed speech source, a stop
    /// request, or a toolkit ending the session.
    ///
    /// # Errors
    ///
    /// Fails if the session was not started or recognition cannot start.
    /// Engine errors are spoken and logged, not returned.
    pub async fn run_round(&mut self, backlog: Option<AudioBacklog>) -> Result<RoundResult> {
        match self.state {
            ConversationState::Init => {
                return Err(DialogError::Config("conversation not started".into()));
            }
            ConversationState::Exit => {
                return Ok(RoundResult {
                    continue_conversation: false,
                });
            }
            _ => {}
        }

        self.source.start(backlog).await?;
        self.text.clear();
        self.transition(ConversationState::Waiting);
        let result = self.listen_and_answer().await;
        self.source.cancel().await;

        let state = result?;
        self.transition(state);
        Ok(RoundResult {
            continue_conversation: state != ConversationState::Exit,
        })
    }

    /// Runs the machine until it is back in Waiting after a query, or exits.
    async fn listen_and_answer(&mut self) -> Result<ConversationState> {
        loop {
            let next = match self.state {
                ConversationState::Waiting => self.waiting().await?,
                ConversationState::PreRecognition => self.pre_recognition().await?,
                ConversationState::Recognition => self.recognition().await?,
                ConversationState::PreQuery => match self.query().await? {
                    ConversationState::Waiting => return Ok(ConversationState::Waiting),
                    other => other,
                },
                ConversationState::Init | ConversationState::Query | ConversationState::Exit => {
                    return Ok(ConversationState::Exit);
                }
            };
            if next == ConversationState::Exit {
                return Ok(next);
            }
            self.transition(next);
        }
    }

    async fn waiting(&mut self) -> Result<ConversationState> {
        let deadline = Instant::now() + self.timing.idle_timeout();
        loop {
            tokio::select! {
                biased;
                () = self.stop.cancelled() => return Ok(ConversationState::Exit),
                update = self.source.read() => match self.hear(update?) {
                    Heard::Closed => return Ok(ConversationState::Exit),
                    Heard::Changed => return Ok(self.listening_state()),
                    Heard::Unchanged => {}
                },
                () = sleep_until(deadline) => {
                    info!(
                        idle_ms = self.timing.idle_timeout_ms,
                        "no speech, ending conversation"
                    );
                    return Ok(ConversationState::Exit);
                }
            }
        }
    }

    async fn recognition(&mut self) -> Result<ConversationState> {
        let mut deadline = Instant::now() + self.timing.final_silence();
        loop {
            tokio::select! {
                biased;
                () = self.stop.cancelled() => return Ok(ConversationState::Exit),
                update = self.source.read() => match self.hear(update?) {
                    Heard::Closed => return Ok(ConversationState::Exit),
                    Heard::Changed if !self.text.has_final() => {
                        return Ok(ConversationState::PreRecognition);
                    }
                    Heard::Changed => deadline = Instant::now() + self.timing.final_silence(),
                    Heard::Unchanged => {}
                },
                () = sleep_until(deadline) => return Ok(ConversationState::PreQuery),
            }
        }
    }

    async fn pre_recognition(&mut self) -> Result<ConversationState> {
        let mut deadline = Instant::now() + self.timing.partial_silence();
        loop {
            tokio::select! {
                biased;
                () = self.stop.cancelled() => return Ok(ConversationState::Exit),
                update = self.source.read() => match self.hear(update?) {
                    Heard::Closed => return Ok(ConversationState::Exit),
                    Heard::Changed if self.text.has_final() => {
                        return Ok(ConversationState::Recognition);
                    }
                    Heard::Changed => deadline = Instant::now() + self.timing.partial_silence(),
                    Heard::Unchanged => {}
                },
                () = sleep_until(deadline) => return Ok(ConversationState::PreQuery),
            }
        }
    }

    /// PreQuery and Query: submit the text and race the first response
    /// against further speech.
    async fn query(&mut self) -> Result<ConversationState> {
        if !self.text.has_text() {
            self.text.clear();
            return Ok(ConversationState::Waiting);
        }
        let utterance = self.text.query_text();
        info!(%utterance, "submitting query");

        let cancel = self.stop.child_token();
        let (milestone_tx, mut milestones) = mpsc::unbounded_channel();
        let progress = self.progress.clone().with_channel(milestone_tx);

        let mut responded = false;
        let mut interrupted = false;
        let mut source_open = true;
        let result = {
            let round = self.engine.query(&utterance, &cancel, &progress);
            tokio::pin!(round);
            loop {
                tokio::select! {
                    biased;
                    result = &mut round => break result,
                    Some(milestone) = milestones.recv(), if !responded && !interrupted => {
                        if milestone.is_response() {
                            responded = true;
                            debug!(from = %self.state, to = %ConversationState::Query, "state transition");
                            self.state = ConversationState::Query;
                        }
                    }
                    update = self.source.read(), if source_open => match update {
                        Ok(Some(update)) if responded => {
                            debug!(text = %update.text, is_final = update.is_final, "speech during answer ignored");
                        }
                        Ok(Some(update)) => {
                            if self.text.apply(&update) && !interrupted {
                                info!("speech continued, cancelling query");
                                interrupted = true;
                                cancel.cancel();
                            }
                        }
                        Ok(None) => source_open = false,
                        Err(e) => {
                            warn!(error = %e, "speech recognition failed during query");
                            source_open = false;
                        }
                    },
                }
            }
        };

        match result {
            Ok(RoundOutcome::Cancelled) if interrupted && !self.stop.is_cancelled() => {
                if !source_open {
                    return Ok(ConversationState::Exit);
                }
                Ok(self.listening_state())
            }
            Ok(outcome) => {
                self.text.clear();
                if self.stop.is_cancelled() || !outcome.continue_conversation() {
                    Ok(ConversationState::Exit)
                } else {
                    Ok(ConversationState::Waiting)
                }
            }
            Err(e) => {
                self.report_failure(&e);
                self.text.clear();
                if self.stop.is_cancelled() {
                    Ok(ConversationState::Exit)
                } else {
                    Ok(ConversationState::Waiting)
                }
            }
        }
    }

    fn hear(&mut self, update: Option<RecognitionUpdate>) -> Heard {
        let Some(update) = update else {
            info!("speech source closed");
            return Heard::Closed;
        };
        debug!(text = %update.text, is_final = update.is_final, "recognized");
        if self.text.apply(&update) {
            Heard::Changed
        } else {
            Heard::Unchanged
        }
    }

    /// Recognition if final text exists, PreRecognition otherwise.
    fn listening_state(&self) -> ConversationState {
        if self.text.has_final() {
            ConversationState::Recognition
        } else {
            ConversationState::PreRecognition
        }
    }

    fn report_failure(&self, error: &DialogError) {
        tracing::error!(error = %error, "query failed");
        let notice = match error {
            DialogError::RoundTripLimit(_) => ROUND_TRIP_LIMIT_NOTICE,
            _ => ROUND_ERROR_NOTICE,
        };
        self.speech.speak(notice, true);
    }

    fn transition(&mut self, next: ConversationState) {
        if next != self.state {
            debug!(from = %self.state, to = %next, "state transition");
            self.state = next;
        }
    }
}

impl std::fmt::Debug for ConversationCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversationCoordinator")
            .field("state", &self.state)
            .field("text", &self.text)
            .field("engine", &self.engine)
            .finish_non_exhaustive()
    }
}
