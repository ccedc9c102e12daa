//! Query engine: one user utterance in, one committed answer out.
//!
//! The [`QueryEngine`] owns the session: the toolkit arena, the
//! [`ToolRegistry`], the [`Timeline`] and the model tier. A round runs
//! through:
//!
//! ```text
//! building → awaiting-reply → processing-reply → repeat | committed | aborted
//! ```
//!
//! - **building**: toolkit hooks run (`on_first_query` once per session,
//!   `on_query` every round), then the request is assembled from the
//!   timeline and the visible tools.
//! - **awaiting-reply**: the backend streams the reply (see
//!   [`query::receive_reply`]).
//! - **processing-reply**: reply items run by descending tool priority. The
//!   first call that asks for a revert or for `stop_processing` skips the
//!   remaining items. Then:
//!   - a `Query` revert drops the round without committing,
//!   - a `Response` revert drops the reply and asks the model again,
//!   - tool results are appended and the model is asked again,
//!   - otherwise the user message and the reply are committed.
//!
//! Any error runs every toolkit's `on_abort` hook before it is returned.

pub mod dispatch;
pub mod dump;
pub mod query;
pub mod types;

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::config::DialogConfig;
use crate::error::{DialogError, Result};
use crate::llm::events::{IncompleteReason, Reply, ReplyItem};
use crate::llm::message::Message;
use crate::llm::provider::{LlmBackend, LlmRequest, ModelTier};
use crate::progress::{ProgressReporter, QueryProgress};
use crate::speech::SpeechSink;
use crate::timeline::{CONFIG_STANDING_PRIORITY, Timeline};
use crate::toolkit::{ContextEffect, Toolkit, ToolkitContext};
use crate::tools::{RevertSignal, ToolOutcome, ToolRegistry, ToolkitId, validate_tool_args};

use dispatch::{ReplyEntry, ToolTarget};
use dump::DebugDump;
pub use types::{
    FILTERED_NOTICE, REFUSAL_NOTICE, ROUND_ERROR_NOTICE, ROUND_TRIP_LIMIT_NOTICE, RoundOutcome,
    RoundState, TRUNCATED_NOTICE,
};

/// Persistable toolkit state, keyed by toolkit name.
pub type ToolkitStates = BTreeMap<String, serde_json::Value>;

/// What processing one reply decided.
enum ReplyStep {
    Repeat,
    Finished(RoundOutcome),
}

/// Drives LLM rounds for one conversation session.
pub struct QueryEngine {
    config: Arc<DialogConfig>,
    backend: Arc<dyn LlmBackend>,
    speech: Arc<dyn SpeechSink>,
    toolkits: Vec<Box<dyn Toolkit>>,
    toolkit_states: Vec<Option<serde_json::Value>>,
    restored: ToolkitStates,
    registry: ToolRegistry,
    timeline: Timeline,
    smarter: bool,
    active: bool,
    started: bool,
    first_query: bool,
    first_query_next: usize,
    session_id: String,
    dump: Option<DebugDump>,
}

impl QueryEngine {
    /// Create an engine. Add toolkits, then call [`start`](Self::start).
    pub fn new(
        config: Arc<DialogConfig>,
        backend: Arc<dyn LlmBackend>,
        speech: Arc<dyn SpeechSink>,
    ) -> Self {
        Self {
            config,
            backend,
            speech,
            toolkits: Vec::new(),
            toolkit_states: Vec::new(),
            restored: ToolkitStates::new(),
            registry: ToolRegistry::new(),
            timeline: Timeline::new(),
            smarter: false,
            active: false,
            started: false,
            first_query: true,
            first_query_next: 0,
            session_id: String::new(),
            dump: None,
        }
    }

    /// Hand previously persisted toolkit state to `on_register`.
    pub fn with_restored_state(mut self, states: ToolkitStates) -> Self {
        self.restored = states;
        self
    }

    /// Add a toolkit.
    ///
    /// # Errors
    ///
    /// Returns [`DialogError::Config`] if the session already started or a
    /// toolkit with the same name was added.
    pub fn add_toolkit(&mut self, toolkit: Box<dyn Toolkit>) -> Result<()> {
        if self.started {
            return Err(DialogError::Config(format!(
                "toolkit '{}' added after session start",
                toolkit.name()
            )));
        }
        if self.toolkits.iter().any(|t| t.name() == toolkit.name()) {
            return Err(DialogError::Config(format!(
                "toolkit '{}' is already registered",
                toolkit.name()
            )));
        }
        self.toolkits.push(toolkit);
        Ok(())
    }

    /// Start the session.
    ///
    /// Sorts toolkits by name, runs every `on_register` and installs the
    /// configured instructions.
    ///
    /// # Errors
    ///
    /// Propagates toolkit hook errors and registration conflicts.
    pub async fn start(&mut self) -> Result<()> {
        if self.started {
            return Err(DialogError::Config("session already started".into()));
        }
        self.started = true;
        self.session_id = uuid::Uuid::new_v4().to_string();
        self.active = true;
        self.smarter = false;
        self.first_query = true;
        self.first_query_next = 0;
        self.toolkits.sort_by(|a, b| a.name().cmp(b.name()));
        self.toolkit_states = vec![None; self.toolkits.len()];
        self.dump = self.config.chat.debug_dump_root().and_then(|root| {
            DebugDump::create(&root, &self.session_id)
                .inspect(|dump| tracing::info!(dir = %dump.dir().display(), "dumping requests"))
                .inspect_err(|e| tracing::warn!(error = %e, "debug dump disabled"))
                .ok()
        });

        for index in 0..self.toolkits.len() {
            let id = ToolkitId(index);
            let mut ctx = self.context(id);
            let restored = self.restored.remove(self.toolkits[index].name());
            let result = self.toolkits[index].on_register(&mut ctx, restored).await;
            let state = result.map_err(|e| self.hook_error(index, e))?;
            self.toolkit_states[index] = state;
            self.merge(ctx)?;
        }

        if let Some(instructions) = self.config.chat.joined_instructions() {
            self.timeline
                .set_standing(instructions, None, CONFIG_STANDING_PRIORITY);
        }

        tracing::info!(
            session_id = %self.session_id,
            toolkits = self.toolkits.len(),
            tools = self.registry.len(),
            backend = self.backend.name(),
            "dialogue session started"
        );
        Ok(())
    }

    /// Run one round for a user utterance.
    ///
    /// # Errors
    ///
    /// Backend failures, toolkit hook failures and
    /// [`DialogError::RoundTripLimit`]. Every toolkit's `on_abort` has run
    /// by the time an error is returned.
    pub async fn query(
        &mut self,
        utterance: &str,
        cancel: &CancellationToken,
        progress: &ProgressReporter,
    ) -> Result<RoundOutcome> {
        if !self.started {
            return Err(DialogError::Config("query before session start".into()));
        }
        let span = tracing::info_span!(
            "round",
            session_id = %self.session_id,
            utterance = %utterance,
        );
        async {
            progress.report(QueryProgress::Starting);
            let mut round = RoundState::new(utterance);
            match self.run_round(&mut round, cancel, progress).await {
                Ok(RoundOutcome::Cancelled) => {
                    tracing::info!("round cancelled");
                    self.abort_toolkits().await;
                    Ok(RoundOutcome::Cancelled)
                }
                Ok(outcome) => {
                    tracing::info!(%outcome, "round finished");
                    progress.report(QueryProgress::Done);
                    Ok(outcome)
                }
                Err(e) => {
                    tracing::error!(error = %e, "round failed");
                    self.abort_toolkits().await;
                    progress.report(QueryProgress::Error);
                    Err(e)
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn run_round(
        &mut self,
        round: &mut RoundState,
        cancel: &CancellationToken,
        progress: &ProgressReporter,
    ) -> Result<RoundOutcome> {
        // A cancelled first round resumes here with the next toolkit.
        if self.first_query {
            while self.first_query_next < self.toolkits.len() {
                if cancel.is_cancelled() {
                    return Ok(RoundOutcome::Cancelled);
                }
                let index = self.first_query_next;
                let mut ctx = self.context(ToolkitId(index));
                let result = self.toolkits[index].on_first_query(&mut ctx).await;
                result.map_err(|e| self.hook_error(index, e))?;
                self.merge(ctx)?;
                self.first_query_next += 1;
            }
            self.registry.prepare(true);
            self.first_query = false;
        }

        for index in 0..self.toolkits.len() {
            if cancel.is_cancelled() {
                return Ok(RoundOutcome::Cancelled);
            }
            let mut ctx = self.context(ToolkitId(index));
            let result = self.toolkits[index].on_query(&mut ctx).await;
            result.map_err(|e| self.hook_error(index, e))?;
            self.merge(ctx)?;
        }

        let max_round_trips = self.config.chat.max_round_trips;
        for trip in 1..=max_round_trips {
            if cancel.is_cancelled() {
                return Ok(RoundOutcome::Cancelled);
            }
            tracing::debug!(trip, max_round_trips, "requesting reply");
            progress.report(QueryProgress::Querying);

            let request = self.build_request(round);
            self.write_dump("request", &request);
            let reply = query::receive_reply(
                self.backend.as_ref(),
                &request,
                self.config.chat.request_timeout(),
                cancel,
                progress,
                self.speech.as_ref(),
            )
            .await?;
            let Some(reply) = reply else {
                return Ok(RoundOutcome::Cancelled);
            };
            self.write_dump("response", &reply);

            progress.report(QueryProgress::Processing);
            match self.process_reply(round, &reply, cancel).await? {
                ReplyStep::Repeat => continue,
                ReplyStep::Finished(outcome) => return Ok(outcome),
            }
        }

        Err(DialogError::RoundTripLimit(max_round_trips))
    }

    /// Assemble the next request for `round`.
    pub fn build_request(&mut self, round: &RoundState) -> LlmRequest {
        self.registry.prepare(false);
        let assembled = self.timeline.assemble(&round.pending());
        let tier = self.tier();
        LlmRequest {
            instructions: assembled.instructions,
            messages: assembled.messages,
            tools: self.registry.visible(),
            tier,
            model: self.config.chat.model_options(tier),
            output_schema: self.config.chat.output_schema.clone(),
            web_search: self.config.chat.web_search,
        }
    }

    async fn process_reply(
        &mut self,
        round: &mut RoundState,
        reply: &Reply,
        cancel: &CancellationToken,
    ) -> Result<ReplyStep> {
        match &reply.incomplete {
            Some(IncompleteReason::MaxOutputTokens) => self.speech.speak(TRUNCATED_NOTICE, true),
            Some(IncompleteReason::ContentFilter) => self.speech.speak(FILTERED_NOTICE, true),
            Some(IncompleteReason::Other(reason)) => {
                tracing::warn!(%reason, "incomplete reply");
                self.speech.speak(
                    &format!("The answer was not processed because of: {reason}"),
                    true,
                );
            }
            None => {}
        }

        round.extend([reply.to_message()]);

        let fallback = self.config.chat.fallback_tool();
        let mut entries = dispatch::plan(reply, &self.registry, fallback);
        let mut revert = RevertSignal::None;

        for entry in &mut entries {
            if cancel.is_cancelled() {
                return Ok(ReplyStep::Finished(RoundOutcome::Cancelled));
            }
            match &entry.item {
                ReplyItem::Text { text } => {
                    if !text.is_empty() {
                        self.speech.speak(text, false);
                    }
                }
                ReplyItem::Refusal { text } => {
                    tracing::info!(refusal = %text, "model refused");
                    self.speech.speak(REFUSAL_NOTICE, true);
                    self.speech.speak(text, true);
                }
                ReplyItem::Reasoning { .. } | ReplyItem::WebSearch => {}
                ReplyItem::FunctionCall {
                    call_id,
                    name,
                    arguments,
                } => {
                    let call_id = call_id.clone();
                    let Some(outcome) = self
                        .execute_call(&call_id, name, arguments, entry.target.as_ref(), cancel)
                        .await?
                    else {
                        return Ok(ReplyStep::Finished(RoundOutcome::Cancelled));
                    };
                    revert = revert.combine(outcome.revert);
                    entry.result = Some(Message::tool_result(call_id, outcome.content()));
                    if outcome.revert.is_revert() || outcome.stop_processing {
                        tracing::debug!(revert = ?outcome.revert, "skipping remaining reply items");
                        break;
                    }
                }
            }
        }

        match revert {
            RevertSignal::Query => {
                round.discard_active();
                let outcome = if self.active {
                    RoundOutcome::Reverted
                } else {
                    RoundOutcome::Ended
                };
                return Ok(ReplyStep::Finished(outcome));
            }
            RevertSignal::Response => {
                round.discard_active();
                return Ok(ReplyStep::Repeat);
            }
            RevertSignal::None => {}
        }

        let results = dispatch::results_in_reply_order(entries);
        if !results.is_empty() {
            round.extend(results);
            return Ok(ReplyStep::Repeat);
        }

        if cancel.is_cancelled() {
            return Ok(ReplyStep::Finished(RoundOutcome::Cancelled));
        }
        let committed = std::mem::replace(round, RoundState::new(""));
        self.timeline.commit(committed.into_messages());
        let outcome = if self.active {
            RoundOutcome::Committed
        } else {
            RoundOutcome::Ended
        };
        Ok(ReplyStep::Finished(outcome))
    }

    /// Run one function call. `None` means the call was cancelled.
    async fn execute_call(
        &mut self,
        call_id: &str,
        requested: &str,
        arguments: &str,
        target: Option<&ToolTarget>,
        cancel: &CancellationToken,
    ) -> Result<Option<ToolOutcome>> {
        let Some(target) = target else {
            tracing::warn!(tool = %requested, "model called an unknown function");
            return Ok(Some(ToolOutcome::error(format!(
                "Unknown function: {requested}"
            ))));
        };

        let args = match validate_tool_args(&target.name, arguments, target.parameters.as_ref()) {
            Ok(args) => args,
            Err(e) => {
                let reason = match e {
                    DialogError::Tool(message) => message,
                    other => other.to_string(),
                };
                tracing::warn!(tool = %target.name, %reason, "invalid tool arguments");
                return Ok(Some(ToolOutcome::error(format!(
                    "Invalid arguments: {reason}"
                ))));
            }
        };

        let span = tracing::info_span!(
            "tool_call",
            tool = %target.name,
            requested = %requested,
            call_id = %call_id,
        );
        let mut ctx = self.context(target.toolkit);
        let toolkit = self
            .toolkits
            .get_mut(target.toolkit.0)
            .ok_or_else(|| DialogError::Config(format!("no toolkit {}", target.toolkit)))?;

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::warn!(tool = %target.name, "tool call cancelled");
                return Ok(None);
            }
            result = toolkit.call_tool(&target.name, args, &mut ctx).instrument(span) => result,
        };
        self.merge(ctx)?;

        let outcome = match result {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::warn!(tool = %target.name, error = %e, "tool failed");
                ToolOutcome::error(e.to_string())
            }
        };
        Ok(Some(outcome))
    }

    async fn abort_toolkits(&mut self) {
        for index in 0..self.toolkits.len() {
            let mut ctx = self.context(ToolkitId(index));
            let result = self.toolkits[index].on_abort(&mut ctx).await;
            if let Err(e) = result.and_then(|()| self.merge(ctx)) {
                tracing::error!(
                    toolkit = self.toolkits[index].name(),
                    error = %e,
                    "toolkit abort hook failed"
                );
                self.speech.speak(ROUND_ERROR_NOTICE, true);
            }
        }
    }

    /// Collect persistable toolkit state.
    ///
    /// Calls every `on_serialize`; toolkits that return nothing keep the
    /// state from `on_register`.
    ///
    /// # Errors
    ///
    /// Propagates hook errors.
    pub async fn serialize_toolkits(&mut self) -> Result<ToolkitStates> {
        for index in 0..self.toolkits.len() {
            let mut ctx = self.context(ToolkitId(index));
            let result = self.toolkits[index].on_serialize(&mut ctx).await;
            if let Some(state) = result.map_err(|e| self.hook_error(index, e))? {
                self.toolkit_states[index] = Some(state);
            }
            self.merge(ctx)?;
        }
        Ok(self
            .toolkits
            .iter()
            .zip(&self.toolkit_states)
            .filter_map(|(toolkit, state)| {
                state
                    .clone()
                    .map(|state| (toolkit.name().to_owned(), state))
            })
            .collect())
    }

    fn write_dump<T: serde::Serialize>(&mut self, kind: &str, value: &T) {
        if let Some(dump) = &mut self.dump
            && let Err(e) = dump.write(kind, value)
        {
            tracing::warn!(kind, error = %e, "failed to write debug dump");
        }
    }

    /// Directory of this session's debug dump, if enabled.
    pub fn dump_dir(&self) -> Option<&std::path::Path> {
        self.dump.as_ref().map(DebugDump::dir)
    }

    /// Attach the toolkit name to a failed hook.
    fn hook_error(&self, index: usize, e: DialogError) -> DialogError {
        match e {
            DialogError::Toolkit { .. } => e,
            other => {
                let name = self.toolkits.get(index).map_or("", |t| t.name());
                DialogError::toolkit(name, other.to_string())
            }
        }
    }

    fn context(&self, id: ToolkitId) -> ToolkitContext {
        let name = self.toolkits.get(id.0).map_or("", |t| t.name());
        ToolkitContext::new(
            id,
            name,
            Arc::clone(&self.config),
            Arc::clone(&self.speech),
            self.smarter,
            self.active,
        )
    }

    fn merge(&mut self, ctx: ToolkitContext) -> Result<()> {
        let (effects, smarter, active) = ctx.into_parts();
        if smarter != self.smarter {
            tracing::info!(smarter, "model tier changed");
        }
        if self.active && !active {
            tracing::info!("session stopped by toolkit");
        }
        self.smarter = smarter;
        self.active = active;
        for effect in effects {
            match effect {
                ContextEffect::RegisterTool(tool) => self.registry.register(tool)?,
                ContextEffect::SetToolHidden { name, hidden } => {
                    self.registry.set_hidden(&name, hidden)?;
                }
                ContextEffect::SetStanding {
                    content,
                    tag,
                    priority,
                } => self.timeline.set_standing(content, tag, priority),
                ContextEffect::DebugMark { toolkit, note } => {
                    self.write_dump(
                        "marker",
                        &serde_json::json!({ "toolkit": toolkit, "note": note }),
                    );
                }
            }
        }
        Ok(())
    }

    /// Stop the session. The current round, if any, still finishes.
    pub fn stop_session(&mut self) {
        self.active = false;
    }

    /// Identifier of the running session, empty before start.
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Whether the session is active.
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Whether the smarter model tier is selected.
    pub fn is_smarter(&self) -> bool {
        self.smarter
    }

    /// Model tier used for the next request.
    pub fn tier(&self) -> ModelTier {
        if self.smarter {
            ModelTier::Smarter
        } else {
            ModelTier::Standard
        }
    }

    /// The permanent conversation log.
    pub fn timeline(&self) -> &Timeline {
        &self.timeline
    }

    /// Registered tools.
    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Toolkit names in hook order.
    pub fn toolkit_names(&self) -> Vec<&str> {
        self.toolkits.iter().map(|t| t.name()).collect()
    }

    /// Session configuration.
    pub fn config(&self) -> &DialogConfig {
        &self.config
    }

    /// Speech output shared with toolkits.
    pub fn speech(&self) -> &Arc<dyn SpeechSink> {
        &self.speech
    }
}

impl std::fmt::Debug for QueryEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryEngine")
            .field("backend", &self.backend.name())
            .field("toolkits", &self.toolkit_names())
            .field("tools", &self.registry.len())
            .field("timeline", &self.timeline.len())
            .field("smarter", &self.smarter)
            .field("active", &self.active)
            .finish()
    }
}
