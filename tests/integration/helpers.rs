//! Shared helpers for integration tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use zefira::config::DialogConfig;
use zefira::llm::{LlmBackend, LlmError, LlmEvent, LlmEventStream, LlmRequest, Reply};
use zefira::toolkit::chat_manager::{ChatManager, Clock};
use zefira::tools::{Tool, ToolOutcome};
use zefira::{QueryEngine, SpeechSink, Toolkit, ToolkitContext};

// ── Backend ──────────────────────────────────────────────────────────

/// One scripted backend answer.
#[derive(Debug, Clone)]
pub(crate) struct Step {
    /// Delay before the first event is emitted.
    pub delay: Duration,
    /// Emit a text delta right away, then wait `delay` before completing.
    pub early_delta: bool,
    pub reply: Reply,
}

impl Step {
    pub(crate) fn reply(reply: Reply) -> Self {
        Self {
            delay: Duration::ZERO,
            early_delta: false,
            reply,
        }
    }

    pub(crate) fn delayed(reply: Reply, delay: Duration) -> Self {
        Self {
            delay,
            early_delta: false,
            reply,
        }
    }

    pub(crate) fn streaming(reply: Reply, delay: Duration) -> Self {
        Self {
            delay,
            early_delta: true,
            reply,
        }
    }
}

/// Backend that replays [`Step`]s and records every request it receives.
///
/// Once the script runs out it keeps answering with `repeat`, or with a
/// plain "Done." text reply.
#[derive(Default)]
pub(crate) struct ScriptedBackend {
    steps: Mutex<VecDeque<Step>>,
    repeat: Option<Reply>,
    requests: Mutex<Vec<LlmRequest>>,
}

impl ScriptedBackend {
    pub(crate) fn new(steps: Vec<Step>) -> Self {
        Self {
            steps: Mutex::new(steps.into()),
            ..Self::default()
        }
    }

    pub(crate) fn replies(replies: Vec<Reply>) -> Self {
        Self::new(replies.into_iter().map(Step::reply).collect())
    }

    pub(crate) fn repeating(reply: Reply) -> Self {
        Self {
            repeat: Some(reply),
            ..Self::default()
        }
    }

    pub(crate) fn requests(&self) -> Vec<LlmRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub(crate) fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl LlmBackend for ScriptedBackend {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn submit(&self, request: &LlmRequest) -> Result<LlmEventStream, LlmError> {
        self.requests.lock().unwrap().push(request.clone());
        let step = self.steps.lock().unwrap().pop_front().unwrap_or_else(|| {
            Step::reply(self.repeat.clone().unwrap_or_else(|| Reply::text("Done.")))
        });
        let stream = async_stream::stream! {
            if step.early_delta {
                yield LlmEvent::TextDelta {
                    text: step.reply.to_message().text_content().to_owned(),
                };
            }
            if !step.delay.is_zero() {
                tokio::time::sleep(step.delay).await;
            }
            yield LlmEvent::Completed { reply: step.reply };
        };
        Ok(Box::pin(stream))
    }
}

/// Text of the last user message of a request.
pub(crate) fn last_user_text(request: &LlmRequest) -> String {
    request.last_user_text().unwrap_or_default().to_owned()
}

// ── Speech ───────────────────────────────────────────────────────────

/// Records everything spoken.
#[derive(Default)]
pub(crate) struct RecordingSink {
    spoken: Mutex<Vec<(String, bool)>>,
}

impl RecordingSink {
    pub(crate) fn texts(&self) -> Vec<String> {
        self.spoken
            .lock()
            .unwrap()
            .iter()
            .map(|(text, _)| text.clone())
            .collect()
    }

    pub(crate) fn notices(&self) -> Vec<String> {
        self.spoken
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, notice)| *notice)
            .map(|(text, _)| text.clone())
            .collect()
    }
}

impl SpeechSink for RecordingSink {
    fn speak(&self, text: &str, is_system_notice: bool) {
        self.spoken
            .lock()
            .unwrap()
            .push((text.to_owned(), is_system_notice));
    }
}

// ── Toolkits ─────────────────────────────────────────────────────────

/// Hook counters shared between a test and its [`HomeToolkit`].
#[derive(Default)]
pub(crate) struct HookCounts {
    pub aborts: AtomicUsize,
    pub queries: AtomicUsize,
    pub calls: Mutex<Vec<String>>,
}

impl HookCounts {
    pub(crate) fn aborts(&self) -> usize {
        self.aborts.load(Ordering::SeqCst)
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

/// Smart-home style toolkit.
///
/// - `switch_light {on}`: plain tool
/// - `list_scenes`: dynamic tool
/// - `scene_editor`: hidden until `unlock_scenes` is called
/// - `set_mood {mood}`: updates the `home::mood` standing message
/// - `forget_that`: reverts the whole query
pub(crate) struct HomeToolkit {
    counts: Arc<HookCounts>,
}

impl HomeToolkit {
    pub(crate) fn new(counts: Arc<HookCounts>) -> Self {
        Self { counts }
    }
}

#[async_trait]
impl Toolkit for HomeToolkit {
    fn name(&self) -> &str {
        "home"
    }

    async fn on_register(
        &mut self,
        ctx: &mut ToolkitContext,
        _restored: Option<serde_json::Value>,
    ) -> zefira::Result<Option<serde_json::Value>> {
        ctx.register_tool(Tool::new("list_scenes", "List lighting scenes.").with_dynamic(true));
        ctx.register_tool(
            Tool::new("switch_light", "Turn the light on or off.").with_parameters(
                serde_json::json!({
                    "type": "object",
                    "properties": { "on": { "type": "boolean" } },
                    "required": ["on"]
                }),
            ),
        );
        ctx.register_tool(Tool::new("scene_editor", "Edit scenes.").with_hidden(true));
        ctx.register_tool(Tool::new("unlock_scenes", "Allow editing scenes."));
        ctx.register_tool(
            Tool::new("set_mood", "Remember the user's mood.").with_parameters(
                serde_json::json!({
                    "type": "object",
                    "properties": { "mood": { "type": "string" } },
                    "required": ["mood"]
                }),
            ),
        );
        ctx.register_tool(Tool::new("forget_that", "Forget the last request."));
        ctx.set_tagged_standing("mood", "The user seems calm.");
        Ok(None)
    }

    async fn on_query(&mut self, _ctx: &mut ToolkitContext) -> zefira::Result<()> {
        self.counts.queries.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn on_abort(&mut self, _ctx: &mut ToolkitContext) -> zefira::Result<()> {
        self.counts.aborts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn call_tool(
        &mut self,
        name: &str,
        args: serde_json::Value,
        ctx: &mut ToolkitContext,
    ) -> zefira::Result<ToolOutcome> {
        self.counts.calls.lock().unwrap().push(name.to_owned());
        match name {
            "switch_light" => Ok(ToolOutcome::json(&serde_json::json!({
                "light": if args["on"].as_bool().unwrap_or_default() { "on" } else { "off" }
            }))),
            "list_scenes" => Ok(ToolOutcome::text("evening, movie")),
            "unlock_scenes" => {
                ctx.set_tool_hidden("scene_editor", false);
                Ok(ToolOutcome::ok())
            }
            "set_mood" => {
                let mood = args["mood"].as_str().unwrap_or_default();
                let content = if mood.is_empty() {
                    String::new()
                } else {
                    format!("The user seems {mood}.")
                };
                ctx.set_tagged_standing("mood", content);
                Ok(ToolOutcome::ok())
            }
            "forget_that" => Ok(ToolOutcome::revert_query()),
            other => Err(zefira::DialogError::Tool(format!("home has no tool '{other}'"))),
        }
    }
}

/// Chat manager with a fixed clock so standing instructions stay stable.
pub(crate) fn chat_manager() -> ChatManager {
    let clock: Clock = Arc::new(|| {
        NaiveDate::from_ymd_opt(2025, 3, 14)
            .and_then(|d| d.and_hms_opt(9, 26, 53))
            .unwrap()
    });
    ChatManager::with_clock(clock)
}

// ── Engine ───────────────────────────────────────────────────────────

pub(crate) struct TestSession {
    pub engine: QueryEngine,
    pub backend: Arc<ScriptedBackend>,
    pub sink: Arc<RecordingSink>,
    pub counts: Arc<HookCounts>,
}

/// Started engine with the chat manager and the home toolkit.
pub(crate) async fn session(backend: ScriptedBackend, config: DialogConfig) -> TestSession {
    let backend = Arc::new(backend);
    let sink = Arc::new(RecordingSink::default());
    let counts = Arc::new(HookCounts::default());
    let mut engine = QueryEngine::new(
        Arc::new(config),
        Arc::clone(&backend) as Arc<dyn LlmBackend>,
        Arc::clone(&sink) as Arc<dyn SpeechSink>,
    );
    engine
        .add_toolkit(Box::new(HomeToolkit::new(Arc::clone(&counts))))
        .unwrap();
    engine.add_toolkit(Box::new(chat_manager())).unwrap();
    engine.start().await.unwrap();
    TestSession {
        engine,
        backend,
        sink,
        counts,
    }
}

/// Unstarted engine with the same toolkits, for the coordinator tests.
pub(crate) fn unstarted_engine(
    backend: &Arc<ScriptedBackend>,
    sink: &Arc<RecordingSink>,
    counts: &Arc<HookCounts>,
    config: DialogConfig,
) -> QueryEngine {
    let mut engine = QueryEngine::new(
        Arc::new(config),
        Arc::clone(backend) as Arc<dyn LlmBackend>,
        Arc::clone(sink) as Arc<dyn SpeechSink>,
    );
    engine
        .add_toolkit(Box::new(HomeToolkit::new(Arc::clone(counts))))
        .unwrap();
    engine.add_toolkit(Box::new(chat_manager())).unwrap();
    engine
}
