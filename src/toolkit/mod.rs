//! Pluggable capability modules.
//!
//! A [`Toolkit`] contributes tools and standing messages to a session and
//! executes the tool calls routed to it. Toolkits never touch the engine
//! directly: every hook receives a [`ToolkitContext`], and the changes
//! recorded there are merged by the engine once the hook returns.

pub mod chat_manager;

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::DialogConfig;
use crate::error::Result;
use crate::speech::SpeechSink;
use crate::timeline::{DEFAULT_STANDING_PRIORITY, standing_tag};
use crate::tools::{Tool, ToolOutcome, ToolkitId};

pub use chat_manager::ChatManager;

/// A capability module plugged into the query engine.
///
/// All hooks have no-op defaults except [`name`](Self::name) and
/// [`call_tool`](Self::call_tool).
#[async_trait]
pub trait Toolkit: Send {
    /// Unique toolkit name. Toolkits run their hooks in name order.
    fn name(&self) -> &str;

    /// Called once at session start. Register tools here.
    ///
    /// `restored` is the state this toolkit returned in a previous session,
    /// if the host persisted it. The returned value is kept by the engine as
    /// the toolkit's persistable state.
    async fn on_register(
        &mut self,
        _ctx: &mut ToolkitContext,
        _restored: Option<serde_json::Value>,
    ) -> Result<Option<serde_json::Value>> {
        Ok(None)
    }

    /// Called before the first query of the session. Finish slow setup here.
    async fn on_first_query(&mut self, _ctx: &mut ToolkitContext) -> Result<()> {
        Ok(())
    }

    /// Called before every query.
    async fn on_query(&mut self, _ctx: &mut ToolkitContext) -> Result<()> {
        Ok(())
    }

    /// Called when a round fails. Errors are logged and otherwise ignored.
    async fn on_abort(&mut self, _ctx: &mut ToolkitContext) -> Result<()> {
        Ok(())
    }

    /// Called when the host asks for persistable state. `None` keeps the
    /// state returned by [`on_register`](Self::on_register).
    async fn on_serialize(
        &mut self,
        _ctx: &mut ToolkitContext,
    ) -> Result<Option<serde_json::Value>> {
        Ok(None)
    }

    /// Execute one of this toolkit's tools with validated arguments.
    async fn call_tool(
        &mut self,
        name: &str,
        args: serde_json::Value,
        ctx: &mut ToolkitContext,
    ) -> Result<ToolOutcome>;
}

/// A change a toolkit asked for, applied by the engine after the hook.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum ContextEffect {
    RegisterTool(Tool),
    SetToolHidden {
        name: String,
        hidden: bool,
    },
    SetStanding {
        content: String,
        tag: Option<String>,
        priority: i32,
    },
    DebugMark {
        toolkit: String,
        note: String,
    },
}

/// The view of the session a toolkit gets during a hook or tool call.
pub struct ToolkitContext {
    toolkit: ToolkitId,
    toolkit_name: String,
    config: Arc<DialogConfig>,
    speech: Arc<dyn SpeechSink>,
    smarter: bool,
    active: bool,
    effects: Vec<ContextEffect>,
}

impl ToolkitContext {
    pub(crate) fn new(
        toolkit: ToolkitId,
        toolkit_name: impl Into<String>,
        config: Arc<DialogConfig>,
        speech: Arc<dyn SpeechSink>,
        smarter: bool,
        active: bool,
    ) -> Self {
        Self {
            toolkit,
            toolkit_name: toolkit_name.into(),
            config,
            speech,
            smarter,
            active,
            effects: Vec::new(),
        }
    }

    /// Name of the toolkit this context belongs to.
    pub fn toolkit_name(&self) -> &str {
        &self.toolkit_name
    }

    /// Register a tool executed by this toolkit.
    pub fn register_tool(&mut self, mut tool: Tool) {
        tool.toolkit = self.toolkit;
        self.effects.push(ContextEffect::RegisterTool(tool));
    }

    /// Show or hide a registered tool.
    pub fn set_tool_hidden(&mut self, name: impl Into<String>, hidden: bool) {
        self.effects.push(ContextEffect::SetToolHidden {
            name: name.into(),
            hidden,
        });
    }

    /// Create or update a standing message owned by this toolkit.
    ///
    /// With a `tag`, later calls with the same tag update the message in
    /// place. An empty `content` removes it from requests.
    pub fn set_standing(&mut self, content: impl Into<String>, tag: Option<&str>, priority: i32) {
        let tag = tag.map(|t| standing_tag(&self.toolkit_name, t));
        self.effects.push(ContextEffect::SetStanding {
            content: content.into(),
            tag,
            priority,
        });
    }

    /// [`set_standing`](Self::set_standing) with a tag and the default priority.
    pub fn set_tagged_standing(&mut self, tag: &str, content: impl Into<String>) {
        self.set_standing(content, Some(tag), DEFAULT_STANDING_PRIORITY);
    }

    /// Leave a marker in the session's debug dump, if dumping is enabled.
    pub fn debug_mark(&mut self, note: impl Into<String>) {
        self.effects.push(ContextEffect::DebugMark {
            toolkit: self.toolkit_name.clone(),
            note: note.into(),
        });
    }

    /// Speak assistant text.
    pub fn speak(&self, text: &str) {
        self.speech.speak(text, false);
    }

    /// Speak a system notice.
    pub fn notice(&self, text: &str) {
        self.speech.speak(text, true);
    }

    /// Audible busy cue.
    pub fn progress_tick(&self) {
        self.speech.progress_tick();
    }

    /// Session configuration.
    pub fn config(&self) -> &DialogConfig {
        &self.config
    }

    /// Whether the smarter model tier is active.
    pub fn smarter(&self) -> bool {
        self.smarter
    }

    /// Switch the model tier for the following requests.
    pub fn set_smarter(&mut self, smarter: bool) {
        self.smarter = smarter;
    }

    /// Whether the session is still active.
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// End the session once the current round finishes.
    pub fn stop_session(&mut self) {
        self.active = false;
    }

    pub(crate) fn into_parts(self) -> (Vec<ContextEffect>, bool, bool) {
        (self.effects, self.smarter, self.active)
    }
}

impl std::fmt::Debug for ToolkitContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolkitContext")
            .field("toolkit", &self.toolkit)
            .field("toolkit_name", &self.toolkit_name)
            .field("smarter", &self.smarter)
            .field("active", &self.active)
            .field("effects", &self.effects.len())
            .finish()
    }
}
