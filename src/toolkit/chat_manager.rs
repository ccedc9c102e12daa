//! Built-in toolkit for managing the conversation itself.
//!
//! Provides `end_chat`, `set_intelligence`, `debug_mark_chat` and the hidden
//! `fallback_function` that receives calls to unknown functions. Also keeps
//! a `current-date-time` standing message fresh before every query.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Local, NaiveDateTime};

use super::{Toolkit, ToolkitContext};
use crate::error::{DialogError, Result};
use crate::tools::{Tool, ToolOutcome};

/// Name the toolkit registers under.
pub const CHAT_MANAGER_NAME: &str = "chat-manager";

/// Name of the hidden tool that answers unknown function calls.
pub const FALLBACK_FUNCTION: &str = "fallback_function";

const DATE_TIME_TAG: &str = "current-date-time";
const DATE_TIME_PROMPT: &str = "Current date and time: ";

/// Source of the current local time.
pub type Clock = Arc<dyn Fn() -> NaiveDateTime + Send + Sync>;

/// Format used for the date/time standing message.
pub fn format_chat_time(time: NaiveDateTime) -> String {
    time.format("%Y-%m-%dT%H:%M:%S, %A").to_string()
}

/// Conversation management toolkit.
pub struct ChatManager {
    clock: Clock,
}

impl ChatManager {
    /// Toolkit using the system clock.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(|| Local::now().naive_local()))
    }

    /// Toolkit using a custom clock.
    pub fn with_clock(clock: Clock) -> Self {
        Self { clock }
    }

    fn end_chat(ctx: &mut ToolkitContext) -> ToolOutcome {
        ctx.notice("The assistant ended the conversation.");
        ctx.stop_session();
        ToolOutcome::revert_query()
    }

    fn set_intelligence(args: &serde_json::Value, ctx: &mut ToolkitContext) -> Result<ToolOutcome> {
        let intelligent = args
            .get("intelligent")
            .and_then(serde_json::Value::as_bool)
            .ok_or_else(|| DialogError::Tool("set_intelligence: 'intelligent' missing".into()))?;
        tracing::info!(
            tier = if intelligent { "smarter" } else { "standard" },
            "model tier requested"
        );
        if intelligent == ctx.smarter() {
            return Ok(ToolOutcome::text("OK"));
        }
        ctx.notice(if intelligent {
            "Smarter model."
        } else {
            "Standard model."
        });
        ctx.set_smarter(intelligent);
        Ok(ToolOutcome::revert_response())
    }

    fn debug_mark_chat(args: &serde_json::Value, ctx: &mut ToolkitContext) -> ToolOutcome {
        let note = args
            .get("note")
            .and_then(serde_json::Value::as_str)
            .unwrap_or_default();
        tracing::info!(note, "debug marker");
        ctx.debug_mark(note);
        ctx.notice("Debug marker");
        ctx.notice(note);
        ToolOutcome::text("OK")
    }

    fn fallback_function(ctx: &ToolkitContext) -> ToolOutcome {
        ctx.notice("The assistant called an unknown function.");
        ToolOutcome::error("Unknown function called")
    }
}

impl Default for ChatManager {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Toolkit for ChatManager {
    fn name(&self) -> &str {
        CHAT_MANAGER_NAME
    }

    async fn on_register(
        &mut self,
        ctx: &mut ToolkitContext,
        _restored: Option<serde_json::Value>,
    ) -> Result<Option<serde_json::Value>> {
        ctx.register_tool(Tool::new(
            "end_chat",
            "End the conversation when the user says goodbye or asks to stop.",
        ));
        ctx.register_tool(
            Tool::new(
                "set_intelligence",
                "Switch to a smarter, slower model for hard questions, or back to the standard one.",
            )
            .with_parameters(serde_json::json!({
                "type": "object",
                "properties": {
                    "intelligent": { "type": "boolean" }
                },
                "required": ["intelligent"],
                "additionalProperties": false
            })),
        );
        ctx.register_tool(
            Tool::new(
                "debug_mark_chat",
                "Mark this point of the conversation for debugging, with a short note.",
            )
            .with_parameters(serde_json::json!({
                "type": "object",
                "properties": {
                    "note": { "type": "string" }
                },
                "required": ["note"],
                "additionalProperties": false
            })),
        );
        ctx.register_tool(
            Tool::new(FALLBACK_FUNCTION, "Handles calls to unknown functions.")
                .with_hidden(true)
                .with_priority(100),
        );
        Ok(None)
    }

    async fn on_query(&mut self, ctx: &mut ToolkitContext) -> Result<()> {
        let now = format_chat_time((self.clock)());
        ctx.set_tagged_standing(DATE_TIME_TAG, format!("{DATE_TIME_PROMPT}{now}"));
        Ok(())
    }

    async fn call_tool(
        &mut self,
        name: &str,
        args: serde_json::Value,
        ctx: &mut ToolkitContext,
    ) -> Result<ToolOutcome> {
        match name {
            "end_chat" => Ok(Self::end_chat(ctx)),
            "set_intelligence" => Self::set_intelligence(&args, ctx),
            "debug_mark_chat" => Ok(Self::debug_mark_chat(&args, ctx)),
            FALLBACK_FUNCTION => Ok(Self::fallback_function(ctx)),
            other => Err(DialogError::Tool(format!(
                "{CHAT_MANAGER_NAME} has no tool '{other}'"
            ))),
        }
    }
}
