//! Core tool types.
//!
//! A [`Tool`] is plain data: name, description, parameter schema, visibility
//! flags and the [`ToolkitId`] of the toolkit that executes it. Execution
//! itself goes through
//! [`Toolkit::call_tool`](crate::toolkit::Toolkit::call_tool) and yields a
//! [`ToolOutcome`].

use serde::{Deserialize, Serialize};

use crate::llm::provider::ToolDefinition;

/// Default priority for tools that do not set one.
pub const DEFAULT_TOOL_PRIORITY: i32 = 0;

/// Index of a toolkit in the session's toolkit arena.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ToolkitId(pub usize);

impl std::fmt::Display for ToolkitId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A function the model may call.
#[derive(Debug, Clone, PartialEq)]
pub struct Tool {
    /// Unique function name.
    pub name: String,
    /// Description shown to the model.
    pub description: String,
    /// JSON schema of the arguments. `None` means no arguments.
    pub parameters: Option<serde_json::Value>,
    /// Hidden tools are not advertised but can still be dispatched.
    pub hidden: bool,
    /// Dynamic tools are sorted after static ones on the first query.
    pub dynamic: bool,
    /// Higher priority calls run first within a single reply.
    pub priority: i32,
    /// Owning toolkit. Assigned by the engine when the tool is registered.
    pub toolkit: ToolkitId,
}

impl Tool {
    /// Create a visible, static tool without parameters.
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: None,
            hidden: false,
            dynamic: false,
            priority: DEFAULT_TOOL_PRIORITY,
            toolkit: ToolkitId::default(),
        }
    }

    /// Set the argument schema.
    pub fn with_parameters(mut self, parameters: serde_json::Value) -> Self {
        self.parameters = Some(parameters);
        self
    }

    /// Set the hidden flag.
    pub fn with_hidden(mut self, hidden: bool) -> Self {
        self.hidden = hidden;
        self
    }

    /// Set the dynamic flag.
    pub fn with_dynamic(mut self, dynamic: bool) -> Self {
        self.dynamic = dynamic;
        self
    }

    /// Set the execution priority.
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Sort score on the first query of a session.
    pub(crate) fn first_query_score(&self) -> u8 {
        u8::from(self.hidden) * 2 + u8::from(self.dynamic)
    }

    /// Sort score on every later query.
    pub(crate) fn later_query_score(&self) -> u8 {
        u8::from(self.hidden) * 2
    }

    /// Definition sent to the backend.
    pub fn definition(&self) -> ToolDefinition {
        let parameters = self.parameters.clone().unwrap_or_else(|| {
            serde_json::json!({
                "type": "object",
                "properties": {},
            })
        });
        ToolDefinition::new(self.name.clone(), self.description.clone(), parameters)
    }
}

/// How a tool asks the engine to roll back the current round.
///
/// Variants are ordered by how much they discard, so combining the signals of
/// one reply keeps the widest with [`RevertSignal::combine`].
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum RevertSignal {
    /// Keep going.
    #[default]
    None,
    /// Discard this reply and query the model again.
    Response,
    /// Discard the whole round, including the user message.
    Query,
}

impl RevertSignal {
    /// Keep the wider of two signals.
    pub fn combine(self, other: Self) -> Self {
        self.max(other)
    }

    /// Whether anything is reverted.
    pub fn is_revert(self) -> bool {
        self != Self::None
    }
}

/// Result of executing one tool call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolOutcome {
    /// Payload sent back to the model. `None` is reported as `"OK"`.
    pub output: Option<String>,
    /// Requested rollback.
    pub revert: RevertSignal,
    /// Skip the remaining tool calls of the same reply.
    pub stop_processing: bool,
}

impl ToolOutcome {
    /// Plain success.
    pub fn ok() -> Self {
        Self::default()
    }

    /// Success with a text payload.
    pub fn text(output: impl Into<String>) -> Self {
        Self {
            output: Some(output.into()),
            ..Self::default()
        }
    }

    /// Success with a JSON payload.
    pub fn json(value: &serde_json::Value) -> Self {
        Self::text(value.to_string())
    }

    /// Structured error payload: `{"status":"error","message":...}`.
    pub fn error(message: impl Into<String>) -> Self {
        Self::json(&serde_json::json!({
            "status": "error",
            "message": message.into(),
        }))
    }

    /// Discard the reply and query again.
    pub fn revert_response() -> Self {
        Self {
            revert: RevertSignal::Response,
            ..Self::default()
        }
    }

    /// Discard the whole round.
    pub fn revert_query() -> Self {
        Self {
            revert: RevertSignal::Query,
            ..Self::default()
        }
    }

    /// Skip the remaining tool calls of the reply.
    pub fn with_stop_processing(mut self) -> Self {
        self.stop_processing = true;
        self
    }

    /// Payload to send back to the model.
    pub fn content(&self) -> &str {
        self.output.as_deref().unwrap_or("OK")
    }
}
