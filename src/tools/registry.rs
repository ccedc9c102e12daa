//! Ordered tool registry.
//!
//! The [`ToolRegistry`] keeps tools in a stable order so that the tool list
//! sent to the backend changes as little as possible between requests. The
//! order is only touched by [`prepare()`](ToolRegistry::prepare), which is a
//! stable sort:
//!
//! - on the first query: static visible, dynamic visible, static hidden,
//!   dynamic hidden
//! - afterwards: visible before hidden, otherwise keeping the previous order

use crate::error::{DialogError, Result};
use crate::llm::provider::ToolDefinition;

use super::types::Tool;

/// Registry of the tools available in a session.
#[derive(Debug, Default)]
pub struct ToolRegistry {
    tools: Vec<Tool>,
}

impl ToolRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool.
    ///
    /// # Errors
    ///
    /// Returns [`DialogError::Config`] if a tool with the same name exists.
    pub fn register(&mut self, tool: Tool) -> Result<()> {
        if self.get(&tool.name).is_some() {
            return Err(DialogError::Config(format!(
                "tool '{}' is already registered",
                tool.name
            )));
        }
        tracing::debug!(
            tool = %tool.name,
            toolkit = %tool.toolkit,
            hidden = tool.hidden,
            dynamic = tool.dynamic,
            "registered tool"
        );
        self.tools.push(tool);
        Ok(())
    }

    /// Reorder the tools before a request.
    pub fn prepare(&mut self, for_first_query: bool) {
        if for_first_query {
            self.tools.sort_by_key(Tool::first_query_score);
        } else {
            self.tools.sort_by_key(Tool::later_query_score);
        }
    }

    /// Definitions of all non-hidden tools, in registry order.
    pub fn visible(&self) -> Vec<ToolDefinition> {
        self.tools
            .iter()
            .filter(|t| !t.hidden)
            .map(Tool::definition)
            .collect()
    }

    /// Look a tool up by name, hidden or not.
    pub fn get(&self, name: &str) -> Option<&Tool> {
        self.tools.iter().find(|t| t.name == name)
    }

    /// Look a tool up by name, falling back to `fallback` when it is unknown.
    pub fn resolve(&self, name: &str, fallback: Option<&str>) -> Option<&Tool> {
        self.get(name).or_else(|| fallback.and_then(|f| self.get(f)))
    }

    /// Show or hide a tool.
    ///
    /// # Errors
    ///
    /// Returns [`DialogError::Config`] if no tool has that name.
    pub fn set_hidden(&mut self, name: &str, hidden: bool) -> Result<()> {
        let tool = self
            .tools
            .iter_mut()
            .find(|t| t.name == name)
            .ok_or_else(|| DialogError::Config(format!("unknown tool '{name}'")))?;
        tool.hidden = hidden;
        Ok(())
    }

    /// Tool names in registry order.
    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name.as_str()).collect()
    }

    /// Number of registered tools.
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Whether no tool is registered.
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}
