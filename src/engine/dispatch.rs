//! Planning the execution order of a reply's items.
//!
//! Each reply item becomes a [`ReplyEntry`]. Function calls are resolved
//! against the registry up front, entries are executed by descending tool
//! priority (ties keep reply order, non-tool items count as 0), and the
//! produced tool results are read back in reply order.

use crate::llm::events::{Reply, ReplyItem};
use crate::llm::message::Message;
use crate::tools::{Tool, ToolRegistry, ToolkitId};

/// The tool a function call resolved to.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolTarget {
    /// Name of the tool that will run (the fallback tool for unknown names).
    pub name: String,
    /// Toolkit that executes it.
    pub toolkit: ToolkitId,
    /// Execution priority.
    pub priority: i32,
    /// Argument schema.
    pub parameters: Option<serde_json::Value>,
}

impl From<&Tool> for ToolTarget {
    fn from(tool: &Tool) -> Self {
        Self {
            name: tool.name.clone(),
            toolkit: tool.toolkit,
            priority: tool.priority,
            parameters: tool.parameters.clone(),
        }
    }
}

/// One reply item with its resolved tool and, once executed, its result.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplyEntry {
    /// Position in the reply.
    pub index: usize,
    /// The reply item.
    pub item: ReplyItem,
    /// Resolved tool for function calls. `None` for other items and for
    /// unknown functions without a fallback.
    pub target: Option<ToolTarget>,
    /// Tool result message, set once the call ran.
    pub result: Option<Message>,
}

impl ReplyEntry {
    /// Priority used to order execution.
    pub fn priority(&self) -> i32 {
        self.target.as_ref().map_or(0, |t| t.priority)
    }
}

/// Resolve every item of `reply` and order the entries for execution.
pub fn plan(reply: &Reply, registry: &ToolRegistry, fallback: Option<&str>) -> Vec<ReplyEntry> {
    let mut entries: Vec<ReplyEntry> = reply
        .items
        .iter()
        .enumerate()
        .map(|(index, item)| {
            let target = match item {
                ReplyItem::FunctionCall { name, .. } => {
                    registry.resolve(name, fallback).map(ToolTarget::from)
                }
                _ => None,
            };
            ReplyEntry {
                index,
                item: item.clone(),
                target,
                result: None,
            }
        })
        .collect();
    entries.sort_by_key(|e| std::cmp::Reverse(e.priority()));
    entries
}

/// Tool results in reply order.
pub fn results_in_reply_order(mut entries: Vec<ReplyEntry>) -> Vec<Message> {
    entries.sort_by_key(|e| e.index);
    entries.into_iter().filter_map(|e| e.result).collect()
}
