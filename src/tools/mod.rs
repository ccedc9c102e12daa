//! Tool registry and tool types.
//!
//! - [`types`]: [`Tool`], [`ToolOutcome`] and [`RevertSignal`]
//! - [`registry`]: ordered [`ToolRegistry`]
//! - [`validation`]: argument checks against a tool's JSON schema

pub mod registry;
pub mod types;
pub mod validation;

pub use registry::ToolRegistry;
pub use types::{DEFAULT_TOOL_PRIORITY, RevertSignal, Tool, ToolOutcome, ToolkitId};
pub use validation::validate_tool_args;
