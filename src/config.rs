//! Configuration types for the dialogue engine.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{DialogError, Result};
use crate::llm::provider::ModelTier;

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DialogConfig {
    /// Turn-taking timers.
    pub recognition: RecognitionConfig,
    /// Query engine and backend request settings.
    pub chat: ChatConfig,
}

/// Turn-taking timer configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecognitionConfig {
    /// Silence after final text before the utterance is submitted (ms).
    pub final_silence_ms: u64,
    /// How long partial text may sit unconfirmed before it is submitted (ms).
    pub partial_silence_ms: u64,
    /// Inactivity after a reply before the conversation ends (ms).
    pub idle_timeout_ms: u64,
}

impl Default for RecognitionConfig {
    fn default() -> Self {
        Self {
            final_silence_ms: 3_000,
            partial_silence_ms: 5_000,
            idle_timeout_ms: 7_000,
        }
    }
}

impl RecognitionConfig {
    /// Timer used while final text is present.
    pub fn final_silence(&self) -> Duration {
        Duration::from_millis(self.final_silence_ms)
    }

    /// Timer used while only partial text is present.
    pub fn partial_silence(&self) -> Duration {
        Duration::from_millis(self.partial_silence_ms)
    }

    /// Idle timeout in the waiting state.
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }
}

/// Model request options for one tier.
///
/// Unset fields are left to the backend's defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelOptions {
    /// Model identifier.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Sampling temperature.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    /// Output token limit.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,
    /// Whether the model may request several tool calls in one reply.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parallel_tool_calls: Option<bool>,
}

impl ModelOptions {
    /// Options with `overlay` applied on top; set fields of `overlay` win.
    pub fn overlaid_with(&self, overlay: &Self) -> Self {
        Self {
            model: overlay.model.clone().or_else(|| self.model.clone()),
            temperature: overlay.temperature.or(self.temperature),
            max_output_tokens: overlay.max_output_tokens.or(self.max_output_tokens),
            parallel_tool_calls: overlay.parallel_tool_calls.or(self.parallel_tool_calls),
        }
    }
}

/// Query engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    /// Maximum request/response cycles per user utterance.
    pub max_round_trips: usize,
    /// Maximum wait for the next backend event (seconds).
    pub request_timeout_secs: u64,
    /// Tool that receives calls to unknown functions. Empty disables it.
    pub fallback_tool: String,
    /// Instructions placed ahead of every toolkit message.
    pub instructions: Vec<String>,
    /// Options for the standard tier.
    pub standard: ModelOptions,
    /// Overrides applied when the smarter tier is active.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub smarter: Option<ModelOptions>,
    /// JSON schema the reply text must follow.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_schema: Option<serde_json::Value>,
    /// Let the backend run hosted web searches.
    pub web_search: bool,
    /// Write every request and reply as JSON for later inspection.
    pub debug_dump: bool,
    /// Where dumps go. Defaults to [`crate::zefira_dirs::debug_dir`].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debug_dump_dir: Option<PathBuf>,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            max_round_trips: 10,
            request_timeout_secs: 120,
            fallback_tool: "fallback_function".to_owned(),
            instructions: Vec::new(),
            standard: ModelOptions::default(),
            smarter: None,
            output_schema: None,
            web_search: false,
            debug_dump: false,
            debug_dump_dir: None,
        }
    }
}

impl ChatConfig {
    /// Fallback tool name, if enabled.
    pub fn fallback_tool(&self) -> Option<&str> {
        Some(self.fallback_tool.as_str()).filter(|name| !name.is_empty())
    }

    /// Per-event backend timeout.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Configured instructions as one standing message, if any.
    pub fn joined_instructions(&self) -> Option<String> {
        let joined = self.instructions.join("\n");
        let trimmed = joined.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_owned())
    }

    /// Root of the per-session dump directories, if dumping is enabled.
    pub fn debug_dump_root(&self) -> Option<PathBuf> {
        self.debug_dump.then(|| {
            self.debug_dump_dir
                .clone()
                .unwrap_or_else(crate::zefira_dirs::debug_dir)
        })
    }

    /// Model options for the given tier.
    pub fn model_options(&self, tier: ModelTier) -> ModelOptions {
        match (tier, &self.smarter) {
            (ModelTier::Smarter, Some(smarter)) => self.standard.overlaid_with(smarter),
            _ => self.standard.clone(),
        }
    }
}

impl DialogConfig {
    /// Load configuration from a TOML file, falling back to defaults for missing fields.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or fails [`validate`](Self::validate).
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self =
            toml::from_str(&content).map_err(|e| DialogError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a TOML file, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or the config cannot be serialized.
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| DialogError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Returns the default config file path (see [`crate::zefira_dirs`]).
    pub fn default_config_path() -> PathBuf {
        crate::zefira_dirs::config_file()
    }

    /// Check value ranges.
    ///
    /// # Errors
    ///
    /// Returns [`DialogError::Config`] describing the first invalid value.
    pub fn validate(&self) -> Result<()> {
        if self.chat.max_round_trips == 0 {
            return Err(DialogError::Config(
                "chat.max_round_trips must be at least 1".into(),
            ));
        }
        if self.chat.request_timeout_secs == 0 {
            return Err(DialogError::Config(
                "chat.request_timeout_secs must be positive".into(),
            ));
        }
        if let Some(schema) = &self.chat.output_schema
            && !schema.is_object()
        {
            return Err(DialogError::Config(
                "chat.output_schema must be a table".into(),
            ));
        }
        let timers = [
            ("final_silence_ms", self.recognition.final_silence_ms),
            ("partial_silence_ms", self.recognition.partial_silence_ms),
            ("idle_timeout_ms", self.recognition.idle_timeout_ms),
        ];
        for (name, value) in timers {
            if value == 0 {
                return Err(DialogError::Config(format!(
                    "recognition.{name} must be positive"
                )));
            }
        }
        Ok(())
    }
}
