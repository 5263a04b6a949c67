//! Configuration loading, validation, and management for RustedLoop.
//!
//! Loads configuration from `~/.rustedloop/config.toml` with environment
//! variable overrides. Validates all settings at startup and converts them
//! into the initial state values of a run.

use rustedloop_core::state::{MemoryState, ModelState, TaskState};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Name of the action that marks a task as complete.
pub const DEFAULT_COMPLETION_ACTION: &str = "submit_completed_task";

/// The root configuration structure.
///
/// Maps directly to `~/.rustedloop/config.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Completion parameters
    #[serde(default)]
    pub model: ModelConfig,

    /// Conversation history bounds
    #[serde(default)]
    pub memory: MemoryConfig,

    /// Task description and cycle bound
    #[serde(default)]
    pub task: TaskConfig,

    /// Response parsing settings
    #[serde(default)]
    pub response: ResponseConfig,

    /// Refinement loop settings
    #[serde(default)]
    pub refinement: RefinementConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default = "default_model")]
    pub name: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Number of samples per completion
    #[serde(default = "default_n")]
    pub n: u32,

    /// Upper bound on tokens requested per completion
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default)]
    pub frequency_penalty: f32,

    #[serde(default)]
    pub presence_penalty: f32,
}

fn default_model() -> String {
    "gpt-3.5-turbo".into()
}
fn default_temperature() -> f32 {
    0.2
}
fn default_n() -> u32 {
    1
}
fn default_max_tokens() -> u32 {
    2000
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            name: default_model(),
            temperature: default_temperature(),
            n: default_n(),
            max_tokens: default_max_tokens(),
            frequency_penalty: 0.0,
            presence_penalty: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Maximum number of conversational (non-system) messages kept
    #[serde(default = "default_max_history_message_count")]
    pub max_history_message_count: usize,

    /// Maximum history size in tokens. Defaults to the model's context window.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_history_token_count: Option<usize>,
}

fn default_max_history_message_count() -> usize {
    100
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            max_history_message_count: default_max_history_message_count(),
            max_history_token_count: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Stop after this many cycles even if the task is not complete
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_cycles: Option<u32>,

    /// Calling this action marks the task complete
    #[serde(default = "default_completion_action")]
    pub completion_action: String,
}

fn default_completion_action() -> String {
    DEFAULT_COMPLETION_ACTION.into()
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            name: None,
            description: None,
            max_cycles: None,
            completion_action: default_completion_action(),
        }
    }
}

/// Wire format the model is asked to answer in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseFormat {
    #[default]
    Json,
    Yaml,
}

impl std::fmt::Display for ResponseFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Json => f.write_str("json"),
            Self::Yaml => f.write_str("yaml"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseConfig {
    #[serde(default)]
    pub format: ResponseFormat,

    /// Skip the remaining processors once one fails
    #[serde(default = "default_true")]
    pub fail_fast: bool,

    /// Let the model call several actions per response
    #[serde(default)]
    pub multi_action: bool,

    /// Truncate action output beyond this many characters
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_output_limit: Option<usize>,
}

fn default_true() -> bool {
    true
}

impl Default for ResponseConfig {
    fn default() -> Self {
        Self {
            format: ResponseFormat::default(),
            fail_fast: true,
            multi_action: false,
            action_output_limit: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefinementConfig {
    /// Re-prompts the validate-and-repair loop may spend before giving up
    #[serde(default = "default_max_repair_attempts")]
    pub max_repair_attempts: u32,

    /// External validator run against extracted code blocks
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validator: Option<ValidatorConfig>,
}

fn default_max_repair_attempts() -> u32 {
    5
}

impl Default for RefinementConfig {
    fn default() -> Self {
        Self {
            max_repair_attempts: default_max_repair_attempts(),
            validator: None,
        }
    }
}

/// A command that reads content on stdin and reports problems.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorConfig {
    pub command: String,

    #[serde(default)]
    pub args: Vec<String>,
}

/// Context window of a known model family, in tokens.
pub fn context_window(model: &str) -> Option<usize> {
    if model.contains("gpt-3") {
        Some(4097)
    } else if model.contains("gpt-4") {
        Some(8192)
    } else {
        None
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.rustedloop/config.toml).
    ///
    /// Environment overrides (highest priority):
    /// - `RUSTEDLOOP_MODEL`
    /// - `RUSTEDLOOP_MAX_CYCLES`
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::load_from(&Self::config_path())?;
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply overrides read through `lookup` (the process environment in [`AppConfig::load`]).
    pub fn apply_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(model) = lookup("RUSTEDLOOP_MODEL") {
            tracing::debug!(model = %model, "Model overridden from environment");
            self.model.name = model;
        }

        if let Some(raw) = lookup("RUSTEDLOOP_MAX_CYCLES") {
            let max_cycles = raw.trim().parse::<u32>().map_err(|e| {
                ConfigError::ValidationError(format!("RUSTEDLOOP_MAX_CYCLES={raw:?}: {e}"))
            })?;
            self.task.max_cycles = Some(max_cycles);
        }

        Ok(())
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".rustedloop")
    }

    /// Get the configuration file path.
    pub fn config_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=2.0).contains(&self.model.temperature) {
            return Err(ConfigError::ValidationError(
                "model.temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.model.n == 0 {
            return Err(ConfigError::ValidationError("model.n must be at least 1".into()));
        }

        if self.memory.max_history_message_count == 0 {
            return Err(ConfigError::ValidationError(
                "memory.max_history_message_count must be at least 1".into(),
            ));
        }

        if self.memory.max_history_token_count == Some(0) {
            return Err(ConfigError::ValidationError(
                "memory.max_history_token_count must be at least 1".into(),
            ));
        }

        if self.refinement.max_repair_attempts == 0 {
            return Err(ConfigError::ValidationError(
                "refinement.max_repair_attempts must be at least 1".into(),
            ));
        }

        if self.task.completion_action.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "task.completion_action must not be empty".into(),
            ));
        }

        if let Some(validator) = &self.refinement.validator
            && validator.command.trim().is_empty()
        {
            return Err(ConfigError::ValidationError(
                "refinement.validator.command must not be empty".into(),
            ));
        }

        Ok(())
    }

    /// Token bound for the conversation history.
    ///
    /// An explicit `memory.max_history_token_count` wins; otherwise the
    /// model's context window is used, and an unknown model is an error.
    pub fn history_token_limit(&self) -> Result<usize, ConfigError> {
        match self.memory.max_history_token_count {
            Some(limit) => Ok(limit),
            None => context_window(&self.model.name)
                .ok_or_else(|| ConfigError::UnknownModel(self.model.name.clone())),
        }
    }

    /// Initial completion parameters.
    pub fn model_state(&self) -> ModelState {
        ModelState {
            name: self.model.name.clone(),
            temperature: self.model.temperature,
            n: self.model.n,
            max_tokens: self.model.max_tokens,
            frequency_penalty: self.model.frequency_penalty,
            presence_penalty: self.model.presence_penalty,
        }
    }

    /// Initial (empty) memory carrying the configured bounds.
    pub fn memory_state(&self) -> Result<MemoryState, ConfigError> {
        Ok(MemoryState::new(
            self.memory.max_history_message_count,
            self.history_token_limit()?,
        ))
    }

    /// Initial task state.
    pub fn task_state(&self) -> TaskState {
        TaskState {
            name: self.task.name.clone(),
            description: self.task.description.clone(),
            max_cycles: self.task.max_cycles,
            ..TaskState::default()
        }
    }

    /// Generate a default config TOML string (for `config init`).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),

    #[error("Unknown model '{0}': set memory.max_history_token_count explicitly")]
    UnknownModel(String),
}

impl From<ConfigError> for rustedloop_core::Error {
    fn from(err: ConfigError) -> Self {
        rustedloop_core::Error::Config {
            message: err.to_string(),
        }
    }
}
