//! Configuration loading, validation, and management for DeskPilot.
//!
//! Loads configuration from `~/.deskpilot/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.deskpilot/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Model runtime connection and gateway behavior
    #[serde(default)]
    pub model: ModelConfig,

    /// ReAct loop limits
    #[serde(default)]
    pub agent: AgentConfig,

    /// Tool dispatcher settings
    #[serde(default)]
    pub tools: ToolsConfig,

    /// Command risk settings
    #[serde(default)]
    pub risk: RiskConfig,

    /// Transparency journal settings
    #[serde(default)]
    pub journal: JournalConfig,

    /// Memory backend
    #[serde(default)]
    pub memory: MemoryConfig,

    /// Active goals and conversation branches
    #[serde(default)]
    pub session: SessionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Base URL of the Ollama runtime
    #[serde(default = "default_host")]
    pub host: String,

    /// Model used for the main conversation
    #[serde(default = "default_model")]
    pub model: String,

    /// Timeout for non-streaming requests
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Longest silence tolerated on a streaming response, both before the
    /// headers arrive and between body reads
    #[serde(default = "default_stream_timeout")]
    pub stream_timeout_secs: u64,

    /// Model tokens batched into each forwarded chunk
    #[serde(default = "default_stream_buffer_tokens")]
    pub stream_buffer_tokens: usize,

    /// Attempts made while the runtime answers 429
    #[serde(default = "default_rate_limit_retries")]
    pub max_rate_limit_retries: u32,

    /// Sleep before each retry after a 429; the last value repeats
    #[serde(default = "default_backoff_schedule")]
    pub backoff_schedule_secs: Vec<u64>,

    /// Model families that accept images
    #[serde(default = "default_vision_models")]
    pub vision_models: Vec<String>,
}

fn default_host() -> String {
    "http://localhost:11434".into()
}
fn default_model() -> String {
    "qwen3:30b".into()
}
fn default_request_timeout() -> u64 {
    120
}
fn default_stream_timeout() -> u64 {
    300
}
fn default_stream_buffer_tokens() -> usize {
    1
}
fn default_rate_limit_retries() -> u32 {
    5
}
fn default_backoff_schedule() -> Vec<u64> {
    vec![3, 8, 15, 25, 40]
}
fn default_vision_models() -> Vec<String> {
    ["gemma3", "llava", "bakllava", "moondream", "llama3.2-vision", "minicpm-v"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            model: default_model(),
            request_timeout_secs: default_request_timeout(),
            stream_timeout_secs: default_stream_timeout(),
            stream_buffer_tokens: default_stream_buffer_tokens(),
            max_rate_limit_retries: default_rate_limit_retries(),
            backoff_schedule_secs: default_backoff_schedule(),
            vision_models: default_vision_models(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default = "default_agent_name")]
    pub agent_name: String,

    /// How the agent addresses the user, also used to label interrupts
    #[serde(default = "default_user_name")]
    pub user_name: String,

    #[serde(default = "default_max_react_steps")]
    pub max_react_steps: usize,

    #[serde(default = "default_max_tool_retries")]
    pub max_tool_retries: u32,

    /// Hard cap on characters produced in one step
    #[serde(default = "default_max_step_chars")]
    pub max_step_chars: usize,

    /// History turns sent with each step
    #[serde(default = "default_history_window")]
    pub history_window: usize,

    /// History turns kept between runs
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,

    /// Recalled memory snippets injected per run
    #[serde(default = "default_memory_snippets")]
    pub memory_snippets: usize,

    #[serde(default = "default_repetition_prefix")]
    pub repetition_prefix_chars: usize,

    /// Steps shorter than this are never treated as a loop
    #[serde(default = "default_repetition_min")]
    pub repetition_min_chars: usize,

    /// Characters of each observation shown in the transcript
    #[serde(default = "default_observation_display")]
    pub observation_display_chars: usize,
}

fn default_agent_name() -> String {
    "Pilot".into()
}
fn default_user_name() -> String {
    "user".into()
}
fn default_max_react_steps() -> usize {
    15
}
fn default_max_tool_retries() -> u32 {
    3
}
fn default_max_step_chars() -> usize {
    8000
}
fn default_history_window() -> usize {
    10
}
fn default_history_limit() -> usize {
    20
}
fn default_memory_snippets() -> usize {
    5
}
fn default_repetition_prefix() -> usize {
    500
}
fn default_repetition_min() -> usize {
    20
}
fn default_observation_display() -> usize {
    3000
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            agent_name: default_agent_name(),
            user_name: default_user_name(),
            max_react_steps: default_max_react_steps(),
            max_tool_retries: default_max_tool_retries(),
            max_step_chars: default_max_step_chars(),
            history_window: default_history_window(),
            history_limit: default_history_limit(),
            memory_snippets: default_memory_snippets(),
            repetition_prefix_chars: default_repetition_prefix(),
            repetition_min_chars: default_repetition_min(),
            observation_display_chars: default_observation_display(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Lifetime of cached results for read-only tools
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl_secs: u64,

    #[serde(default = "default_command_timeout")]
    pub command_timeout_secs: u64,

    /// Characters returned by `read_file`
    #[serde(default = "default_read_limit")]
    pub read_limit_chars: usize,
}

fn default_cache_ttl() -> u64 {
    30
}
fn default_command_timeout() -> u64 {
    120
}
fn default_read_limit() -> usize {
    5000
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            cache_ttl_secs: default_cache_ttl(),
            command_timeout_secs: default_command_timeout(),
            read_limit_chars: default_read_limit(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskConfig {
    /// Roots that shell commands may never modify
    #[serde(default = "default_banned_paths")]
    pub banned_paths: Vec<String>,
}

fn default_banned_paths() -> Vec<String> {
    vec!["/System".into(), "/Library".into(), "~/Library".into(), "/usr".into()]
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            banned_paths: default_banned_paths(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalConfig {
    /// Journal file; defaults to `~/.deskpilot/journal.json`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,

    /// Entries kept on disk
    #[serde(default = "default_journal_entries")]
    pub max_entries: usize,

    /// Recent entries scanned for repeated failures
    #[serde(default = "default_healing_window")]
    pub healing_window: usize,

    /// Failures of one tool within the window that flag it
    #[serde(default = "default_healing_threshold")]
    pub healing_threshold: usize,
}

fn default_journal_entries() -> usize {
    200
}
fn default_healing_window() -> usize {
    50
}
fn default_healing_threshold() -> usize {
    3
}

impl Default for JournalConfig {
    fn default() -> Self {
        Self {
            path: None,
            max_entries: default_journal_entries(),
            healing_window: default_healing_window(),
            healing_threshold: default_healing_threshold(),
        }
    }
}

impl JournalConfig {
    pub fn resolved_path(&self) -> PathBuf {
        self.path
            .clone()
            .unwrap_or_else(|| AppConfig::config_dir().join("journal.json"))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// "file", "in_memory", or "none"
    #[serde(default = "default_memory_backend")]
    pub backend: String,

    /// JSONL file for the file backend; defaults to `~/.deskpilot/memory/memories.jsonl`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

fn default_memory_backend() -> String {
    "file".into()
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            backend: default_memory_backend(),
            path: None,
        }
    }
}

impl MemoryConfig {
    pub fn resolved_path(&self) -> PathBuf {
        self.path.clone().unwrap_or_else(|| {
            AppConfig::config_dir()
                .join("memory")
                .join("memories.jsonl")
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Active goals file; defaults to `~/.deskpilot/goals.json`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub goals_path: Option<PathBuf>,

    /// Saved conversation branches; defaults to `~/.deskpilot/branches.json`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branches_path: Option<PathBuf>,

    /// Most recent goals named in the system prompt
    #[serde(default = "default_prompt_goals")]
    pub prompt_goals: usize,

    /// Most recent goals kept in the simplified-context retry
    #[serde(default = "default_retry_goals")]
    pub retry_goals: usize,
}

fn default_prompt_goals() -> usize {
    3
}
fn default_retry_goals() -> usize {
    2
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            goals_path: None,
            branches_path: None,
            prompt_goals: default_prompt_goals(),
            retry_goals: default_retry_goals(),
        }
    }
}

impl SessionConfig {
    pub fn resolved_goals_path(&self) -> PathBuf {
        self.goals_path
            .clone()
            .unwrap_or_else(|| AppConfig::config_dir().join("goals.json"))
    }

    pub fn resolved_branches_path(&self) -> PathBuf {
        self.branches_path
            .clone()
            .unwrap_or_else(|| AppConfig::config_dir().join("branches.json"))
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.deskpilot/config.toml).
    ///
    /// Environment overrides:
    /// - `DESKPILOT_MODEL`
    /// - `DESKPILOT_OLLAMA_HOST`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;

        if let Ok(model) = std::env::var("DESKPILOT_MODEL") {
            config.model.model = model;
        }

        if let Ok(host) = std::env::var("DESKPILOT_OLLAMA_HOST") {
            config.model.host = host;
        }

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

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".deskpilot")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.model.model.trim().is_empty() {
            return Err(ConfigError::ValidationError("model.model must not be empty".into()));
        }

        if self.model.max_rate_limit_retries == 0 {
            return Err(ConfigError::ValidationError(
                "model.max_rate_limit_retries must be at least 1".into(),
            ));
        }

        if self.model.backoff_schedule_secs.is_empty() {
            return Err(ConfigError::ValidationError(
                "model.backoff_schedule_secs must not be empty".into(),
            ));
        }

        if self.model.stream_buffer_tokens == 0 {
            return Err(ConfigError::ValidationError(
                "model.stream_buffer_tokens must be at least 1".into(),
            ));
        }

        if self.agent.max_react_steps == 0 {
            return Err(ConfigError::ValidationError(
                "agent.max_react_steps must be at least 1".into(),
            ));
        }

        if self.agent.max_tool_retries == 0 {
            return Err(ConfigError::ValidationError(
                "agent.max_tool_retries must be at least 1".into(),
            ));
        }

        if self.journal.max_entries == 0 {
            return Err(ConfigError::ValidationError(
                "journal.max_entries must be at least 1".into(),
            ));
        }

        Ok(())
    }

    /// Generate a default config TOML string (for `config --init`).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            model: ModelConfig::default(),
            agent: AgentConfig::default(),
            tools: ToolsConfig::default(),
            risk: RiskConfig::default(),
            journal: JournalConfig::default(),
            memory: MemoryConfig::default(),
            session: SessionConfig::default(),
        }
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
}
