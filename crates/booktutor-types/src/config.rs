//! Global configuration types for booktutor.
//!
//! `GlobalConfig` represents the top-level `config.toml` in the data
//! directory: which provider to talk to and the engine's operational limits.
//! The tutoring settings a user edits day to day (model, token budget,
//! auto-save interval) live in the database, see [`crate::settings`].

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Top-level configuration. All fields have sensible defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GlobalConfig {
    #[serde(default)]
    pub provider: ProviderConfig,

    #[serde(default)]
    pub engine: EngineConfig,
}

/// Connection settings for the OpenAI-compatible chat completions endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Provider name used to pick a default base URL ("openai", "mistral", ...).
    #[serde(default = "default_provider_name")]
    pub name: String,

    /// Explicit base URL; overrides the name-based default.
    #[serde(default)]
    pub base_url: Option<String>,

    /// Environment variable holding the API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Per-call timeout applied around every model request.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// `max_tokens` sent with every completion request.
    #[serde(default = "default_max_reply_tokens")]
    pub max_reply_tokens: u32,

    #[serde(default)]
    pub temperature: Option<f64>,
}

fn default_provider_name() -> String {
    "openai".to_string()
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

fn default_request_timeout_secs() -> u64 {
    120
}

fn default_max_reply_tokens() -> u32 {
    2_048
}

impl ProviderConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            name: default_provider_name(),
            base_url: None,
            api_key_env: default_api_key_env(),
            request_timeout_secs: default_request_timeout_secs(),
            max_reply_tokens: default_max_reply_tokens(),
            temperature: None,
        }
    }
}

/// Bounds on the turn and summarization loops, retry policy and session lifetime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Model round-trips with tool calls allowed in one turn.
    #[serde(default = "default_max_tool_rounds")]
    pub max_tool_rounds: u32,

    /// Model round-trips allowed in one summarization pass.
    #[serde(default = "default_max_summary_rounds")]
    pub max_summary_rounds: u32,

    /// Attempts per model call, including the first one.
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,

    #[serde(default = "default_retry_base_ms")]
    pub retry_base_ms: u64,

    #[serde(default = "default_retry_max_ms")]
    pub retry_max_ms: u64,

    /// Inactivity after which a live session is closed and dropped from memory.
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,

    /// How often the janitor looks for idle sessions.
    #[serde(default = "default_janitor_interval_secs")]
    pub janitor_interval_secs: u64,
}

fn default_max_tool_rounds() -> u32 {
    8
}

fn default_max_summary_rounds() -> u32 {
    6
}

fn default_retry_attempts() -> u32 {
    3
}

fn default_retry_base_ms() -> u64 {
    500
}

fn default_retry_max_ms() -> u64 {
    8_000
}

fn default_idle_timeout_secs() -> u64 {
    1_800
}

fn default_janitor_interval_secs() -> u64 {
    60
}

impl EngineConfig {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn janitor_interval(&self) -> Duration {
        Duration::from_secs(self.janitor_interval_secs.max(1))
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_tool_rounds: default_max_tool_rounds(),
            max_summary_rounds: default_max_summary_rounds(),
            retry_attempts: default_retry_attempts(),
            retry_base_ms: default_retry_base_ms(),
            retry_max_ms: default_retry_max_ms(),
            idle_timeout_secs: default_idle_timeout_secs(),
            janitor_interval_secs: default_janitor_interval_secs(),
        }
    }
}
