//! Engine settings persisted in the singleton `agent_setting` row.
//!
//! Settings are read once when a session is loaded and handed around as an
//! explicit snapshot. Editing them affects sessions loaded afterwards.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Smallest token budget the engine accepts.
pub const MIN_TOKEN_BUDGET: u32 = 1_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentSettings {
    /// Model identifier sent to the provider.
    pub ai_model: String,
    /// Upper bound on the estimated prompt size of one model call.
    pub token_budget: u32,
    /// Interval of the periodic summarization; `None` disables it.
    pub auto_save_secs: Option<u64>,
}

impl AgentSettings {
    pub fn auto_save(&self) -> Option<Duration> {
        self.auto_save_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }

    /// Check the values a user may have edited.
    pub fn validate(&self) -> Result<(), String> {
        if self.ai_model.trim().is_empty() {
            return Err("ai_model must not be empty".to_string());
        }
        if self.token_budget < MIN_TOKEN_BUDGET {
            return Err(format!(
                "token_budget must be at least {MIN_TOKEN_BUDGET}, got {}",
                self.token_budget
            ));
        }
        Ok(())
    }
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            ai_model: "gpt-4o-mini".to_string(),
            token_budget: 32_000,
            auto_save_secs: Some(600),
        }
    }
}
