//! Bounded retry with exponential backoff around model calls.
//!
//! Every attempt runs under a per-call timeout. Transient failures
//! ([`LlmError::is_transient`]) are retried until the attempt budget is spent;
//! anything else is returned immediately.

use std::time::Duration;

use booktutor_types::config::{EngineConfig, ProviderConfig};
use booktutor_types::llm::{CompletionRequest, CompletionResponse, LlmError};

use super::box_provider::BoxLlmProvider;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Attempts including the first one; at least 1.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Applied to each attempt separately.
    pub call_timeout: Duration,
}

impl RetryPolicy {
    pub fn from_config(engine: &EngineConfig, provider: &ProviderConfig) -> Self {
        Self {
            max_attempts: engine.retry_attempts.max(1),
            base_delay: Duration::from_millis(engine.retry_base_ms),
            max_delay: Duration::from_millis(engine.retry_max_ms),
            call_timeout: provider.request_timeout(),
        }
    }

    /// Delay before retry number `attempt` (1-based), doubling each time.
    ///
    /// A rate-limit hint from the provider is honored when it asks for longer,
    /// still capped at `max_delay`.
    pub fn backoff(&self, attempt: u32, error: &LlmError) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        let delay = self.base_delay.saturating_mul(1u32 << exp).min(self.max_delay);
        match error {
            LlmError::RateLimited {
                retry_after_ms: Some(ms),
            } => delay.max(Duration::from_millis(*ms)).min(self.max_delay),
            _ => delay,
        }
    }

    /// Send `request`, retrying transient failures.
    ///
    /// A response with neither text nor function calls counts as a transient
    /// `MalformedResponse`.
    pub async fn complete(
        &self,
        provider: &BoxLlmProvider,
        request: &CompletionRequest,
    ) -> Result<CompletionResponse, LlmError> {
        let mut attempt = 1;
        loop {
            let result = match tokio::time::timeout(self.call_timeout, provider.complete(request))
                .await
            {
                Ok(Ok(response)) if response.content.trim().is_empty() && !response.has_tool_calls() => {
                    Err(LlmError::MalformedResponse(
                        "response has neither content nor tool calls".to_string(),
                    ))
                }
                Ok(result) => result,
                Err(_) => Err(LlmError::Timeout(self.call_timeout.as_millis() as u64)),
            };

            match result {
                Ok(response) => return Ok(response),
                Err(err) if err.is_transient() && attempt < self.max_attempts => {
                    let delay = self.backoff(attempt, &err);
                    tracing::warn!(
                        provider = provider.name(),
                        attempt,
                        max_attempts = self.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Model call failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => {
                    tracing::error!(
                        provider = provider.name(),
                        attempt,
                        error = %err,
                        "Model call failed"
                    );
                    return Err(err);
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default(), &ProviderConfig::default())
    }
}
