//! Summarization pass: promotes the short-term message window into the
//! long-term records (chapter progress, overall progress, study plan, notes).
//!
//! The model gets the undistilled part of the conversation and must settle all
//! four records, each by a successful write capability or a deliberate
//! `skip_update`. Writes are individually committed; a pass that runs out of
//! rounds leaves the writes it made and reports the rest as pending.

use std::collections::BTreeMap;
use std::sync::Arc;

use booktutor_types::error::TutorError;
use booktutor_types::llm::{CompletionRequest, Message};
use booktutor_types::session::HistoryMessage;
use booktutor_types::summary::{SummaryReport, SummaryStatus, SummaryTarget, SummaryTrigger};

use crate::capability::{CapabilityMode, CapabilityRegistry, Settlement};
use crate::context::accountant::{estimate_tokens, history_cost};
use crate::context::prompt;
use crate::llm::box_provider::BoxLlmProvider;
use crate::llm::retry::RetryPolicy;
use crate::repository::TutorStore;
use crate::session::state::SessionState;

/// Tokens kept free for tool definitions and the model's tool traffic.
const TOOL_RESERVE_TOKENS: u32 = 2_000;

#[derive(Debug, Clone)]
pub struct SummaryOptions {
    pub max_rounds: u32,
    pub max_reply_tokens: u32,
    pub temperature: Option<f64>,
}

/// Which of the four records are settled, and how.
#[derive(Debug, Default)]
struct TargetTracker {
    settled: BTreeMap<SummaryTarget, Settlement>,
}

impl TargetTracker {
    fn record(&mut self, settlement: Settlement) {
        match settlement {
            Settlement::Applied(target) => {
                self.settled.insert(target, settlement);
            }
            Settlement::Skipped(target) => {
                self.settled.entry(target).or_insert(settlement);
            }
        }
    }

    fn pending(&self) -> Vec<SummaryTarget> {
        SummaryTarget::ALL
            .into_iter()
            .filter(|t| !self.settled.contains_key(t))
            .collect()
    }

    fn is_complete(&self) -> bool {
        self.settled.len() == SummaryTarget::ALL.len()
    }

    fn split(&self) -> (Vec<SummaryTarget>, Vec<SummaryTarget>) {
        let mut applied = Vec::new();
        let mut skipped = Vec::new();
        for settlement in self.settled.values() {
            match settlement {
                Settlement::Applied(t) => applied.push(*t),
                Settlement::Skipped(t) => skipped.push(*t),
            }
        }
        (applied, skipped)
    }
}

/// Oldest messages that fit in `budget` tokens; always at least one.
fn oldest_batch(messages: &[HistoryMessage], budget: u32) -> &[HistoryMessage] {
    let mut total = 0u32;
    let mut end = 0;
    for message in messages {
        total = total.saturating_add(history_cost(message));
        if total > budget && end > 0 {
            break;
        }
        end += 1;
    }
    &messages[..end]
}

pub struct Summarizer<S> {
    store: Arc<S>,
    provider: Arc<BoxLlmProvider>,
    registry: CapabilityRegistry<S>,
    retry: RetryPolicy,
    options: SummaryOptions,
}

impl<S: TutorStore> Summarizer<S> {
    pub fn new(
        store: Arc<S>,
        provider: Arc<BoxLlmProvider>,
        retry: RetryPolicy,
        options: SummaryOptions,
    ) -> Self {
        Self {
            registry: CapabilityRegistry::new(store.clone()),
            store,
            provider,
            retry,
            options,
        }
    }

    /// Run one pass over the messages newer than the last summarized one.
    ///
    /// When those messages do not fit the budget at once, the oldest part is
    /// distilled and the rest is left for the next pass.
    #[tracing::instrument(
        skip_all,
        fields(book_id = state.session.key.book_id, student_id = state.session.key.student_id, %trigger)
    )]
    pub async fn run(
        &self,
        state: &mut SessionState,
        trigger: SummaryTrigger,
    ) -> Result<SummaryStatus, TutorError> {
        let key = state.key();
        let undistilled = self
            .store
            .history_since(key, state.session.last_summarized_message_id)
            .await?;
        if undistilled.is_empty() {
            tracing::debug!("Nothing new to summarize");
            return Ok(SummaryStatus::NothingToSummarize);
        }

        let system = prompt::distillation_prompt(&state.book, &state.student, &state.session);
        let room = state
            .settings
            .token_budget
            .saturating_sub(estimate_tokens(&system))
            .saturating_sub(TOOL_RESERVE_TOKENS);
        let batch = oldest_batch(&undistilled, room);
        let through = batch[batch.len() - 1].id;
        if batch.len() < undistilled.len() {
            tracing::info!(
                batch = batch.len(),
                remaining = undistilled.len() - batch.len(),
                "Undistilled history exceeds the budget, summarizing the oldest part"
            );
        }

        let mut messages = vec![Message::user(prompt::transcript(batch, &state.student))];
        let tools = self.registry.definitions(CapabilityMode::Summarization);
        let mut tracker = TargetTracker::default();
        let mut rounds = 0u32;

        while !tracker.is_complete() {
            if rounds >= self.options.max_rounds {
                let pending: Vec<String> = tracker
                    .pending()
                    .into_iter()
                    .map(|t| t.to_string())
                    .collect();
                tracing::warn!(rounds, pending = ?pending, "Summarization ran out of rounds");
                return Err(TutorError::SummaryIncomplete { pending });
            }
            rounds += 1;

            let request = CompletionRequest {
                model: state.settings.ai_model.clone(),
                messages: messages.clone(),
                system: Some(system.clone()),
                max_tokens: self.options.max_reply_tokens,
                temperature: self.options.temperature,
                tools: tools.clone(),
            };
            let response = self.retry.complete(&self.provider, &request).await?;

            if response.has_tool_calls() {
                let calls = response.tool_calls.clone();
                messages.push(Message::assistant_tool_calls(response.content, response.tool_calls));
                for call in &calls {
                    let outcome = self
                        .registry
                        .invoke(key, CapabilityMode::Summarization, call)
                        .await?;
                    if let Some(settlement) = outcome.settlement {
                        tracker.record(settlement);
                    }
                    messages.push(Message::tool_result(call.id.clone(), outcome.to_tool_content()));
                }
            } else {
                let pending = tracker.pending();
                tracing::debug!(round = rounds, pending = pending.len(), "Reminding model of pending updates");
                messages.push(Message::assistant(response.content));
                messages.push(Message::user(prompt::pending_reminder(&pending)));
            }
        }

        self.store.mark_summarized(key, through).await?;
        state.refresh_session(self.store.as_ref()).await?;

        let (applied, skipped) = tracker.split();
        tracing::info!(
            through,
            messages = batch.len(),
            rounds,
            applied = applied.len(),
            skipped = skipped.len(),
            "Summarization completed"
        );

        Ok(SummaryStatus::Completed(SummaryReport {
            through_message_id: through,
            messages: batch.len(),
            applied,
            skipped,
            rounds,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use booktutor_types::session::{HistoryRole, SessionKey};
    use chrono::Utc;

    fn message(id: i64, bytes: usize) -> HistoryMessage {
        HistoryMessage {
            id,
            key: SessionKey::new(1, 1),
            role: HistoryRole::Student,
            content: "m".repeat(bytes),
            client_message_id: None,
            reply_to: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_tracker_applied_wins_over_skipped() {
        let mut tracker = TargetTracker::default();
        tracker.record(Settlement::Skipped(SummaryTarget::StudyPlan));
        tracker.record(Settlement::Applied(SummaryTarget::StudyPlan));
        tracker.record(Settlement::Skipped(SummaryTarget::StudyPlan));
        let (applied, skipped) = tracker.split();
        assert_eq!(applied, vec![SummaryTarget::StudyPlan]);
        assert!(skipped.is_empty());
        assert_eq!(tracker.pending().len(), 3);
    }

    #[test]
    fn test_tracker_completes_with_all_targets() {
        let mut tracker = TargetTracker::default();
        tracker.record(Settlement::Applied(SummaryTarget::ChapterProgress));
        tracker.record(Settlement::Applied(SummaryTarget::ChapterProgress));
        tracker.record(Settlement::Applied(SummaryTarget::OverallProgress));
        tracker.record(Settlement::Skipped(SummaryTarget::StudyPlan));
        assert!(!tracker.is_complete());
        assert_eq!(tracker.pending(), vec![SummaryTarget::AgentMemory]);
        tracker.record(Settlement::Applied(SummaryTarget::AgentMemory));
        assert!(tracker.is_complete());
    }

    #[test]
    fn test_oldest_batch_respects_budget() {
        // Each message costs 10 tokens (24 bytes + overhead).
        let messages: Vec<HistoryMessage> = (1..=10).map(|id| message(id, 24)).collect();
        assert_eq!(oldest_batch(&messages, 35).len(), 3);
        assert_eq!(oldest_batch(&messages, 1_000).len(), 10);
    }

    #[test]
    fn test_oldest_batch_keeps_one_oversized_message() {
        let messages = vec![message(1, 4_000), message(2, 4)];
        let batch = oldest_batch(&messages, 10);
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].id, 1);
    }
}
