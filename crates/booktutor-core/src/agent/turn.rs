//! Conversation turn controller: one student message in, one tutor reply out.
//!
//! ```text
//! Idle -> ContextAssembled -> ModelInvoked -> (ToolCallsPending -> ToolsApplied)* -> Persisted -> Idle
//! ```
//!
//! The model may answer with function calls any number of times up to
//! `max_tool_rounds`; their results are fed back and the model is invoked
//! again. Only the student message and the final reply are persisted, together
//! with the eviction decided by the context accountant, in one transaction.
//! Eviction never reaches past `last_summarized_message_id`; the rest of the
//! planned prefix stays stored and the outcome says so.
//! A turn that fails or is cancelled before that commit persists nothing of
//! its own (capability writes already applied stay, they are independent
//! facts).

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use tokio_util::sync::CancellationToken;

use booktutor_types::config::ProviderConfig;
use booktutor_types::error::TutorError;
use booktutor_types::llm::{CompletionRequest, CompletionResponse, Message, ToolCall};
use booktutor_types::session::{HistoryMessage, HistoryRole};

use crate::capability::{CapabilityMode, CapabilityRegistry};
use crate::context::{ContextAccountant, WindowPlan, prompt};
use crate::llm::box_provider::BoxLlmProvider;
use crate::llm::retry::RetryPolicy;
use crate::repository::{TurnCommit, TutorStore};
use crate::session::state::SessionState;

/// Limits of a single turn.
#[derive(Debug, Clone)]
pub struct TurnOptions {
    pub max_tool_rounds: u32,
    pub max_reply_tokens: u32,
    pub temperature: Option<f64>,
}

impl TurnOptions {
    pub fn new(max_tool_rounds: u32, provider: &ProviderConfig) -> Self {
        Self {
            max_tool_rounds,
            max_reply_tokens: provider.max_reply_tokens,
            temperature: provider.temperature,
        }
    }
}

/// A student message as submitted by the client.
#[derive(Debug, Clone)]
pub struct StudentInput {
    pub text: String,
    /// Client-chosen id; resubmitting the same id returns the committed reply.
    pub message_id: Option<String>,
}

impl StudentInput {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            message_id: None,
        }
    }

    pub fn with_id(text: impl Into<String>, message_id: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            message_id: Some(message_id.into()),
        }
    }
}

/// The context did not fit the budget even without any history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BudgetWarning {
    pub required_tokens: u32,
    pub budget: u32,
}

/// Result of a successful turn.
#[derive(Debug, Clone, Serialize)]
pub struct TurnOutcome {
    pub reply: String,
    pub student_message_id: i64,
    pub reply_message_id: i64,
    /// The exchange had already been committed under the same message id.
    pub replayed: bool,
    pub tool_rounds: u32,
    pub evicted: u64,
    pub window_tokens: u32,
    pub budget_warning: Option<BudgetWarning>,
    /// The window dropped messages that are not summarized yet; they were
    /// kept in the store and need a summarization pass.
    pub eviction_deferred: bool,
}

impl TurnOutcome {
    fn replayed(student: HistoryMessage, reply: HistoryMessage) -> Self {
        Self {
            reply: reply.content,
            student_message_id: student.id,
            reply_message_id: reply.id,
            replayed: true,
            tool_rounds: 0,
            evicted: 0,
            window_tokens: 0,
            budget_warning: None,
            eviction_deferred: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TurnPhase {
    ContextAssembled,
    ModelInvoked,
    ToolCallsPending,
    ToolsApplied,
    Persisted,
}

impl fmt::Display for TurnPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TurnPhase::ContextAssembled => "context_assembled",
            TurnPhase::ModelInvoked => "model_invoked",
            TurnPhase::ToolCallsPending => "tool_calls_pending",
            TurnPhase::ToolsApplied => "tools_applied",
            TurnPhase::Persisted => "persisted",
        };
        f.write_str(name)
    }
}

/// What the model asked for in one round.
enum Step {
    Reply(String),
    ToolCalls { content: String, calls: Vec<ToolCall> },
}

impl From<CompletionResponse> for Step {
    fn from(response: CompletionResponse) -> Self {
        if response.has_tool_calls() {
            Step::ToolCalls {
                content: response.content,
                calls: response.tool_calls,
            }
        } else {
            Step::Reply(response.content)
        }
    }
}

/// The part of a planned eviction that is already summarized.
fn summarized_prefix(planned: Option<i64>, summarized: Option<i64>) -> Option<i64> {
    match (planned, summarized) {
        (Some(planned), Some(summarized)) => Some(planned.min(summarized)),
        _ => None,
    }
}

pub(crate) fn history_message(message: &HistoryMessage) -> Message {
    match message.role {
        HistoryRole::Student => Message::user(message.content.clone()),
        HistoryRole::Agent => Message::assistant(message.content.clone()),
    }
}

/// Runs conversation turns against a session state.
pub struct TurnController<S> {
    store: Arc<S>,
    provider: Arc<BoxLlmProvider>,
    registry: CapabilityRegistry<S>,
    retry: RetryPolicy,
    options: TurnOptions,
}

impl<S: TutorStore> TurnController<S> {
    pub fn new(
        store: Arc<S>,
        provider: Arc<BoxLlmProvider>,
        retry: RetryPolicy,
        options: TurnOptions,
    ) -> Self {
        Self {
            registry: CapabilityRegistry::new(store.clone()),
            store,
            provider,
            retry,
            options,
        }
    }

    /// The window plan the next turn with `text` would start from.
    pub fn preview(&self, state: &SessionState, text: &str) -> WindowPlan {
        let fixed = prompt::tutor_system_prompt(&state.book, &state.student, &state.session);
        ContextAccountant::new(state.settings.token_budget).plan(
            &fixed,
            &state.history,
            &[Message::user(text)],
        )
    }

    /// Run one turn.
    #[tracing::instrument(
        skip_all,
        fields(book_id = state.session.key.book_id, student_id = state.session.key.student_id)
    )]
    pub async fn run(
        &self,
        state: &mut SessionState,
        input: StudentInput,
        cancel: &CancellationToken,
    ) -> Result<TurnOutcome, TutorError> {
        let key = state.key();

        if let Some(message_id) = input.message_id.as_deref() {
            if let Some((student, reply)) = self.store.find_exchange(key, message_id).await? {
                tracing::info!(message_id, "Returning already committed reply");
                return Ok(TurnOutcome::replayed(student, reply));
            }
        }

        let accountant = ContextAccountant::new(state.settings.token_budget);
        let mut warning: Option<BudgetWarning> = None;
        let mut note_budget = |plan: &WindowPlan| {
            if plan.over_budget {
                let required = warning.map_or(0, |w| w.required_tokens).max(plan.total_tokens);
                warning = Some(BudgetWarning {
                    required_tokens: required,
                    budget: accountant.budget(),
                });
            }
        };

        let mut turn = vec![Message::user(input.text.clone())];
        let mut rounds = 0u32;

        let reply = loop {
            let fixed = prompt::tutor_system_prompt(&state.book, &state.student, &state.session);
            let plan = accountant.plan(&fixed, &state.history, &turn);
            note_budget(&plan);
            tracing::debug!(
                phase = %TurnPhase::ContextAssembled,
                round = rounds,
                kept = state.history.len() - plan.keep_from,
                tokens = plan.total_tokens,
                "Context assembled"
            );

            let mut messages: Vec<Message> = state.history[plan.keep_from..]
                .iter()
                .map(history_message)
                .collect();
            messages.extend(turn.iter().cloned());

            let request = CompletionRequest {
                model: state.settings.ai_model.clone(),
                messages,
                system: Some(fixed),
                max_tokens: self.options.max_reply_tokens,
                temperature: self.options.temperature,
                tools: self.registry.definitions(CapabilityMode::Conversation),
            };

            let response = self.invoke_model(&request, cancel).await?;
            tracing::debug!(
                phase = %TurnPhase::ModelInvoked,
                round = rounds,
                stop_reason = %response.stop_reason,
                input_tokens = response.usage.input_tokens,
                output_tokens = response.usage.output_tokens,
                "Model responded"
            );

            match Step::from(response) {
                Step::Reply(text) => break text,
                Step::ToolCalls { content, calls } => {
                    rounds += 1;
                    if rounds > self.options.max_tool_rounds {
                        tracing::warn!(
                            max_tool_rounds = self.options.max_tool_rounds,
                            "Tool-call loop bound reached, aborting turn"
                        );
                        return Err(TutorError::ToolLoopExceeded {
                            rounds: self.options.max_tool_rounds,
                        });
                    }
                    tracing::debug!(
                        phase = %TurnPhase::ToolCallsPending,
                        round = rounds,
                        calls = calls.len(),
                        "Model requested tool calls"
                    );

                    turn.push(Message::assistant_tool_calls(content, calls.clone()));
                    let mut wrote = false;
                    for call in &calls {
                        if cancel.is_cancelled() {
                            return Err(TutorError::Cancelled);
                        }
                        let outcome = self
                            .registry
                            .invoke(key, CapabilityMode::Conversation, call)
                            .await?;
                        wrote |= outcome.is_ok() && outcome.capability.is_some_and(|c| c.is_write());
                        turn.push(Message::tool_result(call.id.clone(), outcome.to_tool_content()));
                    }
                    if wrote {
                        state.refresh_session(self.store.as_ref()).await?;
                    }
                    tracing::debug!(phase = %TurnPhase::ToolsApplied, round = rounds, "Tool results collected");
                }
            }
        };

        // Evict for the window as it will look once this exchange is persisted.
        let fixed = prompt::tutor_system_prompt(&state.book, &state.student, &state.session);
        let persisted = [Message::user(input.text.clone()), Message::assistant(reply.clone())];
        let plan = accountant.plan(&fixed, &state.history, &persisted);
        note_budget(&plan);
        let evict_through =
            summarized_prefix(plan.evict_through, state.session.last_summarized_message_id);
        let eviction_deferred = evict_through != plan.evict_through;
        if eviction_deferred {
            tracing::debug!(
                planned = ?plan.evict_through,
                applied = ?evict_through,
                "Holding back eviction of unsummarized messages"
            );
        }

        if cancel.is_cancelled() {
            return Err(TutorError::Cancelled);
        }

        let committed = self
            .store
            .commit_turn(&TurnCommit {
                key,
                client_message_id: input.message_id,
                student_text: input.text,
                reply_text: reply,
                evict_through,
            })
            .await?;
        state.apply_commit(&committed, evict_through);
        state.refresh_session(self.store.as_ref()).await?;

        tracing::info!(
            phase = %TurnPhase::Persisted,
            tool_rounds = rounds,
            evicted = committed.evicted,
            tokens = plan.total_tokens,
            over_budget = warning.is_some(),
            eviction_deferred,
            "Turn committed"
        );

        Ok(TurnOutcome {
            reply: committed.reply.content,
            student_message_id: committed.student.id,
            reply_message_id: committed.reply.id,
            replayed: false,
            tool_rounds: rounds,
            evicted: committed.evicted,
            window_tokens: plan.total_tokens,
            budget_warning: warning,
            eviction_deferred,
        })
    }

    async fn invoke_model(
        &self,
        request: &CompletionRequest,
        cancel: &CancellationToken,
    ) -> Result<CompletionResponse, TutorError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(TutorError::Cancelled),
            result = self.retry.complete(&self.provider, request) => result.map_err(TutorError::from),
        }
    }
}
