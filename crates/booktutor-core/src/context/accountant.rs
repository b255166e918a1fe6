//! Context accountant: token cost of a conversation window and the eviction
//! decision that keeps it under budget.
//!
//! The estimate is `ceil(bytes / 4)` per text plus a fixed per-message
//! overhead. It is not a tokenizer, but it is deterministic and monotonic in
//! text length, so the same window always yields the same plan.

use booktutor_types::llm::Message;
use booktutor_types::session::HistoryMessage;

/// Framing cost charged for every message on top of its text.
pub const MESSAGE_OVERHEAD_TOKENS: u32 = 4;

/// Estimated token count of a text.
pub fn estimate_tokens(text: &str) -> u32 {
    u32::try_from(text.len().div_ceil(4)).unwrap_or(u32::MAX)
}

/// Estimated cost of an LLM message, including any function calls it carries.
pub fn message_cost(message: &Message) -> u32 {
    let calls: u32 = message
        .tool_calls
        .iter()
        .map(|call| {
            estimate_tokens(&call.name)
                .saturating_add(estimate_tokens(&call.arguments))
                .saturating_add(estimate_tokens(&call.id))
        })
        .fold(0, u32::saturating_add);
    estimate_tokens(&message.content)
        .saturating_add(calls)
        .saturating_add(MESSAGE_OVERHEAD_TOKENS)
}

/// Estimated cost of a persisted history message.
///
/// Equal to the cost of the LLM message it becomes in a request.
pub fn history_cost(message: &HistoryMessage) -> u32 {
    estimate_tokens(&message.content).saturating_add(MESSAGE_OVERHEAD_TOKENS)
}

/// Which part of the history fits next to the fixed prompt and the active turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowPlan {
    /// Index of the oldest history message kept; `history[keep_from..]` is sent.
    pub keep_from: usize,
    /// Id of the newest evicted message; everything up to it is dropped.
    pub evict_through: Option<i64>,
    /// Number of evicted messages.
    pub evicted: usize,
    /// Estimated cost of fixed prompt + kept history + active turn.
    pub total_tokens: u32,
    /// The fixed prompt and the active turn alone exceed the budget.
    pub over_budget: bool,
}

/// Decides what part of a session's history fits in the token budget.
#[derive(Debug, Clone, Copy)]
pub struct ContextAccountant {
    budget: u32,
}

impl ContextAccountant {
    pub fn new(budget: u32) -> Self {
        Self { budget }
    }

    pub fn budget(&self) -> u32 {
        self.budget
    }

    /// Plan the window for one model call.
    ///
    /// - `fixed`: system prompt plus memory block, always sent.
    /// - `history`: persisted messages, oldest first.
    /// - `active`: the turn in flight; never dropped, even when it alone is
    ///   over budget (the plan is then flagged and all history is evicted).
    ///
    /// History is accumulated from the newest message backwards and stops at
    /// the first message that would overflow; that message and everything
    /// older is evicted. Evictions are therefore always a contiguous oldest
    /// prefix, and minimal.
    pub fn plan(&self, fixed: &str, history: &[HistoryMessage], active: &[Message]) -> WindowPlan {
        let base = active
            .iter()
            .map(message_cost)
            .fold(estimate_tokens(fixed), u32::saturating_add);

        if base > self.budget {
            return WindowPlan {
                keep_from: history.len(),
                evict_through: history.last().map(|m| m.id),
                evicted: history.len(),
                total_tokens: base,
                over_budget: true,
            };
        }

        let mut total = base;
        let mut keep_from = history.len();
        for (index, message) in history.iter().enumerate().rev() {
            let next = total.saturating_add(history_cost(message));
            if next > self.budget {
                break;
            }
            total = next;
            keep_from = index;
        }

        WindowPlan {
            keep_from,
            evict_through: keep_from.checked_sub(1).map(|i| history[i].id),
            evicted: keep_from,
            total_tokens: total,
            over_budget: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use booktutor_types::llm::ToolCall;
    use booktutor_types::session::{HistoryRole, SessionKey};
    use chrono::Utc;

    /// History where every message costs exactly `cost` tokens.
    fn history(count: usize, cost: u32) -> Vec<HistoryMessage> {
        let bytes = ((cost - MESSAGE_OVERHEAD_TOKENS) * 4) as usize;
        (0..count)
            .map(|i| HistoryMessage {
                id: i as i64 + 1,
                key: SessionKey::new(1, 1),
                role: if i % 2 == 0 {
                    HistoryRole::Student
                } else {
                    HistoryRole::Agent
                },
                content: "x".repeat(bytes),
                client_message_id: None,
                reply_to: None,
                created_at: Utc::now(),
            })
            .collect()
    }

    #[test]
    fn test_estimate_is_ceiling_of_quarter_length() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abc"), 1);
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
    }

    #[test]
    fn test_message_cost_counts_tool_calls() {
        let plain = Message::assistant("");
        let with_call = Message::assistant_tool_calls(
            "",
            vec![ToolCall {
                id: "c1".into(),
                name: "get_table_of_contents".into(),
                arguments: "{}".into(),
            }],
        );
        assert_eq!(message_cost(&plain), MESSAGE_OVERHEAD_TOKENS);
        assert!(message_cost(&with_call) > message_cost(&plain));
    }

    #[test]
    fn test_small_history_fits_without_eviction() {
        // 50 messages, 3000 tokens in total, budget 100000.
        let history = history(50, 60);
        let plan = ContextAccountant::new(100_000).plan("", &history, &[]);

        assert_eq!(plan.keep_from, 0);
        assert_eq!(plan.evicted, 0);
        assert_eq!(plan.evict_through, None);
        assert_eq!(plan.total_tokens, 3_000);
        assert!(!plan.over_budget);
    }

    #[test]
    fn test_eviction_is_minimal_oldest_prefix() {
        let accountant = ContextAccountant::new(100_000);
        let history = history(2_000, 60);
        let active = [Message::user("next question")];
        let plan = accountant.plan("system prompt", &history, &active);

        assert!(plan.evicted > 0);
        assert!(plan.total_tokens <= accountant.budget());
        assert_eq!(plan.evict_through, Some(history[plan.keep_from - 1].id));

        // Keeping one more (the newest evicted) message would overflow.
        let with_one_more = plan.total_tokens + history_cost(&history[plan.keep_from - 1]);
        assert!(with_one_more > accountant.budget());
    }

    #[test]
    fn test_plan_is_deterministic() {
        let accountant = ContextAccountant::new(5_000);
        let history = history(300, 37);
        let active = [Message::user("same")];
        assert_eq!(
            accountant.plan("fixed", &history, &active),
            accountant.plan("fixed", &history, &active)
        );
    }

    #[test]
    fn test_oversized_active_turn_is_kept_and_flagged() {
        let accountant = ContextAccountant::new(1_000);
        let history = history(10, 20);
        let huge = Message::user("y".repeat(10_000));
        let plan = accountant.plan("", &history, std::slice::from_ref(&huge));

        assert!(plan.over_budget);
        assert_eq!(plan.keep_from, history.len());
        assert_eq!(plan.evicted, history.len());
        assert_eq!(plan.evict_through, Some(10));
        assert!(plan.total_tokens >= message_cost(&huge));
    }

    #[test]
    fn test_empty_history_over_budget_has_nothing_to_evict() {
        let plan = ContextAccountant::new(10).plan(&"z".repeat(400), &[], &[]);
        assert!(plan.over_budget);
        assert_eq!(plan.evict_through, None);
        assert_eq!(plan.evicted, 0);
    }
}
