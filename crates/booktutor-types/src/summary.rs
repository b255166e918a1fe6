//! Summarization pass vocabulary: targets, triggers and results.

use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// One of the four long-term records a summarization pass must settle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum SummaryTarget {
    ChapterProgress,
    OverallProgress,
    StudyPlan,
    AgentMemory,
}

impl SummaryTarget {
    pub const ALL: [SummaryTarget; 4] = [
        SummaryTarget::ChapterProgress,
        SummaryTarget::OverallProgress,
        SummaryTarget::StudyPlan,
        SummaryTarget::AgentMemory,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SummaryTarget::ChapterProgress => "chapter_progress",
            SummaryTarget::OverallProgress => "overall_progress",
            SummaryTarget::StudyPlan => "study_plan",
            SummaryTarget::AgentMemory => "agent_memory",
        }
    }
}

impl fmt::Display for SummaryTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What started a summarization pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SummaryTrigger {
    /// Periodic auto-save of an open session.
    Interval,
    /// Session closed explicitly or evicted for inactivity.
    Close,
    /// The student asked to save.
    Explicit,
    /// The context window no longer fits the budget.
    BudgetPressure,
}

impl fmt::Display for SummaryTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SummaryTrigger::Interval => write!(f, "interval"),
            SummaryTrigger::Close => write!(f, "close"),
            SummaryTrigger::Explicit => write!(f, "explicit"),
            SummaryTrigger::BudgetPressure => write!(f, "budget_pressure"),
        }
    }
}

/// Result of a completed summarization pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryReport {
    /// Newest history message covered by this pass.
    pub through_message_id: i64,
    pub messages: usize,
    pub applied: Vec<SummaryTarget>,
    pub skipped: Vec<SummaryTarget>,
    pub rounds: u32,
}

/// Outcome of asking the engine to summarize a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SummaryStatus {
    Completed(SummaryReport),
    /// Another pass was already in flight; this request was dropped.
    Coalesced,
    /// No new messages since the last pass.
    NothingToSummarize,
}
