//! The two model-driven operations on a session: conversation turns and
//! summarization passes.

pub mod summarizer;
pub mod turn;

pub use summarizer::{SummaryOptions, Summarizer};
pub use turn::{BudgetWarning, StudentInput, TurnController, TurnOptions, TurnOutcome};
