use thiserror::Error;

use crate::llm::LlmError;
use crate::session::SessionKey;

/// Errors from repository operations (used by trait definitions in booktutor-core).
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database connection error")]
    Connection,

    #[error("query error: {0}")]
    Query(String),

    #[error("entity not found")]
    NotFound,

    #[error("conflict: {0}")]
    Conflict(String),

    /// A foreign key or CHECK constraint rejected the write.
    #[error("constraint violation: {0}")]
    Constraint(String),
}

/// A capability call the tutor made that cannot be carried out.
///
/// These go back to the model as the tool result so it can correct itself;
/// they never abort a turn.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CapabilityError {
    #[error("unknown capability '{0}'")]
    Unknown(String),

    #[error("invalid arguments for '{name}': {reason}")]
    InvalidArguments { name: String, reason: String },

    #[error("{0}")]
    Validation(String),

    #[error("'{0}' is not available here")]
    NotPermitted(String),
}

/// Errors surfaced by the tutoring engine to its caller.
#[derive(Debug, Error)]
pub enum TutorError {
    /// The model stayed unavailable after the retry budget was spent.
    #[error("the tutor is unavailable, please retry ({0})")]
    Llm(#[from] LlmError),

    #[error("store error: {0}")]
    Store(#[from] RepositoryError),

    #[error("capability error: {0}")]
    Capability(#[from] CapabilityError),

    #[error("tool-call loop exceeded {rounds} rounds")]
    ToolLoopExceeded { rounds: u32 },

    #[error("summarization ended with pending updates: {}", pending.join(", "))]
    SummaryIncomplete { pending: Vec<String> },

    #[error("operation cancelled")]
    Cancelled,

    #[error("student is not enrolled ({0})")]
    NotEnrolled(SessionKey),

    #[error("{0} not found")]
    NotFound(String),

    #[error("invalid settings: {0}")]
    InvalidSettings(String),
}

impl TutorError {
    /// Whether the failure aborted the turn for reasons the student cannot fix
    /// by simply retrying.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            TutorError::Store(..) | TutorError::ToolLoopExceeded { .. }
        )
    }
}
