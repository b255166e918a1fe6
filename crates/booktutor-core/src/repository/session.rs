//! SessionRepository trait definition.
//!
//! Covers the `teacher_agent` row and the session's message history.

use booktutor_types::book::ChapterNumber;
use booktutor_types::error::RepositoryError;
use booktutor_types::session::{HistoryMessage, SessionKey, TutorSession};

/// Everything a finished turn writes, applied atomically by
/// [`SessionRepository::commit_turn`].
#[derive(Debug, Clone)]
pub struct TurnCommit {
    pub key: SessionKey,
    pub client_message_id: Option<String>,
    pub student_text: String,
    pub reply_text: String,
    /// Delete every history message of the session with `id <= evict_through`.
    pub evict_through: Option<i64>,
}

/// The two rows created by a committed turn.
#[derive(Debug, Clone)]
pub struct CommittedTurn {
    pub student: HistoryMessage,
    pub reply: HistoryMessage,
    pub evicted: u64,
}

pub trait SessionRepository: Send + Sync {
    /// Create the session row if it does not exist and return it.
    fn enroll(
        &self,
        key: SessionKey,
    ) -> impl std::future::Future<Output = Result<TutorSession, RepositoryError>> + Send;

    /// Delete the session together with its history and progress.
    fn unenroll(
        &self,
        key: SessionKey,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    fn get_session(
        &self,
        key: SessionKey,
    ) -> impl std::future::Future<Output = Result<Option<TutorSession>, RepositoryError>> + Send;

    /// Sessions a student is enrolled in.
    fn list_sessions(
        &self,
        student_id: i64,
    ) -> impl std::future::Future<Output = Result<Vec<TutorSession>, RepositoryError>> + Send;

    /// Persisted message window, oldest first.
    fn load_history(
        &self,
        key: SessionKey,
    ) -> impl std::future::Future<Output = Result<Vec<HistoryMessage>, RepositoryError>> + Send;

    /// Messages with `id > after` (all messages when `after` is `None`), oldest first.
    fn history_since(
        &self,
        key: SessionKey,
        after: Option<i64>,
    ) -> impl std::future::Future<Output = Result<Vec<HistoryMessage>, RepositoryError>> + Send;

    /// A previously committed exchange for a client message id: the student
    /// message and the agent reply to it.
    fn find_exchange(
        &self,
        key: SessionKey,
        client_message_id: &str,
    ) -> impl std::future::Future<
        Output = Result<Option<(HistoryMessage, HistoryMessage)>, RepositoryError>,
    > + Send;

    /// Append the student message and the reply, apply the eviction prefix and
    /// touch the session, all in one transaction.
    fn commit_turn(
        &self,
        commit: &TurnCommit,
    ) -> impl std::future::Future<Output = Result<CommittedTurn, RepositoryError>> + Send;

    /// Replace the agent's long-term notes.
    fn update_notes(
        &self,
        key: SessionKey,
        notes: &str,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    fn set_current_chapter(
        &self,
        key: SessionKey,
        chapter_number: Option<&ChapterNumber>,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Record that every message up to `through_id` has been summarized.
    fn mark_summarized(
        &self,
        key: SessionKey,
        through_id: i64,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;
}
