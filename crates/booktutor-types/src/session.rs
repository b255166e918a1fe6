//! Tutoring session types.
//!
//! A session is the long-lived teacher agent for one (book, student) pair. Its
//! short-term memory is the persisted message window (`HistoryMessage`), its
//! long-term memory is the notes blob on the session plus the progress tables.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::book::ChapterNumber;

/// Identity of a tutoring session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionKey {
    pub book_id: i64,
    pub student_id: i64,
}

impl SessionKey {
    pub fn new(book_id: i64, student_id: i64) -> Self {
        Self {
            book_id,
            student_id,
        }
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "book {} / student {}", self.book_id, self.student_id)
    }
}

/// Persisted state of a teacher agent (`teacher_agent` row).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TutorSession {
    pub key: SessionKey,
    /// Chapter the tutor is currently teaching, if any.
    pub current_chapter: Option<ChapterNumber>,
    /// Long-term agent memory, rewritten by summarization.
    pub notes: String,
    /// Newest history message already distilled into notes and progress.
    pub last_summarized_message_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Author of a persisted history message.
///
/// Only the student's input and the tutor's final reply are persisted; tool
/// traffic of a turn lives in memory until the turn ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HistoryRole {
    Student,
    Agent,
}

impl fmt::Display for HistoryRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HistoryRole::Student => write!(f, "student"),
            HistoryRole::Agent => write!(f, "agent"),
        }
    }
}

impl FromStr for HistoryRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "student" => Ok(HistoryRole::Student),
            "agent" => Ok(HistoryRole::Agent),
            other => Err(format!("invalid history role: '{other}'")),
        }
    }
}

/// One persisted message of a session.
///
/// `id` is assigned by the store and totally orders the messages of a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryMessage {
    pub id: i64,
    pub key: SessionKey,
    pub role: HistoryRole,
    pub content: String,
    /// Caller-supplied id of the student input, used to deduplicate retries.
    pub client_message_id: Option<String>,
    /// For agent replies, the id of the student message being answered.
    pub reply_to: Option<i64>,
    pub created_at: DateTime<Utc>,
}
