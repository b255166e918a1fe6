//! Long-term learning state: per-chapter progress and the overall study plan.
//!
//! Both are written only through capabilities, mostly during summarization.
//! The store does not tie the two together; the summarization pass keeps them
//! consistent.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::book::ChapterNumber;

/// Status ordinal of one chapter for one student.
///
/// Persisted as the integers 0, 1, 2 (`CHECK (status IN (0, 1, 2))`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub enum ChapterStatus {
    NotStarted = 0,
    InProgress = 1,
    Completed = 2,
}

impl ChapterStatus {
    pub fn as_i64(self) -> i64 {
        self as i64
    }

    pub fn label(self) -> &'static str {
        match self {
            ChapterStatus::NotStarted => "not_started",
            ChapterStatus::InProgress => "in_progress",
            ChapterStatus::Completed => "completed",
        }
    }
}

impl TryFrom<i64> for ChapterStatus {
    type Error = String;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(ChapterStatus::NotStarted),
            1 => Ok(ChapterStatus::InProgress),
            2 => Ok(ChapterStatus::Completed),
            other => Err(format!(
                "invalid chapter status {other}: expected 0 (not started), 1 (in progress) or 2 (completed)"
            )),
        }
    }
}

impl From<ChapterStatus> for i64 {
    fn from(value: ChapterStatus) -> Self {
        value.as_i64()
    }
}

impl fmt::Display for ChapterStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Progress of one student through one chapter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChapterProgress {
    pub student_id: i64,
    pub book_id: i64,
    pub chapter_number: ChapterNumber,
    pub status: ChapterStatus,
    /// Objectives covered and next steps, free text written by the tutor.
    pub objectives: String,
    pub updated_at: DateTime<Utc>,
}

/// Overall plan and progress summary for a (student, book) pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StudyPlan {
    pub student_id: i64,
    pub book_id: i64,
    pub plan: String,
    pub progress_summary: String,
    pub updated_at: DateTime<Utc>,
}
