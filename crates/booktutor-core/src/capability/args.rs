//! Argument objects of the capabilities.
//!
//! Field docs end up in the JSON Schema the model sees. `student_id` and
//! `book_id` are optional everywhere: they default to the calling session and
//! must match it when given.

use schemars::JsonSchema;
use serde::Deserialize;

use booktutor_types::summary::SummaryTarget;

#[derive(Debug, Deserialize, JsonSchema)]
pub struct BookArgs {
    /// Book id; defaults to the book of this session.
    #[serde(default)]
    pub book_id: Option<i64>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ChapterArgs {
    /// Book id; defaults to the book of this session.
    #[serde(default)]
    pub book_id: Option<i64>,
    /// Dotted chapter number as listed in the table of contents, e.g. "1.2.".
    pub chapter_number: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct SessionArgs {
    /// Student id; defaults to the student of this session.
    #[serde(default)]
    pub student_id: Option<i64>,
    /// Book id; defaults to the book of this session.
    #[serde(default)]
    pub book_id: Option<i64>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct SetChapterProgressArgs {
    #[serde(default)]
    pub student_id: Option<i64>,
    #[serde(default)]
    pub book_id: Option<i64>,
    /// Dotted chapter number, e.g. "1.2.".
    pub chapter_number: String,
    /// 0 = not started, 1 = in progress, 2 = completed.
    pub status: i64,
    /// Objectives covered and next steps for this chapter.
    #[serde(default)]
    pub objectives: String,
    /// Allow lowering the status of a chapter (e.g. to restart it).
    #[serde(default)]
    pub reset: bool,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct UpdateStudyPlanArgs {
    #[serde(default)]
    pub student_id: Option<i64>,
    #[serde(default)]
    pub book_id: Option<i64>,
    /// The complete new study plan.
    pub plan_text: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct UpdateOverallProgressArgs {
    #[serde(default)]
    pub student_id: Option<i64>,
    #[serde(default)]
    pub book_id: Option<i64>,
    /// Short summary of where the student stands in the book.
    pub summary_text: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct UpdateAgentMemoryArgs {
    #[serde(default)]
    pub student_id: Option<i64>,
    #[serde(default)]
    pub book_id: Option<i64>,
    /// The complete new notes about the student; replaces the old notes.
    pub notes_text: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct SetCurrentChapterArgs {
    #[serde(default)]
    pub student_id: Option<i64>,
    #[serde(default)]
    pub book_id: Option<i64>,
    /// Dotted chapter number to teach next, e.g. "2.1.".
    pub chapter_number: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct SkipUpdateArgs {
    /// The record that needs no change.
    pub target: SummaryTarget,
    /// Why no change is needed.
    #[serde(default)]
    pub reason: String,
}
