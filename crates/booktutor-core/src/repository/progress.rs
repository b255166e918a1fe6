//! ProgressRepository trait definition.
//!
//! Per-chapter progress rows and the per-session study plan. Each method is
//! its own transaction; the store does not enforce monotonic status.

use booktutor_types::book::ChapterNumber;
use booktutor_types::error::RepositoryError;
use booktutor_types::progress::{ChapterProgress, ChapterStatus, StudyPlan};
use booktutor_types::session::SessionKey;

pub trait ProgressRepository: Send + Sync {
    /// Progress rows of a session in chapter-number order.
    fn list_chapter_progress(
        &self,
        key: SessionKey,
    ) -> impl std::future::Future<Output = Result<Vec<ChapterProgress>, RepositoryError>> + Send;

    fn get_chapter_progress(
        &self,
        key: SessionKey,
        chapter_number: &ChapterNumber,
    ) -> impl std::future::Future<Output = Result<Option<ChapterProgress>, RepositoryError>> + Send;

    /// Insert or replace the progress row of one chapter.
    fn upsert_chapter_progress(
        &self,
        key: SessionKey,
        chapter_number: &ChapterNumber,
        status: ChapterStatus,
        objectives: &str,
    ) -> impl std::future::Future<Output = Result<ChapterProgress, RepositoryError>> + Send;

    fn get_study_plan(
        &self,
        key: SessionKey,
    ) -> impl std::future::Future<Output = Result<Option<StudyPlan>, RepositoryError>> + Send;

    /// Replace the plan text, creating the row if needed.
    fn set_plan_text(
        &self,
        key: SessionKey,
        plan: &str,
    ) -> impl std::future::Future<Output = Result<StudyPlan, RepositoryError>> + Send;

    /// Replace the overall progress summary, creating the row if needed.
    fn set_progress_summary(
        &self,
        key: SessionKey,
        summary: &str,
    ) -> impl std::future::Future<Output = Result<StudyPlan, RepositoryError>> + Send;
}
