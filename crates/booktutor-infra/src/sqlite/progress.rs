//! SQLite progress repository: `chapter_progress` and `book_progress` rows.

use booktutor_core::repository::ProgressRepository;
use booktutor_types::book::ChapterNumber;
use booktutor_types::error::RepositoryError;
use booktutor_types::progress::{ChapterProgress, ChapterStatus, StudyPlan};
use booktutor_types::session::SessionKey;
use sqlx::Row;

use super::store::{SqliteStore, db_error, now, parse_datetime, row_error};

struct ChapterProgressRow {
    student_id: i64,
    book_id: i64,
    chapter_number: String,
    status: i64,
    objectives: String,
    updated_at: String,
}

impl ChapterProgressRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            student_id: row.try_get("student_id")?,
            book_id: row.try_get("book_id")?,
            chapter_number: row.try_get("chapter_number")?,
            status: row.try_get("status")?,
            objectives: row.try_get("objectives")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn into_progress(self) -> Result<ChapterProgress, RepositoryError> {
        Ok(ChapterProgress {
            student_id: self.student_id,
            book_id: self.book_id,
            chapter_number: ChapterNumber::parse(&self.chapter_number)
                .map_err(RepositoryError::Query)?,
            status: ChapterStatus::try_from(self.status).map_err(RepositoryError::Query)?,
            objectives: self.objectives,
            updated_at: parse_datetime(&self.updated_at)?,
        })
    }
}

struct StudyPlanRow {
    student_id: i64,
    book_id: i64,
    plan: String,
    progress_summary: String,
    updated_at: String,
}

impl StudyPlanRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            student_id: row.try_get("student_id")?,
            book_id: row.try_get("book_id")?,
            plan: row.try_get("plan")?,
            progress_summary: row.try_get("progress_summary")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn into_plan(self) -> Result<StudyPlan, RepositoryError> {
        Ok(StudyPlan {
            student_id: self.student_id,
            book_id: self.book_id,
            plan: self.plan,
            progress_summary: self.progress_summary,
            updated_at: parse_datetime(&self.updated_at)?,
        })
    }
}

impl SqliteStore {
    /// Read a `book_progress` row on the writer, right after changing it.
    async fn plan_after_write(&self, key: SessionKey) -> Result<StudyPlan, RepositoryError> {
        let row = sqlx::query("SELECT * FROM book_progress WHERE student_id = ? AND book_id = ?")
            .bind(key.student_id)
            .bind(key.book_id)
            .fetch_one(&self.pool.writer)
            .await
            .map_err(db_error)?;
        StudyPlanRow::from_row(&row).map_err(row_error)?.into_plan()
    }
}

impl ProgressRepository for SqliteStore {
    async fn list_chapter_progress(
        &self,
        key: SessionKey,
    ) -> Result<Vec<ChapterProgress>, RepositoryError> {
        let rows = sqlx::query("SELECT * FROM chapter_progress WHERE student_id = ? AND book_id = ?")
            .bind(key.student_id)
            .bind(key.book_id)
            .fetch_all(&self.pool.reader)
            .await
            .map_err(db_error)?;

        let mut progress = Vec::with_capacity(rows.len());
        for row in &rows {
            progress.push(ChapterProgressRow::from_row(row).map_err(row_error)?.into_progress()?);
        }
        progress.sort_by(|a, b| a.chapter_number.cmp(&b.chapter_number));
        Ok(progress)
    }

    async fn get_chapter_progress(
        &self,
        key: SessionKey,
        chapter_number: &ChapterNumber,
    ) -> Result<Option<ChapterProgress>, RepositoryError> {
        let row = sqlx::query(
            r#"SELECT * FROM chapter_progress
               WHERE student_id = ? AND book_id = ? AND chapter_number = ?"#,
        )
        .bind(key.student_id)
        .bind(key.book_id)
        .bind(chapter_number.as_str())
        .fetch_optional(&self.pool.reader)
        .await
        .map_err(db_error)?;

        row.map(|row| ChapterProgressRow::from_row(&row).map_err(row_error)?.into_progress())
            .transpose()
    }

    async fn upsert_chapter_progress(
        &self,
        key: SessionKey,
        chapter_number: &ChapterNumber,
        status: ChapterStatus,
        objectives: &str,
    ) -> Result<ChapterProgress, RepositoryError> {
        let updated_at = now();
        sqlx::query(
            r#"INSERT INTO chapter_progress (student_id, book_id, chapter_number, status, objectives, updated_at)
               VALUES (?, ?, ?, ?, ?, ?)
               ON CONFLICT(student_id, book_id, chapter_number) DO UPDATE SET
                   status = excluded.status,
                   objectives = excluded.objectives,
                   updated_at = excluded.updated_at"#,
        )
        .bind(key.student_id)
        .bind(key.book_id)
        .bind(chapter_number.as_str())
        .bind(status.as_i64())
        .bind(objectives)
        .bind(&updated_at)
        .execute(&self.pool.writer)
        .await
        .map_err(db_error)?;

        tracing::debug!(%key, chapter = %chapter_number, %status, "Chapter progress updated");
        Ok(ChapterProgress {
            student_id: key.student_id,
            book_id: key.book_id,
            chapter_number: chapter_number.clone(),
            status,
            objectives: objectives.to_string(),
            updated_at: parse_datetime(&updated_at)?,
        })
    }

    async fn get_study_plan(&self, key: SessionKey) -> Result<Option<StudyPlan>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM book_progress WHERE student_id = ? AND book_id = ?")
            .bind(key.student_id)
            .bind(key.book_id)
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(db_error)?;

        row.map(|row| StudyPlanRow::from_row(&row).map_err(row_error)?.into_plan())
            .transpose()
    }

    async fn set_plan_text(&self, key: SessionKey, plan: &str) -> Result<StudyPlan, RepositoryError> {
        sqlx::query(
            r#"INSERT INTO book_progress (student_id, book_id, plan, progress_summary, updated_at)
               VALUES (?, ?, ?, '', ?)
               ON CONFLICT(student_id, book_id) DO UPDATE SET
                   plan = excluded.plan,
                   updated_at = excluded.updated_at"#,
        )
        .bind(key.student_id)
        .bind(key.book_id)
        .bind(plan)
        .bind(now())
        .execute(&self.pool.writer)
        .await
        .map_err(db_error)?;

        self.plan_after_write(key).await
    }

    async fn set_progress_summary(
        &self,
        key: SessionKey,
        summary: &str,
    ) -> Result<StudyPlan, RepositoryError> {
        sqlx::query(
            r#"INSERT INTO book_progress (student_id, book_id, plan, progress_summary, updated_at)
               VALUES (?, ?, '', ?, ?)
               ON CONFLICT(student_id, book_id) DO UPDATE SET
                   progress_summary = excluded.progress_summary,
                   updated_at = excluded.updated_at"#,
        )
        .bind(key.student_id)
        .bind(key.book_id)
        .bind(summary)
        .bind(now())
        .execute(&self.pool.writer)
        .await
        .map_err(db_error)?;

        self.plan_after_write(key).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sqlite::store::test_support::{enrolled, test_store};

    fn ch(n: &str) -> ChapterNumber {
        ChapterNumber::parse(n).unwrap()
    }

    #[tokio::test]
    async fn test_upsert_replaces_row() {
        let store = test_store().await;
        let key = enrolled(&store).await;

        store
            .upsert_chapter_progress(key, &ch("1."), ChapterStatus::InProgress, "variables")
            .await
            .unwrap();
        store
            .upsert_chapter_progress(key, &ch("1."), ChapterStatus::Completed, "done")
            .await
            .unwrap();

        let row = store.get_chapter_progress(key, &ch("1.")).await.unwrap().unwrap();
        assert_eq!(row.status, ChapterStatus::Completed);
        assert_eq!(row.objectives, "done");
        assert_eq!(store.list_chapter_progress(key).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_store_does_not_enforce_monotonic_status() {
        let store = test_store().await;
        let key = enrolled(&store).await;

        store
            .upsert_chapter_progress(key, &ch("1."), ChapterStatus::Completed, "")
            .await
            .unwrap();
        store
            .upsert_chapter_progress(key, &ch("1."), ChapterStatus::NotStarted, "restart")
            .await
            .unwrap();

        let row = store.get_chapter_progress(key, &ch("1.")).await.unwrap().unwrap();
        assert_eq!(row.status, ChapterStatus::NotStarted);
    }

    #[tokio::test]
    async fn test_progress_for_unknown_chapter_is_constraint_error() {
        let store = test_store().await;
        let key = enrolled(&store).await;

        let err = store
            .upsert_chapter_progress(key, &ch("42."), ChapterStatus::InProgress, "")
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::Constraint(_)));
    }

    #[tokio::test]
    async fn test_status_outside_range_is_rejected_by_schema() {
        let store = test_store().await;
        let key = enrolled(&store).await;

        let err = sqlx::query(
            r#"INSERT INTO chapter_progress (student_id, book_id, chapter_number, status, objectives, updated_at)
               VALUES (?, ?, '1.', 3, '', ?)"#,
        )
        .bind(key.student_id)
        .bind(key.book_id)
        .bind(now())
        .execute(&store.pool.writer)
        .await
        .map_err(db_error)
        .unwrap_err();
        assert!(matches!(err, RepositoryError::Constraint(_)));
    }

    #[tokio::test]
    async fn test_list_progress_in_chapter_order() {
        let store = test_store().await;
        let key = enrolled(&store).await;
        for n in ["10.", "2.", "1.1."] {
            store
                .upsert_chapter_progress(key, &ch(n), ChapterStatus::InProgress, "")
                .await
                .unwrap();
        }

        let order: Vec<String> = store
            .list_chapter_progress(key)
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.chapter_number.to_string())
            .collect();
        assert_eq!(order, vec!["1.1.", "2.", "10."]);
    }

    #[tokio::test]
    async fn test_plan_and_summary_are_independent() {
        let store = test_store().await;
        let key = enrolled(&store).await;
        assert!(store.get_study_plan(key).await.unwrap().is_none());

        store.set_plan_text(key, "1. Basics\n2. Ownership").await.unwrap();
        let plan = store.set_progress_summary(key, "Finished basics").await.unwrap();
        assert_eq!(plan.plan, "1. Basics\n2. Ownership");
        assert_eq!(plan.progress_summary, "Finished basics");

        let plan = store.set_plan_text(key, "2. Ownership").await.unwrap();
        assert_eq!(plan.progress_summary, "Finished basics");
    }
}
