//! SQLite session repository: `teacher_agent` rows and message history.

use booktutor_core::repository::{CommittedTurn, SessionRepository, TurnCommit};
use booktutor_types::book::ChapterNumber;
use booktutor_types::error::RepositoryError;
use booktutor_types::session::{HistoryMessage, HistoryRole, SessionKey, TutorSession};
use sqlx::Row;

use super::store::{SqliteStore, db_error, now, parse_datetime, row_error};

// ---------------------------------------------------------------------------
// Private Row types for SQLite-to-domain mapping
// ---------------------------------------------------------------------------

struct SessionRow {
    student_id: i64,
    book_id: i64,
    current_chapter_number: Option<String>,
    notes: String,
    last_summarized_message_id: Option<i64>,
    created_at: String,
    updated_at: String,
}

impl SessionRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            student_id: row.try_get("student_id")?,
            book_id: row.try_get("book_id")?,
            current_chapter_number: row.try_get("current_chapter_number")?,
            notes: row.try_get("notes")?,
            last_summarized_message_id: row.try_get("last_summarized_message_id")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn into_session(self) -> Result<TutorSession, RepositoryError> {
        let current_chapter = self
            .current_chapter_number
            .as_deref()
            .map(ChapterNumber::parse)
            .transpose()
            .map_err(RepositoryError::Query)?;

        Ok(TutorSession {
            key: SessionKey::new(self.book_id, self.student_id),
            current_chapter,
            notes: self.notes,
            last_summarized_message_id: self.last_summarized_message_id,
            created_at: parse_datetime(&self.created_at)?,
            updated_at: parse_datetime(&self.updated_at)?,
        })
    }
}

struct HistoryRow {
    id: i64,
    student_id: i64,
    book_id: i64,
    role: String,
    content: String,
    client_message_id: Option<String>,
    reply_to: Option<i64>,
    created_at: String,
}

impl HistoryRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            student_id: row.try_get("student_id")?,
            book_id: row.try_get("book_id")?,
            role: row.try_get("role")?,
            content: row.try_get("content")?,
            client_message_id: row.try_get("client_message_id")?,
            reply_to: row.try_get("reply_to")?,
            created_at: row.try_get("created_at")?,
        })
    }

    fn into_message(self) -> Result<HistoryMessage, RepositoryError> {
        let role: HistoryRole = self
            .role
            .parse()
            .map_err(|e: String| RepositoryError::Query(e))?;

        Ok(HistoryMessage {
            id: self.id,
            key: SessionKey::new(self.book_id, self.student_id),
            role,
            content: self.content,
            client_message_id: self.client_message_id,
            reply_to: self.reply_to,
            created_at: parse_datetime(&self.created_at)?,
        })
    }
}

fn history_rows(rows: &[sqlx::sqlite::SqliteRow]) -> Result<Vec<HistoryMessage>, RepositoryError> {
    let mut messages = Vec::with_capacity(rows.len());
    for row in rows {
        messages.push(HistoryRow::from_row(row).map_err(row_error)?.into_message()?);
    }
    Ok(messages)
}

fn not_found_if_untouched(rows_affected: u64) -> Result<(), RepositoryError> {
    if rows_affected == 0 {
        return Err(RepositoryError::NotFound);
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// SessionRepository implementation
// ---------------------------------------------------------------------------

impl SessionRepository for SqliteStore {
    async fn enroll(&self, key: SessionKey) -> Result<TutorSession, RepositoryError> {
        let created_at = now();
        let result = sqlx::query(
            r#"INSERT OR IGNORE INTO teacher_agent (student_id, book_id, notes, created_at, updated_at)
               VALUES (?, ?, '', ?, ?)"#,
        )
        .bind(key.student_id)
        .bind(key.book_id)
        .bind(&created_at)
        .bind(&created_at)
        .execute(&self.pool.writer)
        .await
        .map_err(db_error)?;

        if result.rows_affected() > 0 {
            tracing::info!(%key, "Enrolled student");
        }

        // Read back on the writer so the row is visible immediately.
        let row = sqlx::query("SELECT * FROM teacher_agent WHERE student_id = ? AND book_id = ?")
            .bind(key.student_id)
            .bind(key.book_id)
            .fetch_one(&self.pool.writer)
            .await
            .map_err(db_error)?;
        SessionRow::from_row(&row).map_err(row_error)?.into_session()
    }

    async fn unenroll(&self, key: SessionKey) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM teacher_agent WHERE student_id = ? AND book_id = ?")
            .bind(key.student_id)
            .bind(key.book_id)
            .execute(&self.pool.writer)
            .await
            .map_err(db_error)?;

        not_found_if_untouched(result.rows_affected())?;
        tracing::info!(%key, "Unenrolled student");
        Ok(())
    }

    async fn get_session(&self, key: SessionKey) -> Result<Option<TutorSession>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM teacher_agent WHERE student_id = ? AND book_id = ?")
            .bind(key.student_id)
            .bind(key.book_id)
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(db_error)?;

        row.map(|row| SessionRow::from_row(&row).map_err(row_error)?.into_session())
            .transpose()
    }

    async fn list_sessions(&self, student_id: i64) -> Result<Vec<TutorSession>, RepositoryError> {
        let rows = sqlx::query("SELECT * FROM teacher_agent WHERE student_id = ? ORDER BY book_id")
            .bind(student_id)
            .fetch_all(&self.pool.reader)
            .await
            .map_err(db_error)?;

        let mut sessions = Vec::with_capacity(rows.len());
        for row in &rows {
            sessions.push(SessionRow::from_row(row).map_err(row_error)?.into_session()?);
        }
        Ok(sessions)
    }

    async fn load_history(&self, key: SessionKey) -> Result<Vec<HistoryMessage>, RepositoryError> {
        self.history_since(key, None).await
    }

    async fn history_since(
        &self,
        key: SessionKey,
        after: Option<i64>,
    ) -> Result<Vec<HistoryMessage>, RepositoryError> {
        let rows = sqlx::query(
            r#"SELECT * FROM history_message
               WHERE student_id = ? AND book_id = ? AND id > ?
               ORDER BY id ASC"#,
        )
        .bind(key.student_id)
        .bind(key.book_id)
        .bind(after.unwrap_or(0))
        .fetch_all(&self.pool.reader)
        .await
        .map_err(db_error)?;

        history_rows(&rows)
    }

    async fn find_exchange(
        &self,
        key: SessionKey,
        client_message_id: &str,
    ) -> Result<Option<(HistoryMessage, HistoryMessage)>, RepositoryError> {
        let rows = sqlx::query(
            r#"SELECT * FROM history_message
               WHERE student_id = ? AND book_id = ?
                 AND (client_message_id = ?
                      OR reply_to = (SELECT id FROM history_message
                                     WHERE student_id = ? AND book_id = ? AND client_message_id = ?))
               ORDER BY id ASC"#,
        )
        .bind(key.student_id)
        .bind(key.book_id)
        .bind(client_message_id)
        .bind(key.student_id)
        .bind(key.book_id)
        .bind(client_message_id)
        .fetch_all(&self.pool.reader)
        .await
        .map_err(db_error)?;

        let mut messages = history_rows(&rows)?.into_iter();
        match (messages.next(), messages.next()) {
            (Some(student), Some(reply)) if reply.reply_to == Some(student.id) => {
                Ok(Some((student, reply)))
            }
            _ => Ok(None),
        }
    }

    async fn commit_turn(&self, commit: &TurnCommit) -> Result<CommittedTurn, RepositoryError> {
        let key = commit.key;
        let created_at = now();
        let mut tx = self.pool.writer.begin().await.map_err(db_error)?;

        let evicted = match commit.evict_through {
            Some(through) => sqlx::query(
                "DELETE FROM history_message WHERE student_id = ? AND book_id = ? AND id <= ?",
            )
            .bind(key.student_id)
            .bind(key.book_id)
            .bind(through)
            .execute(&mut *tx)
            .await
            .map_err(db_error)?
            .rows_affected(),
            None => 0,
        };

        let student_id = sqlx::query(
            r#"INSERT INTO history_message (student_id, book_id, role, content, client_message_id, reply_to, created_at)
               VALUES (?, ?, 'student', ?, ?, NULL, ?)"#,
        )
        .bind(key.student_id)
        .bind(key.book_id)
        .bind(&commit.student_text)
        .bind(&commit.client_message_id)
        .bind(&created_at)
        .execute(&mut *tx)
        .await
        .map_err(db_error)?
        .last_insert_rowid();

        let reply_id = sqlx::query(
            r#"INSERT INTO history_message (student_id, book_id, role, content, client_message_id, reply_to, created_at)
               VALUES (?, ?, 'agent', ?, NULL, ?, ?)"#,
        )
        .bind(key.student_id)
        .bind(key.book_id)
        .bind(&commit.reply_text)
        .bind(student_id)
        .bind(&created_at)
        .execute(&mut *tx)
        .await
        .map_err(db_error)?
        .last_insert_rowid();

        let touched = sqlx::query(
            "UPDATE teacher_agent SET updated_at = ? WHERE student_id = ? AND book_id = ?",
        )
        .bind(&created_at)
        .bind(key.student_id)
        .bind(key.book_id)
        .execute(&mut *tx)
        .await
        .map_err(db_error)?;
        not_found_if_untouched(touched.rows_affected())?;

        tx.commit().await.map_err(db_error)?;

        let created_at = parse_datetime(&created_at)?;
        Ok(CommittedTurn {
            student: HistoryMessage {
                id: student_id,
                key,
                role: HistoryRole::Student,
                content: commit.student_text.clone(),
                client_message_id: commit.client_message_id.clone(),
                reply_to: None,
                created_at,
            },
            reply: HistoryMessage {
                id: reply_id,
                key,
                role: HistoryRole::Agent,
                content: commit.reply_text.clone(),
                client_message_id: None,
                reply_to: Some(student_id),
                created_at,
            },
            evicted,
        })
    }

    async fn update_notes(&self, key: SessionKey, notes: &str) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            "UPDATE teacher_agent SET notes = ?, updated_at = ? WHERE student_id = ? AND book_id = ?",
        )
        .bind(notes)
        .bind(now())
        .bind(key.student_id)
        .bind(key.book_id)
        .execute(&self.pool.writer)
        .await
        .map_err(db_error)?;

        not_found_if_untouched(result.rows_affected())
    }

    async fn set_current_chapter(
        &self,
        key: SessionKey,
        chapter_number: Option<&ChapterNumber>,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            r#"UPDATE teacher_agent SET current_chapter_number = ?, updated_at = ?
               WHERE student_id = ? AND book_id = ?"#,
        )
        .bind(chapter_number.map(ChapterNumber::as_str))
        .bind(now())
        .bind(key.student_id)
        .bind(key.book_id)
        .execute(&self.pool.writer)
        .await
        .map_err(db_error)?;

        not_found_if_untouched(result.rows_affected())
    }

    async fn mark_summarized(&self, key: SessionKey, through_id: i64) -> Result<(), RepositoryError> {
        // Never moves backwards.
        let result = sqlx::query(
            r#"UPDATE teacher_agent
               SET last_summarized_message_id = MAX(COALESCE(last_summarized_message_id, 0), ?),
                   updated_at = ?
               WHERE student_id = ? AND book_id = ?"#,
        )
        .bind(through_id)
        .bind(now())
        .bind(key.student_id)
        .bind(key.book_id)
        .execute(&self.pool.writer)
        .await
        .map_err(db_error)?;

        not_found_if_untouched(result.rows_affected())
    }
}
