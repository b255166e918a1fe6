//! SQLite library repository: books and their chapters.

use booktutor_core::repository::LibraryRepository;
use booktutor_types::book::{Book, BookImport, Chapter, ChapterNumber};
use booktutor_types::error::RepositoryError;
use sqlx::Row;

use super::store::{SqliteStore, db_error, now, parse_datetime, row_error};

// ---------------------------------------------------------------------------
// Private Row types for SQLite-to-domain mapping
// ---------------------------------------------------------------------------

struct BookRow {
    id: i64,
    title: String,
    author: String,
    path: String,
    summary: Option<String>,
    description: Option<String>,
    created_at: String,
}

impl BookRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            title: row.try_get("title")?,
            author: row.try_get("author")?,
            path: row.try_get("path")?,
            summary: row.try_get("summary")?,
            description: row.try_get("description")?,
            created_at: row.try_get("created_at")?,
        })
    }

    fn into_book(self) -> Result<Book, RepositoryError> {
        Ok(Book {
            id: self.id,
            title: self.title,
            author: self.author,
            path: self.path,
            summary: self.summary,
            description: self.description,
            created_at: parse_datetime(&self.created_at)?,
        })
    }
}

struct ChapterRow {
    book_id: i64,
    chapter_number: String,
    name: String,
    summary: String,
    key_points: String,
}

impl ChapterRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            book_id: row.try_get("book_id")?,
            chapter_number: row.try_get("chapter_number")?,
            name: row.try_get("name")?,
            summary: row.try_get("summary")?,
            key_points: row.try_get("key_points")?,
        })
    }

    fn into_chapter(self) -> Result<Chapter, RepositoryError> {
        let chapter_number = ChapterNumber::parse(&self.chapter_number)
            .map_err(RepositoryError::Query)?;
        let key_points: Vec<String> = serde_json::from_str(&self.key_points)
            .map_err(|e| RepositoryError::Query(format!("invalid key_points: {e}")))?;

        Ok(Chapter {
            book_id: self.book_id,
            chapter_number,
            name: self.name,
            summary: self.summary,
            key_points,
        })
    }
}

// ---------------------------------------------------------------------------
// LibraryRepository implementation
// ---------------------------------------------------------------------------

impl LibraryRepository for SqliteStore {
    async fn import_book(&self, import: &BookImport) -> Result<Book, RepositoryError> {
        let created_at = now();
        let mut tx = self.pool.writer.begin().await.map_err(db_error)?;

        let result = sqlx::query(
            r#"INSERT INTO book (title, author, path, summary, description, created_at)
               VALUES (?, ?, ?, ?, ?, ?)"#,
        )
        .bind(&import.title)
        .bind(&import.author)
        .bind(&import.path)
        .bind(&import.summary)
        .bind(&import.description)
        .bind(&created_at)
        .execute(&mut *tx)
        .await
        .map_err(db_error)?;
        let book_id = result.last_insert_rowid();

        for chapter in &import.chapters {
            let key_points = serde_json::to_string(&chapter.key_points)
                .map_err(|e| RepositoryError::Query(format!("invalid key_points: {e}")))?;
            sqlx::query(
                r#"INSERT INTO chapter (book_id, chapter_number, name, summary, key_points)
                   VALUES (?, ?, ?, ?, ?)"#,
            )
            .bind(book_id)
            .bind(chapter.chapter_number.as_str())
            .bind(&chapter.name)
            .bind(&chapter.summary)
            .bind(key_points)
            .execute(&mut *tx)
            .await
            .map_err(|e| match db_error(e) {
                RepositoryError::Conflict(_) => RepositoryError::Conflict(format!(
                    "chapter '{}' appears twice",
                    chapter.chapter_number
                )),
                other => other,
            })?;
        }

        tx.commit().await.map_err(db_error)?;
        tracing::info!(book_id, title = %import.title, chapters = import.chapters.len(), "Imported book");

        Ok(Book {
            id: book_id,
            title: import.title.clone(),
            author: import.author.clone(),
            path: import.path.clone(),
            summary: import.summary.clone(),
            description: import.description.clone(),
            created_at: parse_datetime(&created_at)?,
        })
    }

    async fn list_books(&self) -> Result<Vec<Book>, RepositoryError> {
        let rows = sqlx::query("SELECT * FROM book ORDER BY id")
            .fetch_all(&self.pool.reader)
            .await
            .map_err(db_error)?;

        let mut books = Vec::with_capacity(rows.len());
        for row in &rows {
            books.push(BookRow::from_row(row).map_err(row_error)?.into_book()?);
        }
        Ok(books)
    }

    async fn get_book(&self, book_id: i64) -> Result<Option<Book>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM book WHERE id = ?")
            .bind(book_id)
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(db_error)?;

        row.map(|row| BookRow::from_row(&row).map_err(row_error)?.into_book())
            .transpose()
    }

    async fn delete_book(&self, book_id: i64) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM book WHERE id = ?")
            .bind(book_id)
            .execute(&self.pool.writer)
            .await
            .map_err(db_error)?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        tracing::info!(book_id, "Deleted book");
        Ok(())
    }

    async fn list_chapters(&self, book_id: i64) -> Result<Vec<Chapter>, RepositoryError> {
        let rows = sqlx::query("SELECT * FROM chapter WHERE book_id = ?")
            .bind(book_id)
            .fetch_all(&self.pool.reader)
            .await
            .map_err(db_error)?;

        let mut chapters = Vec::with_capacity(rows.len());
        for row in &rows {
            chapters.push(ChapterRow::from_row(row).map_err(row_error)?.into_chapter()?);
        }
        // Chapter numbers do not sort as text ("10." < "2.").
        chapters.sort_by(|a, b| a.chapter_number.cmp(&b.chapter_number));
        Ok(chapters)
    }

    async fn get_chapter(
        &self,
        book_id: i64,
        chapter_number: &ChapterNumber,
    ) -> Result<Option<Chapter>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM chapter WHERE book_id = ? AND chapter_number = ?")
            .bind(book_id)
            .bind(chapter_number.as_str())
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(db_error)?;

        row.map(|row| ChapterRow::from_row(&row).map_err(row_error)?.into_chapter())
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sqlite::store::test_support::{chapter, enrolled, sample_book, test_store};
    use booktutor_core::repository::{ProgressRepository, SessionRepository, TurnCommit};
    use booktutor_types::progress::ChapterStatus;

    #[tokio::test]
    async fn test_import_and_get_book() {
        let store = test_store().await;
        let book = store.import_book(&sample_book()).await.unwrap();

        let loaded = store.get_book(book.id).await.unwrap().unwrap();
        assert_eq!(loaded.title, "Rust in Depth");
        assert_eq!(loaded.summary.as_deref(), Some("A book about Rust."));
        assert!(store.get_book(book.id + 1).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_chapters_in_chapter_order() {
        let store = test_store().await;
        let book = store.import_book(&sample_book()).await.unwrap();

        let numbers: Vec<String> = store
            .list_chapters(book.id)
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.chapter_number.to_string())
            .collect();
        assert_eq!(numbers, vec!["1.", "1.1.", "2.", "10.", "-1."]);
    }

    #[tokio::test]
    async fn test_get_chapter_keeps_key_points() {
        let store = test_store().await;
        let book = store.import_book(&sample_book()).await.unwrap();

        let number = ChapterNumber::parse("1.1").unwrap();
        let chapter = store.get_chapter(book.id, &number).await.unwrap().unwrap();
        assert_eq!(chapter.name, "Variables");
        assert_eq!(chapter.key_points, vec!["Variables point".to_string()]);
    }

    #[tokio::test]
    async fn test_import_rejects_duplicate_chapter_atomically() {
        let store = test_store().await;
        let mut import = sample_book();
        import.chapters.push(chapter("2.", "Ownership again"));

        let err = store.import_book(&import).await.unwrap_err();
        assert!(matches!(err, RepositoryError::Conflict(_)));
        assert!(store.list_books().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_book_cascades() {
        let store = test_store().await;
        let key = enrolled(&store).await;
        let number = ChapterNumber::parse("1.").unwrap();
        store
            .upsert_chapter_progress(key, &number, ChapterStatus::InProgress, "started")
            .await
            .unwrap();
        store.set_plan_text(key, "1. Basics").await.unwrap();
        store
            .commit_turn(&TurnCommit {
                key,
                client_message_id: Some("m1".to_string()),
                student_text: "Hi".to_string(),
                reply_text: "Hello!".to_string(),
                evict_through: None,
            })
            .await
            .unwrap();

        store.delete_book(key.book_id).await.unwrap();

        assert!(store.list_chapters(key.book_id).await.unwrap().is_empty());
        assert!(store.get_session(key).await.unwrap().is_none());
        assert!(store.list_chapter_progress(key).await.unwrap().is_empty());
        assert!(store.get_study_plan(key).await.unwrap().is_none());

        let history: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM history_message WHERE book_id = ?")
                .bind(key.book_id)
                .fetch_one(&store.pool.reader)
                .await
                .unwrap();
        assert_eq!(history, 0);
    }

    #[tokio::test]
    async fn test_delete_missing_book_is_not_found() {
        let store = test_store().await;
        let err = store.delete_book(42).await.unwrap_err();
        assert!(matches!(err, RepositoryError::NotFound));
    }
}
