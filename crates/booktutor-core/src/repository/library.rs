//! LibraryRepository trait definition.

use booktutor_types::book::{Book, BookImport, Chapter, ChapterNumber};
use booktutor_types::error::RepositoryError;

/// Books and chapters. Written only by import, read by the engine.
pub trait LibraryRepository: Send + Sync {
    /// Insert a book with all of its chapters in one transaction.
    fn import_book(
        &self,
        import: &BookImport,
    ) -> impl std::future::Future<Output = Result<Book, RepositoryError>> + Send;

    fn list_books(
        &self,
    ) -> impl std::future::Future<Output = Result<Vec<Book>, RepositoryError>> + Send;

    fn get_book(
        &self,
        book_id: i64,
    ) -> impl std::future::Future<Output = Result<Option<Book>, RepositoryError>> + Send;

    /// Delete a book. Chapters, sessions, history and progress go with it.
    fn delete_book(
        &self,
        book_id: i64,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Chapters of a book in chapter-number order.
    fn list_chapters(
        &self,
        book_id: i64,
    ) -> impl std::future::Future<Output = Result<Vec<Chapter>, RepositoryError>> + Send;

    fn get_chapter(
        &self,
        book_id: i64,
        chapter_number: &ChapterNumber,
    ) -> impl std::future::Future<Output = Result<Option<Chapter>, RepositoryError>> + Send;
}
