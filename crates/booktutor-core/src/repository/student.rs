//! StudentRepository trait definition.

use booktutor_types::error::RepositoryError;
use booktutor_types::student::Student;

pub trait StudentRepository: Send + Sync {
    /// Create a student. Returns `Conflict` when the email is taken.
    fn create_student(
        &self,
        name: &str,
        email: Option<&str>,
    ) -> impl std::future::Future<Output = Result<Student, RepositoryError>> + Send;

    fn list_students(
        &self,
    ) -> impl std::future::Future<Output = Result<Vec<Student>, RepositoryError>> + Send;

    fn get_student(
        &self,
        student_id: i64,
    ) -> impl std::future::Future<Output = Result<Option<Student>, RepositoryError>> + Send;

    /// Delete a student and, by cascade, all of their sessions.
    fn delete_student(
        &self,
        student_id: i64,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;
}
