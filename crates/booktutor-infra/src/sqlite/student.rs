//! SQLite student repository.

use booktutor_core::repository::StudentRepository;
use booktutor_types::error::RepositoryError;
use booktutor_types::student::Student;
use sqlx::Row;

use super::store::{SqliteStore, db_error, now, parse_datetime, row_error};

struct StudentRow {
    id: i64,
    name: String,
    email: Option<String>,
    created_at: String,
}

impl StudentRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            email: row.try_get("email")?,
            created_at: row.try_get("created_at")?,
        })
    }

    fn into_student(self) -> Result<Student, RepositoryError> {
        Ok(Student {
            id: self.id,
            name: self.name,
            email: self.email,
            created_at: parse_datetime(&self.created_at)?,
        })
    }
}

impl StudentRepository for SqliteStore {
    async fn create_student(
        &self,
        name: &str,
        email: Option<&str>,
    ) -> Result<Student, RepositoryError> {
        let created_at = now();
        let result = sqlx::query("INSERT INTO student (name, email, created_at) VALUES (?, ?, ?)")
            .bind(name)
            .bind(email)
            .bind(&created_at)
            .execute(&self.pool.writer)
            .await;

        match result {
            Ok(done) => Ok(Student {
                id: done.last_insert_rowid(),
                name: name.to_string(),
                email: email.map(str::to_string),
                created_at: parse_datetime(&created_at)?,
            }),
            Err(sqlx::Error::Database(db_err)) if db_err.message().contains("UNIQUE") => {
                Err(RepositoryError::Conflict(format!(
                    "a student with email '{}' already exists",
                    email.unwrap_or_default()
                )))
            }
            Err(e) => Err(db_error(e)),
        }
    }

    async fn list_students(&self) -> Result<Vec<Student>, RepositoryError> {
        let rows = sqlx::query("SELECT * FROM student ORDER BY id")
            .fetch_all(&self.pool.reader)
            .await
            .map_err(db_error)?;

        let mut students = Vec::with_capacity(rows.len());
        for row in &rows {
            students.push(StudentRow::from_row(row).map_err(row_error)?.into_student()?);
        }
        Ok(students)
    }

    async fn get_student(&self, student_id: i64) -> Result<Option<Student>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM student WHERE id = ?")
            .bind(student_id)
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(db_error)?;

        row.map(|row| StudentRow::from_row(&row).map_err(row_error)?.into_student())
            .transpose()
    }

    async fn delete_student(&self, student_id: i64) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM student WHERE id = ?")
            .bind(student_id)
            .execute(&self.pool.writer)
            .await
            .map_err(db_error)?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }
}
