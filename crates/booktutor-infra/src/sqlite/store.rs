//! The SQLite-backed store and the helpers its repository impls share.

use chrono::{DateTime, Utc};

use booktutor_types::error::RepositoryError;

use super::pool::DatabasePool;

/// SQLite-backed implementation of every booktutor repository.
///
/// Reads go to the reader pool, writes to the single-connection writer pool.
#[derive(Clone)]
pub struct SqliteStore {
    pub(crate) pool: DatabasePool,
}

impl SqliteStore {
    /// Create a store backed by the given database pool.
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }

    /// Open (and migrate) the database at `database_url`.
    pub async fn connect(database_url: &str) -> Result<Self, RepositoryError> {
        let pool = DatabasePool::new(database_url).await.map_err(|e| {
            tracing::error!(error = %e, "Failed to open database");
            RepositoryError::Connection
        })?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &DatabasePool {
        &self.pool
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

pub(crate) fn parse_datetime(s: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Query(format!("invalid datetime: {e}")))
}

pub(crate) fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

pub(crate) fn now() -> String {
    format_datetime(&Utc::now())
}

/// Map a sqlx error, keeping constraint failures distinguishable.
pub(crate) fn db_error(e: sqlx::Error) -> RepositoryError {
    if let sqlx::Error::Database(db_err) = &e {
        let message = db_err.message();
        if message.contains("UNIQUE") {
            return RepositoryError::Conflict(message.to_string());
        }
        if message.contains("FOREIGN KEY") || message.contains("CHECK") {
            return RepositoryError::Constraint(message.to_string());
        }
    }
    RepositoryError::Query(e.to_string())
}

pub(crate) fn row_error(e: sqlx::Error) -> RepositoryError {
    RepositoryError::Query(e.to_string())
}
