//! Student type.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A learner. Students enroll in books to get a tutoring session per book.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Student {
    pub id: i64,
    pub name: String,
    pub email: Option<String>,
    pub created_at: DateTime<Utc>,
}
