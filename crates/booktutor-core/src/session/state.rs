//! In-memory state of one live session.

use booktutor_types::book::Book;
use booktutor_types::error::TutorError;
use booktutor_types::session::{HistoryMessage, SessionKey, TutorSession};
use booktutor_types::settings::AgentSettings;
use booktutor_types::student::Student;

use crate::repository::{CommittedTurn, TutorStore};

/// Everything a turn or a summarization pass needs about a session.
///
/// Owned by the session's handle behind a mutex; only one operation holds it
/// at a time. The store stays authoritative: the state is reloaded whenever a
/// session is reopened.
#[derive(Debug, Clone)]
pub struct SessionState {
    /// Snapshot taken when the session was loaded.
    pub settings: AgentSettings,
    pub book: Book,
    pub student: Student,
    pub session: TutorSession,
    /// Persisted message window, oldest first.
    pub history: Vec<HistoryMessage>,
}

impl SessionState {
    pub fn key(&self) -> SessionKey {
        self.session.key
    }

    /// Load a session from the store.
    pub async fn load<S: TutorStore>(
        store: &S,
        key: SessionKey,
        settings: AgentSettings,
    ) -> Result<Self, TutorError> {
        let book = store
            .get_book(key.book_id)
            .await?
            .ok_or_else(|| TutorError::NotFound(format!("book {}", key.book_id)))?;
        let student = store
            .get_student(key.student_id)
            .await?
            .ok_or_else(|| TutorError::NotFound(format!("student {}", key.student_id)))?;
        let session = store
            .get_session(key)
            .await?
            .ok_or(TutorError::NotEnrolled(key))?;
        let history = store.load_history(key).await?;

        Ok(Self {
            settings,
            book,
            student,
            session,
            history,
        })
    }

    /// Re-read the session row after capabilities changed notes or chapter.
    pub async fn refresh_session<S: TutorStore>(&mut self, store: &S) -> Result<(), TutorError> {
        let key = self.key();
        self.session = store
            .get_session(key)
            .await?
            .ok_or(TutorError::NotEnrolled(key))?;
        Ok(())
    }

    /// Mirror a committed turn: drop the evicted prefix, append the new rows.
    pub fn apply_commit(&mut self, committed: &CommittedTurn, evict_through: Option<i64>) {
        if let Some(through) = evict_through {
            self.history.retain(|m| m.id > through);
        }
        self.history.push(committed.student.clone());
        self.history.push(committed.reply.clone());
    }

    /// Messages not yet covered by a summarization pass.
    pub fn unsummarized(&self) -> impl Iterator<Item = &HistoryMessage> {
        let after = self.session.last_summarized_message_id;
        self.history
            .iter()
            .filter(move |m| after.is_none_or(|id| m.id > id))
    }
}
