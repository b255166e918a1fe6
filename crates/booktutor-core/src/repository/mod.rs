//! Repository traits for the persistent store.
//!
//! Uses native async fn in traits (RPITIT, Rust 2024 edition); implementations
//! live in booktutor-infra (`SqliteStore`). The engine is generic over
//! [`TutorStore`], the union of all repositories.

pub mod library;
pub mod progress;
pub mod session;
pub mod settings;
pub mod student;

pub use library::LibraryRepository;
pub use progress::ProgressRepository;
pub use session::{CommittedTurn, SessionRepository, TurnCommit};
pub use settings::SettingsRepository;
pub use student::StudentRepository;

/// Everything the tutoring engine needs from the store.
pub trait TutorStore:
    LibraryRepository
    + StudentRepository
    + SessionRepository
    + ProgressRepository
    + SettingsRepository
    + Send
    + Sync
    + 'static
{
}

impl<T> TutorStore for T where
    T: LibraryRepository
        + StudentRepository
        + SessionRepository
        + ProgressRepository
        + SettingsRepository
        + Send
        + Sync
        + 'static
{
}
