//! SQLite storage layer.
//!
//! One [`SqliteStore`] implements every repository trait of `booktutor-core`
//! on a split read/write connection pool in WAL mode.

pub mod library;
pub mod pool;
pub mod progress;
pub mod session;
pub mod settings;
pub mod store;
pub mod student;

pub use pool::DatabasePool;
pub use store::SqliteStore;
