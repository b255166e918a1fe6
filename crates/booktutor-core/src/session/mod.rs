//! Live sessions: per-session state and the supervisor that owns them.

pub mod state;
pub mod supervisor;

pub use state::SessionState;
pub use supervisor::{EngineOptions, SessionOverview, SessionSupervisor};
