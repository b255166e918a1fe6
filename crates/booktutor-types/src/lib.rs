//! Shared domain types for booktutor.
//!
//! Books and chapters, students, tutoring sessions and their history,
//! progress records, engine settings, LLM wire-neutral request/response
//! shapes, and the error taxonomy.
//!
//! Zero infrastructure dependencies -- only serde, chrono, thiserror, schemars.

pub mod book;
pub mod config;
pub mod error;
pub mod llm;
pub mod progress;
pub mod session;
pub mod settings;
pub mod student;
pub mod summary;
