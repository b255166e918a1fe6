//! Infrastructure layer for booktutor.
//!
//! Implements the repository traits of `booktutor-core` on SQLite
//! ([`sqlite::SqliteStore`]), provides the OpenAI-compatible LLM provider and
//! loads the global configuration from the data directory.

pub mod config;
pub mod llm;
pub mod sqlite;
