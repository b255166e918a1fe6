//! LLM provider abstraction and call policy.

pub mod box_provider;
pub mod provider;
pub mod retry;
