//! Context assembly: token accounting and prompt text.

pub mod accountant;
pub mod prompt;

pub use accountant::{ContextAccountant, WindowPlan};
