//! Tutoring engine for booktutor.
//!
//! Repository traits (ports) live in [`repository`]; the engine is built from
//! the context accountant ([`context`]), the capability registry
//! ([`capability`]), the turn controller and summarizer ([`agent`]) and the
//! session supervisor ([`session`]). Concrete storage and LLM providers live
//! in booktutor-infra.

pub mod agent;
pub mod capability;
pub mod context;
pub mod llm;
pub mod repository;
pub mod session;
