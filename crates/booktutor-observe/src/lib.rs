//! Observability for booktutor: subscriber setup and optional OpenTelemetry
//! span export.

pub mod tracing_setup;

pub use tracing_setup::{TracingOptions, init_tracing, shutdown_tracing};
