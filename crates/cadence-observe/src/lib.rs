//! Logging and trace export for Cadence binaries.

pub mod tracing_setup;

pub use tracing_setup::{LogFormat, TracingOptions, directive_for_verbosity, init_tracing, shutdown_tracing};
