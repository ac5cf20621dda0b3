//! Workflow engine core: classification, loading, execution and memory.
//!
//! - `definition` -- YAML parsing, validation and filesystem load
//! - `classifier` -- pure mapping from step shape to kind and payload
//! - `loader` -- resolves step names to runnable step objects
//! - `step` -- prompt and script step objects
//! - `expression` -- JEXL evaluation, interpolation and sub-expressions
//! - `memory` -- transcript, ordered outputs and final output
//! - `context` -- per-execution context threaded through every call
//! - `error_handler` -- attempt loop, lifecycle events and failure wrapping
//! - `executors` -- one executor per step kind
//! - `coordinator` -- dispatch table from kind to executor
//! - `executor` -- the workflow executor façade

pub mod classifier;
pub mod context;
pub mod coordinator;
pub mod definition;
pub mod error;
pub mod error_handler;
pub mod executor;
pub mod executors;
pub mod expression;
pub mod loader;
pub mod memory;
pub mod runtime;
pub mod step;

pub use context::ExecutionContext;
pub use definition::Workflow;
pub use error::{ExecutionError, StepError, WorkflowError};
pub use executor::{ExecutionOutcome, RunReport, WorkflowExecutor, WorkflowExecutorBuilder};
pub use memory::{SharedMemory, WorkflowMemory};
