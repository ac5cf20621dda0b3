//! Per-kind step executors.
//!
//! Each executor knows how to run one kind of step. Nested bodies are
//! handed back to the coordinator, so every nested step gets the same
//! classification, storage and snapshot treatment as a top-level one.

mod agent;
mod branch;
mod command;
mod glob;
mod input;
mod iteration;
mod labeled;
mod parallel;
mod standard;

use std::sync::Arc;

use futures_util::future::BoxFuture;
use serde_json::Value;

use cadence_types::step::{Step, StepKind, StepSpec};

use super::context::ExecutionContext;
use super::error::WorkflowError;
use super::runtime::Runtime;

pub use agent::AgentExecutor;
pub use branch::{CaseExecutor, ConditionalExecutor};
pub use command::CommandExecutor;
pub use glob::{GlobExecutor, glob_match};
pub use input::InputExecutor;
pub use iteration::IterationExecutor;
pub use labeled::LabeledExecutor;
pub use parallel::ParallelExecutor;
pub use standard::StandardExecutor;

/// Runs one classified step.
///
/// `ctx` arrives stamped with the step's display name and retry policy.
/// The coordinator stores the returned value; executors only store results
/// of nested steps, by delegating them back to the coordinator.
pub trait StepExecutor: Send + Sync {
    fn execute<'a>(
        &'a self,
        step: Step,
        ctx: ExecutionContext,
        rt: &'a Arc<Runtime>,
    ) -> BoxFuture<'a, Result<Value, WorkflowError>>;
}

/// Run `steps` in order as a nested body of `parent`; returns the last
/// result, or `null` for an empty body.
pub(crate) async fn run_body(
    steps: &[StepSpec],
    parent: &ExecutionContext,
    rt: &Arc<Runtime>,
) -> Result<Value, WorkflowError> {
    let mut last = Value::Null;
    for spec in steps {
        last = rt.coordinator.execute(spec, parent.child(), rt).await?;
    }
    Ok(last)
}

/// Error for a step routed to an executor registered for another kind.
pub(crate) fn unsupported(executor: &str, kind: StepKind) -> WorkflowError {
    WorkflowError::Configuration(format!("{executor} executor cannot run {kind} steps"))
}
