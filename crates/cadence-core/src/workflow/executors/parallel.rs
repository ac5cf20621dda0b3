//! Parallel groups: one task per sub-step, joined before returning.

use std::sync::Arc;

use futures_util::future::BoxFuture;
use serde_json::Value;
use tokio::task::JoinSet;

use cadence_types::step::Step;

use super::{StepExecutor, unsupported};
use crate::workflow::context::ExecutionContext;
use crate::workflow::error::WorkflowError;
use crate::workflow::runtime::Runtime;

/// Spawns every sub-step on its own task with an isolated context.
///
/// All workers are joined before the group returns. If any failed, the
/// first error observed is returned; outputs written by siblings that
/// completed stay in memory. The result is the list of sibling results in
/// declaration order.
#[derive(Debug, Default, Clone, Copy)]
pub struct ParallelExecutor;

impl StepExecutor for ParallelExecutor {
    fn execute<'a>(
        &'a self,
        step: Step,
        ctx: ExecutionContext,
        rt: &'a Arc<Runtime>,
    ) -> BoxFuture<'a, Result<Value, WorkflowError>> {
        Box::pin(async move {
            let kind = step.kind();
            let Step::Parallel(specs) = step else {
                return Err(unsupported("parallel", kind));
            };
            tracing::debug!(step = %ctx.current_step, workers = specs.len(), "starting parallel group");

            let mut workers = JoinSet::new();
            for (index, spec) in specs.into_iter().enumerate() {
                let rt = Arc::clone(rt);
                let worker_ctx = ctx.child();
                workers.spawn(async move {
                    let value = rt.coordinator.execute(&spec, worker_ctx, &rt).await?;
                    Ok::<_, WorkflowError>((index, value))
                });
            }

            let mut results = vec![Value::Null; workers.len()];
            let mut first_error = None;
            while let Some(joined) = workers.join_next().await {
                match joined {
                    Ok(Ok((index, value))) => results[index] = value,
                    Ok(Err(e)) => {
                        tracing::warn!(error = %e, "parallel worker failed");
                        first_error.get_or_insert(e);
                    }
                    Err(e) => {
                        first_error.get_or_insert(WorkflowError::Join(e.to_string()));
                    }
                }
            }

            match first_error {
                Some(e) => Err(e),
                None => Ok(Value::Array(results)),
            }
        })
    }
}
