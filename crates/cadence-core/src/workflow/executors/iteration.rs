//! `each` and `repeat` loops.
//!
//! Both return the list of per-pass results, where a pass's result is the
//! value of the last step in its body.

use std::sync::Arc;

use futures_util::future::BoxFuture;
use serde_json::{Value, json};

use cadence_types::step::{IterationMode, Step};

use super::{StepExecutor, run_body, unsupported};
use crate::workflow::context::ExecutionContext;
use crate::workflow::error::WorkflowError;
use crate::workflow::expression::{evaluate_condition, evaluate_value, to_iterable};
use crate::workflow::runtime::Runtime;

/// Loop variable holding the zero-based pass index.
pub const INDEX_VARIABLE: &str = "index";

#[derive(Debug, Default, Clone, Copy)]
pub struct IterationExecutor;

impl StepExecutor for IterationExecutor {
    fn execute<'a>(
        &'a self,
        step: Step,
        ctx: ExecutionContext,
        rt: &'a Arc<Runtime>,
    ) -> BoxFuture<'a, Result<Value, WorkflowError>> {
        Box::pin(async move {
            let kind = step.kind();
            let Step::Iteration(iteration) = step else {
                return Err(unsupported("iteration", kind));
            };
            let name = ctx.current_step.clone();
            let mut results = Vec::new();

            match iteration.mode {
                IterationMode::Each {
                    collection,
                    binding,
                } => {
                    let scope = rt.scope(&ctx).await;
                    let items = evaluate_value(&collection, &scope, rt.commands.as_ref(), rt.dir())
                        .await
                        .map(to_iterable)
                        .map_err(|e| WorkflowError::step(&name, e))?;
                    tracing::debug!(step = %name, items = items.len(), "iterating");

                    for (index, item) in items.into_iter().enumerate() {
                        let pass = ctx
                            .clone()
                            .with_variable(binding.clone(), item)
                            .with_variable(INDEX_VARIABLE, json!(index));
                        results.push(run_body(&iteration.steps, &pass, rt).await?);
                    }
                }
                IterationMode::Repeat {
                    until,
                    max_iterations,
                } => {
                    let mut finished = false;
                    for index in 0..max_iterations {
                        let pass = ctx.clone().with_variable(INDEX_VARIABLE, json!(index));
                        results.push(run_body(&iteration.steps, &pass, rt).await?);

                        let scope = rt.scope(&pass).await;
                        if evaluate_condition(&until, &scope, rt.commands.as_ref(), rt.dir())
                            .await
                            .map_err(|e| WorkflowError::step(&name, e))?
                        {
                            finished = true;
                            break;
                        }
                    }
                    if !finished {
                        tracing::warn!(step = %name, max_iterations, "repeat stopped at max_iterations");
                    }
                }
            }

            Ok(Value::Array(results))
        })
    }
}
