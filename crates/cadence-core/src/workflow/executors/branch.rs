//! `if`/`unless` and `case` routing.

use std::sync::Arc;

use futures_util::future::BoxFuture;
use serde_json::Value;

use cadence_types::step::Step;

use super::{StepExecutor, run_body, unsupported};
use crate::workflow::context::ExecutionContext;
use crate::workflow::error::WorkflowError;
use crate::workflow::expression::{evaluate_condition, evaluate_value};
use crate::workflow::memory::value_to_string;
use crate::workflow::runtime::Runtime;

/// Evaluates the predicate and runs exactly one branch. The stored result is
/// the predicate's outcome after `unless` negation.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConditionalExecutor;

impl StepExecutor for ConditionalExecutor {
    fn execute<'a>(
        &'a self,
        step: Step,
        ctx: ExecutionContext,
        rt: &'a Arc<Runtime>,
    ) -> BoxFuture<'a, Result<Value, WorkflowError>> {
        Box::pin(async move {
            let kind = step.kind();
            let Step::Conditional(cond) = step else {
                return Err(unsupported("conditional", kind));
            };

            let scope = rt.scope(&ctx).await;
            let holds = evaluate_condition(&cond.predicate, &scope, rt.commands.as_ref(), rt.dir())
                .await
                .map_err(|e| WorkflowError::step(&ctx.current_step, e))?
                != cond.negate;
            tracing::debug!(step = %ctx.current_step, holds, "condition evaluated");

            let branch = if holds { &cond.then_steps } else { &cond.else_steps };
            run_body(branch, &ctx, rt).await?;
            Ok(Value::Bool(holds))
        })
    }
}

/// Evaluates the expression and runs the first branch whose key equals its
/// rendered value, or the `else` branch. The stored result is the value.
#[derive(Debug, Default, Clone, Copy)]
pub struct CaseExecutor;

impl StepExecutor for CaseExecutor {
    fn execute<'a>(
        &'a self,
        step: Step,
        ctx: ExecutionContext,
        rt: &'a Arc<Runtime>,
    ) -> BoxFuture<'a, Result<Value, WorkflowError>> {
        Box::pin(async move {
            let kind = step.kind();
            let Step::Case(case) = step else {
                return Err(unsupported("case", kind));
            };

            let scope = rt.scope(&ctx).await;
            let value = evaluate_value(&case.expression, &scope, rt.commands.as_ref(), rt.dir())
                .await
                .map_err(|e| WorkflowError::step(&ctx.current_step, e))?;
            let rendered = value_to_string(&value);
            let rendered = rendered.trim();

            let branch = case
                .branches
                .iter()
                .find(|(key, _)| key.trim() == rendered)
                .map(|(_, steps)| steps)
                .unwrap_or(&case.else_steps);
            tracing::debug!(step = %ctx.current_step, value = rendered, "case selected");

            run_body(branch, &ctx, rt).await?;
            Ok(value)
        })
    }
}
