//! `{label: inner}` steps.

use std::sync::Arc;

use futures_util::future::BoxFuture;
use serde_json::Value;

use cadence_types::step::Step;

use super::{StepExecutor, unsupported};
use crate::workflow::context::ExecutionContext;
use crate::workflow::error::WorkflowError;
use crate::workflow::runtime::Runtime;

/// Runs the inner step in place of the labeled one. The inner step's result
/// is stored under the outermost explicit label.
#[derive(Debug, Default, Clone, Copy)]
pub struct LabeledExecutor;

impl StepExecutor for LabeledExecutor {
    fn execute<'a>(
        &'a self,
        step: Step,
        mut ctx: ExecutionContext,
        rt: &'a Arc<Runtime>,
    ) -> BoxFuture<'a, Result<Value, WorkflowError>> {
        Box::pin(async move {
            let kind = step.kind();
            let Step::Labeled { label, inner } = step else {
                return Err(unsupported("labeled", kind));
            };
            if ctx.label.is_none() {
                ctx.label = Some(label);
            }
            rt.coordinator.execute(&inner, ctx, rt).await
        })
    }
}
