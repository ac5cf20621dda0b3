//! Standard named steps: resolved through the step loader and run under the
//! error handler.

use std::sync::Arc;

use futures_util::future::BoxFuture;
use serde_json::Value;

use cadence_types::step::{Step, StepKind};

use super::{StepExecutor, unsupported};
use crate::workflow::context::ExecutionContext;
use crate::workflow::error::WorkflowError;
use crate::workflow::loader::LoadOptions;
use crate::workflow::runtime::Runtime;

#[derive(Debug, Default, Clone, Copy)]
pub struct StandardExecutor;

impl StepExecutor for StandardExecutor {
    fn execute<'a>(
        &'a self,
        step: Step,
        ctx: ExecutionContext,
        rt: &'a Arc<Runtime>,
    ) -> BoxFuture<'a, Result<Value, WorkflowError>> {
        Box::pin(async move {
            let kind = step.kind();
            let Step::Prompt { name } = step else {
                return Err(unsupported("standard", kind));
            };
            let options = LoadOptions {
                phase: ctx.phase,
                is_last: ctx.is_last,
            };

            let value = rt
                .errors
                .with_error_handling(&name, StepKind::Prompt, &ctx.retry, || async {
                    let runnable = rt.loader.load(&rt.workflow.config, &name, options)?;
                    runnable.call(rt, &ctx).await
                })
                .await?;
            Ok(value)
        })
    }
}
