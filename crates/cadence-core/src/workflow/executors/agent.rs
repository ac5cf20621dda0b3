//! `^name` agent steps: the rendered prompt is handed to the external agent.

use std::sync::Arc;

use futures_util::future::BoxFuture;
use serde_json::Value;

use cadence_types::step::{Step, StepKind};

use super::{StepExecutor, unsupported};
use crate::workflow::context::ExecutionContext;
use crate::workflow::error::WorkflowError;
use crate::workflow::expression::interpolate;
use crate::workflow::runtime::Runtime;

#[derive(Debug, Default, Clone, Copy)]
pub struct AgentExecutor;

impl StepExecutor for AgentExecutor {
    fn execute<'a>(
        &'a self,
        step: Step,
        ctx: ExecutionContext,
        rt: &'a Arc<Runtime>,
    ) -> BoxFuture<'a, Result<Value, WorkflowError>> {
        Box::pin(async move {
            let kind = step.kind();
            let Step::Agent { name } = step else {
                return Err(unsupported("agent", kind));
            };

            let reply = rt
                .errors
                .with_error_handling(&name, StepKind::Agent, &ctx.retry, || async {
                    let template = rt.loader.load_prompt(&rt.workflow.config, &name, ctx.phase)?;
                    let prompt = interpolate(&template, &rt.scope(&ctx).await);
                    rt.agent.run(&prompt, rt.dir()).await
                })
                .await?;
            Ok(Value::String(reply))
        })
    }
}
