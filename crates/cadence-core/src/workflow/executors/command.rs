//! `$(...)` command steps.

use std::sync::Arc;

use futures_util::future::BoxFuture;
use serde_json::Value;

use cadence_types::step::{Step, StepKind};

use super::{StepExecutor, unsupported};
use crate::workflow::context::ExecutionContext;
use crate::workflow::error::{StepError, WorkflowError};
use crate::workflow::expression::interpolate;
use crate::workflow::runtime::Runtime;

/// Runs the command through the shell in the workflow directory.
///
/// A non-zero exit raises unless the step sets `exit_on_error: false`, in
/// which case the output is returned with an `[Exit status: N]` trailer.
#[derive(Debug, Default, Clone, Copy)]
pub struct CommandExecutor;

impl StepExecutor for CommandExecutor {
    fn execute<'a>(
        &'a self,
        step: Step,
        ctx: ExecutionContext,
        rt: &'a Arc<Runtime>,
    ) -> BoxFuture<'a, Result<Value, WorkflowError>> {
        Box::pin(async move {
            let kind = step.kind();
            let Step::Command { command } = step else {
                return Err(unsupported("command", kind));
            };
            let command = interpolate(&command, &rt.scope(&ctx).await);
            let exit_on_error = rt
                .step_config(&ctx.config_key)
                .and_then(|s| s.exit_on_error)
                .unwrap_or(true);

            let output = rt
                .errors
                .with_error_handling(&ctx.current_step, StepKind::Command, &ctx.retry, || async {
                    let output = rt.commands.run(&command, rt.dir()).await?;
                    if !output.success() && exit_on_error {
                        return Err(StepError::Command {
                            command: command.clone(),
                            status: output.status,
                            output: output.combined(),
                        });
                    }
                    Ok(output)
                })
                .await?;

            if output.success() {
                Ok(Value::String(output.stdout.trim_end().to_string()))
            } else {
                tracing::warn!(command = %command, status = output.status, "command failed, continuing");
                Ok(Value::String(format!(
                    "{}\n[Exit status: {}]",
                    output.combined().trim_end(),
                    output.status
                )))
            }
        })
    }
}
