//! Input steps: obtain an answer from a stored session event or the input
//! provider.
//!
//! When no answer is available the run unwinds with
//! `WorkflowError::AwaitingInput` and the session is left `waiting` until an
//! event with the step's name is added and the run is resumed.

use std::sync::Arc;

use futures_util::future::BoxFuture;
use serde_json::Value;

use cadence_types::step::{InputKind, InputSpec, Step};

use super::{StepExecutor, unsupported};
use crate::collaborator::InputAnswer;
use crate::workflow::context::ExecutionContext;
use crate::workflow::error::{StepError, WorkflowError};
use crate::workflow::expression::{interpolate, is_truthy};
use crate::workflow::memory::value_to_string;
use crate::workflow::runtime::Runtime;

#[derive(Debug, Default, Clone, Copy)]
pub struct InputExecutor;

impl StepExecutor for InputExecutor {
    fn execute<'a>(
        &'a self,
        step: Step,
        ctx: ExecutionContext,
        rt: &'a Arc<Runtime>,
    ) -> BoxFuture<'a, Result<Value, WorkflowError>> {
        Box::pin(async move {
            let kind = step.kind();
            let Step::Input(mut spec) = step else {
                return Err(unsupported("input", kind));
            };
            let name = ctx.current_step.clone();
            spec.prompt = interpolate(&spec.prompt, &rt.scope(&ctx).await);

            let answer = match rt.state.find_event(&name).await {
                Some(payload) => {
                    tracing::info!(step = %name, "using stored session event");
                    payload
                }
                None => match rt.input.ask(&spec).await {
                    Ok(InputAnswer::Value(value)) => value,
                    Ok(InputAnswer::Deferred) => {
                        tracing::info!(step = %name, "no answer available, waiting for input");
                        return Err(WorkflowError::AwaitingInput { step: name });
                    }
                    Err(e) => return Err(WorkflowError::step(&name, e)),
                },
            };

            validate(&spec, answer).map_err(|e| WorkflowError::step(&name, e))
        })
    }
}

/// Check an answer against the input declaration and normalize it to the declared type.
fn validate(spec: &InputSpec, answer: Value) -> Result<Value, StepError> {
    let empty = matches!(&answer, Value::Null) || value_to_string(&answer).trim().is_empty();
    if empty {
        if spec.required {
            return Err(StepError::Input(format!("'{}' requires an answer", spec.prompt)));
        }
        return Ok(spec.default.clone().unwrap_or(answer));
    }

    match spec.kind {
        InputKind::Boolean => Ok(Value::Bool(match &answer {
            Value::String(s) => matches!(
                s.trim().to_ascii_lowercase().as_str(),
                "y" | "yes" | "true" | "1"
            ),
            other => is_truthy(other),
        })),
        InputKind::Choice if !spec.options.is_empty() => {
            let chosen = value_to_string(&answer);
            if spec.options.iter().any(|o| o == chosen.trim()) {
                Ok(Value::String(chosen.trim().to_string()))
            } else {
                Err(StepError::Input(format!(
                    "'{}' is not one of: {}",
                    chosen.trim(),
                    spec.options.join(", ")
                )))
            }
        }
        _ => Ok(answer),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn spec(kind: InputKind) -> InputSpec {
        InputSpec {
            prompt: "Proceed?".into(),
            name: Some("proceed".into()),
            kind,
            required: true,
            default: None,
            options: vec!["a".into(), "b".into()],
        }
    }

    #[test]
    fn booleans_accept_yes_words() {
        assert_eq!(validate(&spec(InputKind::Boolean), json!("Yes")).unwrap(), json!(true));
        assert_eq!(validate(&spec(InputKind::Boolean), json!("n")).unwrap(), json!(false));
    }

    #[test]
    fn choices_must_be_listed() {
        assert_eq!(validate(&spec(InputKind::Choice), json!(" b ")).unwrap(), json!("b"));
        assert!(validate(&spec(InputKind::Choice), json!("c")).is_err());
    }

    #[test]
    fn required_rejects_empty_answer() {
        assert!(validate(&spec(InputKind::Text), json!("  ")).is_err());
        let mut optional = spec(InputKind::Text);
        optional.required = false;
        optional.default = Some(json!("fallback"));
        assert_eq!(validate(&optional, Value::Null).unwrap(), json!("fallback"));
    }
}
