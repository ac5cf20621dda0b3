//! Interactive answers for input steps, via dialoguer.

use dialoguer::{Confirm, Input, Password, Select};
use futures_util::future::BoxFuture;
use serde_json::Value;

use cadence_core::collaborator::{InputAnswer, InputProvider};
use cadence_core::workflow::error::StepError;
use cadence_types::step::{InputKind, InputSpec};

/// Prompts on the terminal. Without an attended terminal it falls back to
/// the declared default, or defers so the session waits for an event.
#[derive(Debug, Clone, Copy)]
pub struct TerminalInput {
    interactive: bool,
}

impl TerminalInput {
    pub fn new(allow_prompts: bool) -> Self {
        Self {
            interactive: allow_prompts && console::user_attended(),
        }
    }
}

impl InputProvider for TerminalInput {
    fn ask<'a>(&'a self, spec: &'a InputSpec) -> BoxFuture<'a, Result<InputAnswer, StepError>> {
        Box::pin(async move {
            if !self.interactive {
                return Ok(unattended_answer(spec));
            }
            let spec = spec.clone();
            tokio::task::spawn_blocking(move || prompt(&spec))
                .await
                .map_err(|e| StepError::Input(format!("prompt task failed: {e}")))?
                .map(InputAnswer::Value)
        })
    }
}

fn unattended_answer(spec: &InputSpec) -> InputAnswer {
    match &spec.default {
        Some(value) => InputAnswer::Value(value.clone()),
        None => InputAnswer::Deferred,
    }
}

fn prompt(spec: &InputSpec) -> Result<Value, StepError> {
    let fail = |e: dialoguer::Error| StepError::Input(e.to_string());

    match spec.kind {
        InputKind::Boolean => {
            let mut confirm = Confirm::new().with_prompt(&spec.prompt);
            if let Some(default) = spec.default.as_ref().and_then(Value::as_bool) {
                confirm = confirm.default(default);
            }
            confirm.interact().map(Value::Bool).map_err(fail)
        }
        InputKind::Choice => {
            if spec.options.is_empty() {
                return Err(StepError::Input(format!("'{}' has no options to choose from", spec.prompt)));
            }
            let default = spec
                .default
                .as_ref()
                .and_then(Value::as_str)
                .and_then(|d| spec.options.iter().position(|o| o == d))
                .unwrap_or(0);
            let index = Select::new()
                .with_prompt(&spec.prompt)
                .items(&spec.options)
                .default(default)
                .interact()
                .map_err(fail)?;
            Ok(Value::String(spec.options[index].clone()))
        }
        InputKind::Password => Password::new()
            .with_prompt(&spec.prompt)
            .allow_empty_password(!spec.required)
            .interact()
            .map(Value::String)
            .map_err(fail),
        InputKind::Text => {
            let mut input = Input::<String>::new()
                .with_prompt(&spec.prompt)
                .allow_empty(!spec.required);
            if let Some(default) = spec.default.as_ref() {
                let text = match default {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                input = input.default(text);
            }
            input.interact_text().map(Value::String).map_err(fail)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn spec(value: Value) -> InputSpec {
        serde_json::from_value(value).unwrap()
    }

    #[tokio::test]
    async fn non_interactive_uses_default() {
        let input = TerminalInput::new(false);
        let answer = input
            .ask(&spec(json!({"prompt": "Branch?", "default": "main"})))
            .await
            .unwrap();
        assert_eq!(answer, InputAnswer::Value(json!("main")));
    }

    #[tokio::test]
    async fn non_interactive_without_default_defers() {
        let input = TerminalInput::new(false);
        let answer = input
            .ask(&spec(json!({"prompt": "Ship it?", "type": "boolean", "name": "ship"})))
            .await
            .unwrap();
        assert_eq!(answer, InputAnswer::Deferred);
    }
}
