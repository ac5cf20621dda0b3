//! Runnable step objects produced by the step loader.
//!
//! A runnable step is the unit the error handler retries: prompt templates,
//! interpreter scripts and custom factories all implement [`RunnableStep`].
//! Declarative per-step configuration arrives pre-resolved as
//! [`StepSettings`].

use std::path::PathBuf;

use futures_util::future::BoxFuture;
use serde_json::{Map, Value, json};

use cadence_types::llm::{CompletionRequest, Message};
use cadence_types::workflow::{CoerceTo, WorkflowConfig};

use super::context::ExecutionContext;
use super::error::StepError;
use super::expression::{interpolate, is_truthy, to_iterable};
use super::memory::value_to_string;
use super::runtime::Runtime;

/// Max tokens requested from the completion backend per prompt step.
pub const DEFAULT_MAX_TOKENS: u32 = 4096;

// ---------------------------------------------------------------------------
// RunnableStep
// ---------------------------------------------------------------------------

/// A resolved step object exposing `call -> result`.
pub trait RunnableStep: Send + Sync {
    fn name(&self) -> &str;

    fn call<'a>(
        &'a self,
        rt: &'a Runtime,
        ctx: &'a ExecutionContext,
    ) -> BoxFuture<'a, Result<Value, StepError>>;
}

// ---------------------------------------------------------------------------
// StepSettings
// ---------------------------------------------------------------------------

/// Declarative configuration applied to a step after construction.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepSettings {
    pub model: Option<String>,
    pub print_response: bool,
    pub json: bool,
    pub params: Map<String, Value>,
    pub coerce_to: Option<CoerceTo>,
    pub tools: Vec<String>,
}

impl StepSettings {
    /// Merge the workflow defaults with the step's override block.
    ///
    /// `print_response` defaults to on for the last step of a sequence
    /// unless explicitly configured.
    pub fn resolve(workflow: &WorkflowConfig, name: &str, is_last: bool) -> Self {
        let step = workflow.step_config(name);
        Self {
            model: step
                .and_then(|s| s.model.clone())
                .or_else(|| workflow.model.clone()),
            print_response: step.and_then(|s| s.print_response).unwrap_or(is_last),
            json: step.and_then(|s| s.json).unwrap_or(false),
            params: step.map(|s| s.params.clone()).unwrap_or_default(),
            coerce_to: step.and_then(|s| s.coerce_to),
            tools: step
                .and_then(|s| s.available_tools.clone())
                .unwrap_or_else(|| workflow.tools.clone()),
        }
    }
}

/// Add step params to an expression scope: under `params` and, where they
/// do not shadow a built-in key, at the top level.
fn scope_with_params(mut scope: Value, params: &Map<String, Value>) -> Value {
    if let Value::Object(map) = &mut scope {
        map.insert("params".into(), Value::Object(params.clone()));
        for (key, value) in params {
            map.entry(key.clone()).or_insert_with(|| value.clone());
        }
    }
    scope
}

// ---------------------------------------------------------------------------
// PromptStep
// ---------------------------------------------------------------------------

/// A prompt template sent to the completion backend.
#[derive(Debug, Clone)]
pub struct PromptStep {
    pub name: String,
    pub template: String,
    /// Optional template for the final-output fragment.
    pub output_template: Option<String>,
    pub settings: StepSettings,
}

impl PromptStep {
    pub fn new(name: impl Into<String>, template: impl Into<String>, settings: StepSettings) -> Self {
        Self {
            name: name.into(),
            template: template.into(),
            output_template: None,
            settings,
        }
    }

    pub fn with_output_template(mut self, template: Option<String>) -> Self {
        self.output_template = template;
        self
    }

    async fn run(&self, rt: &Runtime, ctx: &ExecutionContext) -> Result<Value, StepError> {
        let scope = scope_with_params(rt.scope(ctx).await, &self.settings.params);
        let prompt = interpolate(&self.template, &scope);

        let mut messages = rt.memory.read().await.transcript.clone();
        messages.push(Message::user(prompt.clone()));

        let request = CompletionRequest {
            model: self
                .settings
                .model
                .clone()
                .unwrap_or_else(|| rt.default_model.clone()),
            messages,
            system: None,
            max_tokens: DEFAULT_MAX_TOKENS,
            temperature: None,
            tools: self.settings.tools.clone(),
            json: self.settings.json,
        };

        tracing::debug!(step = %self.name, model = %request.model, "requesting completion");
        let response = rt.completion.complete(&request).await?;
        let result = post_process(&response.content, &self.settings)?;

        let mut memory = rt.memory.write().await;
        memory.transcript.push(Message::user(prompt));
        memory.transcript.push(Message::assistant(response.content.clone()));
        memory.set_metadata(&self.name, "model", json!(response.model));
        memory.set_metadata(
            &self.name,
            "usage",
            json!({
                "input_tokens": response.usage.input_tokens,
                "output_tokens": response.usage.output_tokens,
            }),
        );

        if self.settings.print_response {
            let rendered = match &self.output_template {
                Some(template) => {
                    let mut scope = scope;
                    if let Value::Object(map) = &mut scope {
                        map.insert("response".into(), result.clone());
                    }
                    interpolate(template, &scope)
                }
                None => value_to_string(&result),
            };
            memory.final_output.push(rendered);
        }

        Ok(result)
    }
}

impl RunnableStep for PromptStep {
    fn name(&self) -> &str {
        &self.name
    }

    fn call<'a>(
        &'a self,
        rt: &'a Runtime,
        ctx: &'a ExecutionContext,
    ) -> BoxFuture<'a, Result<Value, StepError>> {
        Box::pin(self.run(rt, ctx))
    }
}

/// Apply `json` parsing and `coerce_to` to a completion reply.
pub fn post_process(content: &str, settings: &StepSettings) -> Result<Value, StepError> {
    let value = if settings.json {
        parse_json_reply(content)?
    } else {
        Value::String(content.to_string())
    };

    Ok(match settings.coerce_to {
        None => value,
        Some(CoerceTo::Boolean) => Value::Bool(is_truthy(&value)),
        Some(CoerceTo::LlmBoolean) => Value::Bool(llm_boolean(&value_to_string(&value))),
        Some(CoerceTo::Iterable) => Value::Array(to_iterable(value)),
        Some(CoerceTo::String) => Value::String(value_to_string(&value)),
    })
}

/// Parse a JSON reply, tolerating a surrounding markdown code fence.
fn parse_json_reply(content: &str) -> Result<Value, StepError> {
    let trimmed = content.trim();
    let body = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|s| s.trim_end().strip_suffix("```"))
        .unwrap_or(trimmed)
        .trim();
    serde_json::from_str(body)
        .map_err(|e| StepError::execution(format!("response is not valid JSON: {e}")))
}

/// Interpret a free-form reply as yes/no. The first decisive word wins;
/// no decisive word means `false`.
fn llm_boolean(text: &str) -> bool {
    text.split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|w| !w.is_empty())
        .find_map(|word| match word.to_ascii_lowercase().as_str() {
            "yes" | "true" | "affirmative" | "correct" => Some(true),
            "no" | "false" | "negative" | "incorrect" => Some(false),
            _ => None,
        })
        .unwrap_or(false)
}

// ---------------------------------------------------------------------------
// ScriptStep
// ---------------------------------------------------------------------------

/// An interpreter script receiving workflow memory as JSON on stdin.
#[derive(Debug, Clone)]
pub struct ScriptStep {
    pub name: String,
    pub path: PathBuf,
    pub interpreter: &'static str,
    pub settings: StepSettings,
}

impl ScriptStep {
    async fn run(&self, rt: &Runtime) -> Result<Value, StepError> {
        let stdin = {
            let memory = rt.memory.read().await;
            serde_json::to_string(&*memory)
                .map_err(|e| StepError::execution(format!("cannot encode memory: {e}")))?
        };

        let output = rt
            .commands
            .run_script(self.interpreter, &self.path, &stdin, &rt.workflow.dir)
            .await?;
        if !output.success() {
            return Err(StepError::Command {
                command: format!("{} {}", self.interpreter, self.path.display()),
                status: output.status,
                output: output.combined(),
            });
        }

        let stdout = output.stdout.trim();
        let result = serde_json::from_str(stdout).unwrap_or_else(|_| Value::String(stdout.to_string()));

        if self.settings.print_response {
            rt.memory
                .write()
                .await
                .final_output
                .push(value_to_string(&result));
        }
        Ok(result)
    }
}

impl RunnableStep for ScriptStep {
    fn name(&self) -> &str {
        &self.name
    }

    fn call<'a>(
        &'a self,
        rt: &'a Runtime,
        _ctx: &'a ExecutionContext,
    ) -> BoxFuture<'a, Result<Value, StepError>> {
        Box::pin(self.run(rt))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(yaml: &str) -> WorkflowConfig {
        serde_yaml_ng::from_str(yaml).unwrap()
    }

    #[test]
    fn settings_default_print_for_last_step() {
        let workflow = config("name: w\nmodel: base\nsteps: [a, b]\n");
        assert!(StepSettings::resolve(&workflow, "b", true).print_response);
        assert!(!StepSettings::resolve(&workflow, "a", false).print_response);
        assert_eq!(
            StepSettings::resolve(&workflow, "a", false).model.as_deref(),
            Some("base")
        );
    }

    #[test]
    fn explicit_print_response_wins() {
        let workflow = config(
            "name: w\nsteps: [a]\na:\n  print_response: false\n  model: fast\n  available_tools: [grep]\n",
        );
        let settings = StepSettings::resolve(&workflow, "a", true);
        assert!(!settings.print_response);
        assert_eq!(settings.model.as_deref(), Some("fast"));
        assert_eq!(settings.tools, vec!["grep".to_string()]);
    }

    #[test]
    fn parses_fenced_json() {
        let settings = StepSettings {
            json: true,
            ..Default::default()
        };
        let value = post_process("```json\n{\"ok\": true}\n```", &settings).unwrap();
        assert_eq!(value, json!({"ok": true}));
        assert!(post_process("not json", &settings).is_err());
    }

    #[test]
    fn coerces_replies() {
        let with = |coerce_to| StepSettings {
            coerce_to: Some(coerce_to),
            ..Default::default()
        };
        assert_eq!(
            post_process("Yes, the tests pass.", &with(CoerceTo::LlmBoolean)).unwrap(),
            json!(true)
        );
        assert_eq!(
            post_process("No. True fixes are pending.", &with(CoerceTo::LlmBoolean)).unwrap(),
            json!(false)
        );
        assert_eq!(post_process("false", &with(CoerceTo::Boolean)).unwrap(), json!(false));
        assert_eq!(
            post_process("a.rs\nb.rs\n", &with(CoerceTo::Iterable)).unwrap(),
            json!(["a.rs", "b.rs"])
        );
    }
}
