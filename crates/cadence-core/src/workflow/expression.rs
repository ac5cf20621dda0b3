//! JEXL expression evaluation, `{{ }}` interpolation and control-flow
//! sub-expressions.
//!
//! Wraps `jexl_eval::Evaluator` with pre-registered standard transforms.
//! Control constructs (`if`, `case`, `each`, `repeat`) evaluate their
//! sub-expression one of three ways depending on its wrapper:
//!
//! - `{{expr}}` is evaluated as JEXL against the workflow scope
//! - `$(cmd)` runs as a subprocess (exit status in boolean context, stdout
//!   otherwise)
//! - a bare token is a literal, or a reference to a prior step's output
//!
//! **Security note:** step outputs are always passed as context objects,
//! NEVER interpolated into expression strings.

use std::path::Path;

use serde_json::{Value, json};

use cadence_types::step::COMMAND_PREFIX;

use super::error::StepError;
use super::memory::value_to_string;
use crate::collaborator::CommandRunner;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors that can occur during expression evaluation.
#[derive(Debug, thiserror::Error)]
pub enum ExpressionError {
    #[error("expression evaluation failed: {0}")]
    EvalFailed(String),

    #[error("invalid context: {0}")]
    InvalidContext(String),
}

impl From<ExpressionError> for StepError {
    fn from(e: ExpressionError) -> Self {
        StepError::execution(e.to_string())
    }
}

// ---------------------------------------------------------------------------
// WorkflowEvaluator
// ---------------------------------------------------------------------------

/// JEXL expression evaluator with standard transforms pre-registered.
///
/// Cheap to build; callers create one per evaluation and never hold it
/// across an await point.
pub struct WorkflowEvaluator {
    evaluator: jexl_eval::Evaluator<'static>,
}

impl WorkflowEvaluator {
    /// Create a new evaluator with all standard transforms registered.
    pub fn new() -> Self {
        let evaluator = jexl_eval::Evaluator::new()
            .with_transform("lower", |args: &[Value]| {
                let s = args.first().and_then(|v| v.as_str()).unwrap_or("");
                Ok(json!(s.to_lowercase()))
            })
            .with_transform("upper", |args: &[Value]| {
                let s = args.first().and_then(|v| v.as_str()).unwrap_or("");
                Ok(json!(s.to_uppercase()))
            })
            .with_transform("trim", |args: &[Value]| {
                let s = args.first().and_then(|v| v.as_str()).unwrap_or("");
                Ok(json!(s.trim()))
            })
            .with_transform("split", |args: &[Value]| {
                let s = args.first().and_then(|v| v.as_str()).unwrap_or("");
                let delimiter = args.get(1).and_then(|v| v.as_str()).unwrap_or(",");
                let parts: Vec<&str> = s.split(delimiter).collect();
                Ok(json!(parts))
            })
            .with_transform("lines", |args: &[Value]| {
                let s = args.first().and_then(|v| v.as_str()).unwrap_or("");
                let lines: Vec<&str> = s.lines().map(str::trim).filter(|l| !l.is_empty()).collect();
                Ok(json!(lines))
            })
            .with_transform("not", |args: &[Value]| {
                let val = args.first().cloned().unwrap_or(Value::Null);
                Ok(json!(!is_truthy(&val)))
            })
            .with_transform("contains", |args: &[Value]| {
                let subject = args.first().cloned().unwrap_or(Value::Null);
                let search = args.get(1).cloned().unwrap_or(Value::Null);
                let found = match &subject {
                    Value::String(s) => s.contains(search.as_str().unwrap_or("")),
                    Value::Array(items) => items.contains(&search),
                    Value::Object(map) => search.as_str().is_some_and(|k| map.contains_key(k)),
                    _ => false,
                };
                Ok(json!(found))
            })
            .with_transform("startsWith", |args: &[Value]| {
                let subject = args.first().and_then(|v| v.as_str()).unwrap_or("");
                let prefix = args.get(1).and_then(|v| v.as_str()).unwrap_or("");
                Ok(json!(subject.starts_with(prefix)))
            })
            .with_transform("endsWith", |args: &[Value]| {
                let subject = args.first().and_then(|v| v.as_str()).unwrap_or("");
                let suffix = args.get(1).and_then(|v| v.as_str()).unwrap_or("");
                Ok(json!(subject.ends_with(suffix)))
            })
            .with_transform("length", |args: &[Value]| {
                let len = match args.first() {
                    Some(Value::String(s)) => s.chars().count(),
                    Some(Value::Array(a)) => a.len(),
                    Some(Value::Object(o)) => o.len(),
                    _ => 0,
                };
                Ok(json!(len as f64))
            });

        Self { evaluator }
    }

    /// Evaluate an expression and return the raw JSON value.
    pub fn evaluate_value(&self, expression: &str, context: &Value) -> Result<Value, ExpressionError> {
        if !context.is_object() {
            return Err(ExpressionError::InvalidContext(
                "context must be a JSON object".to_string(),
            ));
        }

        self.evaluator
            .eval_in_context(expression, context)
            .map_err(|e| ExpressionError::EvalFailed(e.to_string()))
    }

    /// Evaluate an expression to a boolean using permissive truthiness.
    pub fn evaluate_bool(&self, expression: &str, context: &Value) -> Result<bool, ExpressionError> {
        self.evaluate_value(expression, context).map(|v| is_truthy(&v))
    }
}

impl Default for WorkflowEvaluator {
    fn default() -> Self {
        Self::new()
    }
}

/// Evaluate with a throwaway evaluator.
pub fn eval_value(expression: &str, scope: &Value) -> Result<Value, ExpressionError> {
    WorkflowEvaluator::new().evaluate_value(expression, scope)
}

pub fn eval_bool(expression: &str, scope: &Value) -> Result<bool, ExpressionError> {
    WorkflowEvaluator::new().evaluate_bool(expression, scope)
}

/// Permissive truthiness: `null`, `false`, `""` and `"false"` are false,
/// everything else is true.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::String(s) => {
            let s = s.trim();
            !(s.is_empty() || s.eq_ignore_ascii_case("false"))
        }
        _ => true,
    }
}

// ---------------------------------------------------------------------------
// Interpolation
// ---------------------------------------------------------------------------

/// Replace every `{{ expr }}` in `template` with its evaluated value.
///
/// Placeholders whose expression fails to evaluate are left as-is.
pub fn interpolate(template: &str, scope: &Value) -> String {
    if !template.contains("{{") {
        return template.to_string();
    }

    let evaluator = WorkflowEvaluator::new();
    let mut result = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        let Some(len) = rest[start + 2..].find("}}") else {
            break;
        };
        let end = start + 2 + len;
        let expr = rest[start + 2..end].trim();
        result.push_str(&rest[..start]);
        match evaluator.evaluate_value(expr, scope) {
            Ok(value) => result.push_str(&value_to_string(&value)),
            Err(e) => {
                tracing::debug!(expression = expr, error = %e, "leaving placeholder unresolved");
                result.push_str(&rest[start..end + 2]);
            }
        }
        rest = &rest[end + 2..];
    }
    result.push_str(rest);
    result
}

// ---------------------------------------------------------------------------
// Sub-expressions
// ---------------------------------------------------------------------------

/// A control-flow sub-expression, classified by its wrapper.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubExpression<'a> {
    Template(&'a str),
    Command(&'a str),
    Bare(&'a str),
}

impl<'a> SubExpression<'a> {
    pub fn parse(raw: &'a str) -> Self {
        let trimmed = raw.trim();
        if let Some(inner) = trimmed
            .strip_prefix("{{")
            .and_then(|s| s.strip_suffix("}}"))
        {
            return SubExpression::Template(inner.trim());
        }
        if let Some(inner) = strip_command(trimmed) {
            return SubExpression::Command(inner);
        }
        SubExpression::Bare(trimmed)
    }
}

/// Contents of a `$( ... )` wrapper, if `text` is one.
pub fn strip_command(text: &str) -> Option<&str> {
    text.strip_prefix(COMMAND_PREFIX)
        .and_then(|s| s.strip_suffix(')'))
        .map(str::trim)
}

/// Evaluate a sub-expression in boolean context.
pub async fn evaluate_condition(
    raw: &str,
    scope: &Value,
    commands: &dyn CommandRunner,
    cwd: &Path,
) -> Result<bool, StepError> {
    match SubExpression::parse(raw) {
        SubExpression::Template(expr) => Ok(eval_bool(expr, scope)?),
        SubExpression::Command(cmd) => {
            let output = commands.run(cmd, cwd).await?;
            Ok(output.success())
        }
        SubExpression::Bare(token) => Ok(match token.to_ascii_lowercase().as_str() {
            "true" | "yes" => true,
            "false" | "no" | "" => false,
            _ => scope
                .get("output")
                .and_then(|o| o.get(token))
                .is_some_and(is_truthy),
        }),
    }
}

/// Evaluate a sub-expression in value context.
pub async fn evaluate_value(
    raw: &str,
    scope: &Value,
    commands: &dyn CommandRunner,
    cwd: &Path,
) -> Result<Value, StepError> {
    match SubExpression::parse(raw) {
        SubExpression::Template(expr) => Ok(eval_value(expr, scope)?),
        SubExpression::Command(cmd) => {
            let output = commands.run(cmd, cwd).await?;
            if !output.success() {
                return Err(StepError::Command {
                    command: cmd.to_string(),
                    status: output.status,
                    output: output.combined(),
                });
            }
            Ok(Value::String(output.stdout.trim_end().to_string()))
        }
        SubExpression::Bare(token) => Ok(scope
            .get("output")
            .and_then(|o| o.get(token))
            .cloned()
            .unwrap_or_else(|| Value::String(token.to_string()))),
    }
}

/// Turn an evaluated value into the items an `each` loop walks.
///
/// Arrays are used as-is; strings holding a JSON array are parsed, other
/// strings are split into non-empty lines; `null` is empty; objects yield
/// `{key, value}` pairs; any other scalar is a single item.
pub fn to_iterable(value: Value) -> Vec<Value> {
    match value {
        Value::Array(items) => items,
        Value::Null => Vec::new(),
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.starts_with('[') {
                if let Ok(Value::Array(items)) = serde_json::from_str(trimmed) {
                    return items;
                }
            }
            trimmed
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(|l| Value::String(l.to_string()))
                .collect()
        }
        Value::Object(map) => map
            .into_iter()
            .map(|(key, value)| json!({ "key": key, "value": value }))
            .collect(),
        other => vec![other],
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingCommandRunner;

    fn scope() -> Value {
        json!({
            "output": { "has_data": "yes please", "empty": "", "files": "a.rs\nb.rs\n" },
            "workflow": { "name": "review" },
            "item": "x"
        })
    }

    #[test]
    fn evaluates_dot_notation_and_transforms() {
        let eval = WorkflowEvaluator::new();
        assert_eq!(
            eval.evaluate_value("workflow.name|upper", &scope()).unwrap(),
            json!("REVIEW")
        );
        assert!(eval.evaluate_bool("output.has_data|contains('yes')", &scope()).unwrap());
        assert_eq!(
            eval.evaluate_value("output.files|lines", &scope()).unwrap(),
            json!(["a.rs", "b.rs"])
        );
    }

    #[test]
    fn rejects_non_object_context() {
        let err = WorkflowEvaluator::new()
            .evaluate_value("1 + 1", &json!([1]))
            .unwrap_err();
        assert!(matches!(err, ExpressionError::InvalidContext(_)));
    }

    #[test]
    fn truthiness_is_permissive() {
        assert!(!is_truthy(&Value::Null));
        assert!(!is_truthy(&json!(false)));
        assert!(!is_truthy(&json!("")));
        assert!(!is_truthy(&json!("false")));
        assert!(is_truthy(&json!(0)));
        assert!(is_truthy(&json!("no")));
        assert!(is_truthy(&json!([])));
    }

    #[test]
    fn interpolates_placeholders() {
        let out = interpolate("Review {{ workflow.name }} item={{item}}", &scope());
        assert_eq!(out, "Review review item=x");
        assert_eq!(interpolate("no placeholders", &scope()), "no placeholders");
        assert_eq!(interpolate("dangling {{ oops", &scope()), "dangling {{ oops");
    }

    #[test]
    fn classifies_sub_expressions() {
        assert_eq!(SubExpression::parse("{{ a.b }}"), SubExpression::Template("a.b"));
        assert_eq!(SubExpression::parse("$(test -f x)"), SubExpression::Command("test -f x"));
        assert_eq!(SubExpression::parse(" has_data "), SubExpression::Bare("has_data"));
    }

    #[tokio::test]
    async fn bare_tokens_reference_outputs_or_literals() {
        let runner = RecordingCommandRunner::default();
        let cwd = Path::new(".");
        assert!(evaluate_condition("has_data", &scope(), &runner, cwd).await.unwrap());
        assert!(!evaluate_condition("empty", &scope(), &runner, cwd).await.unwrap());
        assert!(!evaluate_condition("missing", &scope(), &runner, cwd).await.unwrap());
        assert!(evaluate_condition("true", &scope(), &runner, cwd).await.unwrap());

        let v = evaluate_value("literal", &scope(), &runner, cwd).await.unwrap();
        assert_eq!(v, json!("literal"));
    }

    #[tokio::test]
    async fn command_conditions_use_exit_status() {
        let runner = RecordingCommandRunner::default().with_response("check", 1, "");
        let cwd = Path::new(".");
        assert!(!evaluate_condition("$(check)", &scope(), &runner, cwd).await.unwrap());
        assert!(evaluate_condition("$(other)", &scope(), &runner, cwd).await.unwrap());
        assert_eq!(runner.commands(), vec!["check", "other"]);
    }

    #[tokio::test]
    async fn command_values_use_stdout() {
        let runner = RecordingCommandRunner::default().with_response("ls", 0, "a\nb\n");
        let v = evaluate_value("$(ls)", &scope(), &runner, Path::new(".")).await.unwrap();
        assert_eq!(to_iterable(v), vec![json!("a"), json!("b")]);
    }

    #[test]
    fn iterables() {
        assert_eq!(to_iterable(json!("[1,2]")), vec![json!(1), json!(2)]);
        assert_eq!(to_iterable(Value::Null), Vec::<Value>::new());
        assert_eq!(to_iterable(json!(5)), vec![json!(5)]);
        assert_eq!(
            to_iterable(json!({"k": 1})),
            vec![json!({"key": "k", "value": 1})]
        );
    }
}
