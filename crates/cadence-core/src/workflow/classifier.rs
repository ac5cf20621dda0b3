//! Step classification: map a step's shape to its kind and extract its
//! payload.
//!
//! [`classify`] is total and pure: every [`StepSpec`] maps to exactly one
//! [`StepKind`], with no filesystem access. Whether glob-looking text is a
//! glob is decided solely by whether the workflow binds a target resource.
//! [`parse`] additionally validates the payload and may fail with a
//! configuration error.

use serde_json::{Map, Value};

use cadence_types::step::{
    AGENT_MARKER, CONTROL_KEYWORDS, CaseSwitch, Conditional, DEFAULT_MAX_ITERATIONS, InputSpec,
    Iteration, IterationMode, Step, StepKind, StepSpec,
};

use super::error::StepError;
use super::expression::strip_command;

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

/// Kind of `spec`.
///
/// Priority: list, command marker, agent marker, wildcard (only when no
/// resource is bound), control keyword, other mapping, other string.
pub fn classify(spec: &StepSpec, has_resource: bool) -> StepKind {
    match spec {
        StepSpec::Group(_) => StepKind::Parallel,
        StepSpec::Text(text) => classify_text(text, has_resource),
        StepSpec::Block(map) => match control_keyword(map) {
            Some("if") | Some("unless") => StepKind::Conditional,
            Some("case") => StepKind::Case,
            Some("each") => StepKind::Each,
            Some("repeat") => StepKind::Repeat,
            Some("input") => StepKind::Input,
            _ => StepKind::Labeled,
        },
    }
}

fn classify_text(text: &str, has_resource: bool) -> StepKind {
    let text = text.trim();
    if strip_command(text).is_some() {
        StepKind::Command
    } else if text.starts_with(AGENT_MARKER) {
        StepKind::Agent
    } else if !has_resource && is_glob(text) {
        StepKind::Glob
    } else {
        StepKind::Prompt
    }
}

/// Wildcard text without whitespace. Inline prompts are never globs.
fn is_glob(text: &str) -> bool {
    !text.chars().any(char::is_whitespace) && text.contains(['*', '?', '['])
}

/// The control keyword a mapping is led by, checked in a fixed order.
fn control_keyword(map: &Map<String, Value>) -> Option<&'static str> {
    CONTROL_KEYWORDS.into_iter().find(|k| map.contains_key(*k))
}

/// Name under which a step's result is stored, when it has one.
pub fn extract_name(spec: &StepSpec, has_resource: bool) -> Option<String> {
    match spec {
        StepSpec::Group(_) => None,
        StepSpec::Text(text) => {
            let text = text.trim();
            match classify_text(text, has_resource) {
                StepKind::Agent => Some(text.trim_start_matches(AGENT_MARKER).trim().to_string()),
                _ => Some(text.to_string()),
            }
        }
        StepSpec::Block(map) => match control_keyword(map) {
            Some(keyword) if keyword == "input" => {
                let spec = map.get("input").and_then(|v| input_spec(v, map).ok());
                spec.map(|s| input_name(&s))
            }
            Some(keyword) => {
                let head = map.get(keyword).map(scalar_text).unwrap_or_default();
                Some(format!("{keyword}_{head}"))
            }
            None => map.keys().next().cloned(),
        },
    }
}

/// Output key for an input step.
pub fn input_name(spec: &InputSpec) -> String {
    spec.name.clone().unwrap_or_else(|| {
        let slug: String = spec
            .prompt
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '_' })
            .collect();
        let slug = slug.trim_matches('_');
        let slug: String = slug.chars().take(40).collect();
        format!("input_{slug}")
    })
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Classify `spec` and extract its typed payload.
pub fn parse(spec: &StepSpec, has_resource: bool) -> Result<Step, StepError> {
    match spec {
        StepSpec::Group(items) => Ok(Step::Parallel(items.clone())),
        StepSpec::Text(text) => {
            let text = text.trim();
            if text.is_empty() {
                return Err(StepError::Configuration("empty step".into()));
            }
            Ok(match classify_text(text, has_resource) {
                StepKind::Command => Step::Command {
                    command: strip_command(text).unwrap_or_default().to_string(),
                },
                StepKind::Agent => {
                    let name = text.trim_start_matches(AGENT_MARKER).trim();
                    if name.is_empty() {
                        return Err(StepError::Configuration("agent step has no name".into()));
                    }
                    Step::Agent { name: name.to_string() }
                }
                StepKind::Glob => Step::Glob { pattern: text.to_string() },
                _ => Step::Prompt { name: text.to_string() },
            })
        }
        StepSpec::Block(map) => parse_block(map),
    }
}

fn parse_block(map: &Map<String, Value>) -> Result<Step, StepError> {
    match control_keyword(map) {
        Some(keyword @ ("if" | "unless")) => Ok(Step::Conditional(Conditional {
            predicate: required_text(map, keyword)?,
            negate: keyword == "unless",
            then_steps: step_list(map, "then")?,
            else_steps: step_list(map, "else")?,
        })),
        Some("case") => {
            let branches = match map.get("when") {
                None | Some(Value::Null) => Vec::new(),
                Some(Value::Object(when)) => when
                    .iter()
                    .map(|(value, steps)| Ok((value.clone(), steps_from(steps, "when")?)))
                    .collect::<Result<Vec<_>, StepError>>()?,
                Some(_) => {
                    return Err(StepError::Configuration(
                        "case `when` must be a mapping of value to steps".into(),
                    ));
                }
            };
            Ok(Step::Case(CaseSwitch {
                expression: required_text(map, "case")?,
                branches,
                else_steps: step_list(map, "else")?,
            }))
        }
        Some("each") => {
            let binding = map
                .get("as")
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .ok_or_else(|| StepError::Configuration("each step requires `as`".into()))?;
            Ok(Step::Iteration(Iteration {
                mode: IterationMode::Each {
                    collection: required_text(map, "each")?,
                    binding: binding.to_string(),
                },
                steps: step_list(map, "steps")?,
            }))
        }
        Some("repeat") => {
            // `repeat: {steps, until, max_iterations}` or the same keys as siblings.
            let body = match map.get("repeat") {
                Some(Value::Object(inner)) => inner,
                _ => map,
            };
            let max_iterations = match body.get("max_iterations") {
                None | Some(Value::Null) => DEFAULT_MAX_ITERATIONS,
                Some(v) => v
                    .as_u64()
                    .and_then(|n| u32::try_from(n).ok())
                    .filter(|n| *n > 0)
                    .ok_or_else(|| {
                        StepError::Configuration("max_iterations must be a positive integer".into())
                    })?,
            };
            Ok(Step::Iteration(Iteration {
                mode: IterationMode::Repeat {
                    until: required_text(body, "until")?,
                    max_iterations,
                },
                steps: step_list(body, "steps")?,
            }))
        }
        Some(_) => {
            let value = map.get("input").cloned().unwrap_or(Value::Null);
            Ok(Step::Input(input_spec(&value, map)?))
        }
        None => {
            if map.len() != 1 {
                return Err(StepError::Configuration(format!(
                    "a labeled step must have exactly one key, found {}",
                    map.len()
                )));
            }
            let (label, inner) = map
                .iter()
                .next()
                .ok_or_else(|| StepError::Configuration("empty step mapping".into()))?;
            let inner = StepSpec::from_value(inner).map_err(StepError::Configuration)?;
            Ok(Step::Labeled {
                label: label.clone(),
                inner: Box::new(inner),
            })
        }
    }
}

/// `input: "prompt"`, `input: {prompt, ...}`, or prompt fields as siblings.
fn input_spec(value: &Value, map: &Map<String, Value>) -> Result<InputSpec, StepError> {
    let raw = match value {
        Value::Object(_) => value.clone(),
        Value::String(prompt) => {
            let mut merged = map.clone();
            merged.remove("input");
            merged.insert("prompt".into(), Value::String(prompt.clone()));
            Value::Object(merged)
        }
        _ => {
            let mut merged = map.clone();
            merged.remove("input");
            Value::Object(merged)
        }
    };
    let spec: InputSpec = serde_json::from_value(raw)
        .map_err(|e| StepError::Configuration(format!("invalid input step: {e}")))?;
    if spec.prompt.trim().is_empty() {
        return Err(StepError::Configuration("input step requires a prompt".into()));
    }
    Ok(spec)
}

fn required_text(map: &Map<String, Value>, key: &str) -> Result<String, StepError> {
    match map.get(key) {
        None | Some(Value::Null) => Err(StepError::Configuration(format!("`{key}` is required"))),
        Some(value) => {
            let text = scalar_text(value);
            if text.trim().is_empty() {
                Err(StepError::Configuration(format!("`{key}` must not be empty")))
            } else {
                Ok(text)
            }
        }
    }
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.trim().to_string(),
        other => other.to_string(),
    }
}

fn step_list(map: &Map<String, Value>, key: &str) -> Result<Vec<StepSpec>, StepError> {
    match map.get(key) {
        None => Ok(Vec::new()),
        Some(value) => steps_from(value, key),
    }
}

fn steps_from(value: &Value, key: &str) -> Result<Vec<StepSpec>, StepError> {
    StepSpec::list_from_value(value).map_err(|e| StepError::Configuration(format!("`{key}`: {e}")))
}
