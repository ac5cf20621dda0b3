//! Step shapes as written in a workflow document, and the typed step union.
//!
//! A workflow's `steps` list is heterogeneous: plain strings, nested lists
//! and single-purpose mappings. `StepSpec` captures that raw shape exactly as
//! it was deserialized; `Step` is the typed union the classifier produces from
//! it. No tag is stored anywhere -- the kind is always derived from shape.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// ---------------------------------------------------------------------------
// Markers and keywords
// ---------------------------------------------------------------------------

/// Prefix marking a shell command step (`$(ls -la)`).
pub const COMMAND_PREFIX: &str = "$(";

/// Prefix marking a step delegated to the external coding agent.
pub const AGENT_MARKER: char = '^';

/// Mapping keys that introduce a control-flow construct.
pub const CONTROL_KEYWORDS: [&str; 6] = ["if", "unless", "case", "each", "repeat", "input"];

/// Default safety cap for `repeat` loops.
pub const DEFAULT_MAX_ITERATIONS: u32 = 100;

// ---------------------------------------------------------------------------
// StepSpec (raw shape)
// ---------------------------------------------------------------------------

/// A step exactly as it appears in the workflow document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StepSpec {
    /// A bare string: prompt name, inline prompt, command, agent call or glob.
    Text(String),
    /// A nested list: its members run concurrently.
    Group(Vec<StepSpec>),
    /// A mapping: a control construct or a labeled invocation.
    Block(Map<String, Value>),
}

impl StepSpec {
    /// Convenience constructor for text steps.
    pub fn text(s: impl Into<String>) -> Self {
        StepSpec::Text(s.into())
    }

    /// Build a spec from an arbitrary JSON value (used for nested bodies).
    pub fn from_value(value: &Value) -> Result<Self, String> {
        serde_json::from_value(value.clone()).map_err(|e| format!("invalid step shape: {e}"))
    }

    /// Parse a JSON value that should hold a list of steps.
    ///
    /// A single non-list value is accepted as a one-step list.
    pub fn list_from_value(value: &Value) -> Result<Vec<Self>, String> {
        match value {
            Value::Array(items) => items.iter().map(Self::from_value).collect(),
            Value::Null => Ok(Vec::new()),
            other => Ok(vec![Self::from_value(other)?]),
        }
    }
}

impl From<&str> for StepSpec {
    fn from(s: &str) -> Self {
        StepSpec::Text(s.to_string())
    }
}

// ---------------------------------------------------------------------------
// StepKind
// ---------------------------------------------------------------------------

/// The kind of a step, derived from its shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    /// Standard named step (prompt file, script, step directory, custom step).
    Prompt,
    Command,
    Agent,
    Glob,
    Each,
    Repeat,
    Conditional,
    Case,
    Input,
    Labeled,
    Parallel,
}

impl StepKind {
    /// Short lowercase name, used in events and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            StepKind::Prompt => "prompt",
            StepKind::Command => "command",
            StepKind::Agent => "agent",
            StepKind::Glob => "glob",
            StepKind::Each => "each",
            StepKind::Repeat => "repeat",
            StepKind::Conditional => "conditional",
            StepKind::Case => "case",
            StepKind::Input => "input",
            StepKind::Labeled => "labeled",
            StepKind::Parallel => "parallel",
        }
    }
}

impl std::fmt::Display for StepKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Step (typed union)
// ---------------------------------------------------------------------------

/// A classified step with its payload extracted.
///
/// Nested bodies stay as `StepSpec` so they are classified again, lazily,
/// when (and if) they run.
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    /// Standard named step, resolved through the step loader.
    Prompt { name: String },
    /// Shell command; `command` is the text inside `$( ... )`.
    Command { command: String },
    /// External agent call; `name` has the marker stripped.
    Agent { name: String },
    /// Filesystem glob expanded into a newline-separated list.
    Glob { pattern: String },
    /// `each` / `repeat` loop.
    Iteration(Iteration),
    /// `if` / `unless` branch.
    Conditional(Conditional),
    /// `case` / `when` switch.
    Case(CaseSwitch),
    /// Interactive input.
    Input(InputSpec),
    /// `{label: inner}`: run `inner`, store its result under `label`.
    Labeled { label: String, inner: Box<StepSpec> },
    /// Nested list run concurrently.
    Parallel(Vec<StepSpec>),
}

impl Step {
    /// The kind of this step.
    pub fn kind(&self) -> StepKind {
        match self {
            Step::Prompt { .. } => StepKind::Prompt,
            Step::Command { .. } => StepKind::Command,
            Step::Agent { .. } => StepKind::Agent,
            Step::Glob { .. } => StepKind::Glob,
            Step::Iteration(it) => match it.mode {
                IterationMode::Each { .. } => StepKind::Each,
                IterationMode::Repeat { .. } => StepKind::Repeat,
            },
            Step::Conditional(_) => StepKind::Conditional,
            Step::Case(_) => StepKind::Case,
            Step::Input(_) => StepKind::Input,
            Step::Labeled { .. } => StepKind::Labeled,
            Step::Parallel(_) => StepKind::Parallel,
        }
    }
}

/// Body and mode of an iteration step.
#[derive(Debug, Clone, PartialEq)]
pub struct Iteration {
    pub mode: IterationMode,
    pub steps: Vec<StepSpec>,
}

/// `each` walks a collection; `repeat` loops until a condition holds.
#[derive(Debug, Clone, PartialEq)]
pub enum IterationMode {
    Each {
        /// Collection expression (`{{ }}`, `$( )` or a bare reference).
        collection: String,
        /// Variable name bound to the current item.
        binding: String,
    },
    Repeat {
        /// Exit condition evaluated after every pass.
        until: String,
        max_iterations: u32,
    },
}

/// `if` / `unless` construct.
#[derive(Debug, Clone, PartialEq)]
pub struct Conditional {
    pub predicate: String,
    /// `true` for `unless`.
    pub negate: bool,
    pub then_steps: Vec<StepSpec>,
    pub else_steps: Vec<StepSpec>,
}

/// `case` construct; branches keep document order.
#[derive(Debug, Clone, PartialEq)]
pub struct CaseSwitch {
    pub expression: String,
    pub branches: Vec<(String, Vec<StepSpec>)>,
    pub else_steps: Vec<StepSpec>,
}

/// Interactive input request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputSpec {
    pub prompt: String,
    /// Output key for the answer; derived from the prompt when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, rename = "type")]
    pub kind: InputKind,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
}

/// Kind of answer an input step expects.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputKind {
    #[default]
    Text,
    Boolean,
    Choice,
    Password,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_mixed_step_list() {
        let yaml = r#"
- fetch
- $(git status)
- - left
  - right
- if: "{{output.ready}}"
  then: [go]
"#;
        let steps: Vec<StepSpec> = serde_yaml_ng::from_str(yaml).unwrap();
        assert_eq!(steps.len(), 4);
        assert_eq!(steps[0], StepSpec::text("fetch"));
        assert!(matches!(&steps[1], StepSpec::Text(s) if s.starts_with(COMMAND_PREFIX)));
        assert!(matches!(&steps[2], StepSpec::Group(g) if g.len() == 2));
        assert!(matches!(&steps[3], StepSpec::Block(m) if m.contains_key("if")));
    }

    #[test]
    fn list_from_value_accepts_single_item() {
        let steps = StepSpec::list_from_value(&serde_json::json!("solo")).unwrap();
        assert_eq!(steps, vec![StepSpec::text("solo")]);
        assert!(StepSpec::list_from_value(&Value::Null).unwrap().is_empty());
    }

    #[test]
    fn input_spec_defaults() {
        let spec: InputSpec = serde_json::from_value(serde_json::json!({
            "prompt": "Continue?",
            "type": "boolean"
        }))
        .unwrap();
        assert_eq!(spec.kind, InputKind::Boolean);
        assert!(!spec.required);
        assert!(spec.options.is_empty());
    }

    #[test]
    fn step_kind_display() {
        assert_eq!(StepKind::Parallel.to_string(), "parallel");
        assert_eq!(
            Step::Command { command: "ls".into() }.kind(),
            StepKind::Command
        );
    }
}
