//! Workflow document types.
//!
//! A workflow is a YAML document whose `steps` list drives execution. Any
//! other top-level mapping keyed by a step name is a per-step override block.

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::retry::RetryConfig;
use crate::step::StepSpec;

// ---------------------------------------------------------------------------
// Workflow document
// ---------------------------------------------------------------------------

/// Parsed workflow document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowConfig {
    /// Workflow name (used in the session key).
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Default model for prompt steps.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// Resource the workflow operates on. When set, glob-looking step text is
    /// never expanded against the filesystem.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,

    /// Default retry policy for every step without its own.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry: Option<RetryConfig>,

    /// Tools enabled for every prompt step.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<String>,

    #[serde(default)]
    pub steps: Vec<StepSpec>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pre_processing: Vec<StepSpec>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub post_processing: Vec<StepSpec>,

    /// Per-step override blocks keyed by step name.
    #[serde(flatten)]
    pub step_configs: HashMap<String, StepOverride>,
}

impl WorkflowConfig {
    /// Override block for `step_name`, if the document has one.
    pub fn step_config(&self, step_name: &str) -> Option<&StepOverride> {
        self.step_configs.get(step_name)
    }
}

// ---------------------------------------------------------------------------
// Per-step overrides
// ---------------------------------------------------------------------------

/// Declarative configuration applied to a step after it is loaded.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StepOverride {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// Append the rendered result to the final output.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub print_response: Option<bool>,

    /// Parse the completion as JSON.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub json: Option<bool>,

    /// Arbitrary attributes exposed to templates as `params`.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub params: Map<String, Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coerce_to: Option<CoerceTo>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub available_tools: Option<Vec<String>>,

    /// Shorthand retry count (retries after the first attempt).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retries: Option<u32>,

    /// Raise on non-zero command exit (default) instead of annotating output.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_on_error: Option<bool>,

    /// Directory searched first when loading this step.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,

    /// Full retry policy; takes precedence over `retries`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry: Option<RetryConfig>,

    /// `false` forbids retrying this step.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idempotent: Option<bool>,

    /// Explicit retry opt-out.
    #[serde(default)]
    pub no_retry: bool,
}

/// Post-processing applied to a prompt step's reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoerceTo {
    Boolean,
    LlmBoolean,
    Iterable,
    String,
}

// ---------------------------------------------------------------------------
// Execution phase
// ---------------------------------------------------------------------------

/// Which step list is currently executing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    PreProcessing,
    #[default]
    Steps,
    PostProcessing,
}

impl Phase {
    /// Subdirectory the loader checks for phase-specific steps.
    pub fn dir_name(&self) -> Option<&'static str> {
        match self {
            Phase::PreProcessing => Some("pre_processing"),
            Phase::Steps => None,
            Phase::PostProcessing => Some("post_processing"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_document_with_overrides() {
        let yaml = r#"
name: review
model: claude-sonnet
steps:
  - fetch
  - summarize
summarize:
  print_response: true
  coerce_to: llm_boolean
  retries: 2
fetch:
  path: ./custom
  idempotent: false
"#;
        let config: WorkflowConfig = serde_yaml_ng::from_str(yaml).unwrap();
        assert_eq!(config.name, "review");
        assert_eq!(config.steps.len(), 2);

        let summarize = config.step_config("summarize").unwrap();
        assert_eq!(summarize.print_response, Some(true));
        assert_eq!(summarize.coerce_to, Some(CoerceTo::LlmBoolean));
        assert_eq!(summarize.retries, Some(2));

        let fetch = config.step_config("fetch").unwrap();
        assert_eq!(fetch.idempotent, Some(false));
        assert_eq!(fetch.path, Some(PathBuf::from("./custom")));
        assert!(config.step_config("missing").is_none());
    }

    #[test]
    fn phase_directories() {
        assert_eq!(Phase::PreProcessing.dir_name(), Some("pre_processing"));
        assert_eq!(Phase::Steps.dir_name(), None);
    }
}
