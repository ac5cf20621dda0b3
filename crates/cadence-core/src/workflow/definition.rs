//! Workflow document parsing, validation, and loading from disk.
//!
//! Converts YAML into a `WorkflowConfig` and validates structural
//! constraints up front: a non-empty name, at least one step, and every step
//! shape (including nested bodies) parsing into a known kind.

use std::path::{Path, PathBuf};

use cadence_types::state::WorkflowIdentity;
use cadence_types::step::{Step, StepSpec};
use cadence_types::workflow::WorkflowConfig;

use super::classifier;
use super::error::WorkflowError;

// ---------------------------------------------------------------------------
// Workflow
// ---------------------------------------------------------------------------

/// A loaded workflow: its document plus where it lives.
#[derive(Debug, Clone)]
pub struct Workflow {
    pub config: WorkflowConfig,
    /// Absolute path to the document.
    pub path: PathBuf,
    /// Directory step lookups are relative to.
    pub dir: PathBuf,
    pub identity: WorkflowIdentity,
}

impl Workflow {
    pub fn new(config: WorkflowConfig, path: PathBuf, identity: WorkflowIdentity) -> Self {
        let dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        Self {
            config,
            path,
            dir,
            identity,
        }
    }

    /// Whether a target resource is bound (disables glob expansion).
    pub fn has_resource(&self) -> bool {
        self.config
            .target
            .as_deref()
            .is_some_and(|t| !t.trim().is_empty())
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Parse a YAML string into a validated `WorkflowConfig`.
pub fn parse_workflow_yaml(yaml: &str) -> Result<WorkflowConfig, WorkflowError> {
    let config: WorkflowConfig = serde_yaml_ng::from_str(yaml)
        .map_err(|e| WorkflowError::Configuration(format!("parse error: {e}")))?;
    validate_workflow(&config)?;
    Ok(config)
}

/// Read and parse the workflow document at `path`.
///
/// Returns the config and the canonicalized path.
pub fn load_workflow_file(path: &Path) -> Result<(WorkflowConfig, PathBuf), WorkflowError> {
    let yaml = std::fs::read_to_string(path).map_err(|e| {
        WorkflowError::Configuration(format!("cannot read {}: {e}", path.display()))
    })?;
    let config = parse_workflow_yaml(&yaml)?;
    let absolute = std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
    Ok((config, absolute))
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Validate structural constraints on a `WorkflowConfig`.
pub fn validate_workflow(config: &WorkflowConfig) -> Result<(), WorkflowError> {
    if config.name.trim().is_empty() {
        return Err(WorkflowError::Configuration(
            "workflow name must not be empty".to_string(),
        ));
    }
    if config.steps.is_empty() {
        return Err(WorkflowError::Configuration(
            "workflow must have at least one step".to_string(),
        ));
    }

    let has_resource = config.target.as_deref().is_some_and(|t| !t.trim().is_empty());
    for (phase, steps) in [
        ("pre_processing", &config.pre_processing),
        ("steps", &config.steps),
        ("post_processing", &config.post_processing),
    ] {
        for (index, spec) in steps.iter().enumerate() {
            validate_spec(spec, has_resource).map_err(|e| {
                WorkflowError::Configuration(format!("{phase}[{index}]: {e}"))
            })?;
        }
    }
    Ok(())
}

fn validate_spec(spec: &StepSpec, has_resource: bool) -> Result<(), String> {
    let step = classifier::parse(spec, has_resource).map_err(|e| e.to_string())?;
    let nested: Vec<&StepSpec> = match &step {
        Step::Parallel(items) => items.iter().collect(),
        Step::Conditional(c) => c.then_steps.iter().chain(&c.else_steps).collect(),
        Step::Case(c) => c
            .branches
            .iter()
            .flat_map(|(_, steps)| steps)
            .chain(&c.else_steps)
            .collect(),
        Step::Iteration(it) => it.steps.iter().collect(),
        Step::Labeled { inner, .. } => vec![inner.as_ref()],
        _ => Vec::new(),
    };
    nested
        .into_iter()
        .try_for_each(|s| validate_spec(s, has_resource))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_valid_document() {
        let yaml = r#"
name: triage
target: issue-42
steps:
  - fetch
  - if: "{{output.fetch}}"
    then:
      - classify
      - [notify_a, notify_b]
summary:
  print_response: true
"#;
        let config = parse_workflow_yaml(yaml).unwrap();
        assert_eq!(config.steps.len(), 2);
        assert!(config.step_config("summary").is_some());
    }

    #[test]
    fn rejects_empty_steps() {
        let err = parse_workflow_yaml("name: x\nsteps: []\n").unwrap_err();
        assert!(matches!(err, WorkflowError::Configuration(msg) if msg.contains("at least one step")));
    }

    #[test]
    fn rejects_nested_malformed_step() {
        let yaml = r#"
name: bad
steps:
  - if: ready
    then:
      - each: items
        steps: [work]
"#;
        let err = parse_workflow_yaml(yaml).unwrap_err();
        assert!(matches!(err, WorkflowError::Configuration(msg) if msg.contains("steps[0]")));
    }

    #[test]
    fn loads_file_and_resolves_dir() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("workflow.yml");
        std::fs::write(&path, "name: demo\nsteps: [hello]\n").unwrap();

        let (config, absolute) = load_workflow_file(&path).unwrap();
        let workflow = Workflow::new(
            config,
            absolute.clone(),
            WorkflowIdentity {
                name: "demo".into(),
                path: absolute.display().to_string(),
                key: "demo_000000000000".into(),
            },
        );
        assert_eq!(workflow.dir, absolute.parent().unwrap());
        assert!(!workflow.has_resource());
    }
}
