//! Step loader: resolves a step name to a runnable step object.
//!
//! Resolution order:
//! 1. A name containing whitespace is an inline prompt.
//! 2. Factories registered in the [`StepRegistry`].
//! 3. The filesystem, checking each search directory in turn for
//!    `<name>.sh`, `<name>.py` and `<name>/prompt.md`.
//!
//! Search directories, in precedence order: the per-step `path` override,
//! the phase subdirectory, the workflow directory, and `../shared`.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use cadence_types::workflow::{Phase, WorkflowConfig};

use super::error::StepError;
use super::step::{PromptStep, RunnableStep, ScriptStep, StepSettings};

/// Builds a custom step from its resolved settings.
pub type StepFactory = Arc<dyn Fn(&str, StepSettings) -> Arc<dyn RunnableStep> + Send + Sync>;

// ---------------------------------------------------------------------------
// StepRegistry
// ---------------------------------------------------------------------------

/// Custom steps registered by name. Consulted before the filesystem.
#[derive(Clone, Default)]
pub struct StepRegistry {
    factories: HashMap<String, StepFactory>,
}

impl StepRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn(&str, StepSettings) -> Arc<dyn RunnableStep> + Send + Sync + 'static,
    {
        self.factories.insert(name.into(), Arc::new(factory));
    }

    pub fn get(&self, name: &str) -> Option<&StepFactory> {
        self.factories.get(name)
    }
}

impl fmt::Debug for StepRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.factories.keys().collect();
        names.sort();
        f.debug_struct("StepRegistry").field("steps", &names).finish()
    }
}

// ---------------------------------------------------------------------------
// StepLoader
// ---------------------------------------------------------------------------

/// Where to look for a step and how to configure it.
#[derive(Debug, Clone, Copy)]
pub struct LoadOptions {
    pub phase: Phase,
    pub is_last: bool,
}

/// A step resource found on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Resource {
    Shell(PathBuf),
    Python(PathBuf),
    PromptDir(PathBuf),
}

#[derive(Debug, Clone)]
pub struct StepLoader {
    workflow_dir: PathBuf,
    registry: StepRegistry,
}

impl StepLoader {
    pub fn new(workflow_dir: impl Into<PathBuf>, registry: StepRegistry) -> Self {
        Self {
            workflow_dir: workflow_dir.into(),
            registry,
        }
    }

    /// Directories searched for `name`, in precedence order.
    pub fn search_paths(&self, workflow: &WorkflowConfig, name: &str, phase: Phase) -> Vec<PathBuf> {
        let mut paths = Vec::with_capacity(4);
        if let Some(path) = workflow.step_config(name).and_then(|s| s.path.as_ref()) {
            paths.push(self.workflow_dir.join(path));
        }
        if let Some(dir) = phase.dir_name() {
            paths.push(self.workflow_dir.join(dir));
        }
        paths.push(self.workflow_dir.clone());
        paths.push(self.workflow_dir.join("..").join("shared"));
        paths
    }

    /// Resolve `name` to a configured runnable step.
    pub fn load(
        &self,
        workflow: &WorkflowConfig,
        name: &str,
        options: LoadOptions,
    ) -> Result<Arc<dyn RunnableStep>, StepError> {
        let settings = StepSettings::resolve(workflow, name, options.is_last);

        if is_inline_prompt(name) {
            return Ok(Arc::new(PromptStep::new(name, name, settings)));
        }
        if let Some(factory) = self.registry.get(name) {
            tracing::debug!(step = name, "using registered step");
            return Ok(factory(name, settings));
        }

        let searched = self.search_paths(workflow, name, options.phase);
        match find_resource(&searched, name) {
            Some(Resource::Shell(path)) => script(name, path, "bash", settings),
            Some(Resource::Python(path)) => script(name, path, "python3", settings),
            Some(Resource::PromptDir(dir)) => {
                let template = read_file(&dir.join("prompt.md"))?;
                let output_template = std::fs::read_to_string(dir.join("output.txt")).ok();
                Ok(Arc::new(
                    PromptStep::new(name, template, settings).with_output_template(output_template),
                ))
            }
            None => Err(StepError::NotFound {
                name: name.to_string(),
                searched,
            }),
        }
    }

    /// Resolve the prompt text for an agent step: inline text, or the
    /// `prompt.md` of a step directory.
    pub fn load_prompt(
        &self,
        workflow: &WorkflowConfig,
        name: &str,
        phase: Phase,
    ) -> Result<String, StepError> {
        if is_inline_prompt(name) {
            return Ok(name.to_string());
        }
        let searched = self.search_paths(workflow, name, phase);
        searched
            .iter()
            .map(|dir| dir.join(name).join("prompt.md"))
            .find(|p| p.is_file())
            .map(|p| read_file(&p))
            .unwrap_or_else(|| {
                Err(StepError::NotFound {
                    name: name.to_string(),
                    searched,
                })
            })
    }
}

fn is_inline_prompt(name: &str) -> bool {
    name.trim().contains(char::is_whitespace)
}

fn find_resource(dirs: &[PathBuf], name: &str) -> Option<Resource> {
    dirs.iter().find_map(|dir| {
        let shell = dir.join(format!("{name}.sh"));
        if shell.is_file() {
            return Some(Resource::Shell(shell));
        }
        let python = dir.join(format!("{name}.py"));
        if python.is_file() {
            return Some(Resource::Python(python));
        }
        let step_dir = dir.join(name);
        step_dir
            .join("prompt.md")
            .is_file()
            .then_some(Resource::PromptDir(step_dir))
    })
}

fn script(
    name: &str,
    path: PathBuf,
    interpreter: &'static str,
    settings: StepSettings,
) -> Result<Arc<dyn RunnableStep>, StepError> {
    let source = read_file(&path)?;
    if source.trim().is_empty() {
        return Err(StepError::execution(format!(
            "script {} is empty",
            path.display()
        )));
    }
    Ok(Arc::new(ScriptStep {
        name: name.to_string(),
        path,
        interpreter,
        settings,
    }))
}

fn read_file(path: &Path) -> Result<String, StepError> {
    std::fs::read_to_string(path)
        .map_err(|e| StepError::execution(format!("cannot read {}: {e}", path.display())))
}
