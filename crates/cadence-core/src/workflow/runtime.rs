//! Services shared by every step of a run.

use std::path::Path;
use std::sync::Arc;

use serde_json::{Value, json};

use cadence_types::workflow::StepOverride;

use super::context::ExecutionContext;
use super::coordinator::StepCoordinator;
use super::definition::Workflow;
use super::error::StepError;
use super::error_handler::ErrorHandler;
use super::loader::StepLoader;
use super::memory::SharedMemory;
use crate::collaborator::{AgentRunner, CommandRunner, InputProvider};
use crate::event::EventBus;
use crate::llm::BoxCompletionClient;
use crate::retry::RetryPolicy;
use crate::state::StateManager;

/// Everything an executor or step object may reach for.
///
/// Held in an `Arc` so parallel workers can share it across tasks. The only
/// mutable piece is `memory`, which is lock-guarded.
pub struct Runtime {
    pub workflow: Arc<Workflow>,
    pub memory: SharedMemory,
    pub loader: StepLoader,
    pub coordinator: StepCoordinator,
    pub completion: Arc<BoxCompletionClient>,
    pub commands: Arc<dyn CommandRunner>,
    pub agent: Arc<dyn AgentRunner>,
    pub input: Arc<dyn InputProvider>,
    pub state: StateManager,
    pub events: EventBus,
    pub errors: ErrorHandler,
    /// Halt before the first plain step with this name.
    pub pause_at: Option<String>,
    /// Model used when neither the step nor the workflow names one.
    pub default_model: String,
}

impl Runtime {
    /// Directory commands run in and step lookups are relative to.
    pub fn dir(&self) -> &Path {
        &self.workflow.dir
    }

    pub fn step_config(&self, name: &str) -> Option<&StepOverride> {
        self.workflow.config.step_config(name)
    }

    /// Retry policy for `name`: its own block or `retries` count, else the
    /// workflow default.
    pub fn retry_policy(&self, name: &str) -> Result<RetryPolicy, StepError> {
        RetryPolicy::for_step(self.workflow.config.retry.as_ref(), self.step_config(name))
    }

    /// Expression scope for the current memory and context bindings.
    pub async fn scope(&self, ctx: &ExecutionContext) -> Value {
        let workflow = json!({
            "name": self.workflow.name(),
            "target": self.workflow.config.target,
            "session": self.state.session().key(),
        });
        self.memory
            .read()
            .await
            .to_expression_context(&ctx.variables, &workflow)
    }
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("workflow", &self.workflow.name())
            .field("completion", &self.completion.name())
            .field("state", &self.state)
            .field("pause_at", &self.pause_at)
            .finish_non_exhaustive()
    }
}
