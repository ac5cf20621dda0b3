//! Workflow executor: the façade the outside world drives a run through.
//!
//! # Execution flow
//!
//! 1. For a resume request, resolve the session and restore memory from the
//!    nearest preceding snapshot; execution continues from the target step.
//! 2. Run `pre_processing` (fresh runs and resumes from the first step),
//!    then `steps`, then `post_processing`, each through the coordinator.
//! 3. A pause point or an unanswered input stops the run early with
//!    `Paused` / `Waiting`; neither is a failure.
//! 4. Record the session status and publish the workflow lifecycle event.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::{Map, Value};
use tokio::sync::broadcast;

use cadence_types::event::WorkflowEvent;
use cadence_types::state::{SessionRef, SessionStatus, SessionTimestamp};
use cadence_types::step::{StepKind, StepSpec};
use cadence_types::workflow::Phase;

use super::classifier;
use super::context::ExecutionContext;
use super::coordinator::StepCoordinator;
use super::definition::Workflow;
use super::error::WorkflowError;
use super::error_handler::ErrorHandler;
use super::executors::StepExecutor;
use super::loader::{StepLoader, StepRegistry};
use super::memory::WorkflowMemory;
use super::runtime::Runtime;
use crate::collaborator::{
    AgentRunner, CommandRunner, DeferredInput, InputProvider, NoAgentRunner, ShellCommandRunner,
};
use crate::event::EventBus;
use crate::llm::BoxCompletionClient;
use crate::repository::BoxStateRepository;
use crate::state::{ReplayRequest, StateManager, resolve_replay};

/// Model used when neither the step nor the workflow names one.
pub const DEFAULT_MODEL: &str = "claude-sonnet-4-5";

// ---------------------------------------------------------------------------
// Outcome
// ---------------------------------------------------------------------------

/// How a step sequence ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionOutcome {
    Completed,
    /// Halted before the configured pause step. `resume_at` is the
    /// top-level step a replay continues from.
    Paused { step: String, resume_at: String },
    /// An input step is waiting for an external event named `step`.
    Waiting { step: String, resume_at: String },
}

impl ExecutionOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, ExecutionOutcome::Completed)
    }

    /// Top-level step to pass to a replay, if the run stopped early.
    pub fn resume_at(&self) -> Option<&str> {
        match self {
            ExecutionOutcome::Completed => None,
            ExecutionOutcome::Paused { resume_at, .. } | ExecutionOutcome::Waiting { resume_at, .. } => {
                Some(resume_at.as_str())
            }
        }
    }
}

/// Summary of a whole run.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub session: SessionRef,
    pub outcome: ExecutionOutcome,
    /// Step results in execution order.
    pub output: Map<String, Value>,
    pub final_output: String,
    pub duration: Duration,
}

// ---------------------------------------------------------------------------
// WorkflowExecutor
// ---------------------------------------------------------------------------

pub struct WorkflowExecutor {
    rt: Arc<Runtime>,
}

impl WorkflowExecutor {
    pub fn builder(
        workflow: Workflow,
        repository: Arc<BoxStateRepository>,
        completion: Arc<BoxCompletionClient>,
    ) -> WorkflowExecutorBuilder {
        WorkflowExecutorBuilder::new(workflow, repository, completion)
    }

    pub fn runtime(&self) -> &Arc<Runtime> {
        &self.rt
    }

    /// Session snapshots are written to.
    pub fn session(&self) -> SessionRef {
        self.rt.state.session()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<WorkflowEvent> {
        self.rt.events.subscribe()
    }

    /// Current workflow memory.
    pub async fn memory(&self) -> WorkflowMemory {
        self.rt.memory.read().await.clone()
    }

    /// Execute one step spec with an explicit context.
    pub async fn execute_step(
        &self,
        spec: &StepSpec,
        ctx: ExecutionContext,
    ) -> Result<Value, WorkflowError> {
        self.rt.coordinator.execute(spec, ctx, &self.rt).await
    }

    /// Execute `specs` in order as top-level steps of `phase`, numbering
    /// them from `first_order`.
    pub async fn execute_steps(
        &self,
        specs: &[StepSpec],
        phase: Phase,
        first_order: usize,
    ) -> Result<ExecutionOutcome, WorkflowError> {
        let total = match phase {
            Phase::Steps => self.rt.workflow.config.steps.len(),
            _ => first_order + specs.len(),
        };
        for (offset, spec) in specs.iter().enumerate() {
            let order = first_order + offset;
            let is_last = phase == Phase::Steps && order + 1 == total;
            let ctx = ExecutionContext::root(phase, order, is_last);
            match self.execute_step(spec, ctx).await {
                Ok(_) => {}
                Err(WorkflowError::Paused { step }) => {
                    let resume_at = self.resume_point(spec, phase, &step);
                    return Ok(ExecutionOutcome::Paused { step, resume_at });
                }
                Err(WorkflowError::AwaitingInput { step }) => {
                    let resume_at = self.resume_point(spec, phase, &step);
                    return Ok(ExecutionOutcome::Waiting { step, resume_at });
                }
                Err(e) => return Err(e),
            }
        }
        Ok(ExecutionOutcome::Completed)
    }

    /// Name of the top-level step a replay must target to re-enter `spec`.
    /// Pre-processing re-runs with the first step; post-processing with the
    /// last.
    fn resume_point(&self, spec: &StepSpec, phase: Phase, stopped_at: &str) -> String {
        let config = &self.rt.workflow.config;
        let top = match phase {
            Phase::Steps => Some(spec),
            Phase::PreProcessing => config.steps.first(),
            Phase::PostProcessing => config.steps.last(),
        };
        top.and_then(|spec| classifier::extract_name(spec, self.rt.workflow.has_resource()))
            .unwrap_or_else(|| stopped_at.to_string())
    }

    /// Run the whole workflow, optionally resuming from `replay`
    /// (`[session_timestamp:]step_name`).
    pub async fn run(&self, replay: Option<&str>) -> Result<RunReport, WorkflowError> {
        let started = Instant::now();
        let rt = &self.rt;

        let mut start_index = 0;
        let mut resumed_from = None;
        if let Some(raw) = replay {
            let request = ReplayRequest::parse(raw)?;
            let plan = resolve_replay(&rt.workflow, &rt.state, &request).await?;
            if let Some(snapshot) = &plan.snapshot {
                *rt.memory.write().await = WorkflowMemory::from_snapshot(snapshot);
            }
            rt.state.set_session(plan.session);
            start_index = plan.start_index;
            resumed_from = Some(request.step);
        }

        let session = rt.state.session();
        tracing::info!(
            workflow = %rt.workflow.name(),
            session = %session.key(),
            resumed_from = ?resumed_from,
            "starting workflow"
        );
        if resumed_from.is_some() {
            rt.state.update_status(SessionStatus::Running, None).await;
        }
        rt.events.publish(WorkflowEvent::WorkflowStarted {
            workflow: rt.workflow.name().to_string(),
            session: session.key(),
            resumed_from,
        });

        let outcome = match self.run_phases(start_index).await {
            Ok(outcome) => outcome,
            Err(e) => {
                let step = match &e {
                    WorkflowError::Execution(err) => Some(err.step_name.clone()),
                    _ => None,
                };
                tracing::error!(workflow = %rt.workflow.name(), error = %e, "workflow failed");
                rt.state
                    .update_status(SessionStatus::Failed, step.as_deref())
                    .await;
                rt.events.publish(WorkflowEvent::WorkflowFailed {
                    workflow: rt.workflow.name().to_string(),
                    session: session.key(),
                    step,
                    error: e.to_string(),
                });
                return Err(e);
            }
        };

        match &outcome {
            ExecutionOutcome::Completed => {
                rt.state.update_status(SessionStatus::Completed, None).await;
                rt.events.publish(WorkflowEvent::WorkflowCompleted {
                    workflow: rt.workflow.name().to_string(),
                    session: session.key(),
                    duration_ms: started.elapsed().as_millis() as u64,
                });
            }
            ExecutionOutcome::Paused { step, .. } | ExecutionOutcome::Waiting { step, .. } => {
                let waiting = matches!(outcome, ExecutionOutcome::Waiting { .. });
                let status = if waiting {
                    SessionStatus::Waiting
                } else {
                    SessionStatus::Running
                };
                rt.state.update_status(status, Some(step.as_str())).await;
                rt.events.publish(WorkflowEvent::WorkflowPaused {
                    workflow: rt.workflow.name().to_string(),
                    session: session.key(),
                    step: step.clone(),
                    waiting,
                });
            }
        }

        let memory = rt.memory.read().await;
        Ok(RunReport {
            session,
            outcome,
            output: memory.output.clone(),
            final_output: memory.rendered_final_output(),
            duration: started.elapsed(),
        })
    }

    async fn run_phases(&self, start_index: usize) -> Result<ExecutionOutcome, WorkflowError> {
        let config = &self.rt.workflow.config;

        if start_index == 0 && !config.pre_processing.is_empty() {
            let outcome = self
                .execute_steps(&config.pre_processing, Phase::PreProcessing, 0)
                .await?;
            if !outcome.is_completed() {
                return Ok(outcome);
            }
        }

        let outcome = self
            .execute_steps(&config.steps[start_index..], Phase::Steps, start_index)
            .await?;
        if !outcome.is_completed() {
            return Ok(outcome);
        }

        if !config.post_processing.is_empty() {
            return self
                .execute_steps(&config.post_processing, Phase::PostProcessing, config.steps.len())
                .await;
        }
        Ok(ExecutionOutcome::Completed)
    }
}

impl std::fmt::Debug for WorkflowExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowExecutor").field("runtime", &self.rt).finish()
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Wires a [`WorkflowExecutor`] from its collaborators. Anything not set
/// falls back to the non-interactive default.
pub struct WorkflowExecutorBuilder {
    workflow: Workflow,
    repository: Arc<BoxStateRepository>,
    completion: Arc<BoxCompletionClient>,
    commands: Arc<dyn CommandRunner>,
    agent: Arc<dyn AgentRunner>,
    input: Arc<dyn InputProvider>,
    registry: StepRegistry,
    executors: Vec<(StepKind, Arc<dyn StepExecutor>)>,
    events: EventBus,
    pause_at: Option<String>,
    default_model: String,
    timestamp: Option<SessionTimestamp>,
}

impl WorkflowExecutorBuilder {
    fn new(
        workflow: Workflow,
        repository: Arc<BoxStateRepository>,
        completion: Arc<BoxCompletionClient>,
    ) -> Self {
        Self {
            workflow,
            repository,
            completion,
            commands: Arc::new(ShellCommandRunner::default()),
            agent: Arc::new(NoAgentRunner),
            input: Arc::new(DeferredInput),
            registry: StepRegistry::new(),
            executors: Vec::new(),
            events: EventBus::default(),
            pause_at: None,
            default_model: DEFAULT_MODEL.to_string(),
            timestamp: None,
        }
    }

    pub fn commands(mut self, commands: Arc<dyn CommandRunner>) -> Self {
        self.commands = commands;
        self
    }

    pub fn agent(mut self, agent: Arc<dyn AgentRunner>) -> Self {
        self.agent = agent;
        self
    }

    pub fn input(mut self, input: Arc<dyn InputProvider>) -> Self {
        self.input = input;
        self
    }

    /// Custom steps, consulted before the filesystem.
    pub fn registry(mut self, registry: StepRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Replace the built-in executor for `kind`.
    pub fn executor(mut self, kind: StepKind, executor: Arc<dyn StepExecutor>) -> Self {
        self.executors.push((kind, executor));
        self
    }

    pub fn events(mut self, events: EventBus) -> Self {
        self.events = events;
        self
    }

    pub fn pause_at(mut self, step: Option<String>) -> Self {
        self.pause_at = step;
        self
    }

    pub fn default_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = model.into();
        self
    }

    /// Pin the session timestamp instead of taking the current time.
    pub fn timestamp(mut self, timestamp: SessionTimestamp) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn build(self) -> WorkflowExecutor {
        let session = SessionRef::new(
            self.workflow.identity.clone(),
            self.timestamp.unwrap_or_else(SessionTimestamp::now),
        );
        let memory = WorkflowMemory::new().into_shared();

        let mut coordinator = StepCoordinator::new();
        for (kind, executor) in self.executors {
            coordinator.register(kind, executor);
        }

        let rt = Runtime {
            loader: StepLoader::new(self.workflow.dir.clone(), self.registry),
            workflow: Arc::new(self.workflow),
            state: StateManager::new(self.repository, memory.clone(), session),
            memory,
            coordinator,
            completion: self.completion,
            commands: self.commands,
            agent: self.agent,
            input: self.input,
            errors: ErrorHandler::new(self.events.clone()),
            events: self.events,
            pause_at: self.pause_at,
            default_model: self.default_model,
        };
        WorkflowExecutor { rt: Arc::new(rt) }
    }
}
