//! Step coordinator: classifies each step and routes it to the executor
//! registered for its kind.
//!
//! The coordinator owns the bookkeeping every kind shares: deriving the
//! display name, honouring the pause point, resolving the retry policy,
//! storing the result in workflow memory and snapshotting state afterwards.

use std::collections::HashMap;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use serde_json::Value;

use cadence_types::step::{Step, StepKind, StepSpec};

use super::classifier;
use super::context::ExecutionContext;
use super::error::WorkflowError;
use super::executors::{self, StepExecutor};
use super::runtime::Runtime;

/// Name used for unlabeled parallel groups in logs and events.
const PARALLEL_NAME: &str = "parallel";

pub struct StepCoordinator {
    executors: HashMap<StepKind, Arc<dyn StepExecutor>>,
}

impl StepCoordinator {
    /// Coordinator with the built-in executor for every kind.
    pub fn new() -> Self {
        let mut coordinator = Self {
            executors: HashMap::new(),
        };
        coordinator.register(StepKind::Prompt, Arc::new(executors::StandardExecutor));
        coordinator.register(StepKind::Command, Arc::new(executors::CommandExecutor));
        coordinator.register(StepKind::Agent, Arc::new(executors::AgentExecutor));
        coordinator.register(StepKind::Glob, Arc::new(executors::GlobExecutor));
        coordinator.register(StepKind::Each, Arc::new(executors::IterationExecutor));
        coordinator.register(StepKind::Repeat, Arc::new(executors::IterationExecutor));
        coordinator.register(StepKind::Conditional, Arc::new(executors::ConditionalExecutor));
        coordinator.register(StepKind::Case, Arc::new(executors::CaseExecutor));
        coordinator.register(StepKind::Input, Arc::new(executors::InputExecutor));
        coordinator.register(StepKind::Labeled, Arc::new(executors::LabeledExecutor));
        coordinator.register(StepKind::Parallel, Arc::new(executors::ParallelExecutor));
        coordinator
    }

    /// Replace the executor for `kind`.
    pub fn register(&mut self, kind: StepKind, executor: Arc<dyn StepExecutor>) {
        self.executors.insert(kind, executor);
    }

    /// Execute one step spec.
    pub fn execute<'a>(
        &'a self,
        spec: &'a StepSpec,
        mut ctx: ExecutionContext,
        rt: &'a Arc<Runtime>,
    ) -> BoxFuture<'a, Result<Value, WorkflowError>> {
        Box::pin(async move {
            let has_resource = rt.workflow.has_resource();
            let name = classifier::extract_name(spec, has_resource)
                .unwrap_or_else(|| PARALLEL_NAME.to_string());
            let step = classifier::parse(spec, has_resource)
                .map_err(|e| WorkflowError::step(&name, e))?;
            let kind = step.kind();

            if let Step::Prompt { name: ref step_name } = step {
                if rt.pause_at.as_deref() == Some(step_name.as_str()) {
                    tracing::info!(step = %step_name, "reached pause point");
                    return Err(WorkflowError::Paused {
                        step: step_name.clone(),
                    });
                }
            }

            let executor = self.executors.get(&kind).cloned().ok_or_else(|| {
                WorkflowError::Configuration(format!("no executor registered for {kind} steps"))
            })?;

            ctx.config_key = match &ctx.label {
                Some(label) if rt.step_config(&name).is_none() && rt.step_config(label).is_some() => {
                    label.clone()
                }
                _ => name.clone(),
            };

            // A labeled step hands its label down; the inner step stores.
            let store_key = match kind {
                StepKind::Labeled => None,
                StepKind::Parallel => ctx.label.take(),
                _ => Some(ctx.label.take().unwrap_or_else(|| name.clone())),
            };

            ctx.current_step = name.clone();
            ctx.retry = rt
                .retry_policy(&ctx.config_key)
                .map_err(|e| WorkflowError::step(&name, e))?;

            tracing::debug!(step = %name, kind = %kind, depth = ctx.depth, "executing step");
            let order = ctx.sequence_order;
            let value = executor.execute(step, ctx, rt).await?;

            if let Some(key) = store_key {
                rt.memory.write().await.record_output(&key, value.clone());
                rt.state.save_state(&key, order).await;
            }
            Ok(value)
        })
    }
}

impl Default for StepCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for StepCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut kinds: Vec<_> = self.executors.keys().map(StepKind::as_str).collect();
        kinds.sort_unstable();
        f.debug_struct("StepCoordinator").field("kinds", &kinds).finish()
    }
}
