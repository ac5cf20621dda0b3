//! Lifecycle events for the workflow event bus.
//!
//! `WorkflowEvent` is broadcast while a workflow runs. All variants are
//! Clone + Send + Sync for use with tokio broadcast channels.

use serde::{Deserialize, Serialize};

use crate::step::StepKind;

/// Events emitted during workflow execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkflowEvent {
    /// A workflow run has started (or resumed).
    WorkflowStarted {
        workflow: String,
        session: String,
        resumed_from: Option<String>,
    },

    /// The run finished all of its steps.
    WorkflowCompleted {
        workflow: String,
        session: String,
        duration_ms: u64,
    },

    /// The run stopped on an unrecovered step failure.
    WorkflowFailed {
        workflow: String,
        session: String,
        /// Failing step, when the failure belongs to one.
        step: Option<String>,
        error: String,
    },

    /// The run stopped at a configured pause point or input wait.
    WorkflowPaused {
        workflow: String,
        session: String,
        step: String,
        waiting: bool,
    },

    /// A step attempt loop has started.
    StepStarted { step: String, kind: StepKind },

    /// An attempt failed and another one is scheduled.
    StepRetry {
        step: String,
        attempt: u32,
        delay_ms: u64,
        error: String,
    },

    /// A step succeeded.
    StepCompleted {
        step: String,
        attempts: u32,
        duration_ms: u64,
    },

    /// A step failed after its last attempt.
    StepFailed {
        step: String,
        attempts: u32,
        duration_ms: u64,
        error: String,
    },
}

impl WorkflowEvent {
    /// Snake-case event name, matching the serialized `type` tag.
    pub fn event_type(&self) -> &'static str {
        match self {
            WorkflowEvent::WorkflowStarted { .. } => "workflow_started",
            WorkflowEvent::WorkflowCompleted { .. } => "workflow_completed",
            WorkflowEvent::WorkflowFailed { .. } => "workflow_failed",
            WorkflowEvent::WorkflowPaused { .. } => "workflow_paused",
            WorkflowEvent::StepStarted { .. } => "step_started",
            WorkflowEvent::StepRetry { .. } => "step_retry",
            WorkflowEvent::StepCompleted { .. } => "step_completed",
            WorkflowEvent::StepFailed { .. } => "step_failed",
        }
    }

    /// Step name carried by step-level events.
    pub fn step(&self) -> Option<&str> {
        match self {
            WorkflowEvent::StepStarted { step, .. }
            | WorkflowEvent::StepRetry { step, .. }
            | WorkflowEvent::StepCompleted { step, .. }
            | WorkflowEvent::StepFailed { step, .. } => Some(step),
            WorkflowEvent::WorkflowPaused { step, .. } => Some(step),
            WorkflowEvent::WorkflowFailed { step, .. } => step.as_deref(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_with_type_tag() {
        let event = WorkflowEvent::StepRetry {
            step: "fetch".into(),
            attempt: 2,
            delay_ms: 500,
            error: "timeout".into(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "step_retry");
        assert_eq!(json["type"], event.event_type());
        assert_eq!(event.step(), Some("fetch"));
    }
}
