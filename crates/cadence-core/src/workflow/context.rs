//! Per-execution context threaded through the coordinator, executors and
//! step objects.
//!
//! `ExecutionContext` replaces any notion of an ambient "current step": every
//! call receives its own copy, so parallel workers never observe each other's
//! step name, label or loop bindings.

use serde_json::{Map, Value};

use cadence_types::workflow::Phase;

use crate::retry::RetryPolicy;

/// Execution-scoped state for one step invocation.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    /// Display name of the step being executed.
    pub current_step: String,
    /// Explicit label the result should be stored under. The outermost
    /// label wins; nested bodies start without one.
    pub label: Option<String>,
    /// Name the step's override block is looked up under: its own name,
    /// or its label when only the label has a block.
    pub config_key: String,
    pub phase: Phase,
    /// Index of the enclosing top-level step.
    pub sequence_order: usize,
    /// Whether this is the final top-level step of the main phase.
    pub is_last: bool,
    /// Nesting depth; zero for top-level steps.
    pub depth: usize,
    /// Loop bindings visible to expressions.
    pub variables: Map<String, Value>,
    /// Retry policy resolved for the current step.
    pub retry: RetryPolicy,
}

impl ExecutionContext {
    /// Context for a top-level step.
    pub fn root(phase: Phase, sequence_order: usize, is_last: bool) -> Self {
        Self {
            current_step: String::new(),
            label: None,
            config_key: String::new(),
            phase,
            sequence_order,
            is_last,
            depth: 0,
            variables: Map::new(),
            retry: RetryPolicy::none(),
        }
    }

    /// Context for a step nested inside the current one.
    pub fn child(&self) -> Self {
        Self {
            current_step: String::new(),
            label: None,
            config_key: String::new(),
            phase: self.phase,
            sequence_order: self.sequence_order,
            is_last: false,
            depth: self.depth + 1,
            variables: self.variables.clone(),
            retry: RetryPolicy::none(),
        }
    }

    /// Bind a loop variable.
    pub fn with_variable(mut self, name: impl Into<String>, value: Value) -> Self {
        self.variables.insert(name.into(), value);
        self
    }
}
