//! Error taxonomy for step and workflow execution.
//!
//! - [`StepError`] is what a single step attempt raises.
//! - [`ExecutionError`] is the uniform wrapper the error handler produces once
//!   the attempt loop gives up.
//! - [`WorkflowError`] is what the coordinator and the workflow executor return.

use std::path::PathBuf;

use thiserror::Error;

use cadence_types::error::{ErrorKind, InvalidTimestamp, RepositoryError};
use cadence_types::llm::CompletionError;

// ---------------------------------------------------------------------------
// StepError
// ---------------------------------------------------------------------------

/// Failure of a single step attempt.
#[derive(Debug, Clone, Error)]
pub enum StepError {
    /// Malformed step spec or configuration. Never retried.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// No loader match for a step name.
    #[error("step '{name}' not found")]
    NotFound { name: String, searched: Vec<PathBuf> },

    /// The step object raised.
    #[error("{message}")]
    Execution { message: String },

    /// A subprocess exited non-zero.
    #[error("command `{command}` exited with status {status}")]
    Command {
        command: String,
        status: i32,
        output: String,
    },

    #[error(transparent)]
    Completion(#[from] CompletionError),

    #[error("agent failed: {0}")]
    Agent(String),

    #[error("input failed: {0}")]
    Input(String),

    #[error("step timed out")]
    Timeout,
}

impl StepError {
    pub fn execution(message: impl Into<String>) -> Self {
        StepError::Execution {
            message: message.into(),
        }
    }

    /// Coarse kind used by retry matchers.
    pub fn kind(&self) -> ErrorKind {
        match self {
            StepError::Configuration(_) => ErrorKind::Configuration,
            StepError::NotFound { .. } => ErrorKind::NotFound,
            StepError::Execution { .. } => ErrorKind::Execution,
            StepError::Command { .. } => ErrorKind::Command,
            StepError::Completion(e) => match e {
                CompletionError::Timeout => ErrorKind::Timeout,
                CompletionError::RateLimited { .. } => ErrorKind::RateLimited,
                CompletionError::Server { .. } => ErrorKind::Server,
                CompletionError::Transport(_) => ErrorKind::Transport,
                CompletionError::Authentication => ErrorKind::Authentication,
                CompletionError::InvalidResponse(_) => ErrorKind::InvalidResponse,
            },
            StepError::Agent(_) => ErrorKind::Agent,
            StepError::Input(_) => ErrorKind::Input,
            StepError::Timeout => ErrorKind::Timeout,
        }
    }

    /// Status code carried by the failure, if any.
    ///
    /// Completion failures report their HTTP status; command failures report
    /// the exit status when it fits in a `u16`.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            StepError::Completion(e) => e.status_code(),
            StepError::Command { status, .. } => u16::try_from(*status).ok(),
            _ => None,
        }
    }

    /// Errors that must fail immediately regardless of retry policy.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            StepError::Configuration(_) | StepError::NotFound { .. }
        )
    }
}

// ---------------------------------------------------------------------------
// ExecutionError
// ---------------------------------------------------------------------------

/// Terminal step failure as surfaced by the error handler.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct ExecutionError {
    pub step_name: String,
    /// Actionable, human-readable description.
    pub message: String,
    /// Number of attempts made before giving up.
    pub attempts: u32,
    #[source]
    pub source: StepError,
}

impl ExecutionError {
    /// Wrap `source` with a message classified by error kind.
    pub fn new(step_name: impl Into<String>, attempts: u32, source: StepError) -> Self {
        let step_name = step_name.into();
        let message = match &source {
            StepError::NotFound { name, searched } => {
                let paths = searched
                    .iter()
                    .map(|p| format!("  - {}", p.display()))
                    .collect::<Vec<_>>()
                    .join("\n");
                format!(
                    "Step '{name}' not found. Create '{name}/prompt.md', '{name}.sh' or \
                     '{name}.py' in one of:\n{paths}"
                )
            }
            StepError::Configuration(msg) => {
                format!("Step '{step_name}' is misconfigured: {msg}")
            }
            other => format!("Step '{step_name}' failed: {other}"),
        };
        Self {
            step_name,
            message,
            attempts,
            source,
        }
    }
}

// ---------------------------------------------------------------------------
// WorkflowError
// ---------------------------------------------------------------------------

/// Errors returned by the coordinator and the workflow executor.
///
/// `Paused` and `AwaitingInput` are not failures: they unwind the step stack
/// and are turned into an `ExecutionOutcome` at the top level.
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("invalid workflow: {0}")]
    Configuration(String),

    #[error(transparent)]
    Execution(#[from] ExecutionError),

    #[error("invalid resume request: {0}")]
    InvalidReplay(String),

    #[error("parallel worker failed: {0}")]
    Join(String),

    /// State could not be read back for a resume.
    #[error("state store error: {0}")]
    State(#[from] RepositoryError),

    #[error("paused before step '{step}'")]
    Paused { step: String },

    #[error("step '{step}' is waiting for input")]
    AwaitingInput { step: String },
}

impl From<InvalidTimestamp> for WorkflowError {
    fn from(e: InvalidTimestamp) -> Self {
        WorkflowError::InvalidReplay(e.to_string())
    }
}

impl WorkflowError {
    /// Wrap a one-shot step failure that did not go through the retry loop.
    pub fn step(step_name: impl Into<String>, source: StepError) -> Self {
        WorkflowError::Execution(ExecutionError::new(step_name, 1, source))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completion_errors_expose_kind_and_status() {
        let err = StepError::from(CompletionError::Server {
            status: 503,
            message: "overloaded".into(),
        });
        assert_eq!(err.kind(), ErrorKind::Server);
        assert_eq!(err.status_code(), Some(503));

        let err = StepError::from(CompletionError::RateLimited { retry_after_ms: None });
        assert_eq!(err.kind(), ErrorKind::RateLimited);
        assert_eq!(err.status_code(), Some(429));
    }

    #[test]
    fn not_found_message_lists_search_paths() {
        let err = ExecutionError::new(
            "summarize",
            1,
            StepError::NotFound {
                name: "summarize".into(),
                searched: vec![PathBuf::from("/w"), PathBuf::from("/shared")],
            },
        );
        assert!(err.message.contains("Step 'summarize' not found"));
        assert!(err.message.contains("  - /w"));
        assert!(err.message.contains("  - /shared"));
        assert!(matches!(err.source, StepError::NotFound { .. }));
    }

    #[test]
    fn generic_message_keeps_original_cause() {
        let err = ExecutionError::new("fetch", 3, StepError::execution("boom"));
        assert_eq!(err.message, "Step 'fetch' failed: boom");
        assert_eq!(err.attempts, 3);
        assert_eq!(err.source.to_string(), "boom");
    }

    #[test]
    fn fatal_errors() {
        assert!(StepError::Configuration("x".into()).is_fatal());
        assert!(!StepError::Timeout.is_fatal());
    }
}
