//! Error handler: attempt counting, retry integration and lifecycle events
//! around a single step.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};

use cadence_types::event::WorkflowEvent;
use cadence_types::step::StepKind;

use super::error::{ExecutionError, StepError};
use crate::event::EventBus;
use crate::retry::{RetryObserver, RetryPolicy, TracingObserver, with_retry};

/// Publishes `StepRetry` events for every scheduled retry.
struct EventObserver {
    events: EventBus,
}

impl RetryObserver for EventObserver {
    fn on_retry(&self, step: &str, attempt: u32, error: &StepError, delay: Duration) {
        self.events.publish(WorkflowEvent::StepRetry {
            step: step.to_string(),
            attempt,
            delay_ms: delay.as_millis() as u64,
            error: error.to_string(),
        });
    }
}

/// Wraps step execution with retries and uniform failure reporting.
#[derive(Debug, Clone)]
pub struct ErrorHandler {
    events: EventBus,
}

impl ErrorHandler {
    pub fn new(events: EventBus) -> Self {
        Self { events }
    }

    /// Run `block` under `policy`, emitting start/retry/complete/failed
    /// events with timing. A terminal failure is classified into an
    /// actionable message and wrapped with the step name and attempt count.
    pub async fn with_error_handling<F, Fut, T>(
        &self,
        step_name: &str,
        kind: StepKind,
        policy: &RetryPolicy,
        mut block: F,
    ) -> Result<T, ExecutionError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, StepError>>,
    {
        let policy = policy
            .clone()
            .with_observer(Arc::new(TracingObserver))
            .with_observer(Arc::new(EventObserver {
                events: self.events.clone(),
            }));

        self.events.publish(WorkflowEvent::StepStarted {
            step: step_name.to_string(),
            kind,
        });
        let started = Instant::now();
        let attempts = AtomicU32::new(0);

        let result = with_retry(&policy, step_name, || {
            attempts.fetch_add(1, Ordering::Relaxed);
            block()
        })
        .await;

        let attempts = attempts.load(Ordering::Relaxed);
        let duration_ms = started.elapsed().as_millis() as u64;
        match result {
            Ok(value) => {
                tracing::debug!(step = step_name, attempts, duration_ms, "step completed");
                self.events.publish(WorkflowEvent::StepCompleted {
                    step: step_name.to_string(),
                    attempts,
                    duration_ms,
                });
                Ok(value)
            }
            Err(source) => {
                let error = ExecutionError::new(step_name, attempts, source);
                tracing::error!(step = step_name, attempts, duration_ms, error = %error, "step failed");
                self.events.publish(WorkflowEvent::StepFailed {
                    step: step_name.to_string(),
                    attempts,
                    duration_ms,
                    error: error.message.clone(),
                });
                Err(error)
            }
        }
    }
}
