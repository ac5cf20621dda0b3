//! Pluggable observers notified on every attempt.

use std::time::Duration;

use crate::workflow::error::StepError;

/// Receives attempt-level notifications from the retry loop.
///
/// All methods default to no-ops so observers implement only what they need.
pub trait RetryObserver: Send + Sync {
    /// Before attempt `attempt` (1-based) starts.
    fn before_attempt(&self, _step: &str, _attempt: u32) {}

    /// Attempt `attempt` failed and another will run after `delay`.
    fn on_retry(&self, _step: &str, _attempt: u32, _error: &StepError, _delay: Duration) {}

    /// Attempt `attempt` succeeded.
    fn on_success(&self, _step: &str, _attempt: u32) {}

    /// Attempt `attempt` failed and no further attempts will be made.
    fn on_failure(&self, _step: &str, _attempt: u32, _error: &StepError) {}
}

/// Logs every notification through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl RetryObserver for TracingObserver {
    fn before_attempt(&self, step: &str, attempt: u32) {
        tracing::trace!(step, attempt, "starting attempt");
    }

    fn on_retry(&self, step: &str, attempt: u32, error: &StepError, delay: Duration) {
        tracing::warn!(
            step,
            attempt,
            delay_ms = delay.as_millis() as u64,
            error = %error,
            "attempt failed, will retry"
        );
    }

    fn on_success(&self, step: &str, attempt: u32) {
        if attempt > 1 {
            tracing::debug!(step, attempt, "retry succeeded");
        }
    }

    fn on_failure(&self, step: &str, attempt: u32, error: &StepError) {
        tracing::warn!(step, attempt, error = %error, "attempt failed, giving up");
    }
}
