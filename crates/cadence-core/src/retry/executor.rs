//! Bounded retry loop with backoff and observer hooks.

use std::future::Future;

use tokio::time::sleep;

use super::policy::RetryPolicy;
use crate::workflow::error::StepError;

/// Run `operation` until it succeeds or `policy` stops retrying.
///
/// Makes at most `policy.max_attempts + 1` calls. When retries are exhausted
/// (or the error does not qualify) the last error is returned unchanged.
pub async fn with_retry<F, Fut, T>(
    policy: &RetryPolicy,
    step: &str,
    mut operation: F,
) -> Result<T, StepError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, StepError>>,
{
    let mut attempt: u32 = 1;
    loop {
        for observer in &policy.observers {
            observer.before_attempt(step, attempt);
        }

        match operation().await {
            Ok(value) => {
                for observer in &policy.observers {
                    observer.on_success(step, attempt);
                }
                return Ok(value);
            }
            Err(error) => {
                if !policy.should_retry(&error, attempt) {
                    for observer in &policy.observers {
                        observer.on_failure(step, attempt, &error);
                    }
                    return Err(error);
                }

                let delay = policy.delay_for(attempt);
                for observer in &policy.observers {
                    observer.on_retry(step, attempt, &error, delay);
                }
                if !delay.is_zero() {
                    sleep(delay).await;
                }
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    use super::*;
    use crate::retry::observer::RetryObserver;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<String>>);

    impl RetryObserver for Recorder {
        fn before_attempt(&self, _step: &str, attempt: u32) {
            self.0.lock().unwrap().push(format!("before:{attempt}"));
        }
        fn on_retry(&self, _step: &str, attempt: u32, _error: &StepError, _delay: Duration) {
            self.0.lock().unwrap().push(format!("retry:{attempt}"));
        }
        fn on_success(&self, _step: &str, attempt: u32) {
            self.0.lock().unwrap().push(format!("success:{attempt}"));
        }
        fn on_failure(&self, _step: &str, attempt: u32, _error: &StepError) {
            self.0.lock().unwrap().push(format!("failure:{attempt}"));
        }
    }

    #[tokio::test]
    async fn always_failing_block_runs_n_plus_one_times() {
        let policy = RetryPolicy::with_retries(3);
        let calls = AtomicU32::new(0);

        let result: Result<(), _> = with_retry(&policy, "flaky", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(StepError::execution("still broken")) }
        })
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 4);
        match result {
            Err(StepError::Execution { message }) => assert_eq!(message, "still broken"),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let policy = RetryPolicy::with_retries(5);
        let calls = AtomicU32::new(0);

        let result = with_retry(&policy, "flaky", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(StepError::Timeout)
                } else {
                    Ok(n)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn non_idempotent_runs_exactly_once() {
        let mut policy = RetryPolicy::with_retries(5);
        policy.idempotent = false;
        let calls = AtomicU32::new(0);

        let result: Result<(), _> = with_retry(&policy, "write", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(StepError::Timeout) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn observers_see_every_transition() {
        let recorder = Arc::new(Recorder::default());
        let policy = RetryPolicy::with_retries(1).with_observer(recorder.clone());
        let calls = AtomicU32::new(0);

        let _ = with_retry(&policy, "step", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move { if n == 0 { Err(StepError::Timeout) } else { Ok(()) } }
        })
        .await;

        let seen = recorder.0.lock().unwrap().clone();
        assert_eq!(seen, vec!["before:1", "retry:1", "before:2", "success:2"]);
    }

    #[tokio::test]
    async fn waits_for_backoff_delay() {
        let policy = RetryPolicy::from_config(&cadence_types::retry::RetryConfig {
            max_attempts: 1,
            base_delay: 0.05,
            ..Default::default()
        })
        .unwrap();
        let started = std::time::Instant::now();
        let calls = AtomicU32::new(0);

        let _: Result<(), _> = with_retry(&policy, "slow", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(StepError::Timeout) }
        })
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(started.elapsed() >= Duration::from_millis(50));
    }
}
