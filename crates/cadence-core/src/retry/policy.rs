//! Immutable retry policy built from declarative configuration.

use std::sync::Arc;
use std::time::Duration;

use cadence_types::retry::{BackoffKind, RetryConfig};
use cadence_types::workflow::StepOverride;

use super::matcher::ErrorMatcher;
use super::observer::RetryObserver;
use super::strategy::{BackoffStrategy, apply_jitter, to_duration};
use crate::workflow::error::StepError;

/// Everything one attempt loop needs to decide whether and when to retry.
#[derive(Clone)]
pub struct RetryPolicy {
    pub strategy: BackoffStrategy,
    /// Retries allowed after the first attempt.
    pub max_attempts: u32,
    pub base_delay: f64,
    pub max_delay: f64,
    pub jitter: bool,
    pub matcher: ErrorMatcher,
    pub observers: Vec<Arc<dyn RetryObserver>>,
    /// Non-idempotent steps are never retried.
    pub idempotent: bool,
    pub no_retry: bool,
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            strategy: BackoffStrategy::None,
            max_attempts: 0,
            base_delay: 0.0,
            max_delay: 0.0,
            jitter: false,
            matcher: ErrorMatcher::Always,
            observers: Vec::new(),
            idempotent: true,
            no_retry: false,
        }
    }

    /// `retries: N` shorthand: N immediate retries on any error.
    pub fn with_retries(retries: u32) -> Self {
        Self {
            max_attempts: retries,
            ..Self::none()
        }
    }

    pub fn from_config(config: &RetryConfig) -> Result<Self, StepError> {
        let matcher = match &config.matcher {
            Some(m) => ErrorMatcher::from_config(m)?,
            None => ErrorMatcher::Always,
        };
        Ok(Self {
            strategy: BackoffStrategy::from_config(config),
            max_attempts: config.max_attempts,
            base_delay: config.base_delay,
            max_delay: config.max_delay,
            jitter: config.jitter && config.strategy != BackoffKind::None,
            matcher,
            observers: Vec::new(),
            idempotent: true,
            no_retry: false,
        })
    }

    /// Effective policy for a step.
    ///
    /// Precedence: the step's `retry` block, then its `retries` shorthand,
    /// then the workflow default. Opt-outs on the step always apply.
    pub fn for_step(
        workflow_default: Option<&RetryConfig>,
        step: Option<&StepOverride>,
    ) -> Result<Self, StepError> {
        let mut policy = match (step.and_then(|s| s.retry.as_ref()), step.and_then(|s| s.retries)) {
            (Some(config), _) => Self::from_config(config)?,
            (None, Some(n)) => Self::with_retries(n),
            (None, None) => match workflow_default {
                Some(config) => Self::from_config(config)?,
                None => Self::none(),
            },
        };
        if let Some(step) = step {
            policy.idempotent = step.idempotent.unwrap_or(true);
            policy.no_retry = step.no_retry;
        }
        Ok(policy)
    }

    pub fn with_observer(mut self, observer: Arc<dyn RetryObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    /// Whether attempt `attempt` (1-based), which failed with `error`, should
    /// be followed by another one.
    pub fn should_retry(&self, error: &StepError, attempt: u32) -> bool {
        if self.no_retry || !self.idempotent || error.is_fatal() {
            return false;
        }
        if attempt > self.max_attempts {
            return false;
        }
        self.matcher.matches(error)
    }

    /// Delay before retry number `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let seconds = self
            .strategy
            .calculate(attempt, self.base_delay, self.max_delay);
        let seconds = if self.jitter { apply_jitter(seconds) } else { seconds };
        to_duration(seconds)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::none()
    }
}

impl std::fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("strategy", &self.strategy)
            .field("max_attempts", &self.max_attempts)
            .field("base_delay", &self.base_delay)
            .field("max_delay", &self.max_delay)
            .field("jitter", &self.jitter)
            .field("matcher", &self.matcher)
            .field("observers", &self.observers.len())
            .field("idempotent", &self.idempotent)
            .field("no_retry", &self.no_retry)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadence_types::error::ErrorKind;
    use cadence_types::retry::MatcherConfig;

    #[test]
    fn attempt_bound() {
        let policy = RetryPolicy::with_retries(2);
        let err = StepError::execution("boom");
        assert!(policy.should_retry(&err, 1));
        assert!(policy.should_retry(&err, 2));
        assert!(!policy.should_retry(&err, 3));
    }

    #[test]
    fn non_idempotent_is_never_retried() {
        let step = StepOverride {
            retries: Some(5),
            idempotent: Some(false),
            ..Default::default()
        };
        let policy = RetryPolicy::for_step(None, Some(&step)).unwrap();
        assert!(!policy.should_retry(&StepError::Timeout, 1));
    }

    #[test]
    fn no_retry_overrides_workflow_default() {
        let step = StepOverride {
            no_retry: true,
            ..Default::default()
        };
        let policy = RetryPolicy::for_step(Some(&RetryConfig::default()), Some(&step)).unwrap();
        assert_eq!(policy.max_attempts, 3);
        assert!(!policy.should_retry(&StepError::Timeout, 1));
    }

    #[test]
    fn fatal_errors_skip_retry() {
        let policy = RetryPolicy::with_retries(3);
        assert!(!policy.should_retry(&StepError::Configuration("bad".into()), 1));
    }

    #[test]
    fn matcher_filters_errors() {
        let config = RetryConfig {
            matcher: Some(MatcherConfig {
                errors: vec![ErrorKind::Timeout],
                ..Default::default()
            }),
            ..Default::default()
        };
        let policy = RetryPolicy::from_config(&config).unwrap();
        assert!(policy.should_retry(&StepError::Timeout, 1));
        assert!(!policy.should_retry(&StepError::execution("nope"), 1));
    }

    #[test]
    fn step_block_beats_shorthand_and_default() {
        let step = StepOverride {
            retries: Some(9),
            retry: Some(RetryConfig {
                max_attempts: 1,
                ..Default::default()
            }),
            ..Default::default()
        };
        let policy = RetryPolicy::for_step(Some(&RetryConfig::default()), Some(&step)).unwrap();
        assert_eq!(policy.max_attempts, 1);
    }

    #[test]
    fn delays_follow_strategy() {
        let policy = RetryPolicy::from_config(&RetryConfig {
            base_delay: 1.0,
            max_delay: 5.0,
            ..Default::default()
        })
        .unwrap();
        let delays: Vec<u64> = (1..=5).map(|n| policy.delay_for(n).as_secs()).collect();
        assert_eq!(delays, vec![1, 2, 4, 5, 5]);
    }
}
