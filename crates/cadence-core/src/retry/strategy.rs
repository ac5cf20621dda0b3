//! Backoff strategies.

use std::time::Duration;

use rand::Rng;

use cadence_types::retry::{BackoffKind, RetryConfig};

/// Jitter band applied symmetrically around the capped delay.
const JITTER_FRACTION: f64 = 0.10;

/// How the delay grows between attempts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BackoffStrategy {
    /// `base * multiplier^(n-1)`.
    Exponential { multiplier: f64 },
    /// `base + increment * (n-1)`.
    Linear { increment: f64 },
    /// Always `base`.
    Constant,
    /// No delay.
    None,
}

impl BackoffStrategy {
    pub fn from_config(config: &RetryConfig) -> Self {
        match config.strategy {
            BackoffKind::Exponential => BackoffStrategy::Exponential {
                multiplier: config.multiplier,
            },
            BackoffKind::Linear => BackoffStrategy::Linear {
                increment: config.increment,
            },
            BackoffKind::Constant => BackoffStrategy::Constant,
            BackoffKind::None => BackoffStrategy::None,
        }
    }

    /// Delay in seconds before retry number `attempt` (1-based), capped at
    /// `max_delay`.
    pub fn calculate(&self, attempt: u32, base_delay: f64, max_delay: f64) -> f64 {
        let n = attempt.max(1) - 1;
        let raw = match self {
            BackoffStrategy::Exponential { multiplier } => {
                base_delay * multiplier.powi(n.min(i32::MAX as u32) as i32)
            }
            BackoffStrategy::Linear { increment } => base_delay + increment * n as f64,
            BackoffStrategy::Constant => base_delay,
            BackoffStrategy::None => 0.0,
        };
        if raw.is_finite() {
            raw.clamp(0.0, max_delay.max(0.0))
        } else {
            max_delay.max(0.0)
        }
    }
}

/// Spread `delay` uniformly within +/-10%.
pub fn apply_jitter(delay: f64) -> f64 {
    if delay <= 0.0 {
        return 0.0;
    }
    let spread = delay * JITTER_FRACTION;
    let offset = rand::thread_rng().gen_range(-spread..=spread);
    (delay + offset).max(0.0)
}

/// Convert fractional seconds into a `Duration`.
pub fn to_duration(seconds: f64) -> Duration {
    Duration::from_secs_f64(seconds.max(0.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exponential_is_monotonic_then_clamped() {
        let strategy = BackoffStrategy::Exponential { multiplier: 2.0 };
        let delays: Vec<f64> = (1..=6).map(|n| strategy.calculate(n, 1.0, 5.0)).collect();
        assert_eq!(delays, vec![1.0, 2.0, 4.0, 5.0, 5.0, 5.0]);
    }

    #[test]
    fn linear_adds_increment() {
        let strategy = BackoffStrategy::Linear { increment: 0.5 };
        assert_eq!(strategy.calculate(1, 1.0, 10.0), 1.0);
        assert_eq!(strategy.calculate(3, 1.0, 10.0), 2.0);
        assert_eq!(strategy.calculate(100, 1.0, 10.0), 10.0);
    }

    #[test]
    fn constant_and_none() {
        assert_eq!(BackoffStrategy::Constant.calculate(7, 2.5, 60.0), 2.5);
        assert_eq!(BackoffStrategy::None.calculate(7, 2.5, 60.0), 0.0);
    }

    #[test]
    fn huge_exponent_saturates_at_max() {
        let strategy = BackoffStrategy::Exponential { multiplier: 10.0 };
        assert_eq!(strategy.calculate(5000, 1.0, 30.0), 30.0);
    }

    #[test]
    fn jitter_stays_within_ten_percent() {
        for _ in 0..200 {
            let d = apply_jitter(10.0);
            assert!((9.0..=11.0).contains(&d), "{d} out of band");
        }
        assert_eq!(apply_jitter(0.0), 0.0);
    }

    #[test]
    fn builds_from_config() {
        let config = RetryConfig {
            strategy: BackoffKind::Linear,
            increment: 3.0,
            ..Default::default()
        };
        assert_eq!(
            BackoffStrategy::from_config(&config),
            BackoffStrategy::Linear { increment: 3.0 }
        );
    }
}
