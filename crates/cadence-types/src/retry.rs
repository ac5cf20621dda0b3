//! Declarative retry configuration.
//!
//! Retry policies are written in the workflow document either at the top
//! level (the default for every step) or inside a per-step override block:
//!
//! ```yaml
//! retry:
//!   strategy: exponential
//!   max_attempts: 3
//!   base_delay: 1.0
//!   max_delay: 30.0
//!   jitter: true
//!   match:
//!     errors: [timeout, rate_limited]
//!     status_codes: [502, 503]
//! ```

use serde::{Deserialize, Serialize};

use crate::error::ErrorKind;

/// Backoff strategy applied between attempts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffKind {
    #[default]
    Exponential,
    Linear,
    Constant,
    /// Retry immediately.
    None,
}

/// Retry configuration for a step (or the workflow default).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default)]
    pub strategy: BackoffKind,
    /// Number of retries after the first attempt.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Base delay in seconds.
    #[serde(default = "default_base_delay")]
    pub base_delay: f64,
    /// Upper bound on any single delay, in seconds.
    #[serde(default = "default_max_delay")]
    pub max_delay: f64,
    /// Growth factor for exponential backoff.
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
    /// Per-attempt increment for linear backoff, in seconds.
    #[serde(default = "default_increment")]
    pub increment: f64,
    /// Apply +/-10% jitter after capping.
    #[serde(default)]
    pub jitter: bool,
    /// Which errors are retryable. Absent means every error matches.
    #[serde(default, rename = "match", skip_serializing_if = "Option::is_none")]
    pub matcher: Option<MatcherConfig>,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay() -> f64 {
    1.0
}

fn default_max_delay() -> f64 {
    60.0
}

fn default_multiplier() -> f64 {
    2.0
}

fn default_increment() -> f64 {
    1.0
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            strategy: BackoffKind::default(),
            max_attempts: default_max_attempts(),
            base_delay: default_base_delay(),
            max_delay: default_max_delay(),
            multiplier: default_multiplier(),
            increment: default_increment(),
            jitter: false,
            matcher: None,
        }
    }
}

/// Declarative error matcher.
///
/// Each populated criterion becomes one predicate; `mode` decides whether all
/// of them or any of them must hold.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MatcherConfig {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<ErrorKind>,
    /// Regular expression matched against the error message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub status_codes: Vec<u16>,
    #[serde(default)]
    pub mode: MatchMode,
}

/// How multiple matcher criteria combine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMode {
    #[default]
    Any,
    All,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_from_empty_yaml() {
        let config: RetryConfig = serde_yaml_ng::from_str("{}").unwrap();
        assert_eq!(config, RetryConfig::default());
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.strategy, BackoffKind::Exponential);
    }

    #[test]
    fn parses_matcher_block() {
        let yaml = r#"
strategy: linear
max_attempts: 5
match:
  errors: [timeout, rate_limited]
  message: "overloaded"
  status_codes: [503]
  mode: all
"#;
        let config: RetryConfig = serde_yaml_ng::from_str(yaml).unwrap();
        assert_eq!(config.strategy, BackoffKind::Linear);
        let matcher = config.matcher.unwrap();
        assert_eq!(matcher.errors, vec![ErrorKind::Timeout, ErrorKind::RateLimited]);
        assert_eq!(matcher.status_codes, vec![503]);
        assert_eq!(matcher.mode, MatchMode::All);
    }
}
