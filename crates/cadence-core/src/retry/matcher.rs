//! Error matchers deciding which failures are retryable.

use regex::Regex;

use cadence_types::error::ErrorKind;
use cadence_types::retry::{MatchMode, MatcherConfig};

use crate::workflow::error::StepError;

/// Predicate over step errors.
#[derive(Debug, Clone)]
pub enum ErrorMatcher {
    /// Matches every error.
    Always,
    Kind(Vec<ErrorKind>),
    Message(Regex),
    StatusCode(Vec<u16>),
    All(Vec<ErrorMatcher>),
    Any(Vec<ErrorMatcher>),
}

impl ErrorMatcher {
    /// Build a matcher from its declarative form.
    ///
    /// A config with no criteria matches everything.
    pub fn from_config(config: &MatcherConfig) -> Result<Self, StepError> {
        let mut parts = Vec::new();
        if !config.errors.is_empty() {
            parts.push(ErrorMatcher::Kind(config.errors.clone()));
        }
        if let Some(pattern) = &config.message {
            let re = Regex::new(pattern).map_err(|e| {
                StepError::Configuration(format!("invalid retry message pattern '{pattern}': {e}"))
            })?;
            parts.push(ErrorMatcher::Message(re));
        }
        if !config.status_codes.is_empty() {
            parts.push(ErrorMatcher::StatusCode(config.status_codes.clone()));
        }

        Ok(match (parts.len(), config.mode) {
            (0, _) => ErrorMatcher::Always,
            (1, _) => parts.remove(0),
            (_, MatchMode::All) => ErrorMatcher::All(parts),
            (_, MatchMode::Any) => ErrorMatcher::Any(parts),
        })
    }

    pub fn matches(&self, error: &StepError) -> bool {
        match self {
            ErrorMatcher::Always => true,
            ErrorMatcher::Kind(kinds) => kinds.contains(&error.kind()),
            ErrorMatcher::Message(re) => re.is_match(&error.to_string()),
            ErrorMatcher::StatusCode(codes) => {
                error.status_code().is_some_and(|c| codes.contains(&c))
            }
            ErrorMatcher::All(ms) => ms.iter().all(|m| m.matches(error)),
            ErrorMatcher::Any(ms) => ms.iter().any(|m| m.matches(error)),
        }
    }
}

impl Default for ErrorMatcher {
    fn default() -> Self {
        ErrorMatcher::Always
    }
}
