use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Coarse classification of a step failure, used by retry matchers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Configuration,
    NotFound,
    Execution,
    Command,
    Timeout,
    RateLimited,
    Server,
    Transport,
    Authentication,
    InvalidResponse,
    Agent,
    Input,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorKind::Configuration => "configuration",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Execution => "execution",
            ErrorKind::Command => "command",
            ErrorKind::Timeout => "timeout",
            ErrorKind::RateLimited => "rate_limited",
            ErrorKind::Server => "server",
            ErrorKind::Transport => "transport",
            ErrorKind::Authentication => "authentication",
            ErrorKind::InvalidResponse => "invalid_response",
            ErrorKind::Agent => "agent",
            ErrorKind::Input => "input",
        };
        f.write_str(s)
    }
}

/// Errors from repository operations (used by trait definitions in cadence-core).
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database connection error")]
    Connection,

    #[error("query error: {0}")]
    Query(String),

    #[error("filesystem error: {0}")]
    Io(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("entity not found")]
    NotFound,
}

impl From<std::io::Error> for RepositoryError {
    fn from(e: std::io::Error) -> Self {
        RepositoryError::Io(e.to_string())
    }
}

impl From<serde_json::Error> for RepositoryError {
    fn from(e: serde_json::Error) -> Self {
        RepositoryError::Serialization(e.to_string())
    }
}

/// A malformed session timestamp or resume request.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid session timestamp '{0}': expected YYYYMMDD_HHMMSS_LLL")]
pub struct InvalidTimestamp(pub String);
