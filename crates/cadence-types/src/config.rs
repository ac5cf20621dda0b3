//! Engine configuration types.
//!
//! `EngineConfig` is the `cadence.toml` in the data directory. It picks the
//! state backend and supplies defaults for the completion and agent
//! collaborators. Every field has a default, so an empty file is valid.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Where execution state is persisted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StateBackend {
    /// One JSON file per snapshot under `<data_dir>/state/`.
    #[default]
    File,
    /// `sessions`, `snapshots` and `session_events` tables.
    Sqlite,
}

impl fmt::Display for StateBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StateBackend::File => write!(f, "file"),
            StateBackend::Sqlite => write!(f, "sqlite"),
        }
    }
}

impl FromStr for StateBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "file" | "files" => Ok(StateBackend::File),
            "sqlite" | "db" => Ok(StateBackend::Sqlite),
            other => Err(format!("unknown state backend '{other}' (expected file or sqlite)")),
        }
    }
}

/// Top-level engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub state_backend: StateBackend,

    /// Root for state files and the database. Resolved from the environment
    /// when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,

    /// Overrides the default `sqlite://<data_dir>/cadence.db`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_url: Option<String>,

    /// Model used when neither a step nor its workflow names one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_model: Option<String>,

    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    /// Command the prompt of `^agent` steps is piped to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_command: Option<String>,

    /// Wall-clock limit for command steps, in seconds.
    #[serde(default = "default_command_timeout_secs")]
    pub command_timeout_secs: u64,
}

fn default_api_base_url() -> String {
    "https://api.anthropic.com".to_string()
}

fn default_command_timeout_secs() -> u64 {
    600
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            state_backend: StateBackend::default(),
            data_dir: None,
            database_url: None,
            default_model: None,
            api_base_url: default_api_base_url(),
            agent_command: None,
            command_timeout_secs: default_command_timeout_secs(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_values() {
        let config = EngineConfig::default();
        assert_eq!(config.state_backend, StateBackend::File);
        assert_eq!(config.api_base_url, "https://api.anthropic.com");
        assert_eq!(config.command_timeout_secs, 600);
    }

    #[test]
    fn deserialize_with_values() {
        let config: EngineConfig = serde_json::from_value(serde_json::json!({
            "state_backend": "sqlite",
            "default_model": "claude-haiku-4-5",
            "agent_command": "claude -p",
        }))
        .unwrap();
        assert_eq!(config.state_backend, StateBackend::Sqlite);
        assert_eq!(config.default_model.as_deref(), Some("claude-haiku-4-5"));
        assert_eq!(config.agent_command.as_deref(), Some("claude -p"));
        assert_eq!(config.command_timeout_secs, 600);
    }

    #[test]
    fn backend_parses_from_env_style_strings() {
        assert_eq!("SQLite".parse::<StateBackend>().unwrap(), StateBackend::Sqlite);
        assert_eq!("file".parse::<StateBackend>().unwrap(), StateBackend::File);
        assert!("redis".parse::<StateBackend>().is_err());
    }
}
