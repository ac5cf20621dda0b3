//! Engine configuration loader and state backend selection.
//!
//! Reads `cadence.toml` from the data directory and deserializes it into
//! [`EngineConfig`]. Falls back to defaults when the file is missing or
//! malformed, then applies environment overrides.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use secrecy::SecretString;

use cadence_core::repository::BoxStateRepository;
use cadence_types::config::{EngineConfig, StateBackend};
use cadence_types::error::RepositoryError;

use crate::filesystem::{self, FileStateRepository};
use crate::sqlite::pool::{DatabasePool, default_database_url};
use crate::sqlite::state::SqliteStateRepository;

pub const CONFIG_FILE: &str = "cadence.toml";
pub const STATE_BACKEND_ENV: &str = "CADENCE_STATE_BACKEND";
pub const API_KEY_ENV: &str = "CADENCE_API_KEY";

/// Load `{data_dir}/cadence.toml`.
///
/// - Missing file: [`EngineConfig::default()`].
/// - Unreadable or malformed file: logs a warning and returns the default.
pub async fn load_engine_config(data_dir: &Path) -> EngineConfig {
    let config_path = data_dir.join(CONFIG_FILE);

    let content = match tokio::fs::read_to_string(&config_path).await {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No {CONFIG_FILE} found at {}, using defaults", config_path.display());
            return EngineConfig::default();
        }
        Err(err) => {
            tracing::warn!("Failed to read {}: {err}, using defaults", config_path.display());
            return EngineConfig::default();
        }
    };

    match toml::from_str::<EngineConfig>(&content) {
        Ok(config) => config,
        Err(err) => {
            tracing::warn!("Failed to parse {}: {err}, using defaults", config_path.display());
            EngineConfig::default()
        }
    }
}

/// Apply `CADENCE_STATE_BACKEND` from `env`. The data directory override is
/// handled by [`filesystem::resolve_data_dir`].
pub fn apply_env_overrides(mut config: EngineConfig, env: impl Fn(&str) -> Option<String>) -> EngineConfig {
    if let Some(raw) = env(STATE_BACKEND_ENV) {
        match raw.parse::<StateBackend>() {
            Ok(backend) => config.state_backend = backend,
            Err(e) => tracing::warn!("Ignoring {STATE_BACKEND_ENV}: {e}"),
        }
    }
    config
}

/// Resolve the data directory, load the config file and apply environment
/// overrides. The returned config always has `data_dir` set.
pub async fn resolve_engine_config() -> EngineConfig {
    let data_dir = filesystem::resolve_data_dir();
    let mut config = load_engine_config(&data_dir).await;
    if config.data_dir.is_none() {
        config.data_dir = Some(data_dir);
    }
    apply_env_overrides(config, |key| std::env::var(key).ok())
}

/// Completion API key from `CADENCE_API_KEY`, falling back to
/// `ANTHROPIC_API_KEY`.
pub fn api_key_from_env() -> Option<SecretString> {
    [API_KEY_ENV, "ANTHROPIC_API_KEY"]
        .into_iter()
        .filter_map(|key| std::env::var(key).ok())
        .find(|value| !value.trim().is_empty())
        .map(SecretString::from)
}

fn data_dir(config: &EngineConfig) -> PathBuf {
    config
        .data_dir
        .clone()
        .unwrap_or_else(filesystem::resolve_data_dir)
}

/// Build the configured state backend. Called once per engine; everything
/// downstream sees only the type-erased repository.
pub async fn build_state_repository(config: &EngineConfig) -> Result<Arc<BoxStateRepository>, RepositoryError> {
    let data_dir = data_dir(config);
    let repo = match config.state_backend {
        StateBackend::File => {
            let root = filesystem::state_root(&data_dir);
            tracing::debug!(root = %root.display(), "using file state backend");
            BoxStateRepository::new(FileStateRepository::new(root))
        }
        StateBackend::Sqlite => {
            tokio::fs::create_dir_all(&data_dir).await?;
            let url = config
                .database_url
                .clone()
                .unwrap_or_else(|| default_database_url(&data_dir));
            tracing::debug!(url = %url, "using sqlite state backend");
            let pool = DatabasePool::new(&url)
                .await
                .map_err(|e| RepositoryError::Query(format!("cannot open {url}: {e}")))?;
            BoxStateRepository::new(SqliteStateRepository::new(pool))
        }
    };
    Ok(Arc::new(repo))
}
