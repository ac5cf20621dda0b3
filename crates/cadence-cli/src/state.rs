//! Application state wiring the engine's collaborators together.
//!
//! AppState resolves the engine configuration once and pins every port the
//! engine needs to a concrete infra implementation. Commands only ever see
//! the type-erased handles.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;

use cadence_core::collaborator::{AgentRunner, CommandRunner, NoAgentRunner, ShellCommandRunner};
use cadence_core::llm::BoxCompletionClient;
use cadence_core::repository::BoxStateRepository;
use cadence_infra::agent::CommandAgentRunner;
use cadence_infra::config::{api_key_from_env, build_state_repository, resolve_engine_config};
use cadence_infra::filesystem::resolve_data_dir;
use cadence_infra::llm::create_client;
use cadence_types::config::EngineConfig;

/// Shared application state used by every CLI command.
#[derive(Clone)]
pub struct AppState {
    pub config: EngineConfig,
    pub data_dir: PathBuf,
    pub repository: Arc<BoxStateRepository>,
    pub completion: Arc<BoxCompletionClient>,
    pub commands: Arc<dyn CommandRunner>,
    pub agent: Arc<dyn AgentRunner>,
}

impl AppState {
    /// Load configuration and open the configured state backend.
    pub async fn init() -> anyhow::Result<Self> {
        let config = resolve_engine_config().await;
        let data_dir = config.data_dir.clone().unwrap_or_else(resolve_data_dir);

        tokio::fs::create_dir_all(&data_dir)
            .await
            .with_context(|| format!("cannot create data directory {}", data_dir.display()))?;

        let repository = build_state_repository(&config)
            .await
            .with_context(|| format!("cannot open {} state backend", config.state_backend))?;

        let timeout = Duration::from_secs(config.command_timeout_secs);
        let completion = Arc::new(create_client(&config, api_key_from_env()));
        let commands: Arc<dyn CommandRunner> = Arc::new(ShellCommandRunner::new(timeout));
        let agent: Arc<dyn AgentRunner> = match config.agent_command.as_deref() {
            Some(command) if !command.trim().is_empty() => {
                Arc::new(CommandAgentRunner::new(command, timeout))
            }
            _ => Arc::new(NoAgentRunner),
        };

        tracing::debug!(
            data_dir = %data_dir.display(),
            backend = %config.state_backend,
            completion = completion.name(),
            "application state initialized"
        );

        Ok(Self {
            config,
            data_dir,
            repository,
            completion,
            commands,
            agent,
        })
    }
}
