//! Completion backend implementations.
//!
//! Concrete implementations of the
//! [`CompletionClient`](cadence_core::llm::CompletionClient) trait defined in
//! `cadence-core`, plus [`create_client`] which picks one from the engine
//! configuration.

pub mod anthropic;

use secrecy::SecretString;

use cadence_core::llm::{BoxCompletionClient, CompletionClient};
use cadence_types::config::EngineConfig;
use cadence_types::llm::{CompletionError, CompletionRequest, CompletionResponse};

use self::anthropic::AnthropicClient;

/// Stand-in used when no API key is configured.
///
/// Workflows made only of commands still run; the first prompt step fails
/// with [`CompletionError::Authentication`].
pub struct UnconfiguredClient;

impl CompletionClient for UnconfiguredClient {
    fn name(&self) -> &str {
        "unconfigured"
    }

    async fn complete(&self, _request: &CompletionRequest) -> Result<CompletionResponse, CompletionError> {
        tracing::warn!("prompt step needs an API key; set CADENCE_API_KEY or ANTHROPIC_API_KEY");
        Err(CompletionError::Authentication)
    }
}

/// Build the completion backend for `config`.
pub fn create_client(config: &EngineConfig, api_key: Option<SecretString>) -> BoxCompletionClient {
    match api_key {
        Some(key) => {
            let client = AnthropicClient::new(key).with_base_url(config.api_base_url.clone());
            BoxCompletionClient::new(client)
        }
        None => BoxCompletionClient::new(UnconfiguredClient),
    }
}
