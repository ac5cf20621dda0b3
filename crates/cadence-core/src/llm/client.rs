//! CompletionClient trait definition.
//!
//! This is the abstraction every language-model backend implements. The
//! engine only ever needs one thing from it: send the transcript, get a reply.

use cadence_types::llm::{CompletionError, CompletionRequest, CompletionResponse};

/// Trait for completion backends.
///
/// Uses native async fn in traits (RPITIT, Rust 2024 edition). Wrap an
/// implementation in [`BoxCompletionClient`](super::box_client::BoxCompletionClient)
/// for dynamic dispatch.
///
/// Implementations live in cadence-infra (e.g., `AnthropicClient`).
pub trait CompletionClient: Send + Sync {
    /// Human-readable backend name (e.g., "anthropic").
    fn name(&self) -> &str;

    /// Send a completion request and receive the full response.
    fn complete(
        &self,
        request: &CompletionRequest,
    ) -> impl std::future::Future<Output = Result<CompletionResponse, CompletionError>> + Send;
}
