//! AnthropicClient -- [`CompletionClient`] implementation for Anthropic Claude.
//!
//! Sends non-streaming requests to the Anthropic Messages API
//! (`/v1/messages`). HTTP failures are mapped onto [`CompletionError`] so the
//! retry layer can tell transient failures from permanent ones.
//!
//! The API key is wrapped in [`secrecy::SecretString`] and is never logged
//! or included in `Debug` output.

use std::time::Duration;

use reqwest::StatusCode;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use secrecy::{ExposeSecret, SecretString};

use cadence_core::llm::CompletionClient;
use cadence_types::llm::{
    CompletionError, CompletionRequest, CompletionResponse, MessageRole, Usage,
};

use super::types::{AnthropicMessage, AnthropicRequest, AnthropicResponse, ErrorPayload};

const JSON_INSTRUCTION: &str = "Respond with a single valid JSON value and nothing else.";

/// Anthropic Claude completion backend.
pub struct AnthropicClient {
    client: reqwest::Client,
    api_key: SecretString,
    base_url: String,
    timeout: Duration,
}

impl AnthropicClient {
    /// The Anthropic API version header value.
    const API_VERSION: &'static str = "2023-06-01";

    pub fn new(api_key: SecretString) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            base_url: "https://api.anthropic.com".to_string(),
            // Long generations routinely take minutes.
            timeout: Duration::from_secs(300),
        }
    }

    /// Override the base URL (proxies, gateways, tests).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Convert a generic [`CompletionRequest`] into an [`AnthropicRequest`].
    ///
    /// System-role transcript entries are folded into the top-level `system`
    /// field, which is where the Messages API expects them.
    fn to_anthropic_request(&self, request: &CompletionRequest) -> AnthropicRequest {
        let mut system: Vec<&str> = request.system.iter().map(String::as_str).collect();
        let mut messages = Vec::with_capacity(request.messages.len());
        for message in &request.messages {
            match message.role {
                MessageRole::System => system.push(&message.content),
                role => messages.push(AnthropicMessage {
                    role: role.to_string(),
                    content: message.content.clone(),
                }),
            }
        }
        if request.json {
            system.push(JSON_INSTRUCTION);
        }
        if !request.tools.is_empty() {
            tracing::debug!(
                tools = ?request.tools,
                "tool names are not forwarded to the messages API"
            );
        }

        AnthropicRequest {
            model: request.model.clone(),
            max_tokens: request.max_tokens,
            messages,
            system: (!system.is_empty()).then(|| system.join("\n\n")),
            temperature: request.temperature,
        }
    }
}

// No Debug derive: keeps the key out of any accidental `{:?}`.

impl CompletionClient for AnthropicClient {
    fn name(&self) -> &str {
        "anthropic"
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse, CompletionError> {
        let body = self.to_anthropic_request(request);
        let url = self.url("/v1/messages");

        tracing::debug!(model = %body.model, messages = body.messages.len(), "sending completion request");

        let response = self
            .client
            .post(&url)
            .timeout(self.timeout)
            .header("x-api-key", self.api_key.expose_secret())
            .header("anthropic-version", Self::API_VERSION)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    CompletionError::Timeout
                } else {
                    CompletionError::Transport(format!("HTTP request failed: {e}"))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let retry_after_ms = retry_after_ms(response.headers());
            let error_body = response.text().await.unwrap_or_default();
            return Err(map_status(status, retry_after_ms, &error_body));
        }

        let parsed: AnthropicResponse = response
            .json()
            .await
            .map_err(|e| CompletionError::InvalidResponse(format!("failed to parse response: {e}")))?;

        tracing::debug!(
            id = %parsed.id,
            stop_reason = parsed.stop_reason.as_deref().unwrap_or("none"),
            input_tokens = parsed.usage.input_tokens,
            output_tokens = parsed.usage.output_tokens,
            "completion received"
        );

        Ok(CompletionResponse {
            content: parsed.text(),
            model: parsed.model,
            usage: Usage {
                input_tokens: parsed.usage.input_tokens,
                output_tokens: parsed.usage.output_tokens,
            },
        })
    }
}

/// `Retry-After` in milliseconds, when the header carries delta-seconds.
fn retry_after_ms(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|secs| *secs >= 0.0)
        .map(|secs| (secs * 1000.0) as u64)
}

fn map_status(status: StatusCode, retry_after_ms: Option<u64>, body: &str) -> CompletionError {
    let message = serde_json::from_str::<ErrorPayload>(body)
        .map(|payload| payload.error.message)
        .unwrap_or_else(|_| body.to_string());

    match status.as_u16() {
        401 | 403 => CompletionError::Authentication,
        408 => CompletionError::Timeout,
        429 => CompletionError::RateLimited { retry_after_ms },
        code => CompletionError::Server { status: code, message },
    }
}
