//! Anthropic Claude completion backend.
//!
//! [`AnthropicClient`] implements
//! [`CompletionClient`](cadence_core::llm::CompletionClient) over the
//! Anthropic Messages API.

pub mod client;
pub mod types;

pub use client::AnthropicClient;
