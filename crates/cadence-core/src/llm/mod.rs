//! Completion client abstractions.
//!
//! - `CompletionClient`: RPITIT trait for concrete backends
//! - `BoxCompletionClient`: object-safe wrapper for dynamic dispatch

pub mod box_client;
pub mod client;

pub use box_client::BoxCompletionClient;
pub use client::CompletionClient;
