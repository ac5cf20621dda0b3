//! Shared domain types for Cadence.
//!
//! This crate contains the data shapes used across the workflow engine:
//! step specs, the workflow document, retry configuration, persisted
//! snapshots and sessions, lifecycle events, and completion messages.
//!
//! Zero infrastructure dependencies -- only serde, chrono, thiserror.

pub mod config;
pub mod error;
pub mod event;
pub mod llm;
pub mod retry;
pub mod state;
pub mod step;
pub mod workflow;
