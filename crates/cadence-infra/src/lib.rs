//! Infrastructure layer for Cadence.
//!
//! Contains implementations of the ports defined in `cadence-core`: the
//! flat-file and SQLite state repositories, the Anthropic completion
//! backend, the command-backed agent runner, workflow identity and engine
//! configuration loading.

pub mod agent;
pub mod config;
pub mod filesystem;
pub mod identity;
pub mod llm;
pub mod sqlite;
