//! Workflow engine and collaborator trait definitions for Cadence.
//!
//! This crate defines the engine and the "ports" (repository, completion and
//! collaborator traits) that the infrastructure layer implements. It depends
//! only on `cadence-types` -- never on `cadence-infra` or any database crate.

pub mod collaborator;
pub mod event;
pub mod llm;
pub mod repository;
pub mod retry;
pub mod state;
pub mod workflow;

#[cfg(test)]
pub(crate) mod testing;
