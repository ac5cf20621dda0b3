//! Collaborator seams the engine calls out through.
//!
//! The engine never spawns processes, talks to agents or prompts a human
//! directly; it goes through these traits so hosts (and tests) can swap the
//! implementation. The completion seam lives in [`crate::llm`].

pub mod agent;
pub mod command;
pub mod input;

pub use agent::{AgentRunner, NoAgentRunner};
pub use command::{CommandOutput, CommandRunner, ShellCommandRunner};
pub use input::{DeferredInput, InputAnswer, InputProvider};
