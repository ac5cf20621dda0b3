use std::path::Path;

use futures_util::future::BoxFuture;

use crate::workflow::error::StepError;

/// Hands a rendered prompt to an external coding agent and returns its
/// final reply.
pub trait AgentRunner: Send + Sync {
    fn run<'a>(&'a self, prompt: &'a str, cwd: &'a Path) -> BoxFuture<'a, Result<String, StepError>>;
}

/// Runner used when no agent is configured: every call fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoAgentRunner;

impl AgentRunner for NoAgentRunner {
    fn run<'a>(&'a self, _prompt: &'a str, _cwd: &'a Path) -> BoxFuture<'a, Result<String, StepError>> {
        Box::pin(async { Err(StepError::Agent("no agent command configured".into())) })
    }
}
