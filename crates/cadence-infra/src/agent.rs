//! Agent steps backed by an external command.
//!
//! The configured command line runs through `sh -c` in the workflow
//! directory; the rendered prompt is written to its stdin and its stdout is
//! the step output.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use futures_util::future::BoxFuture;
use tokio::io::AsyncWriteExt;

use cadence_core::collaborator::AgentRunner;
use cadence_core::workflow::error::StepError;

/// [`AgentRunner`] that pipes prompts to a shell command (e.g. `claude -p`).
#[derive(Debug, Clone)]
pub struct CommandAgentRunner {
    command: String,
    timeout: Duration,
}

impl CommandAgentRunner {
    pub fn new(command: impl Into<String>, timeout: Duration) -> Self {
        Self {
            command: command.into(),
            timeout,
        }
    }

    async fn invoke(&self, prompt: &str, cwd: &Path) -> Result<String, StepError> {
        tracing::debug!(command = %self.command, cwd = %cwd.display(), "invoking agent");

        let mut child = tokio::process::Command::new("sh")
            .arg("-c")
            .arg(&self.command)
            .current_dir(cwd)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| StepError::Agent(format!("failed to spawn `{}`: {e}", self.command)))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(prompt.as_bytes()).await.ok();
        }

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| StepError::Timeout)?
            .map_err(|e| StepError::Agent(format!("agent did not finish: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(StepError::Agent(format!(
                "`{}` exited with {}: {}",
                self.command,
                output.status.code().unwrap_or(-1),
                stderr.trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim_end().to_string())
    }
}

impl AgentRunner for CommandAgentRunner {
    fn run<'a>(&'a self, prompt: &'a str, cwd: &'a Path) -> BoxFuture<'a, Result<String, StepError>> {
        Box::pin(self.invoke(prompt, cwd))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn prompt_is_piped_to_the_command() {
        let dir = tempfile::tempdir().unwrap();
        let runner = CommandAgentRunner::new("tr a-z A-Z", Duration::from_secs(5));
        let reply = runner.run("fix the tests\n", dir.path()).await.unwrap();
        assert_eq!(reply, "FIX THE TESTS");
    }

    #[tokio::test]
    async fn non_zero_exit_is_an_agent_error() {
        let dir = tempfile::tempdir().unwrap();
        let runner = CommandAgentRunner::new("echo broken >&2; exit 3", Duration::from_secs(5));
        match runner.run("hi", dir.path()).await {
            Err(StepError::Agent(message)) => {
                assert!(message.contains("exited with 3"), "{message}");
                assert!(message.contains("broken"), "{message}");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn slow_agents_time_out() {
        let dir = tempfile::tempdir().unwrap();
        let runner = CommandAgentRunner::new("sleep 5", Duration::from_millis(100));
        assert!(matches!(runner.run("hi", dir.path()).await, Err(StepError::Timeout)));
    }
}
