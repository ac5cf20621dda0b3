//! Subprocess execution for command steps, script steps and `$(...)`
//! sub-expressions.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use futures_util::future::BoxFuture;
use tokio::io::AsyncWriteExt;

use crate::workflow::error::StepError;

/// Default wall-clock limit for a single subprocess.
const DEFAULT_COMMAND_TIMEOUT_SECS: u64 = 600;

/// Captured result of a finished subprocess.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit status; `-1` when the process was killed by a signal.
    pub status: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status == 0
    }

    /// Stdout followed by stderr, trimmed.
    pub fn combined(&self) -> String {
        let mut out = self.stdout.trim_end().to_string();
        let stderr = self.stderr.trim_end();
        if !stderr.is_empty() {
            if !out.is_empty() {
                out.push('\n');
            }
            out.push_str(stderr);
        }
        out
    }
}

/// Runs shell commands and interpreter scripts.
///
/// A non-zero exit is NOT an error at this layer: callers decide whether to
/// raise or annotate. Only spawn failures and timeouts are errors.
pub trait CommandRunner: Send + Sync {
    /// Run `command` through the shell in `cwd`.
    fn run<'a>(&'a self, command: &'a str, cwd: &'a Path) -> BoxFuture<'a, Result<CommandOutput, StepError>>;

    /// Run `script` with `interpreter`, writing `stdin` to the child.
    fn run_script<'a>(
        &'a self,
        interpreter: &'a str,
        script: &'a Path,
        stdin: &'a str,
        cwd: &'a Path,
    ) -> BoxFuture<'a, Result<CommandOutput, StepError>>;
}

/// `CommandRunner` backed by `tokio::process`.
#[derive(Debug, Clone)]
pub struct ShellCommandRunner {
    timeout: Duration,
}

impl ShellCommandRunner {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    async fn spawn(
        &self,
        mut command: tokio::process::Command,
        label: &str,
        stdin: Option<&str>,
    ) -> Result<CommandOutput, StepError> {
        command
            .stdin(if stdin.is_some() { Stdio::piped() } else { Stdio::null() })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = command
            .spawn()
            .map_err(|e| StepError::execution(format!("failed to spawn `{label}`: {e}")))?;

        if let (Some(input), Some(mut pipe)) = (stdin, child.stdin.take()) {
            // A child that exits without reading stdin closes the pipe early.
            pipe.write_all(input.as_bytes()).await.ok();
        }

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| StepError::Timeout)?
            .map_err(|e| StepError::execution(format!("failed to wait for `{label}`: {e}")))?;

        Ok(CommandOutput {
            status: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

impl Default for ShellCommandRunner {
    fn default() -> Self {
        Self::new(Duration::from_secs(DEFAULT_COMMAND_TIMEOUT_SECS))
    }
}

impl CommandRunner for ShellCommandRunner {
    fn run<'a>(&'a self, command: &'a str, cwd: &'a Path) -> BoxFuture<'a, Result<CommandOutput, StepError>> {
        Box::pin(async move {
            tracing::debug!(command, cwd = %cwd.display(), "running command");
            let mut cmd = tokio::process::Command::new("sh");
            cmd.arg("-c").arg(command).current_dir(cwd);
            self.spawn(cmd, command, None).await
        })
    }

    fn run_script<'a>(
        &'a self,
        interpreter: &'a str,
        script: &'a Path,
        stdin: &'a str,
        cwd: &'a Path,
    ) -> BoxFuture<'a, Result<CommandOutput, StepError>> {
        Box::pin(async move {
            tracing::debug!(interpreter, script = %script.display(), "running script");
            let mut cmd = tokio::process::Command::new(interpreter);
            cmd.arg(script).current_dir(cwd);
            let label = script.display().to_string();
            self.spawn(cmd, &label, Some(stdin)).await
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn captures_stdout_and_status() {
        let runner = ShellCommandRunner::default();
        let dir = tempfile::tempdir().unwrap();

        let ok = runner.run("echo hello", dir.path()).await.unwrap();
        assert!(ok.success());
        assert_eq!(ok.stdout.trim(), "hello");

        let failed = runner.run("echo oops >&2; exit 3", dir.path()).await.unwrap();
        assert_eq!(failed.status, 3);
        assert_eq!(failed.combined(), "oops");
    }

    #[tokio::test]
    async fn script_receives_stdin() {
        let runner = ShellCommandRunner::default();
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("echo.sh");
        std::fs::write(&script, "cat\n").unwrap();

        let out = runner
            .run_script("bash", &script, "{\"k\":1}", dir.path())
            .await
            .unwrap();
        assert_eq!(out.stdout, "{\"k\":1}");
    }

    #[tokio::test]
    async fn times_out() {
        let runner = ShellCommandRunner::new(Duration::from_millis(50));
        let dir = tempfile::tempdir().unwrap();
        let err = runner.run("sleep 5", dir.path()).await.unwrap_err();
        assert!(matches!(err, StepError::Timeout));
    }
}
