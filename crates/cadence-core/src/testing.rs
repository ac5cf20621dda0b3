//! In-memory collaborators for engine tests.

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use futures_util::future::BoxFuture;
use serde_json::Value;

use cadence_types::error::RepositoryError;
use cadence_types::llm::{CompletionError, CompletionRequest, CompletionResponse, Usage};
use cadence_types::state::{
    ExecutionSnapshot, Session, SessionEvent, SessionFilter, SessionRef, SessionStatus,
    SessionTimestamp, WorkflowIdentity,
};
use cadence_types::step::InputSpec;

use crate::collaborator::{AgentRunner, CommandOutput, CommandRunner, InputAnswer, InputProvider};
use crate::llm::CompletionClient;
use crate::repository::StateRepository;
use crate::workflow::classifier::input_name;
use crate::workflow::definition::{Workflow, parse_workflow_yaml};
use crate::workflow::error::StepError;

pub fn test_identity(name: &str) -> WorkflowIdentity {
    WorkflowIdentity {
        name: name.to_string(),
        path: format!("/workflows/{name}/workflow.yml"),
        key: format!("{name}_0123456789ab"),
    }
}

pub fn test_session(name: &str) -> SessionRef {
    SessionRef::new(test_identity(name), SessionTimestamp::now())
}

/// Parse `yaml` into a workflow rooted at `dir`.
pub fn test_workflow(dir: &Path, yaml: &str) -> Workflow {
    let config = parse_workflow_yaml(yaml).unwrap();
    let identity = test_identity(&config.name);
    Workflow::new(config, dir.join("workflow.yml"), identity)
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

/// Records every command; replies from canned responses, else success with
/// empty output.
#[derive(Debug, Default, Clone)]
pub struct RecordingCommandRunner {
    responses: HashMap<String, CommandOutput>,
    commands: Arc<Mutex<Vec<String>>>,
}

impl RecordingCommandRunner {
    pub fn with_response(mut self, command: &str, status: i32, stdout: &str) -> Self {
        self.responses.insert(
            command.to_string(),
            CommandOutput {
                status,
                stdout: stdout.to_string(),
                stderr: String::new(),
            },
        );
        self
    }

    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().unwrap().clone()
    }

    fn reply(&self, command: String) -> CommandOutput {
        let output = self.responses.get(&command).cloned().unwrap_or(CommandOutput {
            status: 0,
            stdout: String::new(),
            stderr: String::new(),
        });
        self.commands.lock().unwrap().push(command);
        output
    }
}

impl CommandRunner for RecordingCommandRunner {
    fn run<'a>(&'a self, command: &'a str, _cwd: &'a Path) -> BoxFuture<'a, Result<CommandOutput, StepError>> {
        let output = self.reply(command.to_string());
        Box::pin(async move { Ok(output) })
    }

    fn run_script<'a>(
        &'a self,
        interpreter: &'a str,
        script: &'a Path,
        _stdin: &'a str,
        _cwd: &'a Path,
    ) -> BoxFuture<'a, Result<CommandOutput, StepError>> {
        let output = self.reply(format!("{interpreter} {}", script.display()));
        Box::pin(async move { Ok(output) })
    }
}

// ---------------------------------------------------------------------------
// Completion
// ---------------------------------------------------------------------------

/// Replies from a queue; once the queue is empty every reply is `"ok"`.
#[derive(Debug, Default, Clone)]
pub struct ScriptedCompletionClient {
    replies: Arc<Mutex<VecDeque<Result<String, CompletionError>>>>,
    requests: Arc<Mutex<Vec<CompletionRequest>>>,
}

impl ScriptedCompletionClient {
    pub fn reply(self, content: &str) -> Self {
        self.replies.lock().unwrap().push_back(Ok(content.to_string()));
        self
    }

    pub fn fail(self, error: CompletionError) -> Self {
        self.replies.lock().unwrap().push_back(Err(error));
        self
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Last user message of every request, in order.
    pub fn prompts(&self) -> Vec<String> {
        self.requests()
            .iter()
            .filter_map(|r| r.messages.last().map(|m| m.content.clone()))
            .collect()
    }
}

impl CompletionClient for ScriptedCompletionClient {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse, CompletionError> {
        self.requests.lock().unwrap().push(request.clone());
        let reply = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok("ok".to_string()));
        reply.map(|content| CompletionResponse {
            content,
            model: request.model.clone(),
            usage: Usage::default(),
        })
    }
}

// ---------------------------------------------------------------------------
// Agent & input
// ---------------------------------------------------------------------------

/// Echoes the prompt back, recording it.
#[derive(Debug, Default, Clone)]
pub struct EchoAgentRunner {
    pub prompts: Arc<Mutex<Vec<String>>>,
}

impl AgentRunner for EchoAgentRunner {
    fn run<'a>(&'a self, prompt: &'a str, _cwd: &'a Path) -> BoxFuture<'a, Result<String, StepError>> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        Box::pin(async move { Ok(format!("agent: {prompt}")) })
    }
}

/// Answers input steps from a map keyed by step name; unknown names defer.
#[derive(Debug, Default, Clone)]
pub struct ScriptedInput {
    answers: HashMap<String, Value>,
}

impl ScriptedInput {
    pub fn answer(mut self, name: &str, value: Value) -> Self {
        self.answers.insert(name.to_string(), value);
        self
    }
}

impl InputProvider for ScriptedInput {
    fn ask<'a>(&'a self, spec: &'a InputSpec) -> BoxFuture<'a, Result<InputAnswer, StepError>> {
        let answer = self
            .answers
            .get(&input_name(spec))
            .cloned()
            .map(InputAnswer::Value)
            .unwrap_or(InputAnswer::Deferred);
        Box::pin(async move { Ok(answer) })
    }
}

// ---------------------------------------------------------------------------
// State repository
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct Store {
    sessions: Vec<Session>,
    snapshots: HashMap<String, Vec<ExecutionSnapshot>>,
    events: HashMap<String, Vec<SessionEvent>>,
}

/// `StateRepository` kept in memory. `failing()` makes every call error.
#[derive(Debug, Default, Clone)]
pub struct InMemoryStateRepository {
    store: Arc<Mutex<Store>>,
    failing: bool,
}

impl InMemoryStateRepository {
    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::default()
        }
    }

    fn check(&self) -> Result<(), RepositoryError> {
        if self.failing {
            Err(RepositoryError::Connection)
        } else {
            Ok(())
        }
    }

    /// Snapshot step names of `session` in write order.
    pub fn snapshot_names(&self, session: &SessionRef) -> Vec<String> {
        self.store
            .lock()
            .unwrap()
            .snapshots
            .get(&session.key())
            .map(|s| s.iter().map(|s| s.step_name.clone()).collect())
            .unwrap_or_default()
    }

    pub fn session(&self, session: &SessionRef) -> Option<Session> {
        let key = session.key();
        self.store
            .lock()
            .unwrap()
            .sessions
            .iter()
            .find(|s| s.key() == key)
            .cloned()
    }
}

fn ensure_session<'a>(store: &'a mut Store, session: &SessionRef) -> &'a mut Session {
    let key = session.key();
    let index = match store.sessions.iter().position(|s| s.key() == key) {
        Some(index) => index,
        None => {
            store.sessions.push(Session::start(session));
            store.sessions.len() - 1
        }
    };
    &mut store.sessions[index]
}

impl StateRepository for InMemoryStateRepository {
    async fn save_snapshot(
        &self,
        session: &SessionRef,
        snapshot: &ExecutionSnapshot,
    ) -> Result<(), RepositoryError> {
        self.check()?;
        let mut store = self.store.lock().unwrap();
        ensure_session(&mut store, session);
        store
            .snapshots
            .entry(session.key())
            .or_default()
            .push(snapshot.clone());
        Ok(())
    }

    async fn list_snapshots(&self, session: &SessionRef) -> Result<Vec<ExecutionSnapshot>, RepositoryError> {
        self.check()?;
        Ok(self
            .store
            .lock()
            .unwrap()
            .snapshots
            .get(&session.key())
            .cloned()
            .unwrap_or_default())
    }

    async fn latest_session(&self, workflow: &WorkflowIdentity) -> Result<Option<Session>, RepositoryError> {
        self.check()?;
        Ok(self
            .store
            .lock()
            .unwrap()
            .sessions
            .iter()
            .filter(|s| s.workflow_path == workflow.path)
            .max_by(|a, b| a.timestamp.cmp(&b.timestamp))
            .cloned())
    }

    async fn list_sessions(&self, filter: &SessionFilter) -> Result<Vec<Session>, RepositoryError> {
        self.check()?;
        let mut sessions: Vec<Session> = self
            .store
            .lock()
            .unwrap()
            .sessions
            .iter()
            .filter(|s| filter.matches(s))
            .cloned()
            .collect();
        sessions.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        if let Some(limit) = filter.limit {
            sessions.truncate(limit);
        }
        Ok(sessions)
    }

    async fn update_session_status(
        &self,
        session: &SessionRef,
        status: SessionStatus,
        current_step: Option<&str>,
    ) -> Result<(), RepositoryError> {
        self.check()?;
        let mut store = self.store.lock().unwrap();
        let record = ensure_session(&mut store, session);
        record.status = status;
        record.current_step = current_step.map(str::to_string);
        record.updated_at = Utc::now();
        Ok(())
    }

    async fn cleanup_sessions(&self, older_than: DateTime<Utc>) -> Result<u64, RepositoryError> {
        self.check()?;
        let mut store = self.store.lock().unwrap();
        let (old, keep): (Vec<Session>, Vec<Session>) = std::mem::take(&mut store.sessions)
            .into_iter()
            .partition(|s| s.created_at < older_than);
        store.sessions = keep;
        for session in &old {
            store.snapshots.remove(&session.key());
            store.events.remove(&session.key());
        }
        Ok(old.len() as u64)
    }

    async fn add_event(&self, session_key: &str, event: &SessionEvent) -> Result<(), RepositoryError> {
        self.check()?;
        let mut store = self.store.lock().unwrap();
        if !store.sessions.iter().any(|s| s.key() == session_key) {
            return Err(RepositoryError::NotFound);
        }
        store
            .events
            .entry(session_key.to_string())
            .or_default()
            .push(event.clone());
        Ok(())
    }

    async fn list_events(&self, session: &SessionRef) -> Result<Vec<SessionEvent>, RepositoryError> {
        self.check()?;
        Ok(self
            .store
            .lock()
            .unwrap()
            .events
            .get(&session.key())
            .cloned()
            .unwrap_or_default())
    }
}

/// Write `files` (relative path, contents) under `dir`.
pub fn write_files(dir: &Path, files: &[(&str, &str)]) -> Vec<PathBuf> {
    files
        .iter()
        .map(|(path, contents)| {
            let path = dir.join(path);
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).unwrap();
            }
            std::fs::write(&path, contents).unwrap();
            path
        })
        .collect()
}
