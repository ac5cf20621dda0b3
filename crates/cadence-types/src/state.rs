//! Persisted execution state: snapshots, sessions and external events.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::InvalidTimestamp;
use crate::llm::Message;

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// Point-in-time copy of workflow memory taken after a step completes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionSnapshot {
    pub step_name: String,
    /// Index of the top-level step this snapshot belongs to.
    pub sequence_order: usize,
    pub transcript: Vec<Message>,
    pub output: Map<String, Value>,
    pub final_output: Vec<String>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Session identity
// ---------------------------------------------------------------------------

/// Session timestamp in `YYYYMMDD_HHMMSS_LLL` form.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SessionTimestamp(String);

const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

impl SessionTimestamp {
    /// Timestamp for a run starting now.
    pub fn now() -> Self {
        Self::from_datetime(Utc::now())
    }

    pub fn from_datetime(at: DateTime<Utc>) -> Self {
        let millis = at.timestamp_subsec_millis().min(999);
        Self(format!("{}_{millis:03}", at.format(TIMESTAMP_FORMAT)))
    }

    /// Parse and validate a timestamp string.
    pub fn parse(s: &str) -> Result<Self, InvalidTimestamp> {
        let invalid = || InvalidTimestamp(s.to_string());
        let (datetime, millis) = s.rsplit_once('_').ok_or_else(invalid)?;
        if millis.len() != 3 || !millis.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        if datetime.len() != 15 {
            return Err(invalid());
        }
        NaiveDateTime::parse_from_str(datetime, TIMESTAMP_FORMAT).map_err(|_| invalid())?;
        Ok(Self(s.to_string()))
    }

    /// Wall-clock time this timestamp denotes.
    pub fn to_datetime(&self) -> Option<DateTime<Utc>> {
        let (datetime, millis) = self.0.rsplit_once('_')?;
        let naive = NaiveDateTime::parse_from_str(datetime, TIMESTAMP_FORMAT).ok()?;
        let millis: i64 = millis.parse().ok()?;
        Some(naive.and_utc() + chrono::Duration::milliseconds(millis))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for SessionTimestamp {
    type Error = InvalidTimestamp;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<SessionTimestamp> for String {
    fn from(value: SessionTimestamp) -> Self {
        value.0
    }
}

/// Stable identity of a workflow across runs and backends.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkflowIdentity {
    pub name: String,
    /// Absolute path to the workflow document.
    pub path: String,
    /// `<sanitized name>_<path hash prefix>`.
    pub key: String,
}

/// One run of a workflow.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionRef {
    pub workflow: WorkflowIdentity,
    pub timestamp: SessionTimestamp,
}

impl SessionRef {
    pub fn new(workflow: WorkflowIdentity, timestamp: SessionTimestamp) -> Self {
        Self { workflow, timestamp }
    }

    /// Persisted session key, `<workflow key>/<timestamp>`.
    pub fn key(&self) -> String {
        format!("{}/{}", self.workflow.key, self.timestamp)
    }
}

// ---------------------------------------------------------------------------
// Session record
// ---------------------------------------------------------------------------

/// Lifecycle status of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Running,
    /// Paused until an external event arrives.
    Waiting,
    Completed,
    Failed,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Running => "running",
            SessionStatus::Waiting => "waiting",
            SessionStatus::Completed => "completed",
            SessionStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(SessionStatus::Running),
            "waiting" => Ok(SessionStatus::Waiting),
            "completed" => Ok(SessionStatus::Completed),
            "failed" => Ok(SessionStatus::Failed),
            other => Err(format!("unknown session status '{other}'")),
        }
    }
}

/// Stored session record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub workflow_name: String,
    pub workflow_path: String,
    pub workflow_key: String,
    pub timestamp: SessionTimestamp,
    pub status: SessionStatus,
    /// Step the session stopped at, when waiting or failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_step: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    /// Fresh `running` record for `session`.
    pub fn start(session: &SessionRef) -> Self {
        let now = Utc::now();
        Self {
            workflow_name: session.workflow.name.clone(),
            workflow_path: session.workflow.path.clone(),
            workflow_key: session.workflow.key.clone(),
            timestamp: session.timestamp.clone(),
            status: SessionStatus::Running,
            current_step: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn key(&self) -> String {
        format!("{}/{}", self.workflow_key, self.timestamp)
    }
}

/// External event injected into a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionEvent {
    pub name: String,
    #[serde(default)]
    pub payload: Value,
    pub created_at: DateTime<Utc>,
}

/// Criteria for listing sessions.
#[derive(Debug, Clone, Default)]
pub struct SessionFilter {
    pub status: Option<SessionStatus>,
    pub workflow_name: Option<String>,
    /// Only sessions created before this instant.
    pub older_than: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

impl SessionFilter {
    pub fn matches(&self, session: &Session) -> bool {
        self.status.is_none_or(|s| s == session.status)
            && self
                .workflow_name
                .as_deref()
                .is_none_or(|n| n == session.workflow_name)
            && self.older_than.is_none_or(|t| session.created_at < t)
    }
}
