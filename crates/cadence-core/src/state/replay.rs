//! Resume requests: `[session_timestamp:]step_name`.
//!
//! Replay restores workflow memory from the snapshot nearest before the
//! target step and continues forward from that step. Earlier steps are not
//! re-executed.

use cadence_types::state::{ExecutionSnapshot, SessionRef, SessionTimestamp};

use super::manager::StateManager;
use crate::workflow::classifier;
use crate::workflow::definition::Workflow;
use crate::workflow::error::WorkflowError;

/// A parsed resume request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplayRequest {
    pub timestamp: Option<SessionTimestamp>,
    pub step: String,
}

impl ReplayRequest {
    /// Parse `[timestamp:]step`. Only a prefix shaped like
    /// `YYYYMMDD_HHMMSS_LLL` followed by `:` is read as a timestamp, so step
    /// names may contain colons. A prefix with that shape that is not a
    /// valid instant is an argument error.
    pub fn parse(raw: &str) -> Result<Self, WorkflowError> {
        let raw = raw.trim();
        let (timestamp, step) = match split_timestamp(raw) {
            Some((ts, step)) => (Some(SessionTimestamp::parse(ts)?), step.trim()),
            None => (None, raw),
        };
        if step.is_empty() {
            return Err(WorkflowError::InvalidReplay(format!(
                "'{raw}' does not name a step"
            )));
        }
        Ok(Self {
            timestamp,
            step: step.to_string(),
        })
    }
}

const TIMESTAMP_LEN: usize = "YYYYMMDD_HHMMSS_LLL".len();

fn split_timestamp(raw: &str) -> Option<(&str, &str)> {
    let bytes = raw.as_bytes();
    if bytes.len() <= TIMESTAMP_LEN || bytes[TIMESTAMP_LEN] != b':' {
        return None;
    }
    let shaped = bytes[..TIMESTAMP_LEN].iter().enumerate().all(|(i, b)| match i {
        8 | 15 => *b == b'_',
        _ => b.is_ascii_digit(),
    });
    shaped.then(|| (&raw[..TIMESTAMP_LEN], &raw[TIMESTAMP_LEN + 1..]))
}

/// Where and how to resume.
#[derive(Debug, Clone)]
pub struct ReplayPlan {
    pub session: SessionRef,
    /// Index in `steps` to continue from.
    pub start_index: usize,
    /// Memory to restore; `None` starts from empty memory.
    pub snapshot: Option<ExecutionSnapshot>,
}

/// Resolve `request` against `workflow` and the persisted sessions.
///
/// Without a timestamp the most recent session for the workflow path is
/// used.
pub async fn resolve_replay(
    workflow: &Workflow,
    state: &StateManager,
    request: &ReplayRequest,
) -> Result<ReplayPlan, WorkflowError> {
    let has_resource = workflow.has_resource();
    let start_index = workflow
        .config
        .steps
        .iter()
        .position(|spec| classifier::extract_name(spec, has_resource).as_deref() == Some(request.step.as_str()))
        .ok_or_else(|| {
            WorkflowError::InvalidReplay(format!(
                "step '{}' is not a top-level step of workflow '{}'",
                request.step,
                workflow.name()
            ))
        })?;

    let session = match &request.timestamp {
        Some(ts) => SessionRef::new(workflow.identity.clone(), ts.clone()),
        None => {
            let latest = state
                .repository()
                .latest_session(&workflow.identity)
                .await?
                .ok_or_else(|| {
                    WorkflowError::InvalidReplay(format!(
                        "no previous session for workflow '{}'",
                        workflow.name()
                    ))
                })?;
            SessionRef::new(workflow.identity.clone(), latest.timestamp)
        }
    };

    let snapshot = state.load_state_before_step(&session, start_index).await?;
    match &snapshot {
        Some(s) => tracing::info!(
            session = %session.key(),
            step = %request.step,
            restored_from = %s.step_name,
            "resuming from snapshot"
        ),
        None => tracing::warn!(
            session = %session.key(),
            step = %request.step,
            "no snapshot precedes the resume step, starting with empty memory"
        ),
    }

    Ok(ReplayPlan {
        session,
        start_index,
        snapshot,
    })
}
