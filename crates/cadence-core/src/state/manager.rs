//! Best-effort state persistence.
//!
//! Every write goes through the repository inside a `Result`; failures are
//! logged at `warn` and never reach the caller. A workflow must not fail
//! because its state could not be saved.

use std::sync::{Arc, PoisonError, RwLock};

use serde_json::Value;

use cadence_types::error::RepositoryError;
use cadence_types::state::{ExecutionSnapshot, SessionRef, SessionStatus};

use crate::repository::BoxStateRepository;
use crate::workflow::memory::SharedMemory;

pub struct StateManager {
    repository: Arc<BoxStateRepository>,
    memory: SharedMemory,
    session: RwLock<SessionRef>,
}

impl StateManager {
    pub fn new(repository: Arc<BoxStateRepository>, memory: SharedMemory, session: SessionRef) -> Self {
        Self {
            repository,
            memory,
            session: RwLock::new(session),
        }
    }

    /// Session snapshots are currently written to.
    pub fn session(&self) -> SessionRef {
        self.session
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Redirect writes to another session (used when resuming).
    pub fn set_session(&self, session: SessionRef) {
        *self.session.write().unwrap_or_else(PoisonError::into_inner) = session;
    }

    pub fn repository(&self) -> &Arc<BoxStateRepository> {
        &self.repository
    }

    /// Snapshot current memory after `step_name` completed.
    pub async fn save_state(&self, step_name: &str, sequence_order: usize) {
        let snapshot = self.memory.read().await.snapshot(step_name, sequence_order);
        let session = self.session();
        if let Err(e) = self.repository.save_snapshot(&session, &snapshot).await {
            tracing::warn!(
                step = step_name,
                session = %session.key(),
                error = %e,
                "failed to save state, continuing"
            );
        }
    }

    /// Record the session's lifecycle status.
    pub async fn update_status(&self, status: SessionStatus, current_step: Option<&str>) {
        let session = self.session();
        if let Err(e) = self
            .repository
            .update_session_status(&session, status, current_step)
            .await
        {
            tracing::warn!(
                session = %session.key(),
                status = %status,
                error = %e,
                "failed to update session status"
            );
        }
    }

    /// Payload of the most recent external event named `name`.
    pub async fn find_event(&self, name: &str) -> Option<Value> {
        let session = self.session();
        match self.repository.list_events(&session).await {
            Ok(events) => events
                .into_iter()
                .rev()
                .find(|e| e.name == name)
                .map(|e| e.payload),
            Err(e) => {
                tracing::warn!(session = %session.key(), error = %e, "failed to read session events");
                None
            }
        }
    }

    /// Nearest snapshot strictly preceding the top-level step at
    /// `target_order` in `session`.
    pub async fn load_state_before_step(
        &self,
        session: &SessionRef,
        target_order: usize,
    ) -> Result<Option<ExecutionSnapshot>, RepositoryError> {
        let snapshots = self.repository.list_snapshots(session).await?;
        Ok(select_snapshot(snapshots, target_order))
    }
}

impl std::fmt::Debug for StateManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateManager")
            .field("session", &self.session().key())
            .finish_non_exhaustive()
    }
}

/// Pick the snapshot with the greatest order below `target_order`; among
/// equal orders the last written wins. Snapshots arrive in write order.
///
/// When the target was never reached every snapshot precedes it, so this
/// yields the latest one.
pub fn select_snapshot(
    snapshots: Vec<ExecutionSnapshot>,
    target_order: usize,
) -> Option<ExecutionSnapshot> {
    snapshots
        .into_iter()
        .filter(|s| s.sequence_order < target_order)
        .fold(None, |best: Option<ExecutionSnapshot>, s| match best {
            Some(b) if b.sequence_order > s.sequence_order => Some(b),
            _ => Some(s),
        })
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use serde_json::json;

    use super::*;
    use crate::testing::{InMemoryStateRepository, test_session};
    use crate::workflow::memory::WorkflowMemory;

    fn snap(name: &str, order: usize) -> ExecutionSnapshot {
        ExecutionSnapshot {
            step_name: name.into(),
            sequence_order: order,
            transcript: vec![],
            output: Default::default(),
            final_output: vec![],
            metadata: Default::default(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn selects_nearest_preceding_snapshot() {
        let snaps = vec![snap("a", 0), snap("b", 1), snap("b_inner", 1), snap("c", 2)];
        assert_eq!(select_snapshot(snaps.clone(), 2).unwrap().step_name, "b_inner");
        assert_eq!(select_snapshot(snaps.clone(), 1).unwrap().step_name, "a");
        assert!(select_snapshot(snaps.clone(), 0).is_none());
        assert_eq!(select_snapshot(snaps, 9).unwrap().step_name, "c");
    }

    #[tokio::test]
    async fn save_state_writes_current_memory() {
        let repo = Arc::new(BoxStateRepository::new(InMemoryStateRepository::default()));
        let mut memory = WorkflowMemory::new();
        memory.record_output("fetch", json!("data"));
        let session = test_session("demo");
        let manager = StateManager::new(repo.clone(), memory.into_shared(), session.clone());

        manager.save_state("fetch", 0).await;

        let snaps = repo.list_snapshots(&session).await.unwrap();
        assert_eq!(snaps.len(), 1);
        assert_eq!(snaps[0].output["fetch"], "data");
        let loaded = manager.load_state_before_step(&session, 1).await.unwrap();
        assert_eq!(loaded.unwrap().step_name, "fetch");
    }

    #[tokio::test]
    async fn persistence_failures_are_swallowed() {
        let repo = Arc::new(BoxStateRepository::new(InMemoryStateRepository::failing()));
        let manager = StateManager::new(repo, WorkflowMemory::new().into_shared(), test_session("demo"));

        manager.save_state("fetch", 0).await;
        manager.update_status(SessionStatus::Completed, None).await;
        assert!(manager.find_event("approval").await.is_none());
    }
}
