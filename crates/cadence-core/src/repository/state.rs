//! State repository trait definition.
//!
//! Defines the storage interface for execution snapshots, session records and
//! external session events. The infrastructure layer (cadence-infra) provides
//! a flat-file implementation and a SQLite implementation; the engine only
//! ever sees the type-erased [`BoxStateRepository`].

use std::future::Future;
use std::pin::Pin;

use chrono::{DateTime, Utc};

use cadence_types::error::RepositoryError;
use cadence_types::state::{
    ExecutionSnapshot, Session, SessionEvent, SessionFilter, SessionRef, SessionStatus,
    WorkflowIdentity,
};

/// Repository trait for execution state persistence.
///
/// Uses native async fn in traits (Rust 2024 edition, no async_trait macro).
pub trait StateRepository: Send + Sync {
    // -----------------------------------------------------------------------
    // Snapshots
    // -----------------------------------------------------------------------

    /// Persist a snapshot, creating the session record (status `running`)
    /// if this is the session's first write.
    fn save_snapshot(
        &self,
        session: &SessionRef,
        snapshot: &ExecutionSnapshot,
    ) -> impl Future<Output = Result<(), RepositoryError>> + Send;

    /// All snapshots of a session in write order.
    fn list_snapshots(
        &self,
        session: &SessionRef,
    ) -> impl Future<Output = Result<Vec<ExecutionSnapshot>, RepositoryError>> + Send;

    // -----------------------------------------------------------------------
    // Sessions
    // -----------------------------------------------------------------------

    /// Most recent session recorded for a workflow.
    fn latest_session(
        &self,
        workflow: &WorkflowIdentity,
    ) -> impl Future<Output = Result<Option<Session>, RepositoryError>> + Send;

    /// Sessions matching `filter`, newest first.
    fn list_sessions(
        &self,
        filter: &SessionFilter,
    ) -> impl Future<Output = Result<Vec<Session>, RepositoryError>> + Send;

    /// Set a session's status, creating the record if needed.
    fn update_session_status(
        &self,
        session: &SessionRef,
        status: SessionStatus,
        current_step: Option<&str>,
    ) -> impl Future<Output = Result<(), RepositoryError>> + Send;

    /// Delete sessions created before `older_than` with everything they own.
    /// Returns the number of sessions removed.
    fn cleanup_sessions(
        &self,
        older_than: DateTime<Utc>,
    ) -> impl Future<Output = Result<u64, RepositoryError>> + Send;

    // -----------------------------------------------------------------------
    // Events
    // -----------------------------------------------------------------------

    /// Attach an external event to the session identified by `session_key`.
    /// Fails with `NotFound` when the session does not exist.
    fn add_event(
        &self,
        session_key: &str,
        event: &SessionEvent,
    ) -> impl Future<Output = Result<(), RepositoryError>> + Send;

    /// Events of a session in arrival order.
    fn list_events(
        &self,
        session: &SessionRef,
    ) -> impl Future<Output = Result<Vec<SessionEvent>, RepositoryError>> + Send;
}

// ---------------------------------------------------------------------------
// Dynamic dispatch wrapper
// ---------------------------------------------------------------------------

type BoxFut<'a, T> = Pin<Box<dyn Future<Output = Result<T, RepositoryError>> + Send + 'a>>;

/// Object-safe version of [`StateRepository`] with boxed futures.
pub trait StateRepositoryDyn: Send + Sync {
    fn save_snapshot_boxed<'a>(
        &'a self,
        session: &'a SessionRef,
        snapshot: &'a ExecutionSnapshot,
    ) -> BoxFut<'a, ()>;

    fn list_snapshots_boxed<'a>(&'a self, session: &'a SessionRef)
    -> BoxFut<'a, Vec<ExecutionSnapshot>>;

    fn latest_session_boxed<'a>(&'a self, workflow: &'a WorkflowIdentity)
    -> BoxFut<'a, Option<Session>>;

    fn list_sessions_boxed<'a>(&'a self, filter: &'a SessionFilter) -> BoxFut<'a, Vec<Session>>;

    fn update_session_status_boxed<'a>(
        &'a self,
        session: &'a SessionRef,
        status: SessionStatus,
        current_step: Option<&'a str>,
    ) -> BoxFut<'a, ()>;

    fn cleanup_sessions_boxed(&self, older_than: DateTime<Utc>) -> BoxFut<'_, u64>;

    fn add_event_boxed<'a>(&'a self, session_key: &'a str, event: &'a SessionEvent)
    -> BoxFut<'a, ()>;

    fn list_events_boxed<'a>(&'a self, session: &'a SessionRef) -> BoxFut<'a, Vec<SessionEvent>>;
}

/// Blanket implementation: any `StateRepository` automatically implements `StateRepositoryDyn`.
impl<T: StateRepository> StateRepositoryDyn for T {
    fn save_snapshot_boxed<'a>(
        &'a self,
        session: &'a SessionRef,
        snapshot: &'a ExecutionSnapshot,
    ) -> BoxFut<'a, ()> {
        Box::pin(self.save_snapshot(session, snapshot))
    }

    fn list_snapshots_boxed<'a>(
        &'a self,
        session: &'a SessionRef,
    ) -> BoxFut<'a, Vec<ExecutionSnapshot>> {
        Box::pin(self.list_snapshots(session))
    }

    fn latest_session_boxed<'a>(
        &'a self,
        workflow: &'a WorkflowIdentity,
    ) -> BoxFut<'a, Option<Session>> {
        Box::pin(self.latest_session(workflow))
    }

    fn list_sessions_boxed<'a>(&'a self, filter: &'a SessionFilter) -> BoxFut<'a, Vec<Session>> {
        Box::pin(self.list_sessions(filter))
    }

    fn update_session_status_boxed<'a>(
        &'a self,
        session: &'a SessionRef,
        status: SessionStatus,
        current_step: Option<&'a str>,
    ) -> BoxFut<'a, ()> {
        Box::pin(self.update_session_status(session, status, current_step))
    }

    fn cleanup_sessions_boxed(&self, older_than: DateTime<Utc>) -> BoxFut<'_, u64> {
        Box::pin(self.cleanup_sessions(older_than))
    }

    fn add_event_boxed<'a>(
        &'a self,
        session_key: &'a str,
        event: &'a SessionEvent,
    ) -> BoxFut<'a, ()> {
        Box::pin(self.add_event(session_key, event))
    }

    fn list_events_boxed<'a>(&'a self, session: &'a SessionRef) -> BoxFut<'a, Vec<SessionEvent>> {
        Box::pin(self.list_events(session))
    }
}

/// Type-erased state repository, chosen once when the engine is built.
pub struct BoxStateRepository {
    inner: Box<dyn StateRepositoryDyn + Send + Sync>,
}

impl BoxStateRepository {
    /// Wrap a concrete `StateRepository` in a type-erased box.
    pub fn new<T: StateRepository + 'static>(repo: T) -> Self {
        Self {
            inner: Box::new(repo),
        }
    }

    pub async fn save_snapshot(
        &self,
        session: &SessionRef,
        snapshot: &ExecutionSnapshot,
    ) -> Result<(), RepositoryError> {
        self.inner.save_snapshot_boxed(session, snapshot).await
    }

    pub async fn list_snapshots(
        &self,
        session: &SessionRef,
    ) -> Result<Vec<ExecutionSnapshot>, RepositoryError> {
        self.inner.list_snapshots_boxed(session).await
    }

    pub async fn latest_session(
        &self,
        workflow: &WorkflowIdentity,
    ) -> Result<Option<Session>, RepositoryError> {
        self.inner.latest_session_boxed(workflow).await
    }

    pub async fn list_sessions(&self, filter: &SessionFilter) -> Result<Vec<Session>, RepositoryError> {
        self.inner.list_sessions_boxed(filter).await
    }

    pub async fn update_session_status(
        &self,
        session: &SessionRef,
        status: SessionStatus,
        current_step: Option<&str>,
    ) -> Result<(), RepositoryError> {
        self.inner
            .update_session_status_boxed(session, status, current_step)
            .await
    }

    pub async fn cleanup_sessions(&self, older_than: DateTime<Utc>) -> Result<u64, RepositoryError> {
        self.inner.cleanup_sessions_boxed(older_than).await
    }

    pub async fn add_event(&self, session_key: &str, event: &SessionEvent) -> Result<(), RepositoryError> {
        self.inner.add_event_boxed(session_key, event).await
    }

    pub async fn list_events(&self, session: &SessionRef) -> Result<Vec<SessionEvent>, RepositoryError> {
        self.inner.list_events_boxed(session).await
    }
}

impl std::fmt::Debug for BoxStateRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoxStateRepository").finish_non_exhaustive()
    }
}
