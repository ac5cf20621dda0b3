//! SQLite state repository implementation.
//!
//! Implements `StateRepository` from `cadence-core` using sqlx with split
//! read/write pools. Snapshots are stored as JSON blobs next to the columns
//! replay needs (`step_name`, `sequence_order`); deleting a session cascades
//! to its snapshots and events.

use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::{QueryBuilder, Row, Sqlite};

use cadence_core::repository::StateRepository;
use cadence_types::error::RepositoryError;
use cadence_types::state::{
    ExecutionSnapshot, Session, SessionEvent, SessionFilter, SessionRef, SessionStatus,
    SessionTimestamp, WorkflowIdentity,
};

use super::pool::DatabasePool;

/// SQLite-backed implementation of `StateRepository`.
pub struct SqliteStateRepository {
    pool: DatabasePool,
}

impl SqliteStateRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

// ---------------------------------------------------------------------------
// Internal row types
// ---------------------------------------------------------------------------

struct SessionRow {
    workflow_name: String,
    workflow_path: String,
    workflow_key: String,
    timestamp: String,
    status: String,
    current_step: Option<String>,
    created_at: String,
    updated_at: String,
}

impl SessionRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            workflow_name: row.try_get("workflow_name")?,
            workflow_path: row.try_get("workflow_path")?,
            workflow_key: row.try_get("workflow_key")?,
            timestamp: row.try_get("timestamp")?,
            status: row.try_get("status")?,
            current_step: row.try_get("current_step")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn into_session(self) -> Result<Session, RepositoryError> {
        let status: SessionStatus = self.status.parse().map_err(RepositoryError::Query)?;
        let timestamp = SessionTimestamp::parse(&self.timestamp)
            .map_err(|e| RepositoryError::Query(e.to_string()))?;
        Ok(Session {
            workflow_name: self.workflow_name,
            workflow_path: self.workflow_path,
            workflow_key: self.workflow_key,
            timestamp,
            status,
            current_step: self.current_step,
            created_at: parse_datetime(&self.created_at)?,
            updated_at: parse_datetime(&self.updated_at)?,
        })
    }
}

fn sessions_from_rows(rows: &[sqlx::sqlite::SqliteRow]) -> Result<Vec<Session>, RepositoryError> {
    let mut sessions = Vec::with_capacity(rows.len());
    for row in rows {
        let r = SessionRow::from_row(row).map_err(|e| RepositoryError::Query(e.to_string()))?;
        sessions.push(r.into_session()?);
    }
    Ok(sessions)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn parse_datetime(s: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Query(format!("invalid datetime: {e}")))
}

/// Fixed-width RFC 3339 so stored instants compare correctly as text.
fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn query_error(e: sqlx::Error) -> RepositoryError {
    RepositoryError::Query(e.to_string())
}

/// Insert the session row if it does not exist yet.
async fn ensure_session<'e, E>(executor: E, session: &SessionRef) -> Result<(), RepositoryError>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let now = format_datetime(&Utc::now());
    sqlx::query(
        r#"INSERT OR IGNORE INTO sessions
           (session_key, workflow_name, workflow_path, workflow_key, timestamp, status,
            current_step, created_at, updated_at)
           VALUES (?, ?, ?, ?, ?, 'running', NULL, ?, ?)"#,
    )
    .bind(session.key())
    .bind(&session.workflow.name)
    .bind(&session.workflow.path)
    .bind(&session.workflow.key)
    .bind(session.timestamp.as_str())
    .bind(&now)
    .bind(&now)
    .execute(executor)
    .await
    .map_err(query_error)?;
    Ok(())
}

// ---------------------------------------------------------------------------
// StateRepository impl
// ---------------------------------------------------------------------------

impl StateRepository for SqliteStateRepository {
    async fn save_snapshot(
        &self,
        session: &SessionRef,
        snapshot: &ExecutionSnapshot,
    ) -> Result<(), RepositoryError> {
        let state = serde_json::to_string(snapshot)?;

        let mut tx = self.pool.writer.begin().await.map_err(query_error)?;
        ensure_session(&mut *tx, session).await?;
        sqlx::query(
            r#"INSERT INTO snapshots (session_key, step_name, sequence_order, state, created_at)
               VALUES (?, ?, ?, ?, ?)"#,
        )
        .bind(session.key())
        .bind(&snapshot.step_name)
        .bind(snapshot.sequence_order as i64)
        .bind(&state)
        .bind(format_datetime(&snapshot.created_at))
        .execute(&mut *tx)
        .await
        .map_err(query_error)?;
        tx.commit().await.map_err(query_error)?;

        Ok(())
    }

    async fn list_snapshots(&self, session: &SessionRef) -> Result<Vec<ExecutionSnapshot>, RepositoryError> {
        let rows = sqlx::query("SELECT state FROM snapshots WHERE session_key = ? ORDER BY id ASC")
            .bind(session.key())
            .fetch_all(&self.pool.reader)
            .await
            .map_err(query_error)?;

        let mut snapshots = Vec::with_capacity(rows.len());
        for row in &rows {
            let state: String = row.try_get("state").map_err(query_error)?;
            snapshots.push(
                serde_json::from_str(&state)
                    .map_err(|e| RepositoryError::Query(format!("invalid snapshot JSON: {e}")))?,
            );
        }
        Ok(snapshots)
    }

    async fn latest_session(&self, workflow: &WorkflowIdentity) -> Result<Option<Session>, RepositoryError> {
        let row = sqlx::query(
            "SELECT * FROM sessions WHERE workflow_path = ? ORDER BY timestamp DESC LIMIT 1",
        )
        .bind(&workflow.path)
        .fetch_optional(&self.pool.reader)
        .await
        .map_err(query_error)?;

        match row {
            Some(row) => {
                let r = SessionRow::from_row(&row).map_err(query_error)?;
                Ok(Some(r.into_session()?))
            }
            None => Ok(None),
        }
    }

    async fn list_sessions(&self, filter: &SessionFilter) -> Result<Vec<Session>, RepositoryError> {
        let mut query: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT * FROM sessions WHERE 1 = 1");
        if let Some(status) = filter.status {
            query.push(" AND status = ").push_bind(status.as_str());
        }
        if let Some(name) = &filter.workflow_name {
            query.push(" AND workflow_name = ").push_bind(name.clone());
        }
        if let Some(before) = &filter.older_than {
            query.push(" AND created_at < ").push_bind(format_datetime(before));
        }
        query.push(" ORDER BY timestamp DESC");
        if let Some(limit) = filter.limit {
            query.push(" LIMIT ").push_bind(limit as i64);
        }

        let rows = query
            .build()
            .fetch_all(&self.pool.reader)
            .await
            .map_err(query_error)?;
        sessions_from_rows(&rows)
    }

    async fn update_session_status(
        &self,
        session: &SessionRef,
        status: SessionStatus,
        current_step: Option<&str>,
    ) -> Result<(), RepositoryError> {
        let mut tx = self.pool.writer.begin().await.map_err(query_error)?;
        ensure_session(&mut *tx, session).await?;
        sqlx::query(
            "UPDATE sessions SET status = ?, current_step = ?, updated_at = ? WHERE session_key = ?",
        )
        .bind(status.as_str())
        .bind(current_step)
        .bind(format_datetime(&Utc::now()))
        .bind(session.key())
        .execute(&mut *tx)
        .await
        .map_err(query_error)?;
        tx.commit().await.map_err(query_error)?;

        Ok(())
    }

    async fn cleanup_sessions(&self, older_than: DateTime<Utc>) -> Result<u64, RepositoryError> {
        let result = sqlx::query("DELETE FROM sessions WHERE created_at < ?")
            .bind(format_datetime(&older_than))
            .execute(&self.pool.writer)
            .await
            .map_err(query_error)?;

        Ok(result.rows_affected())
    }

    async fn add_event(&self, session_key: &str, event: &SessionEvent) -> Result<(), RepositoryError> {
        let exists = sqlx::query("SELECT 1 FROM sessions WHERE session_key = ?")
            .bind(session_key)
            .fetch_optional(&self.pool.writer)
            .await
            .map_err(query_error)?;
        if exists.is_none() {
            return Err(RepositoryError::NotFound);
        }

        sqlx::query(
            "INSERT INTO session_events (session_key, name, payload, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(session_key)
        .bind(&event.name)
        .bind(serde_json::to_string(&event.payload)?)
        .bind(format_datetime(&event.created_at))
        .execute(&self.pool.writer)
        .await
        .map_err(query_error)?;

        Ok(())
    }

    async fn list_events(&self, session: &SessionRef) -> Result<Vec<SessionEvent>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT name, payload, created_at FROM session_events WHERE session_key = ? ORDER BY id ASC",
        )
        .bind(session.key())
        .fetch_all(&self.pool.reader)
        .await
        .map_err(query_error)?;

        let mut events = Vec::with_capacity(rows.len());
        for row in &rows {
            let payload: String = row.try_get("payload").map_err(query_error)?;
            let created_at: String = row.try_get("created_at").map_err(query_error)?;
            events.push(SessionEvent {
                name: row.try_get("name").map_err(query_error)?,
                payload: serde_json::from_str(&payload)
                    .map_err(|e| RepositoryError::Query(format!("invalid event payload: {e}")))?,
                created_at: parse_datetime(&created_at)?,
            });
        }
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::{Map, json};

    async fn test_repo() -> SqliteStateRepository {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}?mode=rwc", dir.path().join("state.db").display());
        std::mem::forget(dir);
        SqliteStateRepository::new(DatabasePool::new(&url).await.unwrap())
    }

    fn session(name: &str, timestamp: &str) -> SessionRef {
        SessionRef::new(
            WorkflowIdentity {
                name: name.to_string(),
                path: format!("/srv/{name}/workflow.yml"),
                key: format!("{name}_a1b2c3d4e5f6"),
            },
            SessionTimestamp::parse(timestamp).unwrap(),
        )
    }

    fn snapshot(step: &str, order: usize) -> ExecutionSnapshot {
        let mut output = Map::new();
        output.insert(step.to_string(), json!(format!("{step} done")));
        ExecutionSnapshot {
            step_name: step.to_string(),
            sequence_order: order,
            transcript: Vec::new(),
            output,
            final_output: Vec::new(),
            metadata: Map::new(),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn first_snapshot_creates_running_session() {
        let repo = test_repo().await;
        let s = session("review", "20250301_101500_000");

        repo.save_snapshot(&s, &snapshot("fetch", 0)).await.unwrap();
        repo.save_snapshot(&s, &snapshot("summarize", 1)).await.unwrap();

        let snapshots = repo.list_snapshots(&s).await.unwrap();
        let names: Vec<&str> = snapshots.iter().map(|s| s.step_name.as_str()).collect();
        assert_eq!(names, vec!["fetch", "summarize"]);
        assert_eq!(snapshots[1].output["summarize"], json!("summarize done"));

        let latest = repo.latest_session(&s.workflow).await.unwrap().unwrap();
        assert_eq!(latest.status, SessionStatus::Running);
        assert_eq!(latest.key(), s.key());
    }

    #[tokio::test]
    async fn latest_session_picks_newest_timestamp() {
        let repo = test_repo().await;
        let old = session("review", "20250301_101500_000");
        let new = session("review", "20250302_090000_123");
        repo.save_snapshot(&new, &snapshot("fetch", 0)).await.unwrap();
        repo.save_snapshot(&old, &snapshot("fetch", 0)).await.unwrap();

        let latest = repo.latest_session(&old.workflow).await.unwrap().unwrap();
        assert_eq!(latest.timestamp, new.timestamp);

        let other = session("deploy", "20250303_000000_000");
        assert!(repo.latest_session(&other.workflow).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn status_updates_and_filters() {
        let repo = test_repo().await;
        let a = session("review", "20250301_101500_000");
        let b = session("deploy", "20250301_111500_000");
        repo.save_snapshot(&a, &snapshot("fetch", 0)).await.unwrap();
        repo.update_session_status(&b, SessionStatus::Waiting, Some("approve"))
            .await
            .unwrap();

        let waiting = repo
            .list_sessions(&SessionFilter {
                status: Some(SessionStatus::Waiting),
                ..SessionFilter::default()
            })
            .await
            .unwrap();
        assert_eq!(waiting.len(), 1);
        assert_eq!(waiting[0].workflow_name, "deploy");
        assert_eq!(waiting[0].current_step.as_deref(), Some("approve"));

        let all = repo.list_sessions(&SessionFilter::default()).await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].workflow_name, "deploy", "newest first");

        let limited = repo
            .list_sessions(&SessionFilter {
                workflow_name: Some("review".into()),
                limit: Some(1),
                ..SessionFilter::default()
            })
            .await
            .unwrap();
        assert_eq!(limited.len(), 1);
        assert_eq!(limited[0].workflow_name, "review");
    }

    #[tokio::test]
    async fn events_require_an_existing_session() {
        let repo = test_repo().await;
        let s = session("deploy", "20250301_101500_000");
        let event = SessionEvent {
            name: "approve".into(),
            payload: json!({"ok": true}),
            created_at: Utc::now(),
        };

        let err = repo.add_event(&s.key(), &event).await.unwrap_err();
        assert!(matches!(err, RepositoryError::NotFound));

        repo.update_session_status(&s, SessionStatus::Waiting, Some("approve"))
            .await
            .unwrap();
        repo.add_event(&s.key(), &event).await.unwrap();

        let events = repo.list_events(&s).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].payload, json!({"ok": true}));
    }

    #[tokio::test]
    async fn cleanup_cascades_to_snapshots() {
        let repo = test_repo().await;
        let s = session("review", "20250301_101500_000");
        repo.save_snapshot(&s, &snapshot("fetch", 0)).await.unwrap();

        let removed = repo
            .cleanup_sessions(Utc::now() - Duration::days(1))
            .await
            .unwrap();
        assert_eq!(removed, 0);

        let removed = repo
            .cleanup_sessions(Utc::now() + Duration::seconds(1))
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert!(repo.list_snapshots(&s).await.unwrap().is_empty());
        assert!(repo.latest_session(&s.workflow).await.unwrap().is_none());
    }
}
