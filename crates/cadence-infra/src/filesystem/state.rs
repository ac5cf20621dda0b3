//! Flat-file state repository.
//!
//! Layout under the state root:
//!
//! ```text
//! <root>/<workflow_key>/<timestamp>/session.json
//! <root>/<workflow_key>/<timestamp>/step_<order:03>_<seq:05>_<name>.json
//! <root>/<workflow_key>/<timestamp>/events/<seq:04>_<name>.json
//! ```
//!
//! Snapshot files are never rewritten: every save takes the next `seq` in
//! the session directory, and snapshots are listed in `seq` order.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use cadence_core::repository::StateRepository;
use cadence_types::error::RepositoryError;
use cadence_types::state::{
    ExecutionSnapshot, Session, SessionEvent, SessionFilter, SessionRef, SessionStatus,
    WorkflowIdentity,
};

const SESSION_FILE: &str = "session.json";
const EVENTS_DIR: &str = "events";
const SNAPSHOT_PREFIX: &str = "step_";

/// `StateRepository` writing one JSON file per snapshot.
pub struct FileStateRepository {
    root: PathBuf,
    /// Serializes writes so parallel workers never race on `session.json`.
    write_lock: Mutex<()>,
}

impl FileStateRepository {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn session_dir(&self, session: &SessionRef) -> PathBuf {
        self.root
            .join(&session.workflow.key)
            .join(session.timestamp.as_str())
    }

    /// Directory for a persisted session key (`<workflow_key>/<timestamp>`).
    fn dir_for_key(&self, session_key: &str) -> Option<PathBuf> {
        let (workflow_key, timestamp) = session_key.split_once('/')?;
        let safe = |s: &str| !s.is_empty() && !s.contains(['/', '\\']) && s != "." && s != "..";
        (safe(workflow_key) && safe(timestamp)).then(|| self.root.join(workflow_key).join(timestamp))
    }

    async fn ensure_session(&self, session: &SessionRef) -> Result<Session, RepositoryError> {
        let path = self.session_dir(session).join(SESSION_FILE);
        if let Some(existing) = read_json::<Session>(&path).await? {
            return Ok(existing);
        }
        let record = Session::start(session);
        write_json(&path, &record).await?;
        Ok(record)
    }

    /// Every readable session record under the root.
    async fn all_sessions(&self) -> Result<Vec<Session>, RepositoryError> {
        let mut sessions = Vec::new();
        for workflow_dir in list_dirs(&self.root).await? {
            for session_dir in list_dirs(&workflow_dir).await? {
                match read_json::<Session>(&session_dir.join(SESSION_FILE)).await {
                    Ok(Some(session)) => sessions.push(session),
                    Ok(None) => {}
                    Err(e) => {
                        tracing::warn!(dir = %session_dir.display(), error = %e, "skipping unreadable session");
                    }
                }
            }
        }
        Ok(sessions)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// File-name-safe rendering of a step name.
fn sanitize(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .take(64)
        .collect();
    if cleaned.is_empty() { "step".to_string() } else { cleaned }
}

fn snapshot_file_name(snapshot: &ExecutionSnapshot, seq: usize) -> String {
    format!(
        "{SNAPSHOT_PREFIX}{:03}_{seq:05}_{}.json",
        snapshot.sequence_order,
        sanitize(&snapshot.step_name)
    )
}

/// Write sequence of a snapshot file, `None` for anything else.
fn snapshot_seq(file_name: &str) -> Option<usize> {
    let rest = file_name.strip_prefix(SNAPSHOT_PREFIX)?;
    if !rest.ends_with(".json") {
        return None;
    }
    rest.split('_').nth(1)?.parse().ok()
}

async fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Option<T>, RepositoryError> {
    match tokio::fs::read_to_string(path).await {
        Ok(content) => Ok(Some(serde_json::from_str(&content)?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Write through a temp file so readers never see a partial document.
async fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> Result<(), RepositoryError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, serde_json::to_vec_pretty(value)?).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

async fn list_dirs(path: &Path) -> Result<Vec<PathBuf>, RepositoryError> {
    list_entries(path, true).await
}

async fn list_files(path: &Path) -> Result<Vec<PathBuf>, RepositoryError> {
    list_entries(path, false).await
}

async fn list_entries(path: &Path, dirs: bool) -> Result<Vec<PathBuf>, RepositoryError> {
    let mut entries = match tokio::fs::read_dir(path).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };
    let mut found = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        if entry.file_type().await?.is_dir() == dirs {
            found.push(entry.path());
        }
    }
    found.sort();
    Ok(found)
}

fn file_name(path: &Path) -> &str {
    path.file_name().and_then(|n| n.to_str()).unwrap_or_default()
}

// ---------------------------------------------------------------------------
// StateRepository impl
// ---------------------------------------------------------------------------

impl StateRepository for FileStateRepository {
    async fn save_snapshot(
        &self,
        session: &SessionRef,
        snapshot: &ExecutionSnapshot,
    ) -> Result<(), RepositoryError> {
        let _guard = self.write_lock.lock().await;
        self.ensure_session(session).await?;
        let dir = self.session_dir(session);
        let seq = list_files(&dir)
            .await?
            .iter()
            .filter_map(|path| snapshot_seq(file_name(path)))
            .max()
            .map_or(0, |last| last + 1);
        write_json(&dir.join(snapshot_file_name(snapshot, seq)), snapshot).await
    }

    async fn list_snapshots(&self, session: &SessionRef) -> Result<Vec<ExecutionSnapshot>, RepositoryError> {
        let mut files: Vec<(usize, PathBuf)> = list_files(&self.session_dir(session))
            .await?
            .into_iter()
            .filter_map(|path| snapshot_seq(file_name(&path)).map(|seq| (seq, path)))
            .collect();
        files.sort_by_key(|(seq, _)| *seq);

        let mut snapshots = Vec::with_capacity(files.len());
        for (_, path) in files {
            if let Some(snapshot) = read_json::<ExecutionSnapshot>(&path).await? {
                snapshots.push(snapshot);
            }
        }
        Ok(snapshots)
    }

    async fn latest_session(&self, workflow: &WorkflowIdentity) -> Result<Option<Session>, RepositoryError> {
        // Timestamp directory names sort chronologically.
        let dirs = list_dirs(&self.root.join(&workflow.key)).await?;
        for dir in dirs.iter().rev() {
            if let Some(session) = read_json::<Session>(&dir.join(SESSION_FILE)).await? {
                if session.workflow_path == workflow.path {
                    return Ok(Some(session));
                }
            }
        }
        Ok(None)
    }

    async fn list_sessions(&self, filter: &SessionFilter) -> Result<Vec<Session>, RepositoryError> {
        let mut sessions: Vec<Session> = self
            .all_sessions()
            .await?
            .into_iter()
            .filter(|s| filter.matches(s))
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
        let _guard = self.write_lock.lock().await;
        let mut record = self.ensure_session(session).await?;
        record.status = status;
        record.current_step = current_step.map(str::to_string);
        record.updated_at = Utc::now();
        write_json(&self.session_dir(session).join(SESSION_FILE), &record).await
    }

    async fn cleanup_sessions(&self, older_than: DateTime<Utc>) -> Result<u64, RepositoryError> {
        let _guard = self.write_lock.lock().await;
        let mut removed = 0;
        for session in self.all_sessions().await? {
            if session.created_at >= older_than {
                continue;
            }
            let dir = self.root.join(&session.workflow_key).join(session.timestamp.as_str());
            tokio::fs::remove_dir_all(&dir).await?;
            tracing::debug!(session = %session.key(), "removed session");
            removed += 1;
        }
        Ok(removed)
    }

    async fn add_event(&self, session_key: &str, event: &SessionEvent) -> Result<(), RepositoryError> {
        let dir = self.dir_for_key(session_key).ok_or(RepositoryError::NotFound)?;
        if !tokio::fs::try_exists(dir.join(SESSION_FILE)).await.unwrap_or(false) {
            return Err(RepositoryError::NotFound);
        }

        let _guard = self.write_lock.lock().await;
        let events_dir = dir.join(EVENTS_DIR);
        let seq = list_files(&events_dir).await?.len();
        let path = events_dir.join(format!("{seq:04}_{}.json", sanitize(&event.name)));
        write_json(&path, event).await
    }

    async fn list_events(&self, session: &SessionRef) -> Result<Vec<SessionEvent>, RepositoryError> {
        let mut events = Vec::new();
        for path in list_files(&self.session_dir(session).join(EVENTS_DIR)).await? {
            if !file_name(&path).ends_with(".json") {
                continue;
            }
            if let Some(event) = read_json::<SessionEvent>(&path).await? {
                events.push(event);
            }
        }
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadence_types::state::SessionTimestamp;
    use chrono::Duration;
    use serde_json::{Map, json};

    fn session(timestamp: &str) -> SessionRef {
        SessionRef::new(
            WorkflowIdentity {
                name: "review".into(),
                path: "/srv/review/workflow.yml".into(),
                key: "review_a1b2c3d4e5f6".into(),
            },
            SessionTimestamp::parse(timestamp).unwrap(),
        )
    }

    fn snapshot(step: &str, order: usize) -> ExecutionSnapshot {
        ExecutionSnapshot {
            step_name: step.to_string(),
            sequence_order: order,
            transcript: Vec::new(),
            output: Map::new(),
            final_output: Vec::new(),
            metadata: Map::new(),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn writes_the_documented_layout() {
        let dir = tempfile::tempdir().unwrap();
        let repo = FileStateRepository::new(dir.path());
        let s = session("20250301_101500_000");

        repo.save_snapshot(&s, &snapshot("$(git diff)", 2)).await.unwrap();

        let session_dir = dir.path().join("review_a1b2c3d4e5f6").join("20250301_101500_000");
        assert!(session_dir.join("session.json").exists());
        assert!(session_dir.join("step_002_00000___git_diff_.json").exists());
    }

    #[tokio::test]
    async fn repeated_step_keeps_every_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let repo = FileStateRepository::new(dir.path());
        let s = session("20250301_101500_000");

        for verdict in ["fail", "pass"] {
            let mut lint = snapshot("lint", 1);
            lint.output.insert("lint".into(), json!(verdict));
            repo.save_snapshot(&s, &lint).await.unwrap();
        }

        let snapshots = repo.list_snapshots(&s).await.unwrap();
        assert_eq!(snapshots.len(), 2);
        assert_eq!(snapshots[0].output["lint"], json!("fail"));
        assert_eq!(snapshots[1].output["lint"], json!("pass"));
    }

    #[test]
    fn snapshot_seq_ignores_other_files() {
        assert_eq!(snapshot_seq("step_001_00007_lint.json"), Some(7));
        assert_eq!(snapshot_seq("step_001_00007_lint.json.tmp"), None);
        assert_eq!(snapshot_seq("session.json"), None);
    }

    #[tokio::test]
    async fn lists_snapshots_in_write_order() {
        let dir = tempfile::tempdir().unwrap();
        let repo = FileStateRepository::new(dir.path());
        let s = session("20250301_101500_000");

        repo.save_snapshot(&s, &snapshot("zeta", 0)).await.unwrap();
        repo.save_snapshot(&s, &snapshot("alpha", 0)).await.unwrap();
        repo.save_snapshot(&s, &snapshot("beta", 1)).await.unwrap();

        let names: Vec<String> = repo
            .list_snapshots(&s)
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.step_name)
            .collect();
        assert_eq!(names, vec!["zeta", "alpha", "beta"]);
    }

    #[tokio::test]
    async fn sessions_status_and_latest() {
        let dir = tempfile::tempdir().unwrap();
        let repo = FileStateRepository::new(dir.path());
        let old = session("20250301_101500_000");
        let new = session("20250302_101500_000");

        repo.save_snapshot(&old, &snapshot("fetch", 0)).await.unwrap();
        repo.update_session_status(&new, SessionStatus::Waiting, Some("approve"))
            .await
            .unwrap();

        let latest = repo.latest_session(&old.workflow).await.unwrap().unwrap();
        assert_eq!(latest.timestamp, new.timestamp);
        assert_eq!(latest.status, SessionStatus::Waiting);

        let running = repo
            .list_sessions(&SessionFilter {
                status: Some(SessionStatus::Running),
                ..SessionFilter::default()
            })
            .await
            .unwrap();
        assert_eq!(running.len(), 1);
        assert_eq!(running[0].timestamp, old.timestamp);
    }

    #[tokio::test]
    async fn events_round_trip_and_require_session() {
        let dir = tempfile::tempdir().unwrap();
        let repo = FileStateRepository::new(dir.path());
        let s = session("20250301_101500_000");
        let event = SessionEvent {
            name: "approve".into(),
            payload: json!("yes"),
            created_at: Utc::now(),
        };

        assert!(matches!(
            repo.add_event(&s.key(), &event).await,
            Err(RepositoryError::NotFound)
        ));
        assert!(matches!(
            repo.add_event("../escape", &event).await,
            Err(RepositoryError::NotFound)
        ));

        repo.update_session_status(&s, SessionStatus::Waiting, Some("approve"))
            .await
            .unwrap();
        repo.add_event(&s.key(), &event).await.unwrap();
        repo.add_event(&s.key(), &event).await.unwrap();

        let events = repo.list_events(&s).await.unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].payload, json!("yes"));
    }

    #[tokio::test]
    async fn cleanup_removes_old_sessions() {
        let dir = tempfile::tempdir().unwrap();
        let repo = FileStateRepository::new(dir.path());
        let s = session("20250301_101500_000");
        repo.save_snapshot(&s, &snapshot("fetch", 0)).await.unwrap();

        assert_eq!(repo.cleanup_sessions(Utc::now() - Duration::days(1)).await.unwrap(), 0);
        assert_eq!(repo.cleanup_sessions(Utc::now() + Duration::seconds(1)).await.unwrap(), 1);
        assert!(repo.list_sessions(&SessionFilter::default()).await.unwrap().is_empty());
    }
}
