//! Persistent per-container state.
//!
//! Each container directory holds a `state.json` record, written when the
//! container starts and again when it terminates. Listing containers is a
//! scan of the container directory; there is no daemon and no global index.

use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use pocker_common::constants::STATE_FILE;
use pocker_common::error::{PockerError, Result};
use pocker_common::types::{ContainerId, ContainerState, LaunchStatus};
use serde::{Deserialize, Serialize};

/// Persistent record of one container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerRecord {
    /// Container identifier.
    pub id: ContainerId,
    /// Image the container was launched from.
    pub image: String,
    /// Command vector.
    pub command: Vec<String>,
    /// PID of the init process in the supervisor's namespace.
    pub pid: Option<u32>,
    /// Start time of that process in clock ticks since boot, used to
    /// detect PID reuse.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid_start: Option<u64>,
    /// Current lifecycle state.
    pub state: ContainerState,
    /// When the launch began.
    pub created_at: DateTime<Utc>,
    /// When the process was reaped.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    /// Termination status once reaped.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<LaunchStatus>,
}

impl ContainerRecord {
    /// Creates a record in the `Created` state.
    #[must_use]
    pub fn new(id: ContainerId, image: impl Into<String>, command: Vec<String>) -> Self {
        Self {
            id,
            image: image.into(),
            command,
            pid: None,
            pid_start: None,
            state: ContainerState::Created,
            created_at: Utc::now(),
            finished_at: None,
            status: None,
        }
    }

    /// Marks the container as running under `pid`, started at `started`.
    pub const fn mark_running(&mut self, pid: u32, started: Option<u64>) {
        self.pid = Some(pid);
        self.pid_start = started;
        self.state = ContainerState::Running;
    }

    /// Records the termination `status`.
    pub fn mark_finished(&mut self, status: LaunchStatus, at: DateTime<Utc>) {
        self.state = if status.setup_succeeded() {
            ContainerState::Stopped
        } else {
            ContainerState::Failed
        };
        self.finished_at = Some(at);
        self.status = Some(status);
    }
}

/// Location of the record of container `id`.
#[must_use]
pub fn record_path(container_dir: &Path, id: &ContainerId) -> PathBuf {
    container_dir.join(id.as_str()).join(STATE_FILE)
}

/// Loads the record at `path`.
///
/// # Errors
///
/// Returns [`PockerError::Io`] if the file cannot be read and
/// [`PockerError::Serialization`] if it is not a valid record.
pub fn load_record(path: &Path) -> Result<ContainerRecord> {
    tracing::debug!(path = %path.display(), "loading container record");
    let content = std::fs::read_to_string(path).map_err(|e| PockerError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    Ok(serde_json::from_str(&content)?)
}

/// Persists `record` to `path` atomically.
///
/// # Errors
///
/// Returns an error if the file cannot be written.
pub fn save_record(path: &Path, record: &ContainerRecord) -> Result<()> {
    tracing::debug!(path = %path.display(), state = %record.state, "saving container record");
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let io_error = |e| PockerError::Io {
        path: path.to_path_buf(),
        source: e,
    };
    let json = serde_json::to_vec_pretty(record)?;
    let mut staged = tempfile::NamedTempFile::new_in(dir).map_err(io_error)?;
    staged.write_all(&json).map_err(io_error)?;
    let _ = staged.persist(path).map_err(|e| io_error(e.error))?;
    Ok(())
}

/// Loads every record under `container_dir`, oldest first.
///
/// Directories without a record are skipped; a missing `container_dir`
/// yields an empty list.
///
/// # Errors
///
/// Returns an error if the directory cannot be read or a record is corrupt.
pub fn list_records(container_dir: &Path) -> Result<Vec<ContainerRecord>> {
    let entries = match std::fs::read_dir(container_dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => {
            return Err(PockerError::Io {
                path: container_dir.to_path_buf(),
                source: e,
            });
        }
    };

    let mut records = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| PockerError::Io {
            path: container_dir.to_path_buf(),
            source: e,
        })?;
        let path = entry.path().join(STATE_FILE);
        if path.is_file() {
            records.push(load_record(&path)?);
        }
    }
    records.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str) -> ContainerRecord {
        ContainerRecord::new(ContainerId::new(id), "ubuntu", vec!["sh".into()])
    }

    #[test]
    fn new_record_is_created_without_pid() {
        let r = record("a");
        assert_eq!(r.state, ContainerState::Created);
        assert!(r.pid.is_none());
        assert!(r.status.is_none());
    }

    #[test]
    fn finished_state_follows_setup_outcome() {
        let mut ok = record("a");
        ok.mark_running(10, None);
        ok.mark_finished(LaunchStatus::Exited { code: 3 }, Utc::now());
        assert_eq!(ok.state, ContainerState::Stopped);

        let mut failed = record("b");
        failed.mark_finished(
            LaunchStatus::SetupFailed(pocker_common::types::SetupFailure {
                stage: pocker_common::types::Stage::RootSwitched,
                kind: pocker_common::error::FailureKind::Pivot,
                message: "not a mount point".into(),
            }),
            Utc::now(),
        );
        assert_eq!(failed.state, ContainerState::Failed);
    }

    #[test]
    fn save_then_load_preserves_status() {
        let dir = tempfile::tempdir().unwrap();
        let mut r = record("abc");
        r.mark_running(4242, Some(99));
        r.mark_finished(LaunchStatus::Signaled { signal: 9 }, Utc::now());
        let path = dir.path().join(STATE_FILE);

        save_record(&path, &r).unwrap();
        assert_eq!(load_record(&path).unwrap(), r);
    }

    #[test]
    fn record_without_start_time_still_loads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(STATE_FILE);
        std::fs::write(
            &path,
            r#"{ "id": "abc", "image": "ubuntu", "command": ["sh"], "pid": 7,
                 "state": "running", "created_at": "2024-05-01T10:00:00Z" }"#,
        )
        .unwrap();
        let r = load_record(&path).unwrap();
        assert_eq!(r.pid, Some(7));
        assert_eq!(r.pid_start, None);
        assert_eq!(r.state, ContainerState::Running);
    }

    #[test]
    fn save_overwrites_previous_record() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(STATE_FILE);
        let mut r = record("abc");
        save_record(&path, &r).unwrap();
        r.mark_running(7, None);
        save_record(&path, &r).unwrap();
        assert_eq!(load_record(&path).unwrap().pid, Some(7));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn list_skips_directories_without_records() {
        let dir = tempfile::tempdir().unwrap();
        for id in ["one", "two"] {
            let r = record(id);
            let path = record_path(dir.path(), &r.id);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            save_record(&path, &r).unwrap();
        }
        std::fs::create_dir_all(dir.path().join("stray")).unwrap();

        let records = list_records(dir.path()).unwrap();
        let ids: Vec<_> = records.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids.len(), 2);
        assert!(ids.contains(&"one") && ids.contains(&"two"));
    }

    #[test]
    fn list_of_missing_directory_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(list_records(&dir.path().join("absent")).unwrap().is_empty());
    }

    #[test]
    fn corrupt_record_is_serialization_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(STATE_FILE);
        std::fs::write(&path, "{").unwrap();
        assert!(matches!(
            load_record(&path).unwrap_err(),
            PockerError::Serialization { .. }
        ));
    }
}
