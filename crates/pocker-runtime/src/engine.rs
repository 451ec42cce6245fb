//! Runtime engine that orchestrates container launches.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use pocker_common::config::PockerConfig;
use pocker_common::error::{PockerError, Result};
use pocker_common::types::{ContainerId, ContainerState, LaunchRequest};
use pocker_core::cgroup::{CgroupV1Controller, ResourceController};
use pocker_core::filesystem::overlayfs::ContainerPaths;
use pocker_core::namespace::{self, NamespaceConfig};
use pocker_core::platform::{self, Platform, Signal};
use pocker_image::storage::ImageStore;

use crate::init::{self, InitContext};
use crate::process::{ContainerHandle, LaunchReport};
use crate::state::{self, ContainerRecord};

/// Interval between liveness checks while a stop is in progress.
const STOP_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// How long a killed container may take to disappear.
const KILL_TIMEOUT: Duration = Duration::from_secs(5);

/// How long a live supervisor gets to record the outcome of a container
/// that has died before `stop` records it instead.
const SUPERVISOR_SETTLE: Duration = Duration::from_millis(500);

/// How [`Engine::stop`] ended a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// The container exited within the grace period after `SIGTERM`.
    Terminated,
    /// The container ignored `SIGTERM` and was killed.
    Killed,
    /// The recorded process was already gone, or its PID now belongs to
    /// another process; nothing was signalled.
    AlreadyGone,
}

/// The runtime engine that coordinates all container operations.
///
/// Each launch runs the init pipeline in a new process inside fresh
/// namespaces; any setup failure stays inside that process and comes back
/// as a [`pocker_common::types::LaunchStatus::SetupFailed`] status.
pub struct Engine {
    platform: Arc<dyn Platform>,
    config: PockerConfig,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Engine {
    /// Creates an engine over an explicit platform.
    #[must_use]
    pub fn new(platform: Arc<dyn Platform>, config: PockerConfig) -> Self {
        Self { platform, config }
    }

    /// Creates an engine over the native platform.
    ///
    /// # Errors
    ///
    /// Returns an error on operating systems without Linux namespaces.
    pub fn native(config: PockerConfig) -> Result<Self> {
        Ok(Self::new(platform::native()?, config))
    }

    /// Engine configuration.
    #[must_use]
    pub const fn config(&self) -> &PockerConfig {
        &self.config
    }

    /// Launches a container and returns without waiting for it.
    ///
    /// # Errors
    ///
    /// Returns an error if the container directory or initial record
    /// cannot be written or the init process cannot be spawned. Failures
    /// inside the container are reported through the handle instead.
    pub fn start(&self, request: &LaunchRequest) -> Result<ContainerHandle> {
        let id = ContainerId::generate();
        let image_dir = absolute(request.image_dir())?;
        let container_dir = absolute(request.container_dir())?;
        tracing::info!(id = %id, image = request.image(), command = ?request.command(), "launching container");

        let base = container_dir.join(id.as_str());
        std::fs::create_dir_all(&base).map_err(|e| PockerError::Io {
            path: base.clone(),
            source: e,
        })?;
        let record_path = state::record_path(&container_dir, &id);
        let mut record = ContainerRecord::new(id.clone(), request.image(), request.command().to_vec());
        state::save_record(&record_path, &record)?;

        let images = ImageStore::open(image_dir);
        let paths = ContainerPaths::new(&container_dir, &id);
        let resources = CgroupV1Controller::new(self.platform.as_ref(), &self.config.cgroup);
        let ctx = InitContext {
            platform: self.platform.as_ref(),
            resources: &resources,
            images: &images,
            id: &id,
            paths: &paths,
            request,
        };

        let pid = match namespace::spawn_init(
            self.platform.as_ref(),
            &id,
            &NamespaceConfig::default(),
            Box::new(|| init::run(&ctx)),
        ) {
            Ok(pid) => pid,
            Err(e) => {
                record.state = ContainerState::Failed;
                let _ = state::save_record(&record_path, &record);
                return Err(e);
            }
        };

        let started = match self.platform.process_start(pid) {
            Ok(started) => started,
            Err(e) => {
                tracing::warn!(id = %id, pid, error = %e, "cannot read process start time");
                None
            }
        };
        record.mark_running(pid, started);
        // The child exists now; only the handle can reap it.
        if let Err(e) = state::save_record(&record_path, &record) {
            tracing::warn!(id = %id, pid, error = %e, "failed to record running container");
        }
        Ok(ContainerHandle::new(Arc::clone(&self.platform), pid, record, record_path))
    }

    /// Launches a container and blocks until it terminates.
    ///
    /// # Errors
    ///
    /// See [`Self::start`] and [`ContainerHandle::wait`].
    pub fn run(&self, request: &LaunchRequest) -> Result<LaunchReport> {
        self.start(request)?.wait()
    }

    /// Lists the containers under the configured container directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory or a record cannot be read.
    pub fn list(&self) -> Result<Vec<ContainerRecord>> {
        state::list_records(&self.config.container_dir)
    }

    /// Stops a running container.
    ///
    /// `id` may be a unique prefix, as shown by `pocker ps`.
    ///
    /// Sends `SIGTERM` to its init process and waits up to
    /// `stop_grace_secs` for it to exit, then sends `SIGKILL`. The init
    /// process of a PID namespace drops `SIGTERM` unless it installed a
    /// handler, so most commands only end at the `SIGKILL`. The supervisor
    /// that launched the container reaps it and records the outcome; a
    /// container whose process is gone, or whose PID was reused, is marked
    /// stopped without being signalled.
    ///
    /// # Errors
    ///
    /// Returns [`PockerError::NotFound`] for an unknown container,
    /// [`PockerError::Config`] if it is not running and [`PockerError::Io`]
    /// if it survives `SIGKILL` or its record cannot be updated.
    pub fn stop(&self, id: &ContainerId) -> Result<StopOutcome> {
        let (path, record) = self.load(id)?;
        let id = record.id.clone();
        let Some(pid) = record.pid.filter(|_| record.state == ContainerState::Running) else {
            return Err(PockerError::Config {
                message: format!("container {id} is not running"),
            });
        };

        if !self.is_alive(&record, pid)? {
            tracing::warn!(id = %id, pid, "container process is gone, marking stopped");
            settle(&path)?;
            return Ok(StopOutcome::AlreadyGone);
        }

        if let Err(e) = self.platform.signal(pid, Signal::Terminate) {
            tracing::warn!(id = %id, pid, error = %e, "container process is gone, marking stopped");
            settle(&path)?;
            return Ok(StopOutcome::AlreadyGone);
        }
        tracing::info!(id = %id, pid, "SIGTERM sent");

        let grace = Duration::from_secs(self.config.stop_grace_secs);
        if self.wait_gone(&path, &record, pid, grace)? {
            settle(&path)?;
            tracing::info!(id = %id, "container stopped");
            return Ok(StopOutcome::Terminated);
        }

        tracing::warn!(id = %id, pid, ?grace, "container ignored SIGTERM, sending SIGKILL");
        if let Err(e) = self.platform.signal(pid, Signal::Kill) {
            tracing::debug!(id = %id, pid, error = %e, "container exited before SIGKILL");
        }
        if !self.wait_gone(&path, &record, pid, KILL_TIMEOUT)? {
            return Err(PockerError::Io {
                path,
                source: std::io::Error::new(
                    std::io::ErrorKind::TimedOut,
                    format!("container {id} (pid {pid}) survived SIGKILL"),
                ),
            });
        }
        settle(&path)?;
        tracing::info!(id = %id, "container killed");
        Ok(StopOutcome::Killed)
    }

    /// Whether `pid` is still the process recorded in `record`.
    fn is_alive(&self, record: &ContainerRecord, pid: u32) -> Result<bool> {
        let started = self
            .platform
            .process_start(pid)
            .map_err(|e| PockerError::Io {
                path: PathBuf::from(format!("/proc/{pid}")),
                source: e,
            })?;
        Ok(match (started, record.pid_start) {
            (None, _) => false,
            (Some(now), Some(recorded)) => now == recorded,
            (Some(_), None) => true,
        })
    }

    /// Polls until the container process is gone or `timeout` expires.
    fn wait_gone(
        &self,
        path: &Path,
        record: &ContainerRecord,
        pid: u32,
        timeout: Duration,
    ) -> Result<bool> {
        let deadline = Instant::now() + timeout;
        loop {
            let recorded_done =
                state::load_record(path).is_ok_and(|r| r.state != ContainerState::Running);
            if recorded_done || !self.is_alive(record, pid)? {
                return Ok(true);
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(false);
            }
            std::thread::sleep(STOP_POLL_INTERVAL.min(deadline - now));
        }
    }

    /// Deletes a container that is no longer running.
    ///
    /// `id` may be a unique prefix, as shown by `pocker ps`.
    ///
    /// Releases its cgroup leaves and removes its directory.
    ///
    /// # Errors
    ///
    /// Returns [`PockerError::NotFound`] for an unknown container,
    /// [`PockerError::Config`] if it is still running and
    /// [`PockerError::Cgroup`] or [`PockerError::Io`] if cleanup fails.
    pub fn remove(&self, id: &ContainerId) -> Result<()> {
        let (_, record) = self.load(id)?;
        let id = &record.id;
        if record.state == ContainerState::Running {
            return Err(PockerError::Config {
                message: format!("container {id} is running; stop it first"),
            });
        }

        CgroupV1Controller::new(self.platform.as_ref(), &self.config.cgroup).release(id)?;

        let base = self.config.container_dir.join(id.as_str());
        std::fs::remove_dir_all(&base).map_err(|e| PockerError::Io {
            path: base.clone(),
            source: e,
        })?;
        tracing::info!(id = %id, "container removed");
        Ok(())
    }

    /// Loads the record of `id`, which may be a unique prefix of a full
    /// container ID.
    fn load(&self, id: &ContainerId) -> Result<(PathBuf, ContainerRecord)> {
        let path = state::record_path(&self.config.container_dir, id);
        if path.is_file() {
            let record = state::load_record(&path)?;
            return Ok((path, record));
        }

        let not_found = || PockerError::NotFound {
            kind: "container",
            id: id.to_string(),
        };
        if id.as_str().is_empty() {
            return Err(not_found());
        }
        let mut matches = state::list_records(&self.config.container_dir)?
            .into_iter()
            .filter(|record| record.id.as_str().starts_with(id.as_str()));
        let record = matches.next().ok_or_else(not_found)?;
        if matches.next().is_some() {
            return Err(PockerError::Config {
                message: format!("container ID prefix {id} is ambiguous"),
            });
        }
        let path = state::record_path(&self.config.container_dir, &record.id);
        Ok((path, record))
    }
}

/// Marks a dead container stopped unless its supervisor records the
/// outcome within [`SUPERVISOR_SETTLE`].
fn settle(path: &Path) -> Result<()> {
    let deadline = Instant::now() + SUPERVISOR_SETTLE;
    loop {
        let mut record = state::load_record(path)?;
        if record.state != ContainerState::Running {
            return Ok(());
        }
        let now = Instant::now();
        if now >= deadline {
            record.state = ContainerState::Stopped;
            record.finished_at = Some(chrono::Utc::now());
            return state::save_record(path, &record);
        }
        std::thread::sleep(STOP_POLL_INTERVAL.min(deadline - now));
    }
}

fn absolute(path: &Path) -> Result<PathBuf> {
    std::path::absolute(path).map_err(|e| PockerError::Io {
        path: path.to_path_buf(),
        source: e,
    })
}
