//! Supervision of a launched container.
//!
//! The supervisor holds a [`ContainerHandle`] for the container-init
//! process. Every way of ending supervision (wait, deadline, stop) reaps
//! the child, translates its termination into a [`LaunchStatus`] and
//! updates the container record.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use pocker_common::error::{PockerError, Result};
use pocker_common::types::{ContainerId, LaunchStatus};
use pocker_core::platform::{ChildExit, ExitStatus, Platform, Signal};
use serde::Serialize;

use crate::state::{self, ContainerRecord};

/// Interval between non-blocking reap attempts while a deadline runs.
const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Outcome of one supervised launch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LaunchReport {
    /// Container identity.
    pub id: ContainerId,
    /// PID of the init process in the supervisor's namespace.
    pub pid: u32,
    /// How the container ended.
    pub status: LaunchStatus,
    /// Whether the supervisor killed the container at a deadline.
    pub timed_out: bool,
    /// When the launch began.
    pub started_at: DateTime<Utc>,
    /// When the process was reaped.
    pub finished_at: DateTime<Utc>,
}

impl LaunchReport {
    /// Shell-style exit code of the launch.
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        self.status.exit_code()
    }
}

/// Translates a reaped child into a launch status.
///
/// A failure report from the init process wins over its exit code, so a
/// command that itself exits with the setup-failure code is still
/// reported as a normal exit.
#[must_use]
pub fn launch_status(exit: ChildExit) -> LaunchStatus {
    match (exit.failure, exit.status) {
        (Some(failure), _) => LaunchStatus::SetupFailed(failure),
        (None, ExitStatus::Exited(code)) => LaunchStatus::Exited { code },
        (None, ExitStatus::Signaled(signal)) => LaunchStatus::Signaled { signal },
    }
}

/// Sends signals to a container from any thread.
///
/// Refuses to signal once the supervisor has reaped the process, so a
/// late signal never reaches a process that reused the PID.
#[derive(Clone)]
pub struct Signaller {
    platform: Arc<dyn Platform>,
    pid: u32,
    reaped: Arc<AtomicBool>,
    interrupts: Arc<AtomicU32>,
}

impl std::fmt::Debug for Signaller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signaller").field("pid", &self.pid).finish_non_exhaustive()
    }
}

impl Signaller {
    /// Sends `signal` to the container's init process.
    ///
    /// Signalling PID 1 of a PID namespace tears down the whole namespace
    /// once it dies.
    ///
    /// # Errors
    ///
    /// Returns [`PockerError::NotFound`] if the process no longer exists
    /// or was already reaped.
    pub fn send(&self, signal: Signal) -> Result<()> {
        if self.reaped.load(Ordering::SeqCst) {
            return Err(PockerError::NotFound {
                kind: "process",
                id: format!("{} (already reaped)", self.pid),
            });
        }
        self.platform
            .signal(self.pid, signal)
            .map_err(|e| PockerError::NotFound {
                kind: "process",
                id: format!("{} ({e})", self.pid),
            })?;
        tracing::info!(pid = self.pid, ?signal, "signal sent");
        Ok(())
    }

    /// Handles a user interrupt such as Ctrl+C.
    ///
    /// The first interrupt sends `SIGTERM` and arms a `SIGKILL` after
    /// `grace`; the init process of a PID namespace drops `SIGTERM` unless
    /// it installed a handler. Any later interrupt sends `SIGKILL` at once.
    ///
    /// # Errors
    ///
    /// See [`Self::send`].
    pub fn interrupt(&self, grace: Duration) -> Result<()> {
        if self.interrupts.fetch_add(1, Ordering::SeqCst) > 0 {
            return self.send(Signal::Kill);
        }
        self.send(Signal::Terminate)?;
        let escalation = self.clone();
        let _ = std::thread::spawn(move || {
            std::thread::sleep(grace);
            if escalation.reaped.load(Ordering::SeqCst) {
                return;
            }
            tracing::warn!(pid = escalation.pid, ?grace, "grace period expired, killing container");
            if let Err(e) = escalation.send(Signal::Kill) {
                tracing::debug!(error = %e, "container already gone");
            }
        });
        Ok(())
    }
}

/// A running container owned by its supervisor.
pub struct ContainerHandle {
    platform: Arc<dyn Platform>,
    pid: u32,
    record: ContainerRecord,
    record_path: PathBuf,
    reaped: Arc<AtomicBool>,
    interrupts: Arc<AtomicU32>,
}

impl std::fmt::Debug for ContainerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContainerHandle")
            .field("id", &self.record.id)
            .field("pid", &self.pid)
            .finish_non_exhaustive()
    }
}

impl ContainerHandle {
    pub(crate) fn new(
        platform: Arc<dyn Platform>,
        pid: u32,
        record: ContainerRecord,
        record_path: PathBuf,
    ) -> Self {
        Self {
            platform,
            pid,
            record,
            record_path,
            reaped: Arc::new(AtomicBool::new(false)),
            interrupts: Arc::new(AtomicU32::new(0)),
        }
    }

    /// Container identity.
    pub const fn id(&self) -> &ContainerId {
        &self.record.id
    }

    /// PID of the init process in the supervisor's namespace.
    pub const fn pid(&self) -> u32 {
        self.pid
    }

    /// Returns a [`Signaller`] usable while this handle is blocked waiting.
    #[must_use]
    pub fn signaller(&self) -> Signaller {
        Signaller {
            platform: Arc::clone(&self.platform),
            pid: self.pid,
            reaped: Arc::clone(&self.reaped),
            interrupts: Arc::clone(&self.interrupts),
        }
    }

    /// Blocks until the container terminates and reaps it.
    ///
    /// # Errors
    ///
    /// Returns [`PockerError::Io`] if the child cannot be waited for.
    pub fn wait(self) -> Result<LaunchReport> {
        let exit = self.platform.wait(self.pid).map_err(|e| self.wait_error(e))?;
        Ok(self.finish(exit, false))
    }

    /// Like [`Self::wait`], but kills the container once `timeout` expires.
    ///
    /// # Errors
    ///
    /// Returns an error if the child cannot be waited for or signalled.
    pub fn wait_timeout(self, timeout: Duration) -> Result<LaunchReport> {
        if let Some(exit) = self.poll_until(Instant::now() + timeout)? {
            return Ok(self.finish(exit, false));
        }
        tracing::warn!(id = %self.record.id, pid = self.pid, ?timeout, "deadline expired, killing container");
        let exit = self.kill_and_reap()?;
        Ok(self.finish(exit, true))
    }

    /// Sends `SIGTERM`, waits up to `grace`, then sends `SIGKILL`.
    ///
    /// # Errors
    ///
    /// Returns an error if the child cannot be signalled or waited for.
    pub fn stop(self, grace: Duration) -> Result<LaunchReport> {
        self.signaller().send(Signal::Terminate)?;
        if let Some(exit) = self.poll_until(Instant::now() + grace)? {
            return Ok(self.finish(exit, false));
        }
        tracing::warn!(id = %self.record.id, pid = self.pid, ?grace, "container ignored SIGTERM");
        let exit = self.kill_and_reap()?;
        Ok(self.finish(exit, false))
    }

    fn poll_until(&self, deadline: Instant) -> Result<Option<ChildExit>> {
        loop {
            if let Some(exit) = self.platform.try_wait(self.pid).map_err(|e| self.wait_error(e))? {
                return Ok(Some(exit));
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            std::thread::sleep(POLL_INTERVAL.min(deadline - now));
        }
    }

    fn kill_and_reap(&self) -> Result<ChildExit> {
        self.signaller().send(Signal::Kill)?;
        self.platform.wait(self.pid).map_err(|e| self.wait_error(e))
    }

    fn wait_error(&self, source: std::io::Error) -> PockerError {
        PockerError::Io {
            path: self.record_path.clone(),
            source,
        }
    }

    fn finish(mut self, exit: ChildExit, timed_out: bool) -> LaunchReport {
        self.reaped.store(true, Ordering::SeqCst);
        let status = launch_status(exit);
        let finished_at = Utc::now();
        match &status {
            LaunchStatus::SetupFailed(failure) => {
                tracing::error!(id = %self.record.id, pid = self.pid, %failure, "container setup failed");
            }
            _ => tracing::info!(id = %self.record.id, pid = self.pid, %status, "container exited"),
        }

        self.record.mark_finished(status.clone(), finished_at);
        if let Err(e) = state::save_record(&self.record_path, &self.record) {
            tracing::warn!(id = %self.record.id, error = %e, "failed to update container record");
        }

        LaunchReport {
            id: self.record.id,
            pid: self.pid,
            status,
            timed_out,
            started_at: self.record.created_at,
            finished_at,
        }
    }
}
