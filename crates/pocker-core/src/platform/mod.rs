//! Narrow interface over the privileged OS primitives used by a launch.
//!
//! Pipeline code (ordering, path computation, limit formatting, error
//! classification) only talks to [`Platform`]. [`LinuxPlatform`] performs
//! the real syscalls; `fake::FakePlatform` (behind the `testing` feature)
//! records them in memory so the whole pipeline can be exercised without
//! privilege.
//!
//! Primitives return plain [`std::io::Result`]; the calling stage decides
//! which [`pocker_common::error::PockerError`] variant a failure becomes.

#[cfg(any(test, feature = "testing"))]
pub mod fake;
#[cfg(target_os = "linux")]
mod linux;

use std::io;
use std::path::Path;
use std::sync::Arc;

use pocker_common::error::Result;
use pocker_common::types::SetupFailure;

#[cfg(target_os = "linux")]
pub use linux::LinuxPlatform;

use crate::namespace::NamespaceConfig;

bitflags::bitflags! {
    /// Platform-neutral mount flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct MountFlags: u32 {
        /// Ignore set-user-ID and set-group-ID bits.
        const NOSUID = 1 << 0;
        /// Refuse access to device special files.
        const NODEV = 1 << 1;
        /// Refuse program execution.
        const NOEXEC = 1 << 2;
        /// Mount read-only.
        const RDONLY = 1 << 3;
        /// Always update access times.
        const STRICTATIME = 1 << 4;
        /// Change propagation to private.
        const PRIVATE = 1 << 5;
        /// Apply to the whole subtree.
        const RECURSIVE = 1 << 6;
        /// Bind mount.
        const BIND = 1 << 7;
    }
}

/// Signals the supervisor sends to a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Signal {
    /// `SIGTERM`: ask the container to shut down.
    Terminate,
    /// `SIGKILL`: tear the container down.
    Kill,
}

impl Signal {
    /// Linux signal number.
    pub const fn number(self) -> i32 {
        match self {
            Self::Terminate => 15,
            Self::Kill => 9,
        }
    }
}

/// Raw termination of a reaped child.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    /// Normal exit with a code.
    Exited(i32),
    /// Killed by a signal number.
    Signaled(i32),
}

/// What the supervisor learns when it reaps a container-init process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildExit {
    /// How the process ended.
    pub status: ExitStatus,
    /// Report sent by the init process if it failed before `exec`.
    pub failure: Option<SetupFailure>,
}

/// Body of the container-init process.
///
/// Returns only if the launch failed or `exec` returned; on a real platform a
/// successful `exec` never comes back.
pub type InitFn<'a> = Box<dyn FnOnce() -> std::result::Result<(), SetupFailure> + 'a>;

/// The privileged operations a container launch needs.
pub trait Platform: Send + Sync {
    /// Mounts `source` on `target`.
    ///
    /// # Errors
    ///
    /// Returns the OS error of `mount(2)`.
    fn mount(
        &self,
        source: Option<&str>,
        target: &Path,
        fstype: Option<&str>,
        flags: MountFlags,
        data: Option<&str>,
    ) -> io::Result<()>;

    /// Lazily detaches the mount at `target` (`MNT_DETACH`).
    ///
    /// # Errors
    ///
    /// Returns the OS error of `umount2(2)`.
    fn unmount_detach(&self, target: &Path) -> io::Result<()>;

    /// Creates `path` and any missing parents.
    ///
    /// # Errors
    ///
    /// Fails if a component exists and is not a directory.
    fn create_dir_all(&self, path: &Path) -> io::Result<()>;

    /// Removes the empty directory `path`.
    ///
    /// # Errors
    ///
    /// Returns the OS error of `rmdir(2)`.
    fn remove_dir(&self, path: &Path) -> io::Result<()>;

    /// Creates a symbolic link at `link` pointing to `original`.
    ///
    /// # Errors
    ///
    /// Fails if `link` already exists.
    fn symlink(&self, original: &Path, link: &Path) -> io::Result<()>;

    /// Creates a character device node with exactly `mode` permissions.
    ///
    /// # Errors
    ///
    /// Returns the OS error of `mknod(2)` or `chmod(2)`.
    fn make_char_device(&self, path: &Path, mode: u32, major: u64, minor: u64) -> io::Result<()>;

    /// Writes `contents` to the file at `path`, replacing what was there.
    ///
    /// # Errors
    ///
    /// Returns the OS error of the open or write.
    fn write_file(&self, path: &Path, contents: &str) -> io::Result<()>;

    /// Sets the hostname of the current UTS namespace.
    ///
    /// # Errors
    ///
    /// Returns the OS error of `sethostname(2)`.
    fn set_hostname(&self, name: &str) -> io::Result<()>;

    /// Makes `new_root` the root and moves the old root to `put_old`.
    ///
    /// # Errors
    ///
    /// Returns the OS error of `pivot_root(2)`.
    fn pivot_root(&self, new_root: &Path, put_old: &Path) -> io::Result<()>;

    /// Changes the working directory.
    ///
    /// # Errors
    ///
    /// Returns the OS error of `chdir(2)`.
    fn change_dir(&self, path: &Path) -> io::Result<()>;

    /// Process ID of the caller, as seen from its own PID namespace.
    fn current_pid(&self) -> u32;

    /// Replaces the current process image, searching `PATH` for `argv[0]`.
    ///
    /// # Errors
    ///
    /// Returns the OS error of `execvp(3)`. A real platform never returns
    /// `Ok`.
    fn exec(&self, argv: &[String]) -> io::Result<()>;

    /// Runs `init` as a new process inside fresh namespaces and returns its
    /// PID as seen by the caller.
    ///
    /// # Errors
    ///
    /// Returns the OS error of `clone(2)`.
    fn spawn_isolated(&self, namespaces: &NamespaceConfig, init: InitFn<'_>) -> io::Result<u32>;

    /// Blocks until the child `pid` terminates and reaps it.
    ///
    /// # Errors
    ///
    /// Returns the OS error of `waitpid(2)`.
    fn wait(&self, pid: u32) -> io::Result<ChildExit>;

    /// Reaps the child `pid` if it has terminated, without blocking.
    ///
    /// # Errors
    ///
    /// Returns the OS error of `waitpid(2)`.
    fn try_wait(&self, pid: u32) -> io::Result<Option<ChildExit>>;

    /// Sends `signal` to `pid`.
    ///
    /// # Errors
    ///
    /// Returns the OS error of `kill(2)`.
    fn signal(&self, pid: u32, signal: Signal) -> io::Result<()>;

    /// Start time of the live process `pid`, in clock ticks since boot.
    ///
    /// Returns `None` when no live process has that PID; a zombie counts
    /// as gone. Comparing start times tells a container's init process
    /// apart from a later process that reused its PID.
    ///
    /// # Errors
    ///
    /// Returns an error if the process table cannot be read.
    fn process_start(&self, pid: u32) -> io::Result<Option<u64>>;
}

/// Returns the platform implementation for the running operating system.
///
/// # Errors
///
/// Never fails on Linux.
#[cfg(target_os = "linux")]
pub fn native() -> Result<Arc<dyn Platform>> {
    Ok(Arc::new(LinuxPlatform::new()))
}

/// Stub for non-Linux platforms.
///
/// # Errors
///
/// Always returns an error: containers require Linux namespaces.
#[cfg(not(target_os = "linux"))]
pub fn native() -> Result<Arc<dyn Platform>> {
    Err(pocker_common::error::PockerError::Config {
        message: "Linux required for native container operations".into(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signal_numbers_match_linux() {
        assert_eq!(Signal::Terminate.number(), 15);
        assert_eq!(Signal::Kill.number(), 9);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn native_platform_is_available_on_linux() {
        let platform = native().unwrap();
        assert!(platform.current_pid() > 0);
    }
}
