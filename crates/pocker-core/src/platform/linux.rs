//! Real [`Platform`] backed by Linux syscalls through `nix`.

use std::collections::HashMap;
use std::ffi::CString;
use std::fs::{File, Permissions};
use std::io::{self, Read, Write};
use std::os::fd::OwnedFd;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::sync::{Mutex, PoisonError};

use nix::errno::Errno;
use nix::fcntl::OFlag;
use nix::mount::{MntFlags, MsFlags};
use nix::sched::CloneFlags;
use nix::sys::signal::{self, Signal as NixSignal};
use nix::sys::stat::{Mode, SFlag};
use nix::sys::wait::{WaitPidFlag, WaitStatus};
use nix::unistd::Pid;
use pocker_common::constants::SETUP_FAILURE_EXIT_CODE;
use pocker_common::types::SetupFailure;

use super::{ChildExit, ExitStatus, InitFn, MountFlags, Platform, Signal};
use crate::namespace::NamespaceConfig;

/// Stack handed to the cloned container-init process.
const CLONE_STACK_SIZE: usize = 1024 * 1024;

/// Platform that issues real syscalls.
///
/// Keeps the read end of each child's failure-report pipe until the child
/// is reaped.
#[derive(Debug, Default)]
pub struct LinuxPlatform {
    reports: Mutex<HashMap<u32, OwnedFd>>,
}

impl LinuxPlatform {
    /// Creates the platform.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn take_report(&self, pid: u32) -> io::Result<Option<SetupFailure>> {
        let fd = self
            .reports
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&pid);
        let Some(fd) = fd else {
            return Ok(None);
        };
        let mut report = String::new();
        let _ = File::from(fd).read_to_string(&mut report)?;
        if report.is_empty() {
            return Ok(None);
        }
        serde_json::from_str(&report).map(Some).map_err(io::Error::other)
    }

    fn finish(&self, pid: u32, status: ExitStatus) -> io::Result<ChildExit> {
        let failure = self.take_report(pid)?;
        Ok(ChildExit { status, failure })
    }
}

fn to_ms_flags(flags: MountFlags) -> MsFlags {
    let mut ms = MsFlags::empty();
    for (flag, bit) in [
        (MountFlags::NOSUID, MsFlags::MS_NOSUID),
        (MountFlags::NODEV, MsFlags::MS_NODEV),
        (MountFlags::NOEXEC, MsFlags::MS_NOEXEC),
        (MountFlags::RDONLY, MsFlags::MS_RDONLY),
        (MountFlags::STRICTATIME, MsFlags::MS_STRICTATIME),
        (MountFlags::PRIVATE, MsFlags::MS_PRIVATE),
        (MountFlags::RECURSIVE, MsFlags::MS_REC),
        (MountFlags::BIND, MsFlags::MS_BIND),
    ] {
        if flags.contains(flag) {
            ms |= bit;
        }
    }
    ms
}

fn to_clone_flags(namespaces: &NamespaceConfig) -> CloneFlags {
    let mut flags = CloneFlags::empty();
    for (enabled, flag) in [
        (namespaces.pid, CloneFlags::CLONE_NEWPID),
        (namespaces.mount, CloneFlags::CLONE_NEWNS),
        (namespaces.uts, CloneFlags::CLONE_NEWUTS),
        (namespaces.network, CloneFlags::CLONE_NEWNET),
    ] {
        if enabled {
            flags |= flag;
        }
    }
    flags
}

fn to_pid(pid: u32) -> io::Result<Pid> {
    i32::try_from(pid)
        .map(Pid::from_raw)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, format!("invalid pid {pid}")))
}

fn exit_status(status: WaitStatus) -> Option<ExitStatus> {
    match status {
        WaitStatus::Exited(_, code) => Some(ExitStatus::Exited(code)),
        WaitStatus::Signaled(_, sig, _) => Some(ExitStatus::Signaled(sig as i32)),
        _ => None,
    }
}

impl Platform for LinuxPlatform {
    fn mount(
        &self,
        source: Option<&str>,
        target: &Path,
        fstype: Option<&str>,
        flags: MountFlags,
        data: Option<&str>,
    ) -> io::Result<()> {
        nix::mount::mount(source, target, fstype, to_ms_flags(flags), data)?;
        tracing::debug!(target = %target.display(), ?fstype, ?flags, "mounted");
        Ok(())
    }

    fn unmount_detach(&self, target: &Path) -> io::Result<()> {
        nix::mount::umount2(target, MntFlags::MNT_DETACH)?;
        tracing::debug!(target = %target.display(), "detached mount");
        Ok(())
    }

    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        std::fs::create_dir_all(path)
    }

    fn remove_dir(&self, path: &Path) -> io::Result<()> {
        std::fs::remove_dir(path)
    }

    fn symlink(&self, original: &Path, link: &Path) -> io::Result<()> {
        std::os::unix::fs::symlink(original, link)
    }

    fn make_char_device(&self, path: &Path, mode: u32, major: u64, minor: u64) -> io::Result<()> {
        let dev = nix::sys::stat::makedev(major, minor);
        nix::sys::stat::mknod(path, SFlag::S_IFCHR, Mode::from_bits_truncate(mode), dev)?;
        // mknod(2) honours the umask; restore the exact mode.
        std::fs::set_permissions(path, Permissions::from_mode(mode))
    }

    fn write_file(&self, path: &Path, contents: &str) -> io::Result<()> {
        std::fs::write(path, contents)
    }

    fn set_hostname(&self, name: &str) -> io::Result<()> {
        nix::unistd::sethostname(name)?;
        Ok(())
    }

    fn pivot_root(&self, new_root: &Path, put_old: &Path) -> io::Result<()> {
        nix::unistd::pivot_root(new_root, put_old)?;
        Ok(())
    }

    fn change_dir(&self, path: &Path) -> io::Result<()> {
        nix::unistd::chdir(path)?;
        Ok(())
    }

    fn current_pid(&self) -> u32 {
        nix::unistd::getpid().as_raw().unsigned_abs()
    }

    fn exec(&self, argv: &[String]) -> io::Result<()> {
        let args = argv
            .iter()
            .map(|arg| CString::new(arg.as_str()))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        let Some(program) = args.first() else {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "empty command"));
        };
        match nix::unistd::execvp(program, &args) {
            Ok(never) => match never {},
            Err(errno) => Err(errno.into()),
        }
    }

    #[allow(unsafe_code)]
    fn spawn_isolated(&self, namespaces: &NamespaceConfig, init: InitFn<'_>) -> io::Result<u32> {
        let (report_rx, report_tx) = nix::unistd::pipe2(OFlag::O_CLOEXEC)?;
        let mut report_tx = File::from(report_tx);
        let mut init = Some(init);
        let callback = Box::new(move || -> isize {
            let outcome = init.take().map_or(Ok(()), |init| init());
            match outcome {
                Ok(()) => 0,
                Err(failure) => {
                    if let Ok(json) = serde_json::to_vec(&failure) {
                        let _ = report_tx.write_all(&json);
                    }
                    SETUP_FAILURE_EXIT_CODE as isize
                }
            }
        });

        let mut stack = vec![0_u8; CLONE_STACK_SIZE];
        // SAFETY: the child runs on a dedicated stack in a copy of this
        // address space (no CLONE_VM), only touches data moved into the
        // callback, and either execs or returns an exit status.
        let pid = unsafe {
            nix::sched::clone(
                callback,
                &mut stack,
                to_clone_flags(namespaces),
                Some(libc::SIGCHLD),
            )
        }?;
        let pid = pid.as_raw().unsigned_abs();
        let _ = self
            .reports
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(pid, report_rx);
        tracing::debug!(pid, ?namespaces, "cloned container init");
        Ok(pid)
    }

    fn wait(&self, pid: u32) -> io::Result<ChildExit> {
        let target = to_pid(pid)?;
        loop {
            match nix::sys::wait::waitpid(target, None) {
                Ok(status) => {
                    if let Some(status) = exit_status(status) {
                        return self.finish(pid, status);
                    }
                }
                Err(Errno::EINTR) => {}
                Err(errno) => return Err(errno.into()),
            }
        }
    }

    fn try_wait(&self, pid: u32) -> io::Result<Option<ChildExit>> {
        let target = to_pid(pid)?;
        match nix::sys::wait::waitpid(target, Some(WaitPidFlag::WNOHANG)) {
            Ok(status) => exit_status(status)
                .map(|status| self.finish(pid, status))
                .transpose(),
            Err(Errno::EINTR) => Ok(None),
            Err(errno) => Err(errno.into()),
        }
    }

    fn signal(&self, pid: u32, signal: Signal) -> io::Result<()> {
        let sig = match signal {
            Signal::Terminate => NixSignal::SIGTERM,
            Signal::Kill => NixSignal::SIGKILL,
        };
        signal::kill(to_pid(pid)?, sig)?;
        Ok(())
    }

    fn process_start(&self, pid: u32) -> io::Result<Option<u64>> {
        match std::fs::read_to_string(format!("/proc/{pid}/stat")) {
            Ok(stat) => parse_start_time(&stat),
            Err(e) if e.kind() == io::ErrorKind::NotFound || e.raw_os_error() == Some(libc::ESRCH) => {
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}

/// Extracts `starttime` (field 22) from a `/proc/<pid>/stat` line.
///
/// The command name (field 2) may itself contain spaces and parentheses,
/// so fields are counted from the last `)`.
fn parse_start_time(stat: &str) -> io::Result<Option<u64>> {
    let malformed = || io::Error::new(io::ErrorKind::InvalidData, format!("malformed stat line: {stat:?}"));
    let (_, rest) = stat.rsplit_once(')').ok_or_else(malformed)?;
    let mut fields = rest.split_whitespace();
    let state = fields.next().ok_or_else(malformed)?;
    if matches!(state, "Z" | "X") {
        return Ok(None);
    }
    fields
        .nth(18)
        .ok_or_else(malformed)?
        .parse()
        .map(Some)
        .map_err(|_| malformed())
}
