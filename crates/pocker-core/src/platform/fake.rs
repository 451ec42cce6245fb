//! In-memory [`Platform`] for tests.
//!
//! Keeps a tree of nodes, a mount table, the hostname and the process root,
//! and logs every call in order. After [`Platform::pivot_root`], absolute
//! paths resolve beneath the new root the same way they would in the
//! container, so host-only paths stop being reachable.
//!
//! `spawn_isolated` runs the init body inline; what happens after a
//! successful `exec` is controlled with [`ChildBehavior`]. Any call can be
//! made to fail with [`FakePlatform::fail_on`] or [`FakePlatform::fail_at`].

use std::collections::{BTreeMap, HashMap};
use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use pocker_common::constants::SETUP_FAILURE_EXIT_CODE;

use super::{ChildExit, ExitStatus, InitFn, MountFlags, Platform, Signal};
use crate::namespace::NamespaceConfig;

/// PID handed to the first spawned child.
const FIRST_CHILD_PID: u32 = 4242;

/// PID reported by [`Platform::current_pid`] outside any child.
const HOST_PID: u32 = 1000;

/// A filesystem node in the fake tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FakeNode {
    /// Directory.
    Dir,
    /// Regular file with its contents.
    File(String),
    /// Symbolic link to a target.
    Symlink(PathBuf),
    /// Character device.
    CharDevice {
        /// Permission bits.
        mode: u32,
        /// Major number.
        major: u64,
        /// Minor number.
        minor: u64,
    },
}

/// One entry of the fake mount table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FakeMount {
    /// Mount source.
    pub source: Option<String>,
    /// Host-absolute mount point.
    pub target: PathBuf,
    /// Filesystem type.
    pub fstype: Option<String>,
    /// Mount flags.
    pub flags: MountFlags,
    /// Filesystem-specific options.
    pub data: Option<String>,
}

/// A recorded platform call, with paths exactly as the caller passed them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FakeOp {
    /// `mount`.
    Mount(FakeMount),
    /// `unmount_detach`.
    Unmount(PathBuf),
    /// `create_dir_all`.
    CreateDir(PathBuf),
    /// `remove_dir`.
    RemoveDir(PathBuf),
    /// `symlink`.
    Symlink {
        /// Link target.
        original: PathBuf,
        /// Link path.
        link: PathBuf,
    },
    /// `make_char_device`.
    CharDevice {
        /// Node path.
        path: PathBuf,
        /// Permission bits.
        mode: u32,
        /// Major number.
        major: u64,
        /// Minor number.
        minor: u64,
    },
    /// `write_file`.
    WriteFile {
        /// File path.
        path: PathBuf,
        /// Written contents.
        contents: String,
    },
    /// `set_hostname`.
    SetHostname(String),
    /// `pivot_root`.
    PivotRoot {
        /// New root.
        new_root: PathBuf,
        /// Where the old root went.
        put_old: PathBuf,
    },
    /// `change_dir`.
    ChangeDir(PathBuf),
    /// `exec`.
    Exec(Vec<String>),
    /// `spawn_isolated`.
    Spawn(NamespaceConfig),
    /// `signal`.
    Signal {
        /// Target PID.
        pid: u32,
        /// Signal sent.
        signal: Signal,
    },
}

/// Call kinds that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FakeCall {
    /// `mount`.
    Mount,
    /// `unmount_detach`.
    Unmount,
    /// `create_dir_all`.
    CreateDir,
    /// `remove_dir`.
    RemoveDir,
    /// `symlink`.
    Symlink,
    /// `make_char_device`.
    CharDevice,
    /// `write_file`.
    WriteFile,
    /// `set_hostname`.
    SetHostname,
    /// `pivot_root`.
    PivotRoot,
    /// `change_dir`.
    ChangeDir,
    /// `exec`.
    Exec,
    /// `spawn_isolated`.
    Spawn,
    /// `signal`.
    Signal,
}

/// What a spawned child does once its init body reached `exec`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildBehavior {
    /// Exits with the given code.
    Exit(i32),
    /// Dies from the given signal number.
    KilledBy(i32),
    /// Keeps running until signalled.
    Hang,
    /// Keeps running until `SIGKILL`; ignores `SIGTERM`.
    HangIgnoringTerm,
}

#[derive(Debug)]
struct Injection {
    call: FakeCall,
    path: Option<PathBuf>,
    kind: io::ErrorKind,
}

#[derive(Debug, Clone)]
enum ChildState {
    Running { ignores_term: bool },
    Done(ChildExit),
}

#[derive(Debug)]
struct State {
    ops: Vec<FakeOp>,
    nodes: BTreeMap<PathBuf, FakeNode>,
    mounts: Vec<FakeMount>,
    hostname: Option<String>,
    root: Option<PathBuf>,
    cwd: PathBuf,
    injections: Vec<Injection>,
    behavior: ChildBehavior,
    children: HashMap<u32, ChildState>,
    next_pid: u32,
    running_init: Option<u32>,
}

impl State {
    /// Maps a caller path to its host-absolute location.
    fn resolve(&self, path: &Path) -> PathBuf {
        let joined = if path.is_absolute() {
            let relative = path.strip_prefix("/").unwrap_or(path);
            self.root
                .as_ref()
                .map_or_else(|| path.to_path_buf(), |root| root.join(relative))
        } else {
            self.cwd.join(path)
        };
        normalize(&joined)
    }

    fn check(&self, call: FakeCall, path: Option<&Path>) -> io::Result<()> {
        let hit = self.injections.iter().find(|injection| {
            injection.call == call
                && match (&injection.path, path) {
                    (None, _) => true,
                    (Some(filter), Some(path)) => path.ends_with(filter),
                    (Some(_), None) => false,
                }
        });
        hit.map_or(Ok(()), |injection| {
            Err(io::Error::new(injection.kind, format!("injected {call:?} failure")))
        })
    }

    fn is_dir(&self, path: &Path) -> bool {
        path == Path::new("/") || matches!(self.nodes.get(path), Some(FakeNode::Dir))
    }

    fn is_mount_point(&self, path: &Path) -> bool {
        self.mounts.iter().any(|m| m.target == path)
    }

    fn insert_new(&mut self, path: PathBuf, node: FakeNode) -> io::Result<()> {
        if self.nodes.contains_key(&path) {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("{} exists", path.display()),
            ));
        }
        let _ = self.nodes.insert(path, node);
        Ok(())
    }
}

fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::from("/");
    for component in path.components() {
        match component {
            Component::ParentDir => {
                let _ = out.pop();
            }
            Component::Normal(part) => out.push(part),
            Component::RootDir | Component::CurDir | Component::Prefix(_) => {}
        }
    }
    out
}

fn not_found(path: &Path) -> io::Error {
    io::Error::new(io::ErrorKind::NotFound, format!("{} not found", path.display()))
}

fn invalid(message: String) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidInput, message)
}

type SpawnHook = Box<dyn Fn(u32) + Send + Sync>;

/// Recording, in-memory platform.
pub struct FakePlatform {
    state: Mutex<State>,
    spawn_hook: Mutex<Option<SpawnHook>>,
}

impl std::fmt::Debug for FakePlatform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FakePlatform")
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl Default for FakePlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl FakePlatform {
    /// Creates an empty fake whose children exit with code 0.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                ops: Vec::new(),
                nodes: BTreeMap::new(),
                mounts: Vec::new(),
                hostname: None,
                root: None,
                cwd: PathBuf::from("/"),
                injections: Vec::new(),
                behavior: ChildBehavior::Exit(0),
                children: HashMap::new(),
                next_pid: FIRST_CHILD_PID,
                running_init: None,
            }),
            spawn_hook: Mutex::new(None),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Sets what children do after reaching `exec`.
    #[must_use]
    pub fn with_child_behavior(self, behavior: ChildBehavior) -> Self {
        self.state().behavior = behavior;
        self
    }

    /// Runs `hook` with the child PID after every successful spawn.
    pub fn after_spawn(&self, hook: impl Fn(u32) + Send + Sync + 'static) {
        *self.spawn_hook.lock().unwrap_or_else(PoisonError::into_inner) = Some(Box::new(hook));
    }

    /// Makes every `call` fail with `PermissionDenied`.
    pub fn fail_on(&self, call: FakeCall) {
        self.state().injections.push(Injection {
            call,
            path: None,
            kind: io::ErrorKind::PermissionDenied,
        });
    }

    /// Makes `call` fail with `kind` when its path ends with `path`.
    pub fn fail_at(&self, call: FakeCall, path: impl Into<PathBuf>, kind: io::ErrorKind) {
        self.state().injections.push(Injection {
            call,
            path: Some(path.into()),
            kind,
        });
    }

    /// Seeds a directory (and its parents) on the host side.
    pub fn add_dir(&self, path: impl AsRef<Path>) {
        let mut state = self.state();
        for ancestor in normalize(path.as_ref()).ancestors() {
            if ancestor != Path::new("/") {
                let _ = state.nodes.entry(ancestor.to_path_buf()).or_insert(FakeNode::Dir);
            }
        }
    }

    /// Seeds a regular file on the host side.
    pub fn add_file(&self, path: impl AsRef<Path>, contents: &str) {
        let path = normalize(path.as_ref());
        if let Some(parent) = path.parent() {
            self.add_dir(parent);
        }
        let _ = self.state().nodes.insert(path, FakeNode::File(contents.to_string()));
    }

    /// All recorded calls, in order.
    pub fn ops(&self) -> Vec<FakeOp> {
        self.state().ops.clone()
    }

    /// Position of the first recorded call matching `predicate`.
    pub fn position(&self, predicate: impl Fn(&FakeOp) -> bool) -> Option<usize> {
        self.state().ops.iter().position(predicate)
    }

    /// The node at a host-absolute path.
    pub fn node(&self, path: impl AsRef<Path>) -> Option<FakeNode> {
        self.state().nodes.get(&normalize(path.as_ref())).cloned()
    }

    /// Contents of the file at a host-absolute path.
    pub fn file(&self, path: impl AsRef<Path>) -> Option<String> {
        match self.node(path) {
            Some(FakeNode::File(contents)) => Some(contents),
            _ => None,
        }
    }

    /// Names of the direct children of a host-absolute directory, sorted.
    pub fn entries(&self, dir: impl AsRef<Path>) -> Vec<String> {
        let dir = normalize(dir.as_ref());
        self.state()
            .nodes
            .keys()
            .filter(|path| path.parent() == Some(dir.as_path()))
            .filter_map(|path| path.file_name().map(|n| n.to_string_lossy().into_owned()))
            .collect()
    }

    /// Current mount table.
    pub fn mounts(&self) -> Vec<FakeMount> {
        self.state().mounts.clone()
    }

    /// Hostname set through the platform, if any.
    pub fn hostname(&self) -> Option<String> {
        self.state().hostname.clone()
    }

    /// Host-absolute path of the process root after `pivot_root`.
    pub fn root(&self) -> Option<PathBuf> {
        self.state().root.clone()
    }

    /// Whether `path`, as seen by the process, names an existing node.
    pub fn is_reachable(&self, path: impl AsRef<Path>) -> bool {
        let state = self.state();
        let resolved = state.resolve(path.as_ref());
        resolved == Path::new("/") || state.nodes.contains_key(&resolved)
    }

    /// Exit recorded for `pid`, if it has terminated and not been reaped.
    fn finished(state: &State, pid: u32) -> io::Result<Option<ChildExit>> {
        match state.children.get(&pid) {
            None => Err(io::Error::other(format!("no child process {pid}"))),
            Some(ChildState::Running { .. }) => Ok(None),
            Some(ChildState::Done(exit)) => Ok(Some(exit.clone())),
        }
    }
}

impl Platform for FakePlatform {
    fn mount(
        &self,
        source: Option<&str>,
        target: &Path,
        fstype: Option<&str>,
        flags: MountFlags,
        data: Option<&str>,
    ) -> io::Result<()> {
        let mut state = self.state();
        let mount = FakeMount {
            source: source.map(ToString::to_string),
            target: target.to_path_buf(),
            fstype: fstype.map(ToString::to_string),
            flags,
            data: data.map(ToString::to_string),
        };
        state.ops.push(FakeOp::Mount(mount.clone()));
        state.check(FakeCall::Mount, Some(target))?;

        let resolved = state.resolve(target);
        if !state.is_dir(&resolved) {
            return Err(not_found(target));
        }
        if flags.contains(MountFlags::PRIVATE) {
            // Propagation change only.
            return Ok(());
        }
        state.mounts.push(FakeMount {
            target: resolved,
            ..mount
        });
        Ok(())
    }

    fn unmount_detach(&self, target: &Path) -> io::Result<()> {
        let mut state = self.state();
        state.ops.push(FakeOp::Unmount(target.to_path_buf()));
        state.check(FakeCall::Unmount, Some(target))?;

        let resolved = state.resolve(target);
        let Some(index) = state.mounts.iter().rposition(|m| m.target == resolved) else {
            return Err(invalid(format!("{} is not a mount point", target.display())));
        };
        let _ = state.mounts.remove(index);
        Ok(())
    }

    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        let mut state = self.state();
        state.ops.push(FakeOp::CreateDir(path.to_path_buf()));
        state.check(FakeCall::CreateDir, Some(path))?;

        let resolved = state.resolve(path);
        let ancestors: Vec<PathBuf> = resolved
            .ancestors()
            .filter(|a| *a != Path::new("/"))
            .map(Path::to_path_buf)
            .collect();
        for ancestor in ancestors.into_iter().rev() {
            let existing = state.nodes.get(&ancestor).cloned();
            match existing {
                None => {
                    let _ = state.nodes.insert(ancestor, FakeNode::Dir);
                }
                Some(FakeNode::Dir) => {}
                Some(_) => {
                    return Err(io::Error::new(
                        io::ErrorKind::AlreadyExists,
                        format!("{} exists and is not a directory", ancestor.display()),
                    ));
                }
            }
        }
        Ok(())
    }

    fn remove_dir(&self, path: &Path) -> io::Result<()> {
        let mut state = self.state();
        state.ops.push(FakeOp::RemoveDir(path.to_path_buf()));
        state.check(FakeCall::RemoveDir, Some(path))?;

        let resolved = state.resolve(path);
        if !matches!(state.nodes.get(&resolved), Some(FakeNode::Dir)) {
            return Err(not_found(path));
        }
        if state.is_mount_point(&resolved) {
            return Err(io::Error::new(
                io::ErrorKind::ResourceBusy,
                format!("{} is a mount point", path.display()),
            ));
        }
        // Regular files go with their directory, like cgroupfs control files.
        let children: Vec<(PathBuf, bool)> = state
            .nodes
            .iter()
            .filter(|(p, _)| p.parent() == Some(resolved.as_path()))
            .map(|(p, node)| (p.clone(), matches!(node, FakeNode::File(_))))
            .collect();
        if children.iter().any(|(_, is_file)| !is_file) {
            return Err(io::Error::new(
                io::ErrorKind::DirectoryNotEmpty,
                format!("{} is not empty", path.display()),
            ));
        }
        for (child, _) in children {
            let _ = state.nodes.remove(&child);
        }
        let _ = state.nodes.remove(&resolved);
        Ok(())
    }

    fn symlink(&self, original: &Path, link: &Path) -> io::Result<()> {
        let mut state = self.state();
        state.ops.push(FakeOp::Symlink {
            original: original.to_path_buf(),
            link: link.to_path_buf(),
        });
        state.check(FakeCall::Symlink, Some(link))?;

        let resolved = state.resolve(link);
        state.insert_new(resolved, FakeNode::Symlink(original.to_path_buf()))
    }

    fn make_char_device(&self, path: &Path, mode: u32, major: u64, minor: u64) -> io::Result<()> {
        let mut state = self.state();
        state.ops.push(FakeOp::CharDevice {
            path: path.to_path_buf(),
            mode,
            major,
            minor,
        });
        state.check(FakeCall::CharDevice, Some(path))?;

        let resolved = state.resolve(path);
        state.insert_new(resolved, FakeNode::CharDevice { mode, major, minor })
    }

    fn write_file(&self, path: &Path, contents: &str) -> io::Result<()> {
        let mut state = self.state();
        state.ops.push(FakeOp::WriteFile {
            path: path.to_path_buf(),
            contents: contents.to_string(),
        });
        state.check(FakeCall::WriteFile, Some(path))?;

        let resolved = state.resolve(path);
        if !resolved.parent().is_some_and(|parent| state.is_dir(parent)) {
            return Err(not_found(path));
        }
        let _ = state.nodes.insert(resolved, FakeNode::File(contents.to_string()));
        Ok(())
    }

    fn set_hostname(&self, name: &str) -> io::Result<()> {
        let mut state = self.state();
        state.ops.push(FakeOp::SetHostname(name.to_string()));
        state.check(FakeCall::SetHostname, None)?;
        state.hostname = Some(name.to_string());
        Ok(())
    }

    fn pivot_root(&self, new_root: &Path, put_old: &Path) -> io::Result<()> {
        let mut state = self.state();
        state.ops.push(FakeOp::PivotRoot {
            new_root: new_root.to_path_buf(),
            put_old: put_old.to_path_buf(),
        });
        state.check(FakeCall::PivotRoot, Some(new_root))?;

        let new_root = state.resolve(new_root);
        let put_old = state.resolve(put_old);
        if !state.is_mount_point(&new_root) {
            return Err(invalid(format!("{} is not a mount point", new_root.display())));
        }
        if !put_old.starts_with(&new_root) || !state.is_dir(&put_old) {
            return Err(invalid(format!(
                "{} is not a directory under the new root",
                put_old.display()
            )));
        }
        state.mounts.push(FakeMount {
            source: None,
            target: put_old,
            fstype: Some("oldroot".into()),
            flags: MountFlags::empty(),
            data: None,
        });
        state.root = Some(new_root);
        Ok(())
    }

    fn change_dir(&self, path: &Path) -> io::Result<()> {
        let mut state = self.state();
        state.ops.push(FakeOp::ChangeDir(path.to_path_buf()));
        state.check(FakeCall::ChangeDir, Some(path))?;

        let resolved = state.resolve(path);
        if !state.is_dir(&resolved) {
            return Err(not_found(path));
        }
        state.cwd = resolved;
        Ok(())
    }

    fn current_pid(&self) -> u32 {
        self.state().running_init.unwrap_or(HOST_PID)
    }

    fn exec(&self, argv: &[String]) -> io::Result<()> {
        let mut state = self.state();
        state.ops.push(FakeOp::Exec(argv.to_vec()));
        state.check(FakeCall::Exec, argv.first().map(Path::new))?;
        if argv.is_empty() {
            return Err(invalid("empty command".into()));
        }
        Ok(())
    }

    fn spawn_isolated(&self, namespaces: &NamespaceConfig, init: InitFn<'_>) -> io::Result<u32> {
        let pid = {
            let mut state = self.state();
            state.ops.push(FakeOp::Spawn(namespaces.clone()));
            state.check(FakeCall::Spawn, None)?;
            let pid = state.next_pid;
            state.next_pid += 1;
            state.running_init = Some(pid);
            pid
        };

        let outcome = init();

        let mut state = self.state();
        state.running_init = None;
        state.cwd = PathBuf::from("/");
        state.root = None;
        let child = match outcome {
            Err(failure) => ChildState::Done(ChildExit {
                status: ExitStatus::Exited(SETUP_FAILURE_EXIT_CODE),
                failure: Some(failure),
            }),
            Ok(()) => match state.behavior {
                ChildBehavior::Exit(code) => ChildState::Done(ChildExit {
                    status: ExitStatus::Exited(code),
                    failure: None,
                }),
                ChildBehavior::KilledBy(signal) => ChildState::Done(ChildExit {
                    status: ExitStatus::Signaled(signal),
                    failure: None,
                }),
                ChildBehavior::Hang => ChildState::Running { ignores_term: false },
                ChildBehavior::HangIgnoringTerm => ChildState::Running { ignores_term: true },
            },
        };
        let _ = state.children.insert(pid, child);
        drop(state);

        if let Some(hook) = self.spawn_hook.lock().unwrap_or_else(PoisonError::into_inner).as_ref() {
            hook(pid);
        }
        Ok(pid)
    }

    fn wait(&self, pid: u32) -> io::Result<ChildExit> {
        let mut state = self.state();
        match Self::finished(&state, pid)? {
            Some(exit) => {
                let _ = state.children.remove(&pid);
                Ok(exit)
            }
            None => Err(io::Error::new(
                io::ErrorKind::WouldBlock,
                format!("child {pid} is still running; wait would block forever"),
            )),
        }
    }

    fn try_wait(&self, pid: u32) -> io::Result<Option<ChildExit>> {
        let mut state = self.state();
        let exit = Self::finished(&state, pid)?;
        if exit.is_some() {
            let _ = state.children.remove(&pid);
        }
        Ok(exit)
    }

    fn signal(&self, pid: u32, signal: Signal) -> io::Result<()> {
        let mut state = self.state();
        state.ops.push(FakeOp::Signal { pid, signal });
        state.check(FakeCall::Signal, None)?;

        let Some(child) = state.children.get_mut(&pid) else {
            return Err(io::Error::other(format!("no such process {pid}")));
        };
        if let ChildState::Running { ignores_term } = *child {
            if signal == Signal::Kill || !ignores_term {
                *child = ChildState::Done(ChildExit {
                    status: ExitStatus::Signaled(signal.number()),
                    failure: None,
                });
            }
        }
        Ok(())
    }

    fn process_start(&self, pid: u32) -> io::Result<Option<u64>> {
        let state = self.state();
        Ok(match state.children.get(&pid) {
            Some(ChildState::Running { .. }) => Some(u64::from(pid)),
            Some(ChildState::Done(_)) | None => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_dir_all_records_and_builds_tree() {
        let fake = FakePlatform::new();
        fake.create_dir_all(Path::new("/a/b/c")).unwrap();
        assert_eq!(fake.node("/a"), Some(FakeNode::Dir));
        assert_eq!(fake.node("/a/b/c"), Some(FakeNode::Dir));
        assert_eq!(fake.ops(), vec![FakeOp::CreateDir(PathBuf::from("/a/b/c"))]);
    }

    #[test]
    fn create_dir_over_file_fails() {
        let fake = FakePlatform::new();
        fake.add_file("/a/file", "x");
        let err = fake.create_dir_all(Path::new("/a/file/sub")).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::AlreadyExists);
    }

    #[test]
    fn write_file_requires_parent() {
        let fake = FakePlatform::new();
        assert!(fake.write_file(Path::new("/missing/tasks"), "1").is_err());
        fake.add_dir("/present");
        fake.write_file(Path::new("/present/tasks"), "1").unwrap();
        assert_eq!(fake.file("/present/tasks").as_deref(), Some("1"));
    }

    #[test]
    fn injected_failure_matches_path_suffix() {
        let fake = FakePlatform::new();
        fake.add_dir("/dev");
        fake.fail_at(FakeCall::CharDevice, "dev/null", io::ErrorKind::PermissionDenied);
        assert!(fake.make_char_device(Path::new("/dev/zero"), 0o666, 1, 5).is_ok());
        let err = fake.make_char_device(Path::new("/dev/null"), 0o666, 1, 3).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::PermissionDenied);
    }

    #[test]
    fn pivot_root_requires_mount_point() {
        let fake = FakePlatform::new();
        fake.add_dir("/new/old_root");
        let err = fake
            .pivot_root(Path::new("/new"), Path::new("/new/old_root"))
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }

    #[test]
    fn pivot_root_hides_host_paths() {
        let fake = FakePlatform::new();
        fake.add_file("/etc/host-only", "secret");
        fake.add_dir("/new/old_root");
        fake.mount(Some("overlay"), Path::new("/new"), Some("overlay"), MountFlags::empty(), None)
            .unwrap();
        fake.pivot_root(Path::new("/new"), Path::new("/new/old_root")).unwrap();
        assert!(!fake.is_reachable("/etc/host-only"));
        assert!(fake.is_reachable("/old_root"));
        fake.unmount_detach(Path::new("/old_root")).unwrap();
        fake.remove_dir(Path::new("/old_root")).unwrap();
        assert!(!fake.is_reachable("/old_root"));
        assert_eq!(fake.root(), Some(PathBuf::from("/new")));
    }

    #[test]
    fn remove_dir_refuses_mount_points() {
        let fake = FakePlatform::new();
        fake.add_dir("/mnt");
        fake.mount(Some("tmpfs"), Path::new("/mnt"), Some("tmpfs"), MountFlags::empty(), None)
            .unwrap();
        let err = fake.remove_dir(Path::new("/mnt")).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::ResourceBusy);
    }

    #[test]
    fn spawn_runs_init_inline_with_child_pid() {
        let fake = FakePlatform::new().with_child_behavior(ChildBehavior::Exit(7));
        let seen = Mutex::new(0);
        let pid = fake
            .spawn_isolated(
                &NamespaceConfig::default(),
                Box::new(|| {
                    *seen.lock().unwrap() = fake.current_pid();
                    Ok(())
                }),
            )
            .unwrap();
        assert_eq!(*seen.lock().unwrap(), pid);
        let exit = fake.wait(pid).unwrap();
        assert_eq!(exit.status, ExitStatus::Exited(7));
        assert!(fake.wait(pid).is_err(), "child reaped twice");
    }

    #[test]
    fn hanging_child_ignoring_term_needs_kill() {
        let fake = FakePlatform::new().with_child_behavior(ChildBehavior::HangIgnoringTerm);
        let pid = fake
            .spawn_isolated(&NamespaceConfig::default(), Box::new(|| Ok(())))
            .unwrap();
        assert_eq!(fake.try_wait(pid).unwrap(), None);
        fake.signal(pid, Signal::Terminate).unwrap();
        assert_eq!(fake.try_wait(pid).unwrap(), None);
        fake.signal(pid, Signal::Kill).unwrap();
        let exit = fake.try_wait(pid).unwrap().unwrap();
        assert_eq!(exit.status, ExitStatus::Signaled(9));
    }

    #[test]
    fn only_running_children_have_a_start_time() {
        let fake = FakePlatform::new().with_child_behavior(ChildBehavior::Hang);
        let pid = fake
            .spawn_isolated(&NamespaceConfig::default(), Box::new(|| Ok(())))
            .unwrap();
        assert_eq!(fake.process_start(pid).unwrap(), Some(u64::from(pid)));
        fake.signal(pid, Signal::Terminate).unwrap();
        assert_eq!(fake.process_start(pid).unwrap(), None);
        assert_eq!(fake.process_start(1).unwrap(), None);
    }

    #[test]
    fn spawn_hook_sees_the_child_pid() {
        let fake = FakePlatform::new();
        let seen = std::sync::Arc::new(Mutex::new(None));
        let sink = std::sync::Arc::clone(&seen);
        fake.after_spawn(move |pid| *sink.lock().unwrap() = Some(pid));
        let pid = fake
            .spawn_isolated(&NamespaceConfig::default(), Box::new(|| Ok(())))
            .unwrap();
        assert_eq!(*seen.lock().unwrap(), Some(pid));
    }
}
