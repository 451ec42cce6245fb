//! cgroup v1 resource management.
//!
//! Each container gets one leaf per controller at
//! `<controller root>/<group>/<container id>`. The container-init process
//! joins both leaves before anything is forked beneath it, so every
//! descendant inherits the membership.

pub mod cpu;
pub mod memory;

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use pocker_common::config::CgroupConfig;
use pocker_common::error::{PockerError, Result};
use pocker_common::types::{ContainerId, ResourceLimits};

use crate::platform::Platform;

/// Membership file of a cgroup v1 hierarchy.
const TASKS_FILE: &str = "tasks";

/// Controllers a container is limited by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Subsystem {
    /// The `cpu` controller.
    Cpu,
    /// The `memory` controller.
    Memory,
}

impl Subsystem {
    /// Controller name as used by the kernel.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Cpu => "cpu",
            Self::Memory => "memory",
        }
    }
}

impl fmt::Display for Subsystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Returns the leaf directory of container `id` under `root`.
#[must_use]
pub fn leaf_path(root: &Path, group: &str, id: &ContainerId) -> PathBuf {
    root.join(group).join(id.as_str())
}

/// One container's leaf in one controller hierarchy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CgroupHandle {
    subsystem: Subsystem,
    path: PathBuf,
}

impl CgroupHandle {
    /// Creates the leaf directory if it does not exist yet.
    ///
    /// # Errors
    ///
    /// Returns [`PockerError::Cgroup`] if the directory cannot be created.
    pub fn create(platform: &dyn Platform, subsystem: Subsystem, path: PathBuf) -> Result<Self> {
        platform.create_dir_all(&path).map_err(|e| PockerError::Cgroup {
            path: path.clone(),
            source: e,
        })?;
        tracing::debug!(%subsystem, path = %path.display(), "cgroup leaf ready");
        Ok(Self { subsystem, path })
    }

    /// Controller this leaf belongs to.
    pub const fn subsystem(&self) -> Subsystem {
        self.subsystem
    }

    /// Leaf directory.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Moves `pid` into this leaf.
    ///
    /// # Errors
    ///
    /// Returns [`PockerError::Cgroup`] if writing `tasks` fails.
    pub fn join(&self, platform: &dyn Platform, pid: u32) -> Result<()> {
        self.write(platform, TASKS_FILE, &pid.to_string())?;
        tracing::debug!(subsystem = %self.subsystem, pid, "joined cgroup");
        Ok(())
    }

    /// Writes `value` to the control file `file` of this leaf.
    ///
    /// # Errors
    ///
    /// Returns [`PockerError::Cgroup`] if the write fails.
    pub fn write(&self, platform: &dyn Platform, file: &str, value: &str) -> Result<()> {
        let target = self.path.join(file);
        platform
            .write_file(&target, value)
            .map_err(|e| PockerError::Cgroup {
                path: target,
                source: e,
            })
    }

    /// Removes the leaf. A leaf that is already gone is not an error.
    ///
    /// # Errors
    ///
    /// Returns [`PockerError::Cgroup`] if `rmdir(2)` fails, typically because
    /// processes are still attached.
    pub fn remove(&self, platform: &dyn Platform) -> Result<()> {
        match platform.remove_dir(&self.path) {
            Ok(()) => {
                tracing::debug!(subsystem = %self.subsystem, path = %self.path.display(), "cgroup leaf removed");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(PockerError::Cgroup {
                path: self.path.clone(),
                source: e,
            }),
        }
    }
}

/// Applies and releases per-container resource limits.
pub trait ResourceController {
    /// Places the calling process in the container's groups and applies
    /// the requested limits.
    ///
    /// # Errors
    ///
    /// Returns [`PockerError::Cgroup`] on any failed write.
    fn apply(&self, id: &ContainerId, limits: &ResourceLimits) -> Result<()>;

    /// Removes the container's groups.
    ///
    /// # Errors
    ///
    /// Returns [`PockerError::Cgroup`] if a group cannot be removed.
    fn release(&self, id: &ContainerId) -> Result<()>;
}

/// [`ResourceController`] over the cgroup v1 `cpu` and `memory` controllers.
#[derive(Clone, Copy)]
pub struct CgroupV1Controller<'a> {
    platform: &'a dyn Platform,
    config: &'a CgroupConfig,
}

impl fmt::Debug for CgroupV1Controller<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CgroupV1Controller")
            .field("config", self.config)
            .finish_non_exhaustive()
    }
}

impl<'a> CgroupV1Controller<'a> {
    /// Creates a controller rooted at the locations in `config`.
    pub const fn new(platform: &'a dyn Platform, config: &'a CgroupConfig) -> Self {
        Self { platform, config }
    }

    /// Leaf directory of container `id` for `subsystem`.
    #[must_use]
    pub fn leaf(&self, subsystem: Subsystem, id: &ContainerId) -> PathBuf {
        let root = match subsystem {
            Subsystem::Cpu => &self.config.cpu_root,
            Subsystem::Memory => &self.config.memory_root,
        };
        leaf_path(root, &self.config.group, id)
    }

    fn enter(&self, subsystem: Subsystem, id: &ContainerId, pid: u32) -> Result<CgroupHandle> {
        let handle = CgroupHandle::create(self.platform, subsystem, self.leaf(subsystem, id))?;
        handle.join(self.platform, pid)?;
        Ok(handle)
    }
}

impl ResourceController for CgroupV1Controller<'_> {
    fn apply(&self, id: &ContainerId, limits: &ResourceLimits) -> Result<()> {
        let pid = self.platform.current_pid();

        let cpu = self.enter(Subsystem::Cpu, id, pid)?;
        if let Some(shares) = limits.cpu_shares {
            cpu::set_cpu_shares(self.platform, &cpu, shares)?;
        }

        let mem = self.enter(Subsystem::Memory, id, pid)?;
        if let Some(bytes) = limits.memory_bytes {
            memory::set_memory_limit(self.platform, &mem, bytes)?;
            if let Some(swap) = limits.memory_swap {
                memory::set_memory_swap_limit(self.platform, &mem, swap)?;
            }
        }

        tracing::info!(id = %id, pid, ?limits, "resource limits applied");
        Ok(())
    }

    fn release(&self, id: &ContainerId) -> Result<()> {
        for subsystem in [Subsystem::Cpu, Subsystem::Memory] {
            let handle = CgroupHandle {
                subsystem,
                path: self.leaf(subsystem, id),
            };
            handle.remove(self.platform)?;
        }
        tracing::info!(id = %id, "cgroup leaves released");
        Ok(())
    }
}
