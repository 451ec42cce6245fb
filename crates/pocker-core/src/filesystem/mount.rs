//! Pseudo-filesystems mounted inside the container root.

use std::path::Path;

use pocker_common::error::{PockerError, Result};

use crate::platform::{MountFlags, Platform};

/// Mounts `proc` at `<root>/proc` and `sysfs` at `<root>/sys`.
///
/// Missing mount points are created first; images usually ship them.
///
/// # Errors
///
/// Returns [`PockerError::Mount`] if a directory cannot be created or a
/// mount is refused.
pub fn mount_proc_sys(platform: &dyn Platform, root: &Path) -> Result<()> {
    for (fstype, dir) in [("proc", "proc"), ("sysfs", "sys")] {
        let target = root.join(dir);
        let mount_error = |e| PockerError::Mount {
            target: target.clone(),
            source: e,
        };
        platform.create_dir_all(&target).map_err(mount_error)?;
        platform
            .mount(Some(fstype), &target, Some(fstype), MountFlags::empty(), None)
            .map_err(mount_error)?;
        tracing::debug!(fstype, target = %target.display(), "pseudo-filesystem mounted");
    }
    Ok(())
}
