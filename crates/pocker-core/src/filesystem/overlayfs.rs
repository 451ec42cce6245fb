//! `OverlayFS` assembly of a container root.
//!
//! The shared, read-only image cache is the lower layer; each container
//! gets its own writable upper layer and scratch directory.

use std::path::{Path, PathBuf};

use pocker_common::constants::{DIFF_DIR, ROOTFS_DIR, WORKER_DIR};
use pocker_common::error::{PockerError, Result};
use pocker_common::types::ContainerId;

use crate::platform::{MountFlags, Platform};

/// Per-container directories under `<container_dir>/<id>/`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerPaths {
    /// Overlay mount point; becomes the container root.
    pub rootfs: PathBuf,
    /// Writable upper layer.
    pub diff: PathBuf,
    /// Overlay scratch directory.
    pub worker: PathBuf,
}

impl ContainerPaths {
    /// Computes the paths of container `id`.
    #[must_use]
    pub fn new(container_dir: &Path, id: &ContainerId) -> Self {
        let base = container_dir.join(id.as_str());
        Self {
            rootfs: base.join(ROOTFS_DIR),
            diff: base.join(DIFF_DIR),
            worker: base.join(WORKER_DIR),
        }
    }

    /// Creates any of the three directories that do not exist yet.
    ///
    /// # Errors
    ///
    /// Returns [`PockerError::Io`] if a directory cannot be created, for
    /// instance because a regular file is in the way.
    pub fn ensure(&self, platform: &dyn Platform) -> Result<()> {
        for dir in [&self.rootfs, &self.diff, &self.worker] {
            platform.create_dir_all(dir).map_err(|e| PockerError::Io {
                path: dir.clone(),
                source: e,
            })?;
        }
        Ok(())
    }
}

/// Option string of an overlay mount.
///
/// Layer paths must not contain `:` or `,`; see [`mount_overlay`].
#[must_use]
pub fn overlay_options(lower: &Path, paths: &ContainerPaths) -> String {
    format!(
        "lowerdir={},upperdir={},workdir={}",
        lower.display(),
        paths.diff.display(),
        paths.worker.display()
    )
}

/// Creates the container directories and mounts the overlay at `rootfs`.
///
/// The mount carries `nodev`, so device files surfacing from the image
/// cannot be opened through the merged view.
///
/// # Errors
///
/// Returns [`PockerError::Io`] if the directories cannot be created and
/// [`PockerError::Mount`] if a layer path contains `:` or `,` or the
/// overlay mount is refused.
pub fn mount_overlay(platform: &dyn Platform, lower: &Path, paths: &ContainerPaths) -> Result<PathBuf> {
    for layer in [lower, paths.diff.as_path(), paths.worker.as_path()] {
        if layer.to_string_lossy().contains([':', ',']) {
            return Err(PockerError::Mount {
                target: paths.rootfs.clone(),
                source: std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    format!("overlay layer {} contains ':' or ','", layer.display()),
                ),
            });
        }
    }
    paths.ensure(platform)?;
    let options = overlay_options(lower, paths);
    platform
        .mount(
            Some("overlay"),
            &paths.rootfs,
            Some("overlay"),
            MountFlags::NODEV,
            Some(&options),
        )
        .map_err(|e| PockerError::Mount {
            target: paths.rootfs.clone(),
            source: e,
        })?;
    tracing::info!(merged = %paths.rootfs.display(), lower = %lower.display(), "overlayfs mounted");
    Ok(paths.rootfs.clone())
}

#[cfg(test)]
mod tests {
    use std::io;

    use super::*;
    use crate::platform::fake::{FakeCall, FakeNode, FakePlatform};

    fn paths() -> ContainerPaths {
        ContainerPaths::new(Path::new("/var/pocker/containers"), &ContainerId::new("abc"))
    }

    #[test]
    fn paths_are_scoped_by_id() {
        let paths = paths();
        assert_eq!(paths.rootfs, PathBuf::from("/var/pocker/containers/abc/rootfs"));
        assert_eq!(paths.diff, PathBuf::from("/var/pocker/containers/abc/diff"));
        assert_eq!(paths.worker, PathBuf::from("/var/pocker/containers/abc/worker"));
    }

    #[test]
    fn overlay_mounted_with_nodev_and_layers() {
        let fake = FakePlatform::new();
        let lower = Path::new("/var/pocker/images/ubuntu/rootfs");
        let merged = mount_overlay(&fake, lower, &paths()).unwrap();
        assert_eq!(merged, paths().rootfs);

        let mounts = fake.mounts();
        assert_eq!(mounts.len(), 1);
        let mount = &mounts[0];
        assert_eq!(mount.target, paths().rootfs);
        assert_eq!(mount.fstype.as_deref(), Some("overlay"));
        assert_eq!(mount.flags, MountFlags::NODEV);
        assert_eq!(
            mount.data.as_deref(),
            Some(
                "lowerdir=/var/pocker/images/ubuntu/rootfs,\
                 upperdir=/var/pocker/containers/abc/diff,\
                 workdir=/var/pocker/containers/abc/worker"
            )
        );
        assert_eq!(fake.node("/var/pocker/containers/abc/diff"), Some(FakeNode::Dir));
        assert_eq!(fake.node("/var/pocker/containers/abc/worker"), Some(FakeNode::Dir));
    }

    #[test]
    fn separator_in_layer_path_is_refused_before_mounting() {
        let fake = FakePlatform::new();
        let lower = Path::new("/var/pocker/images/ubuntu:22.04/rootfs");
        let err = mount_overlay(&fake, lower, &paths()).unwrap_err();
        assert!(matches!(err, PockerError::Mount { .. }));
        assert!(fake.mounts().is_empty());
        assert!(fake.ops().is_empty());
    }

    #[test]
    fn existing_directories_are_reused() {
        let fake = FakePlatform::new();
        fake.add_dir("/var/pocker/containers/abc/diff");
        paths().ensure(&fake).unwrap();
        paths().ensure(&fake).unwrap();
    }

    #[test]
    fn file_in_place_of_directory_fails() {
        let fake = FakePlatform::new();
        fake.add_file("/var/pocker/containers/abc/worker", "junk");
        let err = mount_overlay(&fake, Path::new("/lower"), &paths()).unwrap_err();
        assert!(matches!(err, PockerError::Io { .. }));
        assert!(fake.mounts().is_empty());
    }

    #[test]
    fn refused_mount_is_mount_error() {
        let fake = FakePlatform::new();
        fake.fail_at(FakeCall::Mount, "rootfs", io::ErrorKind::PermissionDenied);
        let err = mount_overlay(&fake, Path::new("/lower"), &paths()).unwrap_err();
        match err {
            PockerError::Mount { target, .. } => assert_eq!(target, paths().rootfs),
            other => panic!("unexpected error: {other}"),
        }
    }
}
