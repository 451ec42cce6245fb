//! Root filesystem switch via `pivot_root(2)`.
//!
//! Unlike `chroot`, the host root is detached from the container's mount
//! table instead of merely hidden.

use std::path::{Path, PathBuf};

use pocker_common::constants::OLD_ROOT_DIR;
use pocker_common::error::{PockerError, Result};

use crate::platform::Platform;

/// Makes `new_root` the process root and discards the old root.
///
/// `new_root` must be a mount point. The old root is parked in
/// `new_root/old_root`, detached once the working directory is `/`, and
/// the empty directory removed.
///
/// # Errors
///
/// Returns [`PockerError::Pivot`] if any step fails.
pub fn pivot_root(platform: &dyn Platform, new_root: &Path) -> Result<()> {
    let pivot_error = |e| PockerError::Pivot {
        new_root: new_root.to_path_buf(),
        source: e,
    };
    let put_old = new_root.join(OLD_ROOT_DIR);
    let old_root = PathBuf::from("/").join(OLD_ROOT_DIR);

    platform.create_dir_all(&put_old).map_err(pivot_error)?;
    platform.pivot_root(new_root, &put_old).map_err(pivot_error)?;
    platform.change_dir(Path::new("/")).map_err(pivot_error)?;
    platform.unmount_detach(&old_root).map_err(pivot_error)?;
    platform.remove_dir(&old_root).map_err(pivot_error)?;

    tracing::info!(new_root = %new_root.display(), "root switched");
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io;

    use super::*;
    use crate::platform::MountFlags;
    use crate::platform::fake::{FakeCall, FakeOp, FakePlatform};

    fn mounted_root(fake: &FakePlatform) {
        fake.add_dir("/c/rootfs/bin");
        fake.mount(Some("overlay"), Path::new("/c/rootfs"), Some("overlay"), MountFlags::NODEV, None)
            .unwrap();
    }

    #[test]
    fn host_paths_unreachable_after_switch() {
        let fake = FakePlatform::new();
        fake.add_file("/etc/host-only", "secret");
        mounted_root(&fake);

        pivot_root(&fake, Path::new("/c/rootfs")).unwrap();

        assert!(!fake.is_reachable("/etc/host-only"));
        assert!(!fake.is_reachable("/old_root"));
        assert!(fake.is_reachable("/bin"));
        assert_eq!(fake.root(), Some(PathBuf::from("/c/rootfs")));
    }

    #[test]
    fn container_sees_its_own_mount_table() {
        let fake = FakePlatform::new();
        fake.add_dir("/run/host");
        fake.mount(Some("tmpfs"), Path::new("/run/host"), Some("tmpfs"), MountFlags::empty(), None)
            .unwrap();
        mounted_root(&fake);
        let host_targets: Vec<PathBuf> = fake.mounts().into_iter().map(|m| m.target).collect();

        pivot_root(&fake, Path::new("/c/rootfs")).unwrap();

        let root = fake.root().unwrap();
        let visible: Vec<PathBuf> = fake
            .mounts()
            .into_iter()
            .map(|m| m.target)
            .filter(|target| target.starts_with(&root))
            .collect();
        assert_eq!(visible, vec![PathBuf::from("/c/rootfs")]);
        assert_ne!(visible, host_targets);
        assert!(
            fake.mounts().iter().all(|m| !m.target.ends_with(OLD_ROOT_DIR)),
            "old root still mounted"
        );
    }

    #[test]
    fn steps_run_in_order() {
        let fake = FakePlatform::new();
        mounted_root(&fake);
        pivot_root(&fake, Path::new("/c/rootfs")).unwrap();
        let ops: Vec<FakeOp> = fake.ops().into_iter().skip(1).collect();
        assert_eq!(
            ops,
            vec![
                FakeOp::CreateDir(PathBuf::from("/c/rootfs/old_root")),
                FakeOp::PivotRoot {
                    new_root: PathBuf::from("/c/rootfs"),
                    put_old: PathBuf::from("/c/rootfs/old_root"),
                },
                FakeOp::ChangeDir(PathBuf::from("/")),
                FakeOp::Unmount(PathBuf::from("/old_root")),
                FakeOp::RemoveDir(PathBuf::from("/old_root")),
            ]
        );
    }

    #[test]
    fn root_that_is_not_a_mount_point_fails() {
        let fake = FakePlatform::new();
        fake.add_dir("/c/rootfs");
        let err = pivot_root(&fake, Path::new("/c/rootfs")).unwrap_err();
        match err {
            PockerError::Pivot { new_root, source } => {
                assert_eq!(new_root, PathBuf::from("/c/rootfs"));
                assert_eq!(source.kind(), io::ErrorKind::InvalidInput);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(fake.root(), None);
    }

    #[test]
    fn failed_detach_is_pivot_error() {
        let fake = FakePlatform::new();
        mounted_root(&fake);
        fake.fail_on(FakeCall::Unmount);
        let err = pivot_root(&fake, Path::new("/c/rootfs")).unwrap_err();
        assert!(matches!(err, PockerError::Pivot { .. }));
    }
}
