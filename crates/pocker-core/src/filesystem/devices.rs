//! Minimal `/dev` for a container.
//!
//! A fresh tmpfs replaces whatever the image carries at `dev`, so only the
//! nodes created here exist once the root is switched.

use std::path::{Path, PathBuf};

use pocker_common::error::{PockerError, Result};

use crate::platform::{MountFlags, Platform};

/// Permission bits of every provisioned device node.
pub const DEVICE_MODE: u32 = 0o666;

/// One character device created in the container's `/dev`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceSpec {
    /// File name under `dev`.
    pub name: &'static str,
    /// Major number.
    pub major: u64,
    /// Minor number.
    pub minor: u64,
}

const fn chr(name: &'static str, major: u64, minor: u64) -> DeviceSpec {
    DeviceSpec { name, major, minor }
}

/// Devices created in order.
pub const DEVICE_TABLE: [DeviceSpec; 7] = [
    chr("null", 1, 3),
    chr("zero", 1, 5),
    chr("random", 1, 8),
    chr("urandom", 1, 9),
    chr("console", 5, 1),
    chr("tty", 5, 0),
    chr("full", 1, 7),
];

/// Standard stream links as `(name, target)`.
pub const STD_LINKS: [(&str, &str); 4] = [
    ("stdin", "/proc/self/fd/0"),
    ("stdout", "/proc/self/fd/1"),
    ("stderr", "/proc/self/fd/2"),
    ("fd", "/proc/self/fd"),
];

fn provisioning_error(path: PathBuf) -> impl FnOnce(std::io::Error) -> PockerError {
    move |source| PockerError::DeviceProvisioning { path, source }
}

/// Populates `<root>/dev`.
///
/// Mounts a `nosuid,strictatime` tmpfs with mode 0755, mounts `devpts` on
/// `dev/pts`, links the standard streams to `/proc/self/fd` and creates
/// the nodes of [`DEVICE_TABLE`] with mode 0666.
///
/// # Errors
///
/// Returns [`PockerError::DeviceProvisioning`] on the first failed step,
/// including a name that already exists.
pub fn provision_dev(platform: &dyn Platform, root: &Path) -> Result<()> {
    let dev = root.join("dev");
    platform
        .create_dir_all(&dev)
        .map_err(provisioning_error(dev.clone()))?;
    platform
        .mount(
            Some("tmpfs"),
            &dev,
            Some("tmpfs"),
            MountFlags::NOSUID | MountFlags::STRICTATIME,
            Some("mode=755"),
        )
        .map_err(provisioning_error(dev.clone()))?;

    let pts = dev.join("pts");
    platform
        .create_dir_all(&pts)
        .map_err(provisioning_error(pts.clone()))?;
    platform
        .mount(Some("devpts"), &pts, Some("devpts"), MountFlags::empty(), None)
        .map_err(provisioning_error(pts.clone()))?;

    for (name, target) in STD_LINKS {
        let link = dev.join(name);
        platform
            .symlink(Path::new(target), &link)
            .map_err(provisioning_error(link))?;
    }

    for device in DEVICE_TABLE {
        let path = dev.join(device.name);
        platform
            .make_char_device(&path, DEVICE_MODE, device.major, device.minor)
            .map_err(provisioning_error(path))?;
    }

    tracing::info!(dev = %dev.display(), devices = DEVICE_TABLE.len(), "/dev provisioned");
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io;

    use super::*;
    use crate::platform::fake::{FakeCall, FakeNode, FakeOp, FakePlatform};

    const ROOT: &str = "/c/rootfs";

    #[test]
    fn dev_contains_exactly_the_fixed_entries() {
        let fake = FakePlatform::new();
        provision_dev(&fake, Path::new(ROOT)).unwrap();

        let mut expected = vec![
            "pts", "stdin", "stdout", "stderr", "fd", "null", "zero", "random", "urandom",
            "console", "tty", "full",
        ];
        expected.sort_unstable();
        assert_eq!(fake.entries("/c/rootfs/dev"), expected);
    }

    #[test]
    fn device_nodes_have_fixed_numbers_and_mode() {
        let fake = FakePlatform::new();
        provision_dev(&fake, Path::new(ROOT)).unwrap();
        for (name, major, minor) in [
            ("null", 1, 3),
            ("zero", 1, 5),
            ("random", 1, 8),
            ("urandom", 1, 9),
            ("console", 5, 1),
            ("tty", 5, 0),
            ("full", 1, 7),
        ] {
            assert_eq!(
                fake.node(format!("/c/rootfs/dev/{name}")),
                Some(FakeNode::CharDevice {
                    mode: 0o666,
                    major,
                    minor
                }),
                "{name}"
            );
        }
    }

    #[test]
    fn devices_created_in_table_order() {
        let fake = FakePlatform::new();
        provision_dev(&fake, Path::new(ROOT)).unwrap();
        let created: Vec<String> = fake
            .ops()
            .into_iter()
            .filter_map(|op| match op {
                FakeOp::CharDevice { path, .. } => {
                    path.file_name().map(|n| n.to_string_lossy().into_owned())
                }
                _ => None,
            })
            .collect();
        assert_eq!(
            created,
            vec!["null", "zero", "random", "urandom", "console", "tty", "full"]
        );
    }

    #[test]
    fn tmpfs_and_devpts_mounted() {
        let fake = FakePlatform::new();
        provision_dev(&fake, Path::new(ROOT)).unwrap();
        let mounts = fake.mounts();
        assert_eq!(mounts.len(), 2);
        assert_eq!(mounts[0].target, PathBuf::from("/c/rootfs/dev"));
        assert_eq!(mounts[0].fstype.as_deref(), Some("tmpfs"));
        assert_eq!(mounts[0].flags, MountFlags::NOSUID | MountFlags::STRICTATIME);
        assert_eq!(mounts[0].data.as_deref(), Some("mode=755"));
        assert_eq!(mounts[1].target, PathBuf::from("/c/rootfs/dev/pts"));
        assert_eq!(mounts[1].fstype.as_deref(), Some("devpts"));
    }

    #[test]
    fn std_streams_link_to_proc_self_fd() {
        let fake = FakePlatform::new();
        provision_dev(&fake, Path::new(ROOT)).unwrap();
        assert_eq!(
            fake.node("/c/rootfs/dev/stderr"),
            Some(FakeNode::Symlink(PathBuf::from("/proc/self/fd/2")))
        );
        assert_eq!(
            fake.node("/c/rootfs/dev/fd"),
            Some(FakeNode::Symlink(PathBuf::from("/proc/self/fd")))
        );
    }

    #[test]
    fn name_collision_is_fatal() {
        let fake = FakePlatform::new();
        fake.add_file("/c/rootfs/dev/null", "");
        let err = provision_dev(&fake, Path::new(ROOT)).unwrap_err();
        match err {
            PockerError::DeviceProvisioning { path, source } => {
                assert_eq!(path, PathBuf::from("/c/rootfs/dev/null"));
                assert_eq!(source.kind(), io::ErrorKind::AlreadyExists);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn refused_mknod_stops_provisioning() {
        let fake = FakePlatform::new();
        fake.fail_on(FakeCall::CharDevice);
        let err = provision_dev(&fake, Path::new(ROOT)).unwrap_err();
        assert!(matches!(err, PockerError::DeviceProvisioning { .. }));
        assert_eq!(
            fake.position(|op| matches!(op, FakeOp::CharDevice { .. })),
            Some(fake.ops().len() - 1)
        );
    }
}
