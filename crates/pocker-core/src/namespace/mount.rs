//! Mount namespace isolation.
//!
//! A fresh mount namespace starts as a copy of the host's, including shared
//! propagation. Re-marking the tree private stops mounts made inside the
//! container from leaking to the host and the other way round.

use std::path::Path;

use pocker_common::error::{PockerError, Result};

use crate::platform::{MountFlags, Platform};

/// Recursively marks every mount under `/` as private.
///
/// # Errors
///
/// Returns [`PockerError::Mount`] if the propagation change fails.
pub fn make_mount_tree_private(platform: &dyn Platform) -> Result<()> {
    let root = Path::new("/");
    platform
        .mount(
            None,
            root,
            None,
            MountFlags::PRIVATE | MountFlags::RECURSIVE,
            None,
        )
        .map_err(|e| PockerError::Mount {
            target: root.to_path_buf(),
            source: e,
        })?;
    tracing::debug!("mount tree marked private");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::fake::{FakeCall, FakeOp, FakePlatform};

    #[test]
    fn remounts_root_private_and_recursive() {
        let fake = FakePlatform::new();
        make_mount_tree_private(&fake).unwrap();
        let FakeOp::Mount(mount) = &fake.ops()[0] else {
            panic!("expected a mount");
        };
        assert_eq!(mount.target, Path::new("/"));
        assert_eq!(mount.flags, MountFlags::PRIVATE | MountFlags::RECURSIVE);
        assert_eq!(mount.source, None);
        assert_eq!(mount.fstype, None);
        assert!(fake.mounts().is_empty(), "propagation change is not a new mount");
    }

    #[test]
    fn failure_is_mount_error() {
        let fake = FakePlatform::new();
        fake.fail_on(FakeCall::Mount);
        assert!(matches!(
            make_mount_tree_private(&fake),
            Err(PockerError::Mount { .. })
        ));
    }
}
