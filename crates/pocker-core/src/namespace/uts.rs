//! UTS namespace isolation.
//!
//! Gives the container its own hostname: the container ID.

use pocker_common::error::{PockerError, Result};
use pocker_common::types::ContainerId;

use crate::platform::Platform;

/// Sets the hostname inside the UTS namespace to the container ID.
///
/// # Errors
///
/// Returns [`PockerError::Mount`] (a namespace syscall failure) if
/// `sethostname(2)` fails.
pub fn set_hostname(platform: &dyn Platform, id: &ContainerId) -> Result<()> {
    platform
        .set_hostname(id.as_str())
        .map_err(|e| PockerError::Mount {
            target: "sethostname".into(),
            source: e,
        })?;
    tracing::debug!(hostname = %id, "container hostname set");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::fake::{FakeCall, FakePlatform};

    #[test]
    fn hostname_is_container_id() {
        let fake = FakePlatform::new();
        let id = ContainerId::new("5f0c-test");
        set_hostname(&fake, &id).unwrap();
        assert_eq!(fake.hostname().as_deref(), Some("5f0c-test"));
    }

    #[test]
    fn failure_maps_to_mount_error() {
        let fake = FakePlatform::new();
        fake.fail_on(FakeCall::SetHostname);
        let err = set_hostname(&fake, &ContainerId::new("x")).unwrap_err();
        assert!(matches!(err, PockerError::Mount { .. }));
    }
}
