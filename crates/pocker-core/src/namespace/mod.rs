//! Namespace management for container isolation.
//!
//! The container-init process is created directly inside fresh PID, mount,
//! UTS and network namespaces by [`spawn_init`]. Once running it calls
//! [`mount::make_mount_tree_private`] and [`uts::set_hostname`] before any
//! other setup.

pub mod mount;
pub mod uts;

use pocker_common::error::{PockerError, Result};
use pocker_common::types::ContainerId;

use crate::platform::{InitFn, Platform};

/// Which namespaces the container-init process is created in.
#[allow(clippy::struct_excessive_bools)]
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NamespaceConfig {
    /// Isolate PID namespace; init becomes PID 1.
    pub pid: bool,
    /// Isolate mount namespace.
    pub mount: bool,
    /// Isolate UTS (hostname) namespace.
    pub uts: bool,
    /// Isolate network namespace.
    pub network: bool,
}

impl Default for NamespaceConfig {
    fn default() -> Self {
        Self {
            pid: true,
            mount: true,
            uts: true,
            network: true,
        }
    }
}

/// Spawns `init` as PID 1 of new namespaces and returns its host PID.
///
/// # Errors
///
/// Returns [`PockerError::Mount`] if the namespace-creating `clone(2)`
/// fails.
pub fn spawn_init(
    platform: &dyn Platform,
    id: &ContainerId,
    config: &NamespaceConfig,
    init: InitFn<'_>,
) -> Result<u32> {
    let pid = platform
        .spawn_isolated(config, init)
        .map_err(|e| PockerError::Mount {
            target: format!("clone({config:?})").into(),
            source: e,
        })?;
    tracing::info!(id = %id, pid, "container init spawned in new namespaces");
    Ok(pid)
}
