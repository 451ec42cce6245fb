//! The container-init pipeline.
//!
//! Runs inside the freshly cloned process, which is PID 1 of its own PID
//! namespace. Stages run strictly in order and the first failure ends the
//! pipeline:
//!
//! 1. mount tree private, hostname set
//! 2. cgroup leaves joined, limits applied (host paths still reachable)
//! 3. image cache materialized, overlay root mounted
//! 4. `/proc` and `/sys` mounted
//! 5. `/dev` provisioned
//! 6. root switched
//! 7. command executed
//!
//! A failure is returned as a [`SetupFailure`] naming the stage; the
//! platform turns it into a distinct exit of this process only.

use pocker_common::error::{PockerError, Result};
use pocker_common::types::{ContainerId, LaunchRequest, SetupFailure, Stage};
use pocker_core::cgroup::ResourceController;
use pocker_core::filesystem::overlayfs::{self, ContainerPaths};
use pocker_core::filesystem::{devices, mount, pivot_root};
use pocker_core::namespace;
use pocker_core::platform::Platform;
use pocker_image::storage::ImageStore;

/// Everything the init process needs, borrowed from the supervisor.
pub struct InitContext<'a> {
    /// Privileged operations.
    pub platform: &'a dyn Platform,
    /// Resource limit enforcement.
    pub resources: &'a dyn ResourceController,
    /// Image cache.
    pub images: &'a ImageStore,
    /// Container identity.
    pub id: &'a ContainerId,
    /// Directories of this container.
    pub paths: &'a ContainerPaths,
    /// What to run.
    pub request: &'a LaunchRequest,
}

fn stage<T>(stage: Stage, id: &ContainerId, result: Result<T>) -> std::result::Result<T, SetupFailure> {
    result.map_err(|err| {
        let failure = SetupFailure::new(stage, &err);
        tracing::error!(id = %id, %stage, kind = %failure.kind, error = %err, "container setup failed");
        failure
    })
}

/// Runs the pipeline and `exec`s the command.
///
/// On a real platform this only returns on failure.
///
/// # Errors
///
/// Returns the [`SetupFailure`] of the first stage that failed.
pub fn run(ctx: &InitContext<'_>) -> std::result::Result<(), SetupFailure> {
    let InitContext {
        platform,
        resources,
        images,
        id,
        paths,
        request,
    } = *ctx;

    stage(Stage::MountPrivate, id, isolate(platform, id))?;
    stage(
        Stage::ResourceLimited,
        id,
        resources.apply(id, request.limits()),
    )?;
    let root = stage(
        Stage::RootMaterialized,
        id,
        images
            .materialize(request.image())
            .and_then(|lower| overlayfs::mount_overlay(platform, &lower, paths)),
    )?;
    stage(Stage::ProcSysMounted, id, mount::mount_proc_sys(platform, &root))?;
    stage(Stage::DevProvisioned, id, devices::provision_dev(platform, &root))?;
    stage(Stage::RootSwitched, id, pivot_root::pivot_root(platform, &root))?;

    tracing::info!(id = %id, command = ?request.command(), "executing command");
    stage(Stage::Execed, id, exec(platform, request.command()))
}

fn isolate(platform: &dyn Platform, id: &ContainerId) -> Result<()> {
    namespace::mount::make_mount_tree_private(platform)?;
    namespace::uts::set_hostname(platform, id)
}

fn exec(platform: &dyn Platform, command: &[String]) -> Result<()> {
    platform.exec(command).map_err(|e| PockerError::Exec {
        command: command.first().cloned().unwrap_or_default(),
        source: e,
    })
}
