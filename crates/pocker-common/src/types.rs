//! Domain primitive types used across the pocker workspace.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_CONTAINER_DIR, DEFAULT_IMAGE_DIR, SETUP_FAILURE_EXIT_CODE,
};
use crate::error::{FailureKind, PockerError, Result};

/// Unique identifier for a container launch.
///
/// Names the container directory, the cgroup leaves and the hostname.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContainerId(String);

impl ContainerId {
    /// Creates a container ID from an existing string value.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a fresh random (UUID v4) container ID.
    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Returns the inner string representation.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContainerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Swap-inclusive memory limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemorySwap {
    /// Memory plus swap may not exceed this many bytes.
    Limited(u64),
    /// Swap usage is not limited.
    Unlimited,
}

impl MemorySwap {
    /// Value written to `memory.memsw.limit_in_bytes`.
    #[must_use]
    pub fn control_value(self) -> String {
        match self {
            Self::Limited(bytes) => bytes.to_string(),
            Self::Unlimited => "-1".to_string(),
        }
    }
}

/// Resource limits for a container.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceLimits {
    /// CPU shares (relative weight).
    pub cpu_shares: Option<u64>,
    /// Memory limit in bytes.
    pub memory_bytes: Option<u64>,
    /// Memory plus swap limit.
    pub memory_swap: Option<MemorySwap>,
}

impl ResourceLimits {
    /// Returns `true` when no limit is requested.
    #[must_use]
    pub const fn is_unlimited(&self) -> bool {
        self.cpu_shares.is_none() && self.memory_bytes.is_none() && self.memory_swap.is_none()
    }

    /// Checks that the limits can be applied in a single pass.
    ///
    /// # Errors
    ///
    /// Returns [`PockerError::Config`] when a swap limit is given without a
    /// memory limit, or is smaller than the memory limit.
    pub fn validate(&self) -> Result<()> {
        match (self.memory_bytes, self.memory_swap) {
            (None, Some(_)) => Err(PockerError::Config {
                message: "a memory-swap limit requires a memory limit".into(),
            }),
            (Some(memory), Some(MemorySwap::Limited(swap))) if swap < memory => {
                Err(PockerError::Config {
                    message: format!(
                        "memory-swap limit ({swap}) must not be smaller than memory limit ({memory})"
                    ),
                })
            }
            _ => Ok(()),
        }
    }
}

/// Everything needed to launch one container.
///
/// Built once through [`LaunchRequest::builder`] and never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchRequest {
    command: Vec<String>,
    image: String,
    image_dir: PathBuf,
    container_dir: PathBuf,
    limits: ResourceLimits,
}

impl LaunchRequest {
    /// Starts building a request for `command` inside `image`.
    #[must_use]
    pub fn builder(image: impl Into<String>, command: Vec<String>) -> LaunchRequestBuilder {
        LaunchRequestBuilder {
            request: Self {
                command,
                image: image.into(),
                image_dir: PathBuf::from(DEFAULT_IMAGE_DIR),
                container_dir: PathBuf::from(DEFAULT_CONTAINER_DIR),
                limits: ResourceLimits::default(),
            },
        }
    }

    /// Command argument vector; never empty.
    #[must_use]
    pub fn command(&self) -> &[String] {
        &self.command
    }

    /// Image name.
    #[must_use]
    pub fn image(&self) -> &str {
        &self.image
    }

    /// Directory holding image archives.
    #[must_use]
    pub fn image_dir(&self) -> &Path {
        &self.image_dir
    }

    /// Directory holding container directories.
    #[must_use]
    pub fn container_dir(&self) -> &Path {
        &self.container_dir
    }

    /// Requested resource limits.
    #[must_use]
    pub const fn limits(&self) -> &ResourceLimits {
        &self.limits
    }
}

/// Builder for [`LaunchRequest`].
#[derive(Debug, Clone)]
pub struct LaunchRequestBuilder {
    request: LaunchRequest,
}

impl LaunchRequestBuilder {
    /// Sets the image directory.
    #[must_use]
    pub fn image_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.request.image_dir = dir.into();
        self
    }

    /// Sets the container directory.
    #[must_use]
    pub fn container_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.request.container_dir = dir.into();
        self
    }

    /// Sets the resource limits. A CPU share count of `0` means "unset".
    #[must_use]
    pub fn limits(mut self, mut limits: ResourceLimits) -> Self {
        limits.cpu_shares = limits.cpu_shares.filter(|shares| *shares > 0);
        self.request.limits = limits;
        self
    }

    /// Validates and returns the request.
    ///
    /// # Errors
    ///
    /// Returns [`PockerError::Config`] for an empty command, an invalid image
    /// name or inconsistent limits.
    pub fn build(self) -> Result<LaunchRequest> {
        let request = self.request;
        if request.command.is_empty() || request.command[0].is_empty() {
            return Err(PockerError::Config {
                message: "a command to run is required".into(),
            });
        }
        validate_image_name(&request.image)?;
        request.limits.validate()?;
        Ok(request)
    }
}

/// Rejects image names that would escape the image directory or break
/// the overlay option string, where `:` separates lower layers and `,`
/// separates options.
///
/// # Errors
///
/// Returns [`PockerError::Config`] for empty names, names containing a
/// path separator, `:` or `,`, or the `.`/`..` components.
pub fn validate_image_name(name: &str) -> Result<()> {
    if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\\', '\0']) {
        return Err(PockerError::Config {
            message: format!("invalid image name: {name:?}"),
        });
    }
    if name.contains([':', ',']) {
        return Err(PockerError::Config {
            message: format!("invalid image name: {name:?} must not contain ':' or ','"),
        });
    }
    Ok(())
}

/// Steps of the container-init pipeline, in execution order.
///
/// A failure is reported against the stage that was being entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Running as PID 1 of the new namespaces.
    Spawned,
    /// Mount tree re-marked private, hostname set.
    MountPrivate,
    /// Joined the cgroup leaves and applied limits.
    ResourceLimited,
    /// Image cached and overlay root mounted.
    RootMaterialized,
    /// `/proc` and `/sys` mounted in the new root.
    ProcSysMounted,
    /// `/dev` populated in the new root.
    DevProvisioned,
    /// Root switched and the host root detached.
    RootSwitched,
    /// Control handed to the target command.
    Execed,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Spawned => "spawned",
            Self::MountPrivate => "mount-private",
            Self::ResourceLimited => "resource-limited",
            Self::RootMaterialized => "root-materialized",
            Self::ProcSysMounted => "proc-sys-mounted",
            Self::DevProvisioned => "dev-provisioned",
            Self::RootSwitched => "root-switched",
            Self::Execed => "execed",
        };
        f.write_str(name)
    }
}

/// Structured description of a launch that failed before `exec`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetupFailure {
    /// Stage that could not be completed.
    pub stage: Stage,
    /// Class of the error.
    pub kind: FailureKind,
    /// Human-readable diagnostic.
    pub message: String,
}

impl SetupFailure {
    /// Captures `error` as a failure of `stage`.
    #[must_use]
    pub fn new(stage: Stage, error: &PockerError) -> Self {
        Self {
            stage,
            kind: error.kind(),
            message: error.to_string(),
        }
    }
}

impl fmt::Display for SetupFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "setup failed at stage {} ({}): {}", self.stage, self.kind, self.message)
    }
}

/// How a supervised container process ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum LaunchStatus {
    /// The command ran and exited normally.
    Exited {
        /// Exit code of the command.
        code: i32,
    },
    /// The process was terminated by a signal.
    Signaled {
        /// Signal number.
        signal: i32,
    },
    /// The container could not be constructed.
    SetupFailed(SetupFailure),
}

impl LaunchStatus {
    /// Shell-style exit code for this status.
    ///
    /// Signals map to `128 + signal`, setup failures to
    /// [`SETUP_FAILURE_EXIT_CODE`].
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::Exited { code } => *code,
            Self::Signaled { signal } => 128 + *signal,
            Self::SetupFailed(_) => SETUP_FAILURE_EXIT_CODE,
        }
    }

    /// Returns `true` if the command was reached.
    #[must_use]
    pub const fn setup_succeeded(&self) -> bool {
        !matches!(self, Self::SetupFailed(_))
    }
}

impl fmt::Display for LaunchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exited { code } => write!(f, "exited with code {code}"),
            Self::Signaled { signal } => write!(f, "killed by signal {signal}"),
            Self::SetupFailed(failure) => fmt::Display::fmt(failure, f),
        }
    }
}

/// Lifecycle state of a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContainerState {
    /// Container has been created but not yet started.
    Created,
    /// Container is actively running.
    Running,
    /// Container process has terminated.
    Stopped,
    /// Container never reached its command.
    Failed,
}

impl fmt::Display for ContainerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::Running => write!(f, "running"),
            Self::Stopped => write!(f, "stopped"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    fn cmd(args: &[&str]) -> Vec<String> {
        args.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn generated_ids_are_unique() {
        let ids: HashSet<_> = (0..1000).map(|_| ContainerId::generate()).collect();
        assert_eq!(ids.len(), 1000);
    }

    #[test]
    fn builder_applies_defaults() {
        let request = LaunchRequest::builder("ubuntu", cmd(&["bash"])).build().unwrap();
        assert_eq!(request.image(), "ubuntu");
        assert_eq!(request.command(), ["bash"]);
        assert_eq!(request.image_dir(), Path::new(DEFAULT_IMAGE_DIR));
        assert!(request.limits().is_unlimited());
    }

    #[test]
    fn empty_command_is_rejected() {
        let err = LaunchRequest::builder("ubuntu", Vec::new()).build().unwrap_err();
        assert_eq!(err.kind(), FailureKind::Config);
    }

    #[test]
    fn image_name_cannot_escape_image_dir() {
        for name in ["", "..", "../etc", "a/b"] {
            assert!(
                LaunchRequest::builder(name, cmd(&["sh"])).build().is_err(),
                "{name:?} accepted"
            );
        }
    }

    #[test]
    fn image_name_cannot_carry_overlay_separators() {
        for name in ["ubuntu:22.04", "a,upperdir=x"] {
            let err = LaunchRequest::builder(name, cmd(&["sh"])).build().unwrap_err();
            assert_eq!(err.kind(), FailureKind::Config, "{name:?} accepted");
        }
        assert!(validate_image_name("ubuntu-22.04").is_ok());
    }

    #[test]
    fn zero_cpu_shares_means_unset() {
        let request = LaunchRequest::builder("ubuntu", cmd(&["sh"]))
            .limits(ResourceLimits {
                cpu_shares: Some(0),
                ..ResourceLimits::default()
            })
            .build()
            .unwrap();
        assert_eq!(request.limits().cpu_shares, None);
    }

    #[test]
    fn swap_without_memory_is_rejected() {
        let limits = ResourceLimits {
            memory_swap: Some(MemorySwap::Unlimited),
            ..ResourceLimits::default()
        };
        assert!(limits.validate().is_err());
    }

    #[test]
    fn swap_below_memory_is_rejected() {
        let limits = ResourceLimits {
            memory_bytes: Some(2048),
            memory_swap: Some(MemorySwap::Limited(1024)),
            ..ResourceLimits::default()
        };
        assert!(limits.validate().is_err());

        let limits = ResourceLimits {
            memory_bytes: Some(2048),
            memory_swap: Some(MemorySwap::Unlimited),
            ..ResourceLimits::default()
        };
        assert!(limits.validate().is_ok());
    }

    #[test]
    fn exit_codes_distinguish_outcomes() {
        assert_eq!(LaunchStatus::Exited { code: 3 }.exit_code(), 3);
        assert_eq!(LaunchStatus::Signaled { signal: 9 }.exit_code(), 137);
        let failure = SetupFailure {
            stage: Stage::RootSwitched,
            kind: FailureKind::Pivot,
            message: "boom".into(),
        };
        let status = LaunchStatus::SetupFailed(failure);
        assert_eq!(status.exit_code(), SETUP_FAILURE_EXIT_CODE);
        assert!(!status.setup_succeeded());
    }

    #[test]
    fn stages_are_ordered() {
        assert!(Stage::MountPrivate < Stage::ResourceLimited);
        assert!(Stage::ResourceLimited < Stage::RootMaterialized);
        assert!(Stage::DevProvisioned < Stage::RootSwitched);
        assert!(Stage::RootSwitched < Stage::Execed);
    }

    #[test]
    fn setup_failure_roundtrips_through_json() {
        let failure = SetupFailure {
            stage: Stage::DevProvisioned,
            kind: FailureKind::DeviceProvisioning,
            message: "mknod: operation not permitted".into(),
        };
        let json = serde_json::to_string(&failure).unwrap();
        let back: SetupFailure = serde_json::from_str(&json).unwrap();
        assert_eq!(back, failure);
    }
}
