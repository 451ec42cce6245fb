//! Unified error types for the pocker workspace.
//!
//! Every condition that can abort a container launch has its own variant so
//! callers branch on [`PockerError::kind`] instead of parsing messages.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Top-level error type shared across the workspace.
#[derive(Debug, Error)]
pub enum PockerError {
    /// An I/O operation failed outside of a classified pipeline stage.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path where the I/O error occurred.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A configuration value or launch request is invalid.
    #[error("invalid configuration: {message}")]
    Config {
        /// Description of the invalid configuration.
        message: String,
    },

    /// A required resource was not found.
    #[error("{kind} not found: {id}")]
    NotFound {
        /// Type of the missing resource.
        kind: &'static str,
        /// Identifier of the missing resource.
        id: String,
    },

    /// The image archive does not exist in the image directory.
    #[error("unable to locate image {name} (looked for {path})")]
    ImageNotFound {
        /// Requested image name.
        name: String,
        /// Archive path that was probed.
        path: PathBuf,
    },

    /// The image archive is corrupt, unreadable or contains a member that
    /// must not be extracted.
    #[error("archive error in {path}: {message}")]
    Archive {
        /// Archive being extracted.
        path: PathBuf,
        /// Description of the failure.
        message: String,
    },

    /// A mount, unmount or namespace syscall failed.
    #[error("mount error at {target}: {source}")]
    Mount {
        /// Mount point (or namespace operation) that failed.
        target: PathBuf,
        /// Underlying OS error.
        source: std::io::Error,
    },

    /// Building the container `/dev` failed.
    #[error("device provisioning failed at {path}: {source}")]
    DeviceProvisioning {
        /// Device path being created.
        path: PathBuf,
        /// Underlying OS error.
        source: std::io::Error,
    },

    /// Creating, joining or configuring a control group failed.
    #[error("cgroup error at {path}: {source}")]
    Cgroup {
        /// Control file or hierarchy directory involved.
        path: PathBuf,
        /// Underlying OS error.
        source: std::io::Error,
    },

    /// The root switch could not be completed.
    #[error("pivot_root into {new_root} failed: {source}")]
    Pivot {
        /// Root the process was switching into.
        new_root: PathBuf,
        /// Underlying OS error.
        source: std::io::Error,
    },

    /// The target command is missing or not executable.
    #[error("cannot execute {command}: {source}")]
    Exec {
        /// Program name (`argv[0]`).
        command: String,
        /// Underlying OS error.
        source: std::io::Error,
    },

    /// Serialization or deserialization failed.
    #[error("serialization error: {source}")]
    Serialization {
        /// Underlying serialization error.
        #[from]
        source: serde_json::Error,
    },
}

impl PockerError {
    /// Returns the failure class of this error.
    pub const fn kind(&self) -> FailureKind {
        match self {
            Self::Io { .. } => FailureKind::Io,
            Self::Config { .. } => FailureKind::Config,
            Self::NotFound { .. } => FailureKind::NotFound,
            Self::ImageNotFound { .. } => FailureKind::ImageNotFound,
            Self::Archive { .. } => FailureKind::Archive,
            Self::Mount { .. } => FailureKind::Mount,
            Self::DeviceProvisioning { .. } => FailureKind::DeviceProvisioning,
            Self::Cgroup { .. } => FailureKind::Cgroup,
            Self::Pivot { .. } => FailureKind::Pivot,
            Self::Exec { .. } => FailureKind::Exec,
            Self::Serialization { .. } => FailureKind::Serialization,
        }
    }
}

/// Data-only mirror of the [`PockerError`] variants.
///
/// Unlike the error itself this can cross a process boundary, which is how
/// the container-init process tells its supervisor what went wrong.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// See [`PockerError::Io`].
    Io,
    /// See [`PockerError::Config`].
    Config,
    /// See [`PockerError::NotFound`].
    NotFound,
    /// See [`PockerError::ImageNotFound`].
    ImageNotFound,
    /// See [`PockerError::Archive`].
    Archive,
    /// See [`PockerError::Mount`].
    Mount,
    /// See [`PockerError::DeviceProvisioning`].
    DeviceProvisioning,
    /// See [`PockerError::Cgroup`].
    Cgroup,
    /// See [`PockerError::Pivot`].
    Pivot,
    /// See [`PockerError::Exec`].
    Exec,
    /// See [`PockerError::Serialization`].
    Serialization,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Io => "io",
            Self::Config => "config",
            Self::NotFound => "not-found",
            Self::ImageNotFound => "image-not-found",
            Self::Archive => "archive",
            Self::Mount => "mount",
            Self::DeviceProvisioning => "device-provisioning",
            Self::Cgroup => "cgroup",
            Self::Pivot => "pivot",
            Self::Exec => "exec",
            Self::Serialization => "serialization",
        };
        f.write_str(name)
    }
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, PockerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_matches_variant() {
        let err = PockerError::ImageNotFound {
            name: "ubuntu".into(),
            path: PathBuf::from("/images/ubuntu.tar"),
        };
        assert_eq!(err.kind(), FailureKind::ImageNotFound);

        let err = PockerError::Cgroup {
            path: PathBuf::from("/sys/fs/cgroup/cpu/pocker/x/tasks"),
            source: std::io::Error::from(std::io::ErrorKind::PermissionDenied),
        };
        assert_eq!(err.kind(), FailureKind::Cgroup);
    }

    #[test]
    fn image_not_found_message_names_image() {
        let err = PockerError::ImageNotFound {
            name: "alpine".into(),
            path: PathBuf::from("/images/alpine.tar"),
        };
        assert!(err.to_string().contains("alpine"));
    }

    #[test]
    fn failure_kind_serializes_snake_case() {
        let json = serde_json::to_string(&FailureKind::DeviceProvisioning).unwrap();
        assert_eq!(json, "\"device_provisioning\"");
    }
}
