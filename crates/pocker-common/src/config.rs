//! Global configuration model for the pocker runtime.
//!
//! Values come from an optional JSON file; every field falls back to its
//! default when absent. Command-line flags override what is loaded here.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::constants;
use crate::error::{PockerError, Result};

/// Root configuration for the pocker runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PockerConfig {
    /// Directory holding image archives and cached extractions.
    pub image_dir: PathBuf,
    /// Directory holding per-container directories.
    pub container_dir: PathBuf,
    /// Image used when a launch does not name one.
    pub default_image: String,
    /// Control group locations.
    pub cgroup: CgroupConfig,
    /// Seconds a stopped container gets between `SIGTERM` and `SIGKILL`.
    pub stop_grace_secs: u64,
}

impl Default for PockerConfig {
    fn default() -> Self {
        Self {
            image_dir: PathBuf::from(constants::DEFAULT_IMAGE_DIR),
            container_dir: PathBuf::from(constants::DEFAULT_CONTAINER_DIR),
            default_image: constants::DEFAULT_IMAGE.to_string(),
            cgroup: CgroupConfig::default(),
            stop_grace_secs: constants::DEFAULT_STOP_GRACE_SECS,
        }
    }
}

impl PockerConfig {
    /// Loads the configuration from `path`, or returns the defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not valid JSON.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let content = std::fs::read_to_string(path).map_err(|e| PockerError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        let config = serde_json::from_str(&content)?;
        Ok(config)
    }
}

/// Location of the cgroup v1 controllers used for resource limits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CgroupConfig {
    /// Mount point of the `cpu` controller.
    pub cpu_root: PathBuf,
    /// Mount point of the `memory` controller.
    pub memory_root: PathBuf,
    /// Group directory under each controller holding container leaves.
    pub group: String,
}

impl Default for CgroupConfig {
    fn default() -> Self {
        Self {
            cpu_root: PathBuf::from(constants::CPU_CGROUP_ROOT),
            memory_root: PathBuf::from(constants::MEMORY_CGROUP_ROOT),
            group: constants::CGROUP_GROUP.to_string(),
        }
    }
}
