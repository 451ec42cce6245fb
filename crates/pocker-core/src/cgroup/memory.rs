//! Memory resource control via the cgroup v1 `memory` controller.

use pocker_common::error::Result;
use pocker_common::types::MemorySwap;

use super::CgroupHandle;
use crate::platform::Platform;

/// Hard memory limit control file.
pub const MEMORY_LIMIT_FILE: &str = "memory.limit_in_bytes";

/// Memory plus swap limit control file.
pub const MEMSW_LIMIT_FILE: &str = "memory.memsw.limit_in_bytes";

/// Sets the hard memory limit in bytes.
///
/// # Errors
///
/// Returns an error if writing `memory.limit_in_bytes` fails.
pub fn set_memory_limit(platform: &dyn Platform, cgroup: &CgroupHandle, bytes: u64) -> Result<()> {
    cgroup.write(platform, MEMORY_LIMIT_FILE, &bytes.to_string())?;
    tracing::debug!(bytes, "memory limit set");
    Ok(())
}

/// Sets the memory plus swap limit.
///
/// The kernel rejects this unless the memory limit was written first and
/// is not larger.
///
/// # Errors
///
/// Returns an error if writing `memory.memsw.limit_in_bytes` fails.
pub fn set_memory_swap_limit(
    platform: &dyn Platform,
    cgroup: &CgroupHandle,
    swap: MemorySwap,
) -> Result<()> {
    cgroup.write(platform, MEMSW_LIMIT_FILE, &swap.control_value())?;
    tracing::debug!(?swap, "memory+swap limit set");
    Ok(())
}
