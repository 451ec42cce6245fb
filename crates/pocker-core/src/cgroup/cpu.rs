//! CPU resource control via the cgroup v1 `cpu` controller.

use pocker_common::error::Result;

use super::CgroupHandle;
use crate::platform::Platform;

/// Relative CPU weight control file.
pub const CPU_SHARES_FILE: &str = "cpu.shares";

/// Sets the relative CPU weight of a container.
///
/// Under contention each group receives CPU time in proportion to its
/// shares; the kernel default is 1024.
///
/// # Errors
///
/// Returns an error if writing `cpu.shares` fails.
pub fn set_cpu_shares(platform: &dyn Platform, cgroup: &CgroupHandle, shares: u64) -> Result<()> {
    cgroup.write(platform, CPU_SHARES_FILE, &shares.to_string())?;
    tracing::debug!(shares, "CPU shares set");
    Ok(())
}
