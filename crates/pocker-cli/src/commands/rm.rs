//! `pocker rm`: Remove stopped containers.

use std::process::ExitCode;

use clap::Args;
use pocker_common::types::ContainerId;
use pocker_runtime::engine::Engine;

/// Arguments for the `rm` command.
#[derive(Args, Debug)]
pub struct RmArgs {
    /// Container IDs to remove.
    #[arg(required = true)]
    pub containers: Vec<String>,
}

/// Executes the `rm` command.
///
/// Deletes each container directory and its cgroup leaves.
///
/// # Errors
///
/// Returns an error if a container is unknown, still running, or cannot
/// be cleaned up.
pub fn execute(args: &RmArgs, engine: &Engine) -> anyhow::Result<ExitCode> {
    for id in &args.containers {
        engine.remove(&ContainerId::new(id.as_str()))?;
        println!("{id}");
    }
    Ok(ExitCode::SUCCESS)
}
