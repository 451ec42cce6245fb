//! `pocker stop`: Ask running containers to shut down.

use std::process::ExitCode;

use clap::Args;
use pocker_common::types::ContainerId;
use pocker_runtime::engine::{Engine, StopOutcome};

use crate::output::{DIM, RESET};

/// Arguments for the `stop` command.
#[derive(Args, Debug)]
pub struct StopArgs {
    /// Container IDs to stop.
    #[arg(required = true)]
    pub containers: Vec<String>,
}

/// Executes the `stop` command.
///
/// Sends `SIGTERM`, then `SIGKILL` once the configured grace period
/// expires; the supervising `pocker run` reaps the container.
///
/// # Errors
///
/// Returns an error if a container is unknown, not running or survives
/// `SIGKILL`.
pub fn execute(args: &StopArgs, engine: &Engine) -> anyhow::Result<ExitCode> {
    for id in &args.containers {
        let note = match engine.stop(&ContainerId::new(id.as_str()))? {
            StopOutcome::Terminated => "",
            StopOutcome::Killed => " (killed)",
            StopOutcome::AlreadyGone => " (already gone)",
        };
        println!("{id}{DIM}{note}{RESET}");
    }
    Ok(ExitCode::SUCCESS)
}
