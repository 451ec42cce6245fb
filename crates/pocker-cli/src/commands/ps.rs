//! `pocker ps`: List containers.

use std::process::ExitCode;

use clap::Args;
use pocker_common::types::ContainerState;
use pocker_runtime::engine::Engine;

use crate::output::short_id;

/// Arguments for the `ps` command.
#[derive(Args, Debug)]
pub struct PsArgs {
    /// Show all containers (including stopped and failed).
    #[arg(short, long)]
    pub all: bool,
}

/// Executes the `ps` command.
///
/// # Errors
///
/// Returns an error if container records cannot be read.
pub fn execute(args: &PsArgs, engine: &Engine) -> anyhow::Result<ExitCode> {
    let containers: Vec<_> = engine
        .list()?
        .into_iter()
        .filter(|c| args.all || c.state == ContainerState::Running)
        .collect();

    if containers.is_empty() {
        println!("No containers found.");
        return Ok(ExitCode::SUCCESS);
    }

    println!(
        "{:<14} {:<10} {:<8} {:<12} {:<20} {:<26} COMMAND",
        "CONTAINER ID", "STATE", "PID", "IMAGE", "STATUS", "CREATED"
    );
    for c in &containers {
        println!(
            "{:<14} {:<10} {:<8} {:<12} {:<20} {:<26} {}",
            short_id(c.id.as_str()),
            c.state.to_string(),
            c.pid.map_or_else(|| "-".to_string(), |p| p.to_string()),
            c.image,
            c.status
                .as_ref()
                .map_or_else(|| "-".to_string(), ToString::to_string),
            c.created_at.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
            c.command.join(" ")
        );
    }
    Ok(ExitCode::SUCCESS)
}
