//! CLI command definitions and dispatch.

pub mod ps;
pub mod rm;
pub mod run;
pub mod stop;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use pocker_common::config::PockerConfig;
use pocker_runtime::engine::Engine;

/// pocker: minimal daemon-less container runtime.
#[derive(Parser, Debug)]
#[command(name = "pocker", version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Command,

    /// JSON configuration file.
    #[arg(long, global = true, env = pocker_common::constants::CONFIG_ENV)]
    pub config: Option<PathBuf>,

    /// Containers directory (overrides the configuration).
    #[arg(long, global = true)]
    pub container_dir: Option<PathBuf>,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    pub log_json: bool,
}

/// Available CLI subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a command in a new container and wait for it.
    Run(run::RunArgs),
    /// Ask a running container to shut down.
    Stop(stop::StopArgs),
    /// List containers.
    Ps(ps::PsArgs),
    /// Remove stopped containers and their cgroups.
    Rm(rm::RmArgs),
}

/// Dispatches the parsed CLI command to its handler.
///
/// # Errors
///
/// Returns an error if the configuration cannot be loaded or the command
/// fails.
pub fn execute(cli: Cli) -> anyhow::Result<ExitCode> {
    let mut config = PockerConfig::load(cli.config.as_deref())?;
    if let Some(dir) = cli.container_dir {
        config.container_dir = dir;
    }
    tracing::debug!(?config, "configuration loaded");

    match cli.command {
        Command::Run(args) => run::execute(args, config),
        Command::Stop(args) => stop::execute(&args, &Engine::native(config)?),
        Command::Ps(args) => ps::execute(&args, &Engine::native(config)?),
        Command::Rm(args) => rm::execute(&args, &Engine::native(config)?),
    }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn run_collects_trailing_command() {
        let cli = Cli::try_parse_from([
            "pocker", "run", "--memory", "256m", "--cpu-shares", "512", "-i", "alpine", "--",
            "sh", "-c", "echo hi",
        ])
        .unwrap();
        let Command::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.command, vec!["sh", "-c", "echo hi"]);
        assert_eq!(args.image.as_deref(), Some("alpine"));
        assert_eq!(args.cpu_shares, 512);
        assert_eq!(args.memory.as_deref(), Some("256m"));
    }

    #[test]
    fn run_requires_a_command() {
        assert!(Cli::try_parse_from(["pocker", "run"]).is_err());
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["pocker", "ps", "--all", "--log-json", "--container-dir", "/tmp/c"])
            .unwrap();
        assert!(cli.log_json);
        assert_eq!(cli.container_dir, Some(PathBuf::from("/tmp/c")));
    }
}
