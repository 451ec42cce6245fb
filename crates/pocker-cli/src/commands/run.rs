//! `pocker run`: Run a command in a new container.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::Args;
use pocker_common::config::PockerConfig;
use pocker_common::types::{LaunchRequest, LaunchStatus, ResourceLimits};
use pocker_common::units::{parse_memory_size, parse_memory_swap};
use pocker_runtime::engine::Engine;
use pocker_runtime::process::LaunchReport;

use crate::output::{self, BOLD, DIM, GREEN, RED, RESET};

/// Arguments for the `run` command.
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Memory limit in bytes. Suffixes k, m and g are powers of 1024.
    #[arg(long)]
    pub memory: Option<String>,

    /// Memory plus swap limit in bytes, or -1 for unlimited swap.
    #[arg(long, allow_hyphen_values = true)]
    pub memory_swap: Option<String>,

    /// CPU shares (relative weight); 0 leaves the default.
    #[arg(long, default_value_t = 0)]
    pub cpu_shares: u64,

    /// Image name.
    #[arg(short = 'i', long = "image-name", visible_alias = "image")]
    pub image: Option<String>,

    /// Images directory (overrides the configuration).
    #[arg(long)]
    pub image_dir: Option<PathBuf>,

    /// Kill the container after this many seconds.
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Command and arguments to run inside the container.
    #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
    pub command: Vec<String>,
}

impl RunArgs {
    fn limits(&self) -> anyhow::Result<ResourceLimits> {
        Ok(ResourceLimits {
            cpu_shares: Some(self.cpu_shares),
            memory_bytes: self.memory.as_deref().map(parse_memory_size).transpose()?,
            memory_swap: self.memory_swap.as_deref().map(parse_memory_swap).transpose()?,
        })
    }

    fn request(&self, config: &PockerConfig) -> anyhow::Result<LaunchRequest> {
        let image = self.image.clone().unwrap_or_else(|| config.default_image.clone());
        let request = LaunchRequest::builder(image, self.command.clone())
            .image_dir(self.image_dir.clone().unwrap_or_else(|| config.image_dir.clone()))
            .container_dir(config.container_dir.clone())
            .limits(self.limits()?)
            .build()?;
        Ok(request)
    }
}

/// Executes the `run` command.
///
/// Returns the container's shell-style exit code.
///
/// # Errors
///
/// Returns an error if the request is invalid or the container cannot be
/// spawned.
pub fn execute(args: RunArgs, config: PockerConfig) -> anyhow::Result<ExitCode> {
    let request = args.request(&config)?;
    let engine = Engine::native(config)?;

    let handle = engine.start(&request)?;
    eprintln!(
        "  {GREEN}●{RESET} {BOLD}{}{RESET} {DIM}[pid {}, image {}]{RESET}",
        handle.id(),
        handle.pid(),
        request.image()
    );
    if let Some(bytes) = request.limits().memory_bytes {
        eprintln!("    {DIM}memory limit {}{RESET}", output::format_bytes(bytes));
    }

    let signaller = handle.signaller();
    let grace = Duration::from_secs(engine.config().stop_grace_secs);
    let installed = ctrlc::set_handler(move || {
        if let Err(e) = signaller.interrupt(grace) {
            tracing::warn!(error = %e, "could not forward Ctrl+C");
        }
    });
    if let Err(e) = installed {
        // The child is already running; kill and reap it before bailing out.
        if let Err(stop_error) = handle.stop(Duration::ZERO) {
            tracing::warn!(error = %stop_error, "could not reap container");
        }
        return Err(anyhow::anyhow!("failed to set Ctrl+C handler: {e}"));
    }

    let report = match args.timeout {
        Some(secs) => handle.wait_timeout(Duration::from_secs(secs))?,
        None => handle.wait()?,
    };
    print_report(&report);
    Ok(ExitCode::from(output::exit_byte(report.exit_code())))
}

fn print_report(report: &LaunchReport) {
    let elapsed = report.finished_at - report.started_at;
    match &report.status {
        LaunchStatus::SetupFailed(failure) => {
            eprintln!("  {RED}setup failed{RESET} {failure}");
        }
        status => {
            let suffix = if report.timed_out { " (timed out)" } else { "" };
            eprintln!(
                "  {} {status}{suffix} {DIM}after {:.1}s{RESET}",
                report.pid,
                elapsed.as_seconds_f64()
            );
        }
    }
}
