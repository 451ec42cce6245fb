//! # pocker
//!
//! Minimal daemon-less container runtime.
//! Runs a command from a tar image inside fresh namespaces, with cgroup
//! v1 CPU and memory limits.

#![allow(clippy::print_stdout, clippy::print_stderr)]
#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used, clippy::panic))]

mod commands;
mod output;

use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::commands::Cli;

fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if cli.log_json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    match commands::execute(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("  {}error:{} {e:#}", output::RED, output::RESET);
            ExitCode::FAILURE
        }
    }
}
