//! stagehand: staged HTTP load generator.
//!
//! Ramps concurrent virtual users through the stages of a JSON scenario and
//! prints latency percentiles, error counts and throughput when done.

use anyhow::Result;
use clap::Parser;
use std::time::Instant;
use tracing_subscriber::EnvFilter;

mod commands;

/// Staged HTTP load generator
#[derive(Parser)]
#[command(name = "stagehand")]
#[command(about = "Drive staged concurrent HTTP load against an endpoint", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: commands::Commands,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let name = cli.command.name();

    let started = Instant::now();
    let result = cli.command.execute();
    tracing::debug!(
        command = name,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "command finished"
    );

    result
}
