//! `stagehand` CLI subcommands.
//!
//! Provides `run` (quick test against a URL, optionally from a scenario file)
//! and `run-file` (execute a scenario file as written).

mod run;

use anyhow::Result;
use clap::{Args, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

use stagehand::loadtest::scenario::parse_duration;

/// Output options shared by every subcommand.
#[derive(Debug, Clone, Args)]
pub struct OutputArgs {
    /// Disable colored output
    #[arg(long)]
    pub no_color: bool,

    /// Disable the live status line
    #[arg(long)]
    pub no_progress: bool,

    /// Write a JSON report into this directory
    #[arg(long, value_name = "DIR")]
    pub report: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run a load test against a URL
    ///
    /// Without --file, ramps to --connections VUs over one second and holds
    /// them for --duration. With --file, runs that scenario against URL.
    Run {
        /// Target endpoint URL
        url: String,

        /// Number of concurrent connections (virtual users)
        #[arg(short = 'c', long, default_value_t = 10)]
        connections: u32,

        /// Stop after this many requests in total
        #[arg(short = 'n', long = "requests", value_name = "N")]
        requests: Option<u64>,

        /// Scenario file whose target URL is replaced by URL
        #[arg(short = 'f', long = "file", value_name = "PATH")]
        file: Option<PathBuf>,

        /// How long to hold full load (e.g. 30s, 2m)
        #[arg(short = 'd', long, default_value = "10s", value_parser = parse_duration_arg)]
        duration: Duration,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Run a load test described by a JSON scenario file
    RunFile {
        /// Path to the scenario file
        path: PathBuf,

        /// Stop after this many requests in total
        #[arg(short = 'n', long = "requests", value_name = "N")]
        requests: Option<u64>,

        #[command(flatten)]
        output: OutputArgs,
    },
}

impl Commands {
    /// Short name for log lines.
    pub fn name(&self) -> &'static str {
        match self {
            Commands::Run { .. } => "run",
            Commands::RunFile { .. } => "run-file",
        }
    }

    /// Execute the selected subcommand on a fresh multi-threaded runtime.
    pub fn execute(self) -> Result<()> {
        let runtime = tokio::runtime::Runtime::new()?;
        match self {
            Commands::Run {
                url,
                connections,
                requests,
                file,
                duration,
                output,
            } => {
                let scenario = match file {
                    Some(path) => run::load_with_url(&path, url)?,
                    None => run::quick_scenario(url, connections, duration)?,
                };
                runtime.block_on(run::execute_run(scenario, requests, output))
            }
            Commands::RunFile {
                path,
                requests,
                output,
            } => {
                let scenario = run::load_scenario(&path)?;
                runtime.block_on(run::execute_run(scenario, requests, output))
            }
        }
    }
}

fn parse_duration_arg(value: &str) -> Result<Duration, String> {
    match parse_duration(value) {
        Ok(duration) if !duration.is_zero() => Ok(duration),
        Ok(_) => Err("duration must be greater than zero".to_string()),
        Err(e) => Err(e.to_string()),
    }
}
