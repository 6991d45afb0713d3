//! `stagehand run` / `stagehand run-file` implementation.

use anyhow::{Context, Result};
use std::io::IsTerminal;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use stagehand::loadtest::aggregate::aggregate;
use stagehand::loadtest::coordinator::LoadCoordinator;
use stagehand::loadtest::display::display_loop;
use stagehand::loadtest::metrics::MetricsCollector;
use stagehand::loadtest::report::{write_report, RunReport};
use stagehand::loadtest::scenario::{HttpMethod, Scenario, Stage};
use stagehand::loadtest::summary::render_summary;
use stagehand::loadtest::transport::ReqwestTransport;

use super::OutputArgs;

/// Ramp-up window for scenarios built from command-line flags.
const QUICK_RAMP: Duration = Duration::from_secs(1);

/// Per-request timeout for scenarios built from command-line flags.
const QUICK_TIMEOUT_MS: u64 = 30_000;

/// Load and validate a scenario file.
pub fn load_scenario(path: &Path) -> Result<Scenario> {
    if !path.exists() {
        anyhow::bail!("Scenario file not found: {}", path.display());
    }
    Scenario::load(path)
        .with_context(|| format!("Failed to load scenario '{}'", path.display()))
}

/// Load a scenario file and point it at `url`.
pub fn load_with_url(path: &Path, url: String) -> Result<Scenario> {
    let mut scenario = load_scenario(path)?;
    scenario.target_url = url;
    scenario
        .validate()
        .context("Scenario is invalid with the given URL")?;
    Ok(scenario)
}

/// GET scenario that ramps to `connections` over one second and holds them
/// for `hold`.
pub fn quick_scenario(url: String, connections: u32, hold: Duration) -> Result<Scenario> {
    let scenario = Scenario {
        test_name: None,
        target_url: url,
        method: HttpMethod::Get,
        timeout_ms: QUICK_TIMEOUT_MS,
        stages: vec![
            Stage::new(QUICK_RAMP, connections),
            Stage::new(hold, connections),
        ],
        ..Default::default()
    };
    scenario.validate().context("Invalid run arguments")?;
    Ok(scenario)
}

/// Run `scenario` to completion (or Ctrl+C) and print the summary.
pub async fn execute_run(scenario: Scenario, requests: Option<u64>, output: OutputArgs) -> Result<()> {
    if output.no_color || !std::io::stdout().is_terminal() {
        colored::control::set_override(false);
    }

    let transport = ReqwestTransport::new(scenario.display_name())
        .context("Failed to create HTTP client")?;
    let collector = Arc::new(MetricsCollector::new());
    let mut coordinator = LoadCoordinator::new(Arc::new(transport), Arc::clone(&collector));
    if let Some(n) = requests {
        coordinator = coordinator.with_max_requests(n);
    }

    tracing::info!(
        target_url = %scenario.target_url,
        stages = scenario.stages.len(),
        max_vus = scenario.max_target(),
        "starting load test"
    );

    let cancel = CancellationToken::new();
    tokio::spawn(handle_ctrl_c(cancel.clone()));

    let display_cancel = CancellationToken::new();
    let display = (!output.no_progress).then(|| {
        tokio::spawn(display_loop(coordinator.subscribe(), display_cancel.clone()))
    });

    let run = coordinator.run(&scenario, cancel).await;

    display_cancel.cancel();
    if let Some(handle) = display {
        let _ = handle.await;
    }

    let result = aggregate(&collector.snapshot());
    println!("{}", render_summary(&scenario, &result, &run));

    if let Some(dir) = output.report {
        let report = RunReport::build(&scenario, &result, &run);
        match write_report(&report, &dir) {
            Ok(path) => {
                eprintln!();
                eprintln!("Report written to: {}", path.display());
            }
            Err(e) => {
                tracing::warn!(error = %e, dir = %dir.display(), "failed to write report");
            }
        }
    }

    Ok(())
}

/// First Ctrl+C cancels the run gracefully; a second one exits immediately.
async fn handle_ctrl_c(cancel: CancellationToken) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to install Ctrl+C handler");
        return;
    }
    eprintln!("\nReceived Ctrl+C, stopping gracefully...");
    cancel.cancel();

    if tokio::signal::ctrl_c().await.is_ok() {
        eprintln!("\nReceived second Ctrl+C, aborting immediately.");
        std::process::exit(130);
    }
}
