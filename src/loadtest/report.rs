//! JSON report serialization for load test results.
//!
//! Produces a schema-versioned JSON file with the aggregated metrics, the
//! resolved scenario (for reproducibility, credential headers redacted) and
//! the per-tick ramp timeline.
//! Meant for CI pipelines and for plotting the ramp after the fact.

use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::loadtest::aggregate::AggregatedResult;
use crate::loadtest::coordinator::{RampTick, RunSummary};
use crate::loadtest::scenario::Scenario;

/// Report format version. Bump on breaking layout changes.
const SCHEMA_VERSION: &str = "1.0";

/// Written in place of credential header values.
pub const REDACTED: &str = "[redacted]";

/// Headers whose values never leave the process.
const SECRET_HEADERS: &[&str] = &[
    "authorization",
    "proxy-authorization",
    "cookie",
    "x-api-key",
];

/// Top-level JSON report.
#[derive(Debug, Serialize)]
pub struct RunReport {
    pub schema_version: String,
    /// RFC 3339 timestamp of report creation.
    pub timestamp: String,
    pub test_name: Option<String>,
    pub target_url: String,
    /// Measured wall-clock duration of the run.
    pub duration_secs: f64,
    pub scenario: ReportScenario,
    pub metrics: ReportMetrics,
    pub run: ReportRun,
    /// One entry per control-loop tick.
    pub timeline: Vec<RampTick>,
}

/// Resolved scenario, as the run saw it.
#[derive(Debug, Serialize)]
pub struct ReportScenario {
    pub method: String,
    pub timeout_ms: u64,
    pub sleep_ms: u64,
    pub payload_count: usize,
    /// Configured headers, with credential values replaced by [`REDACTED`].
    pub headers: BTreeMap<String, String>,
    pub stages: Vec<ReportStage>,
}

#[derive(Debug, Serialize)]
pub struct ReportStage {
    pub duration_ms: u64,
    pub target: u32,
}

#[derive(Debug, Serialize)]
pub struct ReportMetrics {
    pub total_requests: u64,
    pub success_count: u64,
    pub error_count: u64,
    /// Fraction of successful attempts (0.0..=1.0).
    pub success_rate: f64,
    pub throughput_rps: f64,
    pub latency: LatencyMetrics,
    /// Keyed by status code as a string; `"0"` is "no response".
    pub status_counts: BTreeMap<String, u64>,
}

/// Latency statistics over successful requests, in milliseconds.
#[derive(Debug, Serialize)]
pub struct LatencyMetrics {
    pub average_ms: f64,
    pub p90_ms: u64,
    pub p95_ms: u64,
    pub p99_ms: u64,
}

#[derive(Debug, Serialize)]
pub struct ReportRun {
    pub workers_spawned: u64,
    pub peak_active: usize,
    pub cancelled: bool,
    pub budget_exhausted: bool,
    pub shutdown_timed_out: bool,
}

impl RunReport {
    /// Assemble a report from a finished run.
    pub fn build(scenario: &Scenario, result: &AggregatedResult, run: &RunSummary) -> Self {
        let status_counts = result
            .status_counts
            .iter()
            .map(|(status, count)| (status.to_string(), *count))
            .collect();

        Self {
            schema_version: SCHEMA_VERSION.to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            test_name: scenario.test_name.clone(),
            target_url: scenario.target_url.clone(),
            duration_secs: run.elapsed.as_secs_f64(),
            scenario: ReportScenario {
                method: scenario.method.to_string(),
                timeout_ms: scenario.timeout_ms,
                sleep_ms: scenario.sleep_ms,
                payload_count: scenario.payload.len(),
                headers: redact_headers(&scenario.headers),
                stages: scenario
                    .stages
                    .iter()
                    .map(|stage| ReportStage {
                        duration_ms: stage.duration.as_millis() as u64,
                        target: stage.target,
                    })
                    .collect(),
            },
            metrics: ReportMetrics {
                total_requests: result.total_requests,
                success_count: result.success_count(),
                error_count: result.error_count,
                success_rate: result.success_rate(),
                throughput_rps: result.throughput(run.elapsed),
                latency: LatencyMetrics {
                    average_ms: result.average_latency_ms,
                    p90_ms: result.p90_ms,
                    p95_ms: result.p95_ms,
                    p99_ms: result.p99_ms,
                },
                status_counts,
            },
            run: ReportRun {
                workers_spawned: run.workers_spawned,
                peak_active: run.peak_active,
                cancelled: run.cancelled,
                budget_exhausted: run.budget_exhausted,
                shutdown_timed_out: run.shutdown_timed_out,
            },
            timeline: run.ticks.clone(),
        }
    }
}

/// Copy of `headers` with credential values replaced. Names are kept as
/// configured; matching ignores case.
pub fn redact_headers(headers: &BTreeMap<String, String>) -> BTreeMap<String, String> {
    headers
        .iter()
        .map(|(name, value)| {
            let secret = SECRET_HEADERS
                .iter()
                .any(|secret| name.eq_ignore_ascii_case(secret));
            let value = if secret { REDACTED } else { value.as_str() };
            (name.clone(), value.to_string())
        })
        .collect()
}

/// Write `report` into `dir` as `stagehand-<timestamp>.json`.
///
/// Creates `dir` if needed and returns the path of the written file.
pub fn write_report(report: &RunReport, dir: &Path) -> Result<PathBuf, std::io::Error> {
    std::fs::create_dir_all(dir)?;

    let path = dir.join(report_filename(&chrono::Utc::now()));
    let json = serde_json::to_string_pretty(report).map_err(std::io::Error::other)?;
    std::fs::write(&path, json)?;

    tracing::debug!(path = %path.display(), "report written");
    Ok(path)
}

/// Report filename for `timestamp`. Hyphens instead of colons so the name is
/// valid on every platform.
pub fn report_filename(timestamp: &chrono::DateTime<chrono::Utc>) -> String {
    format!("stagehand-{}.json", timestamp.format("%Y-%m-%dT%H-%M-%S"))
}
