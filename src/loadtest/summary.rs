//! Terminal summary renderer for load test results.
//!
//! Produces a colorized, human-readable summary with a short header describing
//! the scenario, dotted-line metric rows (`metric.........: value`), and a
//! status code breakdown.
//!
//! [`render_summary`] is a pure function: structured data in, formatted
//! [`String`] out. Color coding goes through the `colored` crate, which
//! respects the global override set when `--no-color` is active or output is
//! piped.

use colored::Colorize;

use crate::loadtest::aggregate::AggregatedResult;
use crate::loadtest::coordinator::RunSummary;
use crate::loadtest::scenario::Scenario;

/// Width for dotted metric row padding.
const PAD_WIDTH: usize = 32;

/// Render the end-of-run summary.
///
/// # Layout
///
/// ```text
///   stagehand  checkout-flow
///
///   target:    http://localhost:8080/checkout
///   method:    POST
///   vus:       50
///   duration:  90.0s (3 stages)
///
///   http_req_duration...............: avg=41.5ms  p90=80ms  p95=120ms  p99=300ms
///   http_reqs.......................: 12000
///   http_req_errors.................: 12
///   http_req_success_rate...........: 99.9%
///   http_req_throughput.............: 133.3 req/s
///   run_elapsed.....................: 90.0s
///   run_peak_vus....................: 50
///
///   status codes:
///     200...........................: 11988
///     no response...................: 12
/// ```
pub fn render_summary(scenario: &Scenario, result: &AggregatedResult, run: &RunSummary) -> String {
    let mut lines = Vec::new();

    lines.push(render_header(scenario));

    let latency = format!(
        "avg={:.1}ms  p90={}ms  p95={}ms  p99={}ms",
        result.average_latency_ms, result.p90_ms, result.p95_ms, result.p99_ms
    );
    let latency = if result.p99_ms < 1000 {
        latency.green().to_string()
    } else {
        latency.yellow().to_string()
    };
    lines.push(format_metric_row("http_req_duration", &latency, PAD_WIDTH));

    lines.push(format_metric_row(
        "http_reqs",
        &result.total_requests.to_string(),
        PAD_WIDTH,
    ));

    let errors = if result.error_count > 0 {
        result.error_count.to_string().red().to_string()
    } else {
        result.error_count.to_string()
    };
    lines.push(format_metric_row("http_req_errors", &errors, PAD_WIDTH));

    let success_pct = result.success_rate() * 100.0;
    let success = format!("{success_pct:.1}%");
    let success = if result.total_requests == 0 || success_pct < 95.0 {
        success.red().to_string()
    } else if success_pct < 99.0 {
        success.yellow().to_string()
    } else {
        success.green().to_string()
    };
    lines.push(format_metric_row("http_req_success_rate", &success, PAD_WIDTH));

    let throughput = format!("{:.1} req/s", result.throughput(run.elapsed));
    lines.push(format_metric_row(
        "http_req_throughput",
        &throughput.green().to_string(),
        PAD_WIDTH,
    ));

    lines.push(format_metric_row(
        "run_elapsed",
        &format!("{:.1}s", run.elapsed.as_secs_f64()),
        PAD_WIDTH,
    ));
    lines.push(format_metric_row(
        "run_peak_vus",
        &run.peak_active.to_string(),
        PAD_WIDTH,
    ));

    if !result.status_counts.is_empty() {
        lines.push(String::new());
        lines.push("  status codes:".to_string());
        for (status, count) in &result.status_counts {
            let label = match *status {
                0 => "  no response".to_string(),
                code => format!("  {code}"),
            };
            let count = if (200..300).contains(status) {
                count.to_string()
            } else {
                count.to_string().red().to_string()
            };
            lines.push(format_metric_row(&label, &count, PAD_WIDTH));
        }
    }

    let notes = run_notes(run);
    if !notes.is_empty() {
        lines.push(String::new());
        lines.extend(notes);
    }

    lines.join("\n")
}

fn render_header(scenario: &Scenario) -> String {
    format!(
        "\n  {}  {}\n\n  target:    {}\n  method:    {}\n  vus:       {}\n  duration:  {:.1}s ({} stages)\n",
        "stagehand".bold(),
        scenario.display_name(),
        scenario.target_url,
        scenario.method,
        scenario.max_target(),
        scenario.total_duration().as_secs_f64(),
        scenario.stages.len(),
    )
}

/// Lines explaining why a run ended early or untidily.
fn run_notes(run: &RunSummary) -> Vec<String> {
    let mut notes = Vec::new();
    if run.cancelled {
        notes.push(format!("  {} run was cancelled before the last stage", "note:".yellow()));
    }
    if run.budget_exhausted {
        notes.push(format!("  {} request budget reached", "note:".yellow()));
    }
    if run.shutdown_timed_out {
        notes.push(format!(
            "  {} some workers did not stop in time and were aborted",
            "warning:".red().bold()
        ));
    }
    notes
}

/// `"  name..........: value"`
fn format_metric_row(name: &str, value: &str, pad_width: usize) -> String {
    format!("  {name:.<pad_width$}: {value}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loadtest::scenario::{HttpMethod, Stage};
    use std::collections::BTreeMap;
    use std::time::Duration;

    fn setup_no_color() {
        colored::control::set_override(false);
    }

    fn scenario() -> Scenario {
        Scenario {
            test_name: Some("checkout-flow".to_string()),
            target_url: "http://localhost:8080/checkout".to_string(),
            method: HttpMethod::Post,
            timeout_ms: 5_000,
            stages: vec![
                Stage::new(Duration::from_secs(30), 50),
                Stage::new(Duration::from_secs(60), 20),
            ],
            ..Default::default()
        }
    }

    fn result() -> AggregatedResult {
        AggregatedResult {
            total_requests: 1000,
            error_count: 10,
            average_latency_ms: 41.5,
            p90_ms: 80,
            p95_ms: 120,
            p99_ms: 300,
            status_counts: BTreeMap::from([(200, 990), (0, 10)]),
        }
    }

    fn run() -> RunSummary {
        RunSummary {
            elapsed: Duration::from_secs(10),
            peak_active: 50,
            ..Default::default()
        }
    }

    #[test]
    fn test_render_summary_header() {
        setup_no_color();
        let output = render_summary(&scenario(), &result(), &run());
        assert!(output.contains("checkout-flow"));
        assert!(output.contains("http://localhost:8080/checkout"));
        assert!(output.contains("method:    POST"));
        assert!(output.contains("vus:       50"), "max stage target: {output}");
        assert!(output.contains("90.0s (2 stages)"), "sum of stages: {output}");
    }

    #[test]
    fn test_render_summary_metrics() {
        setup_no_color();
        let output = render_summary(&scenario(), &result(), &run());
        assert!(output.contains("avg=41.5ms  p90=80ms  p95=120ms  p99=300ms"));
        assert!(output.contains("http_reqs"));
        assert!(output.contains(": 1000"));
        assert!(output.contains("99.0%"));
        assert!(output.contains("100.0 req/s"), "rps from elapsed: {output}");
        assert!(output.contains("run_peak_vus"));
    }

    #[test]
    fn test_render_summary_status_breakdown() {
        setup_no_color();
        let output = render_summary(&scenario(), &result(), &run());
        assert!(output.contains("status codes:"));
        assert!(output.contains("no response"));
        assert!(output.contains("200"));
    }

    #[test]
    fn test_render_summary_empty_run() {
        setup_no_color();
        let output = render_summary(
            &scenario(),
            &AggregatedResult::default(),
            &RunSummary::default(),
        );
        assert!(output.contains("0.0%"));
        assert!(output.contains("0.0 req/s"));
        assert!(!output.contains("status codes:"));
    }

    #[test]
    fn test_render_summary_notes() {
        setup_no_color();
        let run = RunSummary {
            cancelled: true,
            shutdown_timed_out: true,
            ..run()
        };
        let output = render_summary(&scenario(), &result(), &run);
        assert!(output.contains("cancelled"));
        assert!(output.contains("aborted"));
        assert!(!output.contains("budget"));
    }

    #[test]
    fn test_format_metric_row_padding() {
        let row = format_metric_row("abc", "1", 8);
        assert_eq!(row, "  abc.....: 1");
    }
}
