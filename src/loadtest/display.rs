//! Live terminal status line for a running load test.
//!
//! Renders a single in-place updating spinner line showing the current stage,
//! active workers against the interpolated target, request count, RPS, and
//! elapsed time. Updates once per coordinator tick from the progress watch
//! channel, never per request.

use std::time::Duration;

use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::loadtest::coordinator::RampProgress;

/// Spinner-backed status line on stderr.
pub struct LiveDisplay {
    status_bar: ProgressBar,
}

impl LiveDisplay {
    /// Create the status line. Colors follow the global `colored` setting.
    pub fn new() -> Self {
        let status_bar = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {wide_msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏");
        status_bar.set_style(style);
        status_bar.enable_steady_tick(Duration::from_millis(100));

        Self { status_bar }
    }

    /// Format one status line from a progress update.
    ///
    /// Active workers are shown green when they match the target and yellow
    /// while the coordinator is still catching up.
    pub fn format_status(progress: &RampProgress) -> String {
        let secs = progress.elapsed.as_secs_f64();
        let rps = if secs > 0.0 {
            progress.requests as f64 / secs
        } else {
            0.0
        };

        let vus = format!("{}/{}", progress.active, progress.target);
        let vus = if progress.active == progress.target as usize {
            vus.green()
        } else {
            vus.yellow()
        };

        let line = format!(
            "vus: {}  |  requests: {}  |  rps: {}  |  elapsed: {}s",
            vus,
            progress.requests,
            format!("{rps:.1}").green(),
            progress.elapsed.as_secs()
        );

        if progress.stages > 0 {
            format!(
                "  [stage {}/{}]  {}",
                progress.stage + 1,
                progress.stages,
                line
            )
        } else {
            format!("  {line}")
        }
    }

    pub fn update(&self, progress: &RampProgress) {
        self.status_bar.set_message(Self::format_status(progress));
    }

    /// Stop the spinner and clear the line.
    pub fn finish(&self) {
        self.status_bar.finish_and_clear();
    }
}

impl Default for LiveDisplay {
    fn default() -> Self {
        Self::new()
    }
}

/// Render progress updates until `cancel` fires or the sender goes away.
pub async fn display_loop(
    mut progress_rx: watch::Receiver<RampProgress>,
    cancel: CancellationToken,
) {
    let display = LiveDisplay::new();

    eprintln!();
    eprintln!("  Running load test...");
    eprintln!();

    loop {
        tokio::select! {
            changed = progress_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let progress = progress_rx.borrow_and_update().clone();
                display.update(&progress);
            }
            _ = cancel.cancelled() => break,
        }
    }

    display.finish();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn progress(active: usize, target: u32) -> RampProgress {
        RampProgress {
            stage: 1,
            stages: 3,
            step: 2,
            total_steps: 4,
            target,
            active,
            requests: 250,
            elapsed: Duration::from_secs(10),
        }
    }

    #[test]
    fn test_format_status_contents() {
        colored::control::set_override(false);
        let status = LiveDisplay::format_status(&progress(4, 5));
        assert!(status.contains("[stage 2/3]"), "got: {status}");
        assert!(status.contains("vus: 4/5"), "got: {status}");
        assert!(status.contains("requests: 250"), "got: {status}");
        assert!(status.contains("rps: 25.0"), "got: {status}");
        assert!(status.contains("elapsed: 10s"), "got: {status}");
    }

    #[test]
    fn test_format_status_before_first_tick() {
        let status = LiveDisplay::format_status(&RampProgress::default());
        assert!(!status.contains('['), "got: {status}");
        assert!(status.contains("0.0"), "got: {status}");
    }

    #[test]
    fn test_live_display_new_does_not_panic() {
        let display = LiveDisplay::new();
        display.update(&progress(1, 1));
        display.finish();
    }

    #[tokio::test]
    async fn test_display_loop_stops_on_cancel() {
        let (_tx, rx) = watch::channel(RampProgress::default());
        let cancel = CancellationToken::new();
        cancel.cancel();
        display_loop(rx, cancel).await;
    }

    #[tokio::test]
    async fn test_display_loop_stops_when_sender_dropped() {
        let (tx, rx) = watch::channel(RampProgress::default());
        drop(tx);
        display_loop(rx, CancellationToken::new()).await;
    }
}
