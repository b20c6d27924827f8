//! Run metrics. Counters are always emitted through the `metrics` facade
//! (no-ops without a recorder); when `METRICS_TEXTFILE` is set the binary
//! installs a Prometheus recorder and dumps it to that file at exit, for a
//! node-exporter textfile collector.

use std::path::Path;

use anyhow::{Context, Result};
use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

pub const TARGETS_CHECKED: &str = "monitor_targets_checked_total";
pub const FETCH_ERRORS: &str = "monitor_fetch_errors_total";
pub const CHANGES: &str = "monitor_changes_total";
pub const BASELINES: &str = "monitor_baselines_total";
pub const NOTIFICATIONS: &str = "monitor_notifications_total";
pub const LAST_RUN_TS: &str = "monitor_last_run_ts";
pub const RUN_DURATION_MS: &str = "monitor_run_duration_ms";

pub struct Metrics {
    handle: PrometheusHandle,
}

impl Metrics {
    /// Install the Prometheus recorder globally. Call at most once per process.
    pub fn install() -> Result<Self> {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .context("prometheus: install recorder")?;
        describe();
        Ok(Self { handle })
    }

    pub fn render(&self) -> String {
        self.handle.render()
    }

    /// Write the exposition text to `path` via temp file + rename.
    pub fn write_textfile(&self, path: &Path) -> Result<()> {
        let tmp = path.with_extension("prom.tmp");
        std::fs::write(&tmp, self.render())
            .with_context(|| format!("write {}", tmp.display()))?;
        std::fs::rename(&tmp, path).with_context(|| format!("rename to {}", path.display()))
    }
}

fn describe() {
    describe_counter!(TARGETS_CHECKED, "Targets processed (fetch attempted).");
    describe_counter!(FETCH_ERRORS, "Targets skipped due to fetch or storage errors.");
    describe_counter!(CHANGES, "Targets whose content changed since the last snapshot.");
    describe_counter!(BASELINES, "Targets observed for the first time.");
    describe_counter!(NOTIFICATIONS, "Consolidated notifications attempted, by result.");
    describe_gauge!(LAST_RUN_TS, "Unix ts when the monitor last completed a run.");
    describe_histogram!(RUN_DURATION_MS, "Wall time of a monitor run in milliseconds.");
}
