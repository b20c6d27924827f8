// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod config;
pub mod diff;
pub mod error;
pub mod extract;
pub mod fetch;
pub mod logging;
pub mod metrics;
pub mod monitor;
pub mod notify;
pub mod snapshot;

// ---- Re-exports for stable public API ----
pub use crate::config::{BaselinePolicy, MonitorConfig, Target};
pub use crate::error::MonitorError;
pub use crate::monitor::{Monitor, NotificationStatus, RunReport, TargetOutcome};
pub use crate::notify::{Digest, EventKind, NotificationEvent, Notifier, NotifierMux};

/// Exit code for configuration errors.
pub const EXIT_CONFIG_ERROR: u8 = 1;

/// Load configuration from the environment, run once, and return the process
/// exit code. Expects tracing to be initialized already.
pub async fn run_from_env() -> u8 {
    let cfg = match MonitorConfig::from_env() {
        Ok(c) => c,
        Err(e) => {
            tracing::error!(error = %e, "cannot start monitor");
            return EXIT_CONFIG_ERROR;
        }
    };

    let metrics = match &cfg.metrics_textfile {
        Some(_) => match crate::metrics::Metrics::install() {
            Ok(m) => Some(m),
            Err(e) => {
                tracing::warn!(error = %format!("{e:#}"), "metrics disabled");
                None
            }
        },
        None => None,
    };

    let monitor = match Monitor::from_config(&cfg) {
        Ok(m) => m,
        Err(e) => {
            tracing::error!(error = %e, "cannot start monitor");
            return EXIT_CONFIG_ERROR;
        }
    };

    let report = monitor.run(&cfg.targets, cfg.test_mode).await;

    if let (Some(m), Some(path)) = (&metrics, &cfg.metrics_textfile) {
        if let Err(e) = m.write_textfile(path) {
            tracing::warn!(error = %format!("{e:#}"), "metrics textfile not written");
        }
    }

    report.exit_code()
}
