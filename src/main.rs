//! page-monitor runs one scheduled pass. It fetches every configured page, compares
//! against stored snapshots, persists changes and sends one notification.
//!
//! Exit codes: 0 run completed, 1 configuration error, 2 notification failed.

use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env in local/dev; no-op when the scheduler injects the environment.
    let _ = dotenvy::dotenv();

    page_change_monitor::logging::init();

    ExitCode::from(page_change_monitor::run_from_env().await)
}
