// tests/e2e_smoke.rs
// Full pass through the env-driven entrypoint against a local HTTP server.

use std::env;

use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const VARS: &[&str] = &[
    "TARGET_URL",
    "TARGET_NAME",
    "MONITOR_STATE_DIR",
    "MONITOR_DRY_RUN",
    "TEST_EMAIL",
    "SMTP_USER",
    "SMTP_PASS",
    "GMAIL_USER",
    "GMAIL_APP_PASSWORD",
    "NOTIFY_EMAIL_TO",
    "EMAIL_RECIPIENT",
    "METRICS_TEXTFILE",
];

fn clear() {
    for v in VARS {
        env::remove_var(v);
    }
}

async fn serve_page() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/visit"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"<html><head><title>Visit</title></head>
               <body><button class="btn register">Register for a tour</button></body></html>"#,
        ))
        .mount(&server)
        .await;
    server
}

#[tokio::test]
#[serial_test::serial]
async fn dry_run_test_mode_completes_and_writes_baseline() {
    clear();
    let server = serve_page().await;
    let state = tempfile::tempdir().unwrap();

    env::set_var("TARGET_URL", format!("{}/visit", server.uri()));
    env::set_var("TARGET_NAME", "visit");
    env::set_var("MONITOR_STATE_DIR", state.path().display().to_string());
    env::set_var("MONITOR_DRY_RUN", "1");
    env::set_var("TEST_EMAIL", "true");

    let code = page_change_monitor::run_from_env().await;
    assert_eq!(code, 0);
    assert!(state.path().join("page_snapshot_visit.json").exists());
    assert!(state.path().join("page_content_visit.html").exists());
    clear();
}

#[tokio::test]
#[serial_test::serial]
async fn required_notification_without_channel_exits_2() {
    clear();
    let server = serve_page().await;
    let state = tempfile::tempdir().unwrap();

    env::set_var("TARGET_URL", format!("{}/visit", server.uri()));
    env::set_var("MONITOR_STATE_DIR", state.path().display().to_string());
    env::set_var("TEST_EMAIL", "true");

    let code = page_change_monitor::run_from_env().await;
    assert_eq!(code, 2);
    // Snapshot persisted even though nobody was told.
    assert!(state.path().join("page_snapshot_default.json").exists());
    clear();
}

#[tokio::test]
#[serial_test::serial]
async fn unreachable_target_still_completes() {
    clear();
    let state = tempfile::tempdir().unwrap();

    env::set_var("TARGET_URL", "http://127.0.0.1:9/nothing");
    env::set_var("MONITOR_STATE_DIR", state.path().display().to_string());

    let code = page_change_monitor::run_from_env().await;
    assert_eq!(code, 0);
    assert!(!state.path().join("page_snapshot_default.json").exists());
    clear();
}
