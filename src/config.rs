// src/config.rs
//! Startup configuration: targets, email settings and runner knobs are read
//! once from the process environment (and an optional config file) into an
//! immutable [`MonitorConfig`].

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{MonitorError, Result};
use crate::extract::IgnoreSet;

pub const ENV_CONFIG_PATH: &str = "MONITOR_CONFIG_PATH";
/// Highest `TARGET_URL_<n>` index scanned.
pub const MAX_NUMBERED_TARGETS: usize = 10;

const DEFAULT_JSON_CONFIG: &str = "urls_config.json";
const DEFAULT_TOML_CONFIG: &str = "config/targets.toml";
const DEFAULT_SMTP_HOST: &str = "smtp.gmail.com";
const DEFAULT_SMTP_PORT: u16 = 587;
const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
    AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

/// A named page to check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    pub name: String,
    pub url: String,
    /// Regexes whose matches are dropped from page text before comparison.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ignore: Vec<String>,
}

impl Target {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            ignore: Vec::new(),
        }
    }

    pub fn with_ignore(mut self, pattern: impl Into<String>) -> Self {
        self.ignore.push(pattern.into());
        self
    }
}

/// Whether the first observation of a target produces a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BaselinePolicy {
    /// Record the baseline quietly.
    #[default]
    Silent,
    /// Report baseline creation in the run's message.
    Notify,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailSettings {
    pub smtp_host: String,
    pub smtp_port: u16,
    pub username: String,
    pub password: String,
    pub from: String,
    /// Full digest recipient.
    pub to: Option<String>,
    /// Carrier email-to-SMS gateway address, e.g. `5551234567@txt.att.net`.
    pub sms_to: Option<String>,
}

/// Twilio Messages API credentials; all four must be present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TwilioSettings {
    pub account_sid: String,
    pub auth_token: String,
    pub from_number: String,
    pub to_number: String,
}

#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub targets: Vec<Target>,
    pub test_mode: bool,
    pub state_dir: PathBuf,
    pub fetch_timeout: Duration,
    pub user_agent: String,
    pub concurrency: usize,
    pub baseline: BaselinePolicy,
    pub dry_run: bool,
    pub email: Option<EmailSettings>,
    pub twilio: Option<TwilioSettings>,
    pub metrics_textfile: Option<PathBuf>,
}

impl MonitorConfig {
    /// Read everything from the process environment, resolving config files
    /// relative to the current directory.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|k| std::env::var(k).ok(), Path::new("."))
    }

    /// Same as [`from_env`](Self::from_env) with an explicit variable source.
    pub fn from_lookup<F>(lookup: F, base_dir: &Path) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |k: &str| {
            lookup(k)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let flag = |k: &str| get(k).is_some_and(|v| parse_bool(&v));

        let targets = load_targets(&get, base_dir)?;

        let test_mode = flag("TEST_EMAIL") || flag("MONITOR_TEST_MODE");

        let state_dir = get("MONITOR_STATE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| base_dir.to_path_buf());

        let timeout_secs =
            parse_num("MONITOR_FETCH_TIMEOUT_SECS", get("MONITOR_FETCH_TIMEOUT_SECS"))?
                .unwrap_or(DEFAULT_FETCH_TIMEOUT_SECS);
        if timeout_secs == 0 {
            return Err(MonitorError::config("MONITOR_FETCH_TIMEOUT_SECS must be > 0"));
        }

        let concurrency: usize =
            parse_num("MONITOR_CONCURRENCY", get("MONITOR_CONCURRENCY"))?.unwrap_or(1);

        let baseline = if flag("MONITOR_NOTIFY_ON_BASELINE") {
            BaselinePolicy::Notify
        } else {
            BaselinePolicy::Silent
        };

        Ok(Self {
            targets,
            test_mode,
            state_dir,
            fetch_timeout: Duration::from_secs(timeout_secs),
            user_agent: get("MONITOR_USER_AGENT")
                .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string()),
            concurrency: concurrency.max(1),
            baseline,
            dry_run: flag("MONITOR_DRY_RUN"),
            email: load_email(&get)?,
            twilio: load_twilio(&get),
            metrics_textfile: get("METRICS_TEXTFILE").map(PathBuf::from),
        })
    }
}

/// Resolve targets, first source that yields anything wins:
/// 1) `TARGET_URL` (+ optional `TARGET_NAME`)
/// 2) `TARGET_URL_<n>` / `TARGET_NAME_<n>`, n = 1.., stopping at the first gap
/// 3) `$MONITOR_CONFIG_PATH`, `urls_config.json`, `config/targets.toml`
pub fn load_targets<F>(get: &F, base_dir: &Path) -> Result<Vec<Target>>
where
    F: Fn(&str) -> Option<String>,
{
    let targets = if let Some(url) = get("TARGET_URL") {
        let name = get("TARGET_NAME").unwrap_or_else(|| "default".to_string());
        vec![Target::new(name, url)]
    } else {
        let numbered = numbered_targets(get);
        if !numbered.is_empty() {
            numbered
        } else {
            file_targets(get, base_dir)?
        }
    };

    let targets: Vec<Target> = targets
        .into_iter()
        .filter(|t| !t.url.trim().is_empty())
        .collect();

    if targets.is_empty() {
        return Err(MonitorError::config(
            "no targets configured; set TARGET_URL, TARGET_URL_1.. or provide urls_config.json",
        ));
    }

    for t in &targets {
        IgnoreSet::new(&t.ignore).map_err(|e| {
            MonitorError::config(format!("target {}: invalid ignore pattern: {e}", t.name))
        })?;
    }

    Ok(targets)
}

fn numbered_targets<F>(get: &F) -> Vec<Target>
where
    F: Fn(&str) -> Option<String>,
{
    let mut out = Vec::new();
    for i in 1..=MAX_NUMBERED_TARGETS {
        let Some(url) = get(&format!("TARGET_URL_{i}")) else {
            break;
        };
        let name = get(&format!("TARGET_NAME_{i}")).unwrap_or_else(|| format!("page_{i}"));
        out.push(Target::new(name, url));
    }
    out
}

fn file_targets<F>(get: &F, base_dir: &Path) -> Result<Vec<Target>>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(p) = get(ENV_CONFIG_PATH) {
        let path = base_dir.join(p);
        if !path.exists() {
            return Err(MonitorError::config(format!(
                "{ENV_CONFIG_PATH} points to non-existent path {}",
                path.display()
            )));
        }
        return load_targets_from(&path);
    }
    for candidate in [DEFAULT_JSON_CONFIG, DEFAULT_TOML_CONFIG] {
        let path = base_dir.join(candidate);
        if path.exists() {
            return load_targets_from(&path);
        }
    }
    Ok(Vec::new())
}

#[derive(Debug, Deserialize)]
struct TargetsFile {
    #[serde(default)]
    urls: Vec<Target>,
}

/// Load targets from a JSON or TOML file. The extension picks the parser;
/// anything else tries JSON, then TOML.
pub fn load_targets_from(path: &Path) -> Result<Vec<Target>> {
    let content = fs::read_to_string(path).map_err(|e| {
        MonitorError::config(format!("reading targets from {}: {e}", path.display()))
    })?;
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    parse_targets(&content, &ext)
        .map_err(|e| MonitorError::config(format!("parsing {}: {e}", path.display())))
}

fn parse_targets(s: &str, hint_ext: &str) -> std::result::Result<Vec<Target>, String> {
    let parsed = match hint_ext {
        "json" => serde_json::from_str::<TargetsFile>(s).map_err(|e| e.to_string()),
        "toml" => toml::from_str::<TargetsFile>(s).map_err(|e| e.to_string()),
        _ => serde_json::from_str::<TargetsFile>(s)
            .or_else(|_| toml::from_str::<TargetsFile>(s))
            .map_err(|e| e.to_string()),
    }?;
    Ok(parsed
        .urls
        .into_iter()
        .map(|mut t| {
            t.name = t.name.trim().to_string();
            t.url = t.url.trim().to_string();
            t
        })
        .collect())
}

fn load_email<F>(get: &F) -> Result<Option<EmailSettings>>
where
    F: Fn(&str) -> Option<String>,
{
    let username = get("SMTP_USER").or_else(|| get("GMAIL_USER"));
    let password = get("SMTP_PASS").or_else(|| get("GMAIL_APP_PASSWORD"));
    let to = get("NOTIFY_EMAIL_TO").or_else(|| get("EMAIL_RECIPIENT"));
    let sms_to = get("SMS_EMAIL");

    let (username, password) = match (username, password) {
        (Some(u), Some(p)) => (u, p),
        (None, None) => return Ok(None),
        (u, p) => {
            tracing::warn!(
                user = u.is_some(),
                password = p.is_some(),
                "incomplete SMTP credentials; email notifications disabled"
            );
            return Ok(None);
        }
    };

    if to.is_none() && sms_to.is_none() {
        tracing::warn!("SMTP credentials set without a recipient; email notifications disabled");
        return Ok(None);
    }

    let smtp_port = parse_num("SMTP_PORT", get("SMTP_PORT"))?.unwrap_or(DEFAULT_SMTP_PORT);

    Ok(Some(EmailSettings {
        smtp_host: get("SMTP_HOST").unwrap_or_else(|| DEFAULT_SMTP_HOST.to_string()),
        smtp_port,
        from: get("NOTIFY_EMAIL_FROM").unwrap_or_else(|| username.clone()),
        username,
        password,
        to,
        sms_to,
    }))
}

fn load_twilio<F>(get: &F) -> Option<TwilioSettings>
where
    F: Fn(&str) -> Option<String>,
{
    let vals = (
        get("TWILIO_ACCOUNT_SID"),
        get("TWILIO_AUTH_TOKEN"),
        get("TWILIO_FROM_NUMBER"),
        get("TWILIO_TO_NUMBER"),
    );
    match vals {
        (Some(account_sid), Some(auth_token), Some(from_number), Some(to_number)) => {
            Some(TwilioSettings {
                account_sid,
                auth_token,
                from_number,
                to_number,
            })
        }
        (None, None, None, None) => None,
        _ => {
            tracing::warn!("incomplete TWILIO_* settings; Twilio SMS disabled");
            None
        }
    }
}

/// `1`, `true`, `yes`, `on` (any case) are true; everything else is false.
pub fn parse_bool(v: &str) -> bool {
    matches!(
        v.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

fn parse_num<T: std::str::FromStr>(key: &str, v: Option<String>) -> Result<Option<T>> {
    match v {
        None => Ok(None),
        Some(s) => s
            .parse()
            .map(Some)
            .map_err(|_| MonitorError::config(format!("{key} must be a number, got {s:?}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k: &str| map.get(k).cloned()
    }

    #[test]
    fn single_url_wins_over_numbered() {
        let tmp = tempfile::tempdir().unwrap();
        let get = env(&[
            ("TARGET_URL", "https://a.test/"),
            ("TARGET_URL_1", "https://b.test/"),
        ]);
        let cfg = MonitorConfig::from_lookup(get, tmp.path()).unwrap();
        assert_eq!(cfg.targets, vec![Target::new("default", "https://a.test/")]);
    }

    #[test]
    fn numbered_targets_default_names_and_stop_at_gap() {
        let tmp = tempfile::tempdir().unwrap();
        let get = env(&[
            ("TARGET_URL_1", "https://one.test/"),
            ("TARGET_NAME_1", "visits"),
            ("TARGET_URL_2", "https://two.test/"),
            ("TARGET_URL_4", "https://four.test/"),
        ]);
        let cfg = MonitorConfig::from_lookup(get, tmp.path()).unwrap();
        let names: Vec<_> = cfg.targets.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["visits", "page_2"]);
    }

    #[test]
    fn json_and_toml_files_parse() {
        let json = r#"{"urls":[{"name":" a ","url":"https://a.test/","ignore":["\\d+ views"]}]}"#;
        let toml = r#"
[[urls]]
name = "b"
url = "https://b.test/"
"#;
        let j = parse_targets(json, "json").unwrap();
        assert_eq!(j[0].name, "a");
        assert_eq!(j[0].ignore, vec![r"\d+ views".to_string()]);
        let t = parse_targets(toml, "").unwrap();
        assert_eq!(t, vec![Target::new("b", "https://b.test/")]);
    }

    #[test]
    fn no_targets_is_config_error() {
        let tmp = tempfile::tempdir().unwrap();
        let err = MonitorConfig::from_lookup(env(&[]), tmp.path()).unwrap_err();
        assert!(matches!(err, MonitorError::Config(_)));
    }

    #[test]
    fn missing_explicit_config_path_is_error() {
        let tmp = tempfile::tempdir().unwrap();
        let get = env(&[(ENV_CONFIG_PATH, "nope.json")]);
        let err = MonitorConfig::from_lookup(get, tmp.path()).unwrap_err();
        assert!(err.to_string().contains("non-existent"));
    }

    #[test]
    fn invalid_ignore_pattern_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(
            tmp.path().join("urls_config.json"),
            r#"{"urls":[{"name":"a","url":"https://a.test/","ignore":["("]}]}"#,
        )
        .unwrap();
        let err = MonitorConfig::from_lookup(env(&[]), tmp.path()).unwrap_err();
        assert!(err.to_string().contains("invalid ignore pattern"));
    }

    #[test]
    fn email_falls_back_to_gmail_names() {
        let tmp = tempfile::tempdir().unwrap();
        let get = env(&[
            ("TARGET_URL", "https://a.test/"),
            ("GMAIL_USER", "me@gmail.com"),
            ("GMAIL_APP_PASSWORD", "secret"),
            ("EMAIL_RECIPIENT", "you@example.com"),
            ("TEST_EMAIL", "True"),
        ]);
        let cfg = MonitorConfig::from_lookup(get, tmp.path()).unwrap();
        let email = cfg.email.expect("email configured");
        assert_eq!(email.smtp_host, "smtp.gmail.com");
        assert_eq!(email.smtp_port, 587);
        assert_eq!(email.from, "me@gmail.com");
        assert_eq!(email.to.as_deref(), Some("you@example.com"));
        assert!(cfg.test_mode);
        assert_eq!(cfg.baseline, BaselinePolicy::Silent);
    }

    #[test]
    fn sms_gateway_alone_is_enough() {
        let tmp = tempfile::tempdir().unwrap();
        let get = env(&[
            ("TARGET_URL", "https://a.test/"),
            ("GMAIL_USER", "me@gmail.com"),
            ("GMAIL_APP_PASSWORD", "secret"),
            ("SMS_EMAIL", "5551234567@txt.att.net"),
        ]);
        let cfg = MonitorConfig::from_lookup(get, tmp.path()).unwrap();
        let email = cfg.email.expect("sms gateway configured");
        assert!(email.to.is_none());
        assert_eq!(email.sms_to.as_deref(), Some("5551234567@txt.att.net"));
    }

    #[test]
    fn test_mode_flags_are_ored() {
        let tmp = tempfile::tempdir().unwrap();
        let get = env(&[
            ("TARGET_URL", "https://a.test/"),
            ("TEST_EMAIL", "false"),
            ("MONITOR_TEST_MODE", "1"),
        ]);
        let cfg = MonitorConfig::from_lookup(get, tmp.path()).unwrap();
        assert!(cfg.test_mode);
    }

    #[test]
    fn twilio_needs_all_four_vars() {
        let tmp = tempfile::tempdir().unwrap();
        let full = env(&[
            ("TARGET_URL", "https://a.test/"),
            ("TWILIO_ACCOUNT_SID", "AC123"),
            ("TWILIO_AUTH_TOKEN", "tok"),
            ("TWILIO_FROM_NUMBER", "+15550001111"),
            ("TWILIO_TO_NUMBER", "+15552223333"),
        ]);
        let cfg = MonitorConfig::from_lookup(full, tmp.path()).unwrap();
        assert_eq!(cfg.twilio.map(|t| t.account_sid), Some("AC123".to_string()));

        let partial = env(&[
            ("TARGET_URL", "https://a.test/"),
            ("TWILIO_ACCOUNT_SID", "AC123"),
        ]);
        let cfg = MonitorConfig::from_lookup(partial, tmp.path()).unwrap();
        assert!(cfg.twilio.is_none());
    }

    #[test]
    fn incomplete_email_disables_channel() {
        let tmp = tempfile::tempdir().unwrap();
        let get = env(&[("TARGET_URL", "https://a.test/"), ("SMTP_USER", "me")]);
        let cfg = MonitorConfig::from_lookup(get, tmp.path()).unwrap();
        assert!(cfg.email.is_none());
    }

    #[test]
    fn bad_number_is_config_error() {
        let tmp = tempfile::tempdir().unwrap();
        let get = env(&[
            ("TARGET_URL", "https://a.test/"),
            ("MONITOR_CONCURRENCY", "many"),
        ]);
        assert!(MonitorConfig::from_lookup(get, tmp.path()).is_err());
    }
}
