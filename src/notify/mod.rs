// src/notify/mod.rs
//! Notification events and the channels that deliver them. A run folds all of
//! its events into one [`Digest`] and hands it to [`NotifierMux`], which sends
//! it through every configured channel.

pub mod email;
pub mod twilio;

use anyhow::Result;
use chrono::{DateTime, Utc};

use crate::config::MonitorConfig;
use crate::error::MonitorError;

pub use email::{EmailNotifier, SmsGatewayNotifier, SmtpMailer};
pub use twilio::TwilioNotifier;

/// SMS gateways truncate anything longer.
pub const SMS_MAX_CHARS: usize = 160;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Changed,
    Baseline,
    Test,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationEvent {
    pub target: String,
    pub url: String,
    pub kind: EventKind,
    pub changes: Vec<String>,
    pub ts: DateTime<Utc>,
}

impl NotificationEvent {
    pub fn changed(target: &str, url: &str, changes: Vec<String>, ts: DateTime<Utc>) -> Self {
        Self {
            target: target.to_string(),
            url: url.to_string(),
            kind: EventKind::Changed,
            changes,
            ts,
        }
    }

    pub fn baseline(target: &str, url: &str, ts: DateTime<Utc>) -> Self {
        Self {
            target: target.to_string(),
            url: url.to_string(),
            kind: EventKind::Baseline,
            changes: vec!["Baseline snapshot created".to_string()],
            ts,
        }
    }

    pub fn test(ts: DateTime<Utc>) -> Self {
        Self {
            target: "test".to_string(),
            url: String::new(),
            kind: EventKind::Test,
            changes: vec!["This is a test notification from the page monitor".to_string()],
            ts,
        }
    }
}

/// One consolidated message for a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Digest {
    pub subject: String,
    pub body: String,
    /// Single-line form for SMS gateways.
    pub short: String,
}

impl Digest {
    /// `None` when there is nothing to report.
    pub fn compose(events: &[NotificationEvent]) -> Option<Self> {
        if events.is_empty() {
            return None;
        }

        let pages: Vec<&str> = events
            .iter()
            .filter(|e| e.kind != EventKind::Test)
            .map(|e| e.target.as_str())
            .collect();

        let subject = if pages.is_empty() {
            "Page monitor test notification".to_string()
        } else {
            format!("Page change alert: {}", pages.join(", "))
        };

        let mut body = String::new();
        for ev in events {
            let heading = match ev.kind {
                EventKind::Changed => format!("PAGE CHANGE ALERT for {}", ev.target),
                EventKind::Baseline => format!("Now monitoring {}", ev.target),
                EventKind::Test => "TEST NOTIFICATION".to_string(),
            };
            body.push_str(&heading);
            body.push('\n');
            for line in &ev.changes {
                body.push_str("  - ");
                body.push_str(line);
                body.push('\n');
            }
            if !ev.url.is_empty() {
                body.push_str(&format!("URL: {}\n", ev.url));
            }
            body.push_str(&format!("Time: {}\n\n", ev.ts.format("%Y-%m-%d %H:%M:%S UTC")));
        }

        let short = if pages.is_empty() {
            "Page monitor: test notification".to_string()
        } else {
            format!("Page monitor: {} changed: {}", pages.len(), pages.join(", "))
        };

        Some(Self {
            subject,
            body: body.trim_end().to_string(),
            short: short.chars().take(SMS_MAX_CHARS).collect(),
        })
    }
}

#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    fn name(&self) -> &'static str;
    async fn send(&self, digest: &Digest) -> Result<()>;
}

/// Dry-run channel: writes the message to the log.
pub struct LogNotifier;

#[async_trait::async_trait]
impl Notifier for LogNotifier {
    fn name(&self) -> &'static str {
        "log"
    }

    async fn send(&self, digest: &Digest) -> Result<()> {
        tracing::info!(subject = %digest.subject, body = %digest.body, "dry run notification");
        Ok(())
    }
}

/// Fan-out over every configured channel.
#[derive(Default)]
pub struct NotifierMux {
    channels: Vec<Box<dyn Notifier>>,
}

impl NotifierMux {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, channel: Box<dyn Notifier>) -> Self {
        self.channels.push(channel);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn channel_names(&self) -> Vec<&'static str> {
        self.channels.iter().map(|c| c.name()).collect()
    }

    /// Dry run logs only. Otherwise Twilio SMS first, then whichever email
    /// recipients are configured (full digest, SMS gateway).
    pub fn from_config(cfg: &MonitorConfig) -> Result<Self, MonitorError> {
        if cfg.dry_run {
            return Ok(Self::new().with(Box::new(LogNotifier)));
        }

        let mut mux = Self::new();
        if let Some(twilio) = &cfg.twilio {
            mux = mux.with(Box::new(TwilioNotifier::new(twilio.clone())?));
        }
        if let Some(email) = &cfg.email {
            let mailer = SmtpMailer::new(email)?;
            if let Some(to) = &email.to {
                mux = mux.with(Box::new(EmailNotifier::new(mailer.clone(), to)?));
            }
            if let Some(sms) = &email.sms_to {
                mux = mux.with(Box::new(SmsGatewayNotifier::new(mailer, sms)?));
            }
        }
        Ok(mux)
    }

    /// Send through all channels. Succeeds when at least one channel delivered;
    /// returns the number of channels that did.
    pub async fn deliver(&self, digest: &Digest) -> Result<usize, MonitorError> {
        if self.channels.is_empty() {
            return Err(MonitorError::notification(
                "no notification channel configured (set SMTP/GMAIL credentials with a recipient, \
                 or TWILIO_* settings)",
            ));
        }

        let mut delivered = 0usize;
        let mut failures = Vec::new();
        for ch in &self.channels {
            match ch.send(digest).await {
                Ok(()) => {
                    tracing::info!(
                        channel = ch.name(),
                        subject = %digest.subject,
                        "notification sent"
                    );
                    delivered += 1;
                }
                Err(e) => {
                    tracing::warn!(
                        channel = ch.name(),
                        error = %format!("{e:#}"),
                        "notification failed"
                    );
                    failures.push(format!("{}: {e:#}", ch.name()));
                }
            }
        }

        if delivered == 0 {
            return Err(MonitorError::notification(failures.join("; ")));
        }
        Ok(delivered)
    }
}
