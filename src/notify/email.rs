use std::time::Duration;

use anyhow::{Context, Result};
use lettre::message::{header, Mailbox, Message};
use lettre::transport::smtp::{authentication::Credentials, AsyncSmtpTransport};
use lettre::{AsyncTransport, Tokio1Executor};

use super::{Digest, Notifier};
use crate::config::EmailSettings;
use crate::error::MonitorError;

const SMTP_TIMEOUT: Duration = Duration::from_secs(30);
/// Implicit TLS port; everything else upgrades with STARTTLS.
const SMTPS_PORT: u16 = 465;

/// Authenticated SMTP transport plus sender, shared by the email and SMS channels.
#[derive(Clone)]
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    pub fn new(cfg: &EmailSettings) -> Result<Self, MonitorError> {
        let builder = if cfg.smtp_port == SMTPS_PORT {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&cfg.smtp_host)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&cfg.smtp_host)
        }
        .map_err(|e| MonitorError::config(format!("invalid SMTP_HOST {}: {e}", cfg.smtp_host)))?;

        let transport = builder
            .port(cfg.smtp_port)
            .credentials(Credentials::new(cfg.username.clone(), cfg.password.clone()))
            .timeout(Some(SMTP_TIMEOUT))
            .build();

        Ok(Self {
            transport,
            from: parse_mailbox("NOTIFY_EMAIL_FROM", &cfg.from)?,
        })
    }

    async fn send(&self, to: &Mailbox, subject: &str, body: String) -> Result<()> {
        let msg = Message::builder()
            .from(self.from.clone())
            .to(to.clone())
            .subject(subject)
            .header(header::ContentType::TEXT_PLAIN)
            .body(body)
            .context("build email")?;

        self.transport.send(msg).await.context("send email")?;
        Ok(())
    }
}

fn parse_mailbox(key: &str, addr: &str) -> Result<Mailbox, MonitorError> {
    addr.parse()
        .map_err(|e| MonitorError::config(format!("invalid {key} {addr:?}: {e}")))
}

/// Full digest to the recipient mailbox.
pub struct EmailNotifier {
    mailer: SmtpMailer,
    to: Mailbox,
}

impl EmailNotifier {
    pub fn new(mailer: SmtpMailer, to: &str) -> Result<Self, MonitorError> {
        Ok(Self {
            mailer,
            to: parse_mailbox("NOTIFY_EMAIL_TO", to)?,
        })
    }
}

#[async_trait::async_trait]
impl Notifier for EmailNotifier {
    fn name(&self) -> &'static str {
        "email"
    }

    async fn send(&self, digest: &Digest) -> Result<()> {
        self.mailer
            .send(&self.to, &digest.subject, digest.body.clone())
            .await
    }
}

/// Short form to a carrier email-to-SMS address.
pub struct SmsGatewayNotifier {
    mailer: SmtpMailer,
    to: Mailbox,
}

impl SmsGatewayNotifier {
    pub fn new(mailer: SmtpMailer, to: &str) -> Result<Self, MonitorError> {
        Ok(Self {
            mailer,
            to: parse_mailbox("SMS_EMAIL", to)?,
        })
    }
}

#[async_trait::async_trait]
impl Notifier for SmsGatewayNotifier {
    fn name(&self) -> &'static str {
        "sms-gateway"
    }

    async fn send(&self, digest: &Digest) -> Result<()> {
        self.mailer
            .send(&self.to, "Page Monitor Update", digest.short.clone())
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> EmailSettings {
        EmailSettings {
            smtp_host: "smtp.example.com".into(),
            smtp_port: 587,
            username: "me@example.com".into(),
            password: "pw".into(),
            from: "me@example.com".into(),
            to: Some("you@example.com".into()),
            sms_to: None,
        }
    }

    #[tokio::test]
    async fn builds_with_valid_addresses() {
        let mailer = SmtpMailer::new(&settings()).unwrap();
        assert!(EmailNotifier::new(mailer.clone(), "you@example.com").is_ok());
        assert!(SmsGatewayNotifier::new(mailer, "5551234567@txt.att.net").is_ok());
    }

    #[tokio::test]
    async fn rejects_bad_sender() {
        let mut s = settings();
        s.from = "not an address".into();
        let err = SmtpMailer::new(&s).err().expect("should fail");
        assert!(err.to_string().contains("NOTIFY_EMAIL_FROM"));
    }
}
