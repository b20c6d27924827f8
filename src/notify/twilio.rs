use std::time::Duration;

use anyhow::{Context, Result};

use super::{Digest, Notifier};
use crate::config::TwilioSettings;
use crate::error::MonitorError;

pub const TWILIO_API_BASE: &str = "https://api.twilio.com";
const TWILIO_TIMEOUT: Duration = Duration::from_secs(20);

/// Short form as an SMS through the Twilio Messages API.
pub struct TwilioNotifier {
    settings: TwilioSettings,
    api_base: String,
    client: reqwest::Client,
}

impl TwilioNotifier {
    pub fn new(settings: TwilioSettings) -> Result<Self, MonitorError> {
        let client = reqwest::Client::builder()
            .timeout(TWILIO_TIMEOUT)
            .build()
            .map_err(|e| MonitorError::config(format!("twilio client: {e}")))?;
        Ok(Self {
            settings,
            api_base: TWILIO_API_BASE.to_string(),
            client,
        })
    }

    /// Point at another host; used against a local mock server.
    pub fn with_api_base(mut self, base: impl Into<String>) -> Self {
        self.api_base = base.into().trim_end_matches('/').to_string();
        self
    }

    fn messages_url(&self) -> String {
        format!(
            "{}/2010-04-01/Accounts/{}/Messages.json",
            self.api_base, self.settings.account_sid
        )
    }
}

#[async_trait::async_trait]
impl Notifier for TwilioNotifier {
    fn name(&self) -> &'static str {
        "twilio"
    }

    async fn send(&self, digest: &Digest) -> Result<()> {
        let s = &self.settings;
        let form = [
            ("To", s.to_number.as_str()),
            ("From", s.from_number.as_str()),
            ("Body", digest.short.as_str()),
        ];

        self.client
            .post(self.messages_url())
            .basic_auth(&s.account_sid, Some(&s.auth_token))
            .form(&form)
            .send()
            .await
            .context("twilio post")?
            .error_for_status()
            .context("twilio non-2xx")?;

        tracing::debug!(to = %s.to_number, "twilio message queued");
        Ok(())
    }
}
