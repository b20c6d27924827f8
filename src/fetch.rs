// src/fetch.rs
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::Client;

/// Source of page bodies. The HTTP implementation is the only one used in
/// production; tests plug in canned pages.
#[async_trait::async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<String>;
}

pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration, user_agent: &str) -> Result<Self> {
        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .context("build HTTP client")?;
        Ok(Self { client })
    }
}

#[async_trait::async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<String> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("GET {url}"))?
            .error_for_status()
            .with_context(|| format!("GET {url} non-2xx"))?;
        resp.text().await.context("read body")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn returns_body_and_sends_user_agent() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/tours"))
            .and(header("user-agent", "monitor-test"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<p>hi</p>"))
            .mount(&server)
            .await;

        let f = HttpFetcher::new(Duration::from_secs(5), "monitor-test").unwrap();
        let body = f.fetch(&format!("{}/tours", server.uri())).await.unwrap();
        assert_eq!(body, "<p>hi</p>");
    }

    #[tokio::test]
    async fn non_2xx_is_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let f = HttpFetcher::new(Duration::from_secs(5), "monitor-test").unwrap();
        let err = f.fetch(&server.uri()).await.unwrap_err();
        assert!(format!("{err:#}").contains("503"));
    }

    #[tokio::test]
    async fn slow_response_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("late")
                    .set_delay(Duration::from_secs(3)),
            )
            .mount(&server)
            .await;

        let f = HttpFetcher::new(Duration::from_millis(200), "monitor-test").unwrap();
        assert!(f.fetch(&server.uri()).await.is_err());
    }
}
