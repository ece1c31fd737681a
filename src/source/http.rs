use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use super::{FetchError, SourcePayload, TelemetrySource};

/// Polls an HTTP endpoint with a plain GET.
#[derive(Debug, Clone)]
pub struct HttpSource {
    url: String,
    client: reqwest::Client,
}

impl HttpSource {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, FetchError> {
        let url = url.into();
        if url.trim().is_empty() {
            return Err(FetchError::Transport("source url must not be empty".into()));
        }
        let client = reqwest::Client::builder()
            .connect_timeout(timeout)
            .timeout(timeout)
            .build()
            .map_err(|e| FetchError::Transport(e.to_string()))?;
        Ok(Self { url, client })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl TelemetrySource for HttpSource {
    async fn fetch(&self) -> Result<SourcePayload, FetchError> {
        let response = self
            .client
            .get(&self.url)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Transport(format!("HTTP {}", status.as_u16())));
        }

        let body = response
            .text()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;
        debug!(url = %self.url, bytes = body.len(), "fetched telemetry");
        SourcePayload::from_body(&body)
    }

    fn describe(&self) -> String {
        self.url.clone()
    }
}
