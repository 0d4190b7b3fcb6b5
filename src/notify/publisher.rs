use async_trait::async_trait;
use log::{debug, warn};
use reqwest::header::CONTENT_TYPE;
use std::time::Duration;

use crate::capture::EventRecord;
use crate::error::{CaptureError, Result};

/// Remote sink for capture events
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, record: &EventRecord) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct PublisherOptions {
    /// Check certificates and host names
    pub verify_tls: bool,
    /// Upper bound for the whole request
    pub timeout: Duration,
}

impl Default for PublisherOptions {
    fn default() -> Self {
        Self {
            verify_tls: true,
            timeout: Duration::from_secs(5),
        }
    }
}

/// POSTs each event as JSON to a fixed URL.
pub struct HttpPublisher {
    client: reqwest::Client,
    url: String,
}

impl HttpPublisher {
    pub fn new(url: impl Into<String>, options: PublisherOptions) -> Result<Self> {
        let url = url.into();
        if !options.verify_tls {
            warn!("TLS verification disabled for event endpoint {}", url);
        }

        let client = reqwest::Client::builder()
            .timeout(options.timeout)
            .danger_accept_invalid_certs(!options.verify_tls)
            .build()
            .map_err(|e| {
                CaptureError::Configuration(format!("failed to create HTTP client: {}", e))
            })?;

        Ok(Self { client, url })
    }
}

#[async_trait]
impl EventPublisher for HttpPublisher {
    async fn publish(&self, record: &EventRecord) -> Result<()> {
        let body = record.to_json();
        debug!("POST {} body {}", self.url, body);

        let response = self
            .client
            .post(&self.url)
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .map_err(|e| CaptureError::RemotePublish(format!("request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(CaptureError::RemotePublish(format!("HTTP {}", response.status())));
        }
        Ok(())
    }
}
