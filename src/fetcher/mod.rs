//! Downloads remote content with basic payload validation.

use async_trait::async_trait;
use std::time::Duration;
use tracing::warn;

/// Anything shorter than this is an error page, not media.
pub const MIN_CONTENT_LEN: usize = 1024;

/// Fetches raw bytes from a URL, yielding `None` on any failure.
#[async_trait]
pub trait ContentFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Option<Vec<u8>>;
}

pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(timeout_secs: u64) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to create HTTP client: {}", e))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl ContentFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Option<Vec<u8>> {
        let response = match self.client.get(url).send().await {
            Ok(response) => response,
            Err(e) => {
                warn!("Fetch of {} failed: {}", url, e);
                return None;
            }
        };

        let status = response.status();
        if !is_acceptable_status(status) {
            warn!("Fetch of {} returned status {}", url, status);
            return None;
        }

        let body = match response.bytes().await {
            Ok(body) => body.to_vec(),
            Err(e) => {
                warn!("Failed to read body of {}: {}", url, e);
                return None;
            }
        };

        if !is_plausible_media(&body) {
            warn!("Fetch of {} returned only {} bytes, discarding", url, body.len());
            return None;
        }
        Some(body)
    }
}

/// Only a plain 200 counts as success; redirects are followed by the client.
pub fn is_acceptable_status(status: reqwest::StatusCode) -> bool {
    status == reqwest::StatusCode::OK
}

/// Payloads at or below [`MIN_CONTENT_LEN`] bytes are rejected.
pub fn is_plausible_media(body: &[u8]) -> bool {
    body.len() > MIN_CONTENT_LEN
}
