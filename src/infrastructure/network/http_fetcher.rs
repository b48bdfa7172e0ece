//! HTTP implementation of the fetch primitive.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tracing::{debug, trace};

use crate::domain::errors::AssetError;
use crate::domain::ports::AssetFetcher;
use crate::infrastructure::config::NetworkConfig;

/// Fetches assets over HTTP(S).
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    /// Creates a fetcher from network configuration.
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be built.
    pub fn new(config: &NetworkConfig) -> Result<Self, AssetError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent.as_str())
            .build()
            .map_err(|e| AssetError::fetch(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl AssetFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<Bytes, AssetError> {
        debug!(url, "Fetching asset");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| AssetError::fetch(format!("Request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(AssetError::fetch(format!(
                "HTTP {}: {}",
                response.status().as_u16(),
                response.status().canonical_reason().unwrap_or("Unknown")
            )));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| AssetError::fetch(format!("Failed to read body: {e}")))?;

        trace!(url, size = bytes.len(), "Fetched asset");
        Ok(bytes)
    }
}
