use async_trait::async_trait;
use reqwest::StatusCode;

use crate::application::ports::package_sources::{MarketplaceClient, SourceError};
use crate::domain::plugins::identifier::PluginIdentifier;

/// Fetches canonical package bytes from the marketplace registry configured
/// in `MARKETPLACE_API_URL`.
pub struct ReqwestMarketplaceClient {
    client: reqwest::Client,
    base_url: String,
}

impl ReqwestMarketplaceClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl MarketplaceClient for ReqwestMarketplaceClient {
    async fn fetch_package(&self, identifier: &PluginIdentifier) -> Result<Vec<u8>, SourceError> {
        let url = format!(
            "{}/api/v1/plugins/{}/download",
            self.base_url,
            urlencoding::encode(identifier.as_str())
        );
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| SourceError::Unreachable(anyhow::anyhow!("request failed: {e}")))?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Err(SourceError::NotFound);
        }
        if !resp.status().is_success() {
            return Err(SourceError::Unreachable(anyhow::anyhow!(
                "marketplace returned status {}",
                resp.status()
            )));
        }
        let bytes = resp
            .bytes()
            .await
            .map_err(|e| SourceError::Unreachable(anyhow::anyhow!("failed to read body: {e}")))?;
        Ok(bytes.to_vec())
    }
}
