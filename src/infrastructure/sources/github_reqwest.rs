use async_trait::async_trait;
use reqwest::StatusCode;

use crate::application::ports::package_sources::{GithubReleaseClient, SourceError};

/// Downloads release assets from github.com. Only public releases; the
/// download URL scheme is stable (`/releases/download/<tag>/<asset>`).
pub struct ReqwestGithubReleaseClient {
    client: reqwest::Client,
}

impl ReqwestGithubReleaseClient {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for ReqwestGithubReleaseClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GithubReleaseClient for ReqwestGithubReleaseClient {
    async fn fetch_release_asset(
        &self,
        repo: &str,
        version: &str,
        asset: &str,
    ) -> Result<Vec<u8>, SourceError> {
        let url = format!(
            "https://github.com/{}/releases/download/{}/{}",
            repo,
            urlencoding::encode(version),
            urlencoding::encode(asset)
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
                "github returned status {}",
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
