use std::sync::Arc;
use std::time::Duration;

use crate::application::ports::package_sources::{
    GithubReleaseClient, MarketplaceClient, SourceError,
};
use crate::domain::plugins::source::InstallSource;

#[derive(thiserror::Error, Debug)]
pub enum AcquireError {
    #[error("package of {size} bytes exceeds the {limit} byte limit")]
    PackageTooLarge { size: usize, limit: usize },
    #[error("package not found at source")]
    NotFound,
    #[error("source unreachable")]
    Unreachable(#[source] anyhow::Error),
}

impl From<SourceError> for AcquireError {
    fn from(err: SourceError) -> Self {
        match err {
            SourceError::NotFound => AcquireError::NotFound,
            SourceError::Unreachable(e) => AcquireError::Unreachable(e),
        }
    }
}

/// Obtains raw package bytes from whichever source the request names.
/// Purely functional for local bytes; one bounded outbound fetch for the
/// remote variants.
pub struct PackageAcquirer {
    github: Arc<dyn GithubReleaseClient>,
    marketplace: Arc<dyn MarketplaceClient>,
    size_limit: usize,
    remote_timeout: Duration,
}

impl PackageAcquirer {
    pub fn new(
        github: Arc<dyn GithubReleaseClient>,
        marketplace: Arc<dyn MarketplaceClient>,
        size_limit: usize,
        remote_timeout: Duration,
    ) -> Self {
        Self {
            github,
            marketplace,
            size_limit,
            remote_timeout,
        }
    }

    pub fn size_limit(&self) -> usize {
        self.size_limit
    }

    pub async fn acquire(&self, source: &InstallSource) -> Result<Vec<u8>, AcquireError> {
        let bytes = match source {
            InstallSource::LocalPackage { bytes } => {
                // Length is known before any copy happens; reject up front.
                self.ensure_within_limit(bytes.len())?;
                bytes.clone()
            }
            InstallSource::GitHubRelease {
                repo,
                version,
                asset,
            } => {
                self.bounded(self.github.fetch_release_asset(repo, version, asset))
                    .await?
            }
            InstallSource::Marketplace { identifier } => {
                self.bounded(self.marketplace.fetch_package(identifier))
                    .await?
            }
        };
        self.ensure_within_limit(bytes.len())?;
        Ok(bytes)
    }

    pub fn ensure_within_limit(&self, size: usize) -> Result<(), AcquireError> {
        if size > self.size_limit {
            return Err(AcquireError::PackageTooLarge {
                size,
                limit: self.size_limit,
            });
        }
        Ok(())
    }

    async fn bounded<F>(&self, fetch: F) -> Result<Vec<u8>, AcquireError>
    where
        F: std::future::Future<Output = Result<Vec<u8>, SourceError>>,
    {
        match tokio::time::timeout(self.remote_timeout, fetch).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(AcquireError::Unreachable(anyhow::anyhow!(
                "fetch exceeded {:?}",
                self.remote_timeout
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    use crate::domain::plugins::identifier::PluginIdentifier;

    struct StaticGithub(Result<Vec<u8>, ()>);

    #[async_trait]
    impl GithubReleaseClient for StaticGithub {
        async fn fetch_release_asset(
            &self,
            _repo: &str,
            _version: &str,
            _asset: &str,
        ) -> Result<Vec<u8>, SourceError> {
            self.0.clone().map_err(|_| SourceError::NotFound)
        }
    }

    struct StalledMarketplace;

    #[async_trait]
    impl MarketplaceClient for StalledMarketplace {
        async fn fetch_package(
            &self,
            _identifier: &PluginIdentifier,
        ) -> Result<Vec<u8>, SourceError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(Vec::new())
        }
    }

    fn acquirer(github: StaticGithub, limit: usize) -> PackageAcquirer {
        PackageAcquirer::new(
            Arc::new(github),
            Arc::new(StalledMarketplace),
            limit,
            Duration::from_secs(5),
        )
    }

    #[tokio::test]
    async fn local_package_over_limit_is_rejected() {
        let acq = acquirer(StaticGithub(Ok(Vec::new())), 5 * 1024 * 1024);
        let source = InstallSource::LocalPackage {
            bytes: vec![0u8; 10 * 1024 * 1024],
        };
        let err = acq.acquire(&source).await.unwrap_err();
        assert!(matches!(err, AcquireError::PackageTooLarge { .. }));
    }

    #[tokio::test]
    async fn remote_payload_over_limit_is_rejected() {
        let acq = acquirer(StaticGithub(Ok(vec![0u8; 64])), 16);
        let source = InstallSource::GitHubRelease {
            repo: "acme/translator".into(),
            version: "v1.0.0".into(),
            asset: "translator.zip".into(),
        };
        let err = acq.acquire(&source).await.unwrap_err();
        assert!(matches!(err, AcquireError::PackageTooLarge { .. }));
    }

    #[tokio::test]
    async fn missing_asset_maps_to_not_found() {
        let acq = acquirer(StaticGithub(Err(())), 1024);
        let source = InstallSource::GitHubRelease {
            repo: "acme/translator".into(),
            version: "v1.0.0".into(),
            asset: "missing.zip".into(),
        };
        let err = acq.acquire(&source).await.unwrap_err();
        assert!(matches!(err, AcquireError::NotFound));
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_fetch_times_out_as_unreachable() {
        let acq = acquirer(StaticGithub(Ok(Vec::new())), 1024);
        let identifier =
            PluginIdentifier::parse("acme/translator:1.0.0@9f86d081884c7d65").unwrap();
        let source = InstallSource::Marketplace { identifier };
        let err = acq.acquire(&source).await.unwrap_err();
        assert!(matches!(err, AcquireError::Unreachable(_)));
    }
}
