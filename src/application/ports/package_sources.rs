use async_trait::async_trait;

use crate::domain::plugins::identifier::PluginIdentifier;

/// Why a remote source failed to hand back package bytes. Network and auth
/// failures are deliberately folded into `Unreachable`; callers only branch
/// on "it does not exist" vs "we could not get it".
#[derive(thiserror::Error, Debug)]
pub enum SourceError {
    #[error("package not found at source")]
    NotFound,
    #[error("source unreachable")]
    Unreachable(#[source] anyhow::Error),
}

#[async_trait]
pub trait GithubReleaseClient: Send + Sync {
    /// Downloads the named asset of a release, e.g.
    /// `fetch_release_asset("acme/translator", "v1.2.0", "translator.zip")`.
    async fn fetch_release_asset(
        &self,
        repo: &str,
        version: &str,
        asset: &str,
    ) -> Result<Vec<u8>, SourceError>;
}

#[async_trait]
pub trait MarketplaceClient: Send + Sync {
    /// Resolves a previously-published identifier to its canonical package
    /// bytes. `NotFound` when the identifier is unpublished.
    async fn fetch_package(&self, identifier: &PluginIdentifier) -> Result<Vec<u8>, SourceError>;
}
