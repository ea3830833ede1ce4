use std::sync::Arc;

use uuid::Uuid;

use crate::application::access::{self, Forbidden, PluginAction};
use crate::application::ports::permission_repository::PermissionRepository;
use crate::application::services::install::{InstallOrchestrator, UploadError};
use crate::domain::plugins::manifest::PluginManifest;
use crate::domain::plugins::permission::TenantRole;

#[derive(thiserror::Error, Debug)]
pub enum UploadPackageError {
    #[error(transparent)]
    Forbidden(#[from] Forbidden),
    #[error(transparent)]
    Upload(#[from] UploadError),
}

/// Resolves an uploaded package and returns its manifest without installing.
/// The package bytes stay cached so a follow-up install can name them by
/// identifier alone.
pub struct UploadPackage<'a, P>
where
    P: PermissionRepository + ?Sized,
{
    pub permissions: &'a P,
    pub orchestrator: Arc<InstallOrchestrator>,
}

impl<'a, P> UploadPackage<'a, P>
where
    P: PermissionRepository + ?Sized,
{
    pub async fn execute(
        &self,
        tenant_id: Uuid,
        role: TenantRole,
        bytes: Vec<u8>,
    ) -> Result<PluginManifest, UploadPackageError> {
        access::require(self.permissions, tenant_id, role, PluginAction::Install).await?;
        Ok(self.orchestrator.upload_package(tenant_id, bytes).await?)
    }
}

/// Same preview flow but the bytes come from a GitHub release asset.
pub struct UploadFromGithub<'a, P>
where
    P: PermissionRepository + ?Sized,
{
    pub permissions: &'a P,
    pub orchestrator: Arc<InstallOrchestrator>,
}

impl<'a, P> UploadFromGithub<'a, P>
where
    P: PermissionRepository + ?Sized,
{
    pub async fn execute(
        &self,
        tenant_id: Uuid,
        role: TenantRole,
        repo: &str,
        version: &str,
        asset: &str,
    ) -> Result<PluginManifest, UploadPackageError> {
        access::require(self.permissions, tenant_id, role, PluginAction::Install).await?;
        Ok(self
            .orchestrator
            .upload_from_github(tenant_id, repo, version, asset)
            .await?)
    }
}
