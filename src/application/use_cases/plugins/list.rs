use std::sync::Arc;

use uuid::Uuid;

use crate::application::access::{self, Forbidden, PluginAction};
use crate::application::ports::permission_repository::PermissionRepository;
use crate::application::services::install::{InstallOrchestrator, UploadError};
use crate::domain::plugins::PluginInstallation;
use crate::domain::plugins::identifier::PluginIdentifier;
use crate::domain::plugins::manifest::PluginManifest;
use crate::domain::plugins::permission::TenantRole;

/// Lists the tenant's active installations. Readable by any tenant member.
pub struct ListInstallations {
    pub orchestrator: Arc<InstallOrchestrator>,
}

impl ListInstallations {
    pub async fn execute(&self, tenant_id: Uuid) -> anyhow::Result<Vec<PluginInstallation>> {
        self.orchestrator.list_installations(tenant_id).await
    }
}

#[derive(thiserror::Error, Debug)]
pub enum FetchManifestError {
    #[error(transparent)]
    Forbidden(#[from] Forbidden),
    #[error(transparent)]
    Upload(#[from] UploadError),
}

/// Read-only manifest lookup for a plugin identifier, without installing.
/// Sits behind the Debug gate: it backs the remote-debugging tooling, not
/// the install surface.
pub struct FetchManifest<'a, P>
where
    P: PermissionRepository + ?Sized,
{
    pub permissions: &'a P,
    pub orchestrator: Arc<InstallOrchestrator>,
}

impl<'a, P> FetchManifest<'a, P>
where
    P: PermissionRepository + ?Sized,
{
    pub async fn execute(
        &self,
        tenant_id: Uuid,
        role: TenantRole,
        identifier: &PluginIdentifier,
    ) -> Result<PluginManifest, FetchManifestError> {
        access::require(self.permissions, tenant_id, role, PluginAction::Debug).await?;
        Ok(self.orchestrator.fetch_manifest(tenant_id, identifier).await?)
    }
}
