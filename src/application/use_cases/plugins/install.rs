use std::sync::Arc;

use uuid::Uuid;

use crate::application::access::{self, Forbidden, PluginAction};
use crate::application::ports::permission_repository::PermissionRepository;
use crate::application::services::install::{
    CreateTaskError, InstallOrchestrator, InstallRequest,
};
use crate::domain::plugins::identifier::PluginIdentifier;
use crate::domain::plugins::permission::TenantRole;
use crate::domain::plugins::source::InstallSource;
use crate::domain::plugins::task::InstallTask;

#[derive(thiserror::Error, Debug)]
pub enum InstallError {
    #[error(transparent)]
    Forbidden(#[from] Forbidden),
    #[error(transparent)]
    Create(#[from] CreateTaskError),
}

/// Schedules installation of previously uploaded packages, referenced by the
/// identifiers their upload calls returned.
pub struct InstallFromUploads<'a, P>
where
    P: PermissionRepository + ?Sized,
{
    pub permissions: &'a P,
    pub orchestrator: Arc<InstallOrchestrator>,
}

impl<'a, P> InstallFromUploads<'a, P>
where
    P: PermissionRepository + ?Sized,
{
    pub async fn execute(
        &self,
        tenant_id: Uuid,
        role: TenantRole,
        identifiers: Vec<PluginIdentifier>,
    ) -> Result<InstallTask, InstallError> {
        access::require(self.permissions, tenant_id, role, PluginAction::Install).await?;
        let requests = self
            .orchestrator
            .requests_from_uploads(tenant_id, identifiers)
            .await?;
        Ok(self
            .orchestrator
            .create_install_task(tenant_id, requests)
            .await?)
    }
}

/// Schedules installation of a GitHub release asset. The caller asserts the
/// identifier it expects; the worker verifies it against the downloaded
/// package before committing.
pub struct InstallFromGithub<'a, P>
where
    P: PermissionRepository + ?Sized,
{
    pub permissions: &'a P,
    pub orchestrator: Arc<InstallOrchestrator>,
}

impl<'a, P> InstallFromGithub<'a, P>
where
    P: PermissionRepository + ?Sized,
{
    #[allow(clippy::too_many_arguments)]
    pub async fn execute(
        &self,
        tenant_id: Uuid,
        role: TenantRole,
        identifier: PluginIdentifier,
        repo: String,
        version: String,
        asset: String,
    ) -> Result<InstallTask, InstallError> {
        access::require(self.permissions, tenant_id, role, PluginAction::Install).await?;
        let request = InstallRequest {
            identifier,
            source: InstallSource::GitHubRelease {
                repo,
                version,
                asset,
            },
        };
        Ok(self
            .orchestrator
            .create_install_task(tenant_id, vec![request])
            .await?)
    }
}

/// Schedules installation of one or more marketplace plugins in a single
/// batch task. Siblings fail independently.
pub struct InstallFromMarketplace<'a, P>
where
    P: PermissionRepository + ?Sized,
{
    pub permissions: &'a P,
    pub orchestrator: Arc<InstallOrchestrator>,
}

impl<'a, P> InstallFromMarketplace<'a, P>
where
    P: PermissionRepository + ?Sized,
{
    pub async fn execute(
        &self,
        tenant_id: Uuid,
        role: TenantRole,
        identifiers: Vec<PluginIdentifier>,
    ) -> Result<InstallTask, InstallError> {
        access::require(self.permissions, tenant_id, role, PluginAction::Install).await?;
        let requests = identifiers
            .into_iter()
            .map(|identifier| InstallRequest {
                identifier: identifier.clone(),
                source: InstallSource::Marketplace { identifier },
            })
            .collect();
        Ok(self
            .orchestrator
            .create_install_task(tenant_id, requests)
            .await?)
    }
}
