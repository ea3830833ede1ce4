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
pub enum UpgradeError {
    #[error(transparent)]
    Forbidden(#[from] Forbidden),
    #[error(transparent)]
    Create(#[from] CreateTaskError),
}

/// Replaces an installed version with a new one: install-new then
/// uninstall-old, strictly in that order, inside one single-item task.
pub struct UpgradePlugin<'a, P>
where
    P: PermissionRepository + ?Sized,
{
    pub permissions: &'a P,
    pub orchestrator: Arc<InstallOrchestrator>,
}

impl<'a, P> UpgradePlugin<'a, P>
where
    P: PermissionRepository + ?Sized,
{
    pub async fn from_marketplace(
        &self,
        tenant_id: Uuid,
        role: TenantRole,
        old_identifier: PluginIdentifier,
        new_identifier: PluginIdentifier,
    ) -> Result<InstallTask, UpgradeError> {
        let request = InstallRequest {
            identifier: new_identifier.clone(),
            source: InstallSource::Marketplace {
                identifier: new_identifier,
            },
        };
        self.execute(tenant_id, role, old_identifier, request).await
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn from_github(
        &self,
        tenant_id: Uuid,
        role: TenantRole,
        old_identifier: PluginIdentifier,
        new_identifier: PluginIdentifier,
        repo: String,
        version: String,
        asset: String,
    ) -> Result<InstallTask, UpgradeError> {
        let request = InstallRequest {
            identifier: new_identifier,
            source: InstallSource::GitHubRelease {
                repo,
                version,
                asset,
            },
        };
        self.execute(tenant_id, role, old_identifier, request).await
    }

    async fn execute(
        &self,
        tenant_id: Uuid,
        role: TenantRole,
        old_identifier: PluginIdentifier,
        request: InstallRequest,
    ) -> Result<InstallTask, UpgradeError> {
        access::require(self.permissions, tenant_id, role, PluginAction::Install).await?;
        Ok(self
            .orchestrator
            .create_upgrade_task(tenant_id, old_identifier, request)
            .await?)
    }
}
