use std::sync::Arc;

use uuid::Uuid;

use crate::application::access::{self, Forbidden, PluginAction};
use crate::application::ports::permission_repository::PermissionRepository;
use crate::application::services::install::{InstallOrchestrator, UninstallError};
use crate::domain::plugins::permission::TenantRole;

#[derive(thiserror::Error, Debug)]
pub enum UninstallPluginError {
    #[error(transparent)]
    Forbidden(#[from] Forbidden),
    #[error(transparent)]
    Uninstall(#[from] UninstallError),
}

/// Removes an active installation by its installation id.
pub struct UninstallPlugin<'a, P>
where
    P: PermissionRepository + ?Sized,
{
    pub permissions: &'a P,
    pub orchestrator: Arc<InstallOrchestrator>,
}

impl<'a, P> UninstallPlugin<'a, P>
where
    P: PermissionRepository + ?Sized,
{
    pub async fn execute(
        &self,
        tenant_id: Uuid,
        role: TenantRole,
        installation_id: Uuid,
    ) -> Result<bool, UninstallPluginError> {
        access::require(self.permissions, tenant_id, role, PluginAction::Install).await?;
        Ok(self.orchestrator.uninstall(tenant_id, installation_id).await?)
    }
}
