use uuid::Uuid;

use crate::application::access;
use crate::application::ports::permission_repository::PermissionRepository;
use crate::domain::plugins::permission::{TenantPluginPermission, TenantRole};

#[derive(thiserror::Error, Debug)]
pub enum ChangePermissionError {
    #[error("only tenant owners and admins may change plugin permissions")]
    Forbidden,
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

/// Reads the tenant's effective policy; an absent row reads as the default.
pub struct GetPermission<'a, P>
where
    P: PermissionRepository + ?Sized,
{
    pub permissions: &'a P,
}

impl<'a, P> GetPermission<'a, P>
where
    P: PermissionRepository + ?Sized,
{
    pub async fn execute(&self, tenant_id: Uuid) -> anyhow::Result<TenantPluginPermission> {
        access::effective_permission(self.permissions, tenant_id).await
    }
}

/// Overwrites the policy row. Restricted to owners and admins regardless of
/// what the stored policy says, so a tenant can always be reopened.
pub struct ChangePermission<'a, P>
where
    P: PermissionRepository + ?Sized,
{
    pub permissions: &'a P,
}

impl<'a, P> ChangePermission<'a, P>
where
    P: PermissionRepository + ?Sized,
{
    pub async fn execute(
        &self,
        tenant_id: Uuid,
        role: TenantRole,
        permission: TenantPluginPermission,
    ) -> Result<(), ChangePermissionError> {
        if !role.is_admin_or_owner() {
            return Err(ChangePermissionError::Forbidden);
        }
        self.permissions.put(tenant_id, permission).await?;
        Ok(())
    }
}
