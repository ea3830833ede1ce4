use uuid::Uuid;

use crate::application::ports::permission_repository::PermissionRepository;
use crate::domain::plugins::permission::{TenantPluginPermission, TenantRole};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PluginAction {
    Install,
    Debug,
}

#[derive(thiserror::Error, Debug)]
#[error("plugin {action:?} is not permitted for this role in the tenant")]
pub struct Forbidden {
    pub action: PluginAction,
}

// Presentation builds (tenant, role) from the token; this module only
// evaluates stored policy. Absent row means the default (open) policy;
// a failed lookup does not.

pub async fn effective_permission<P>(
    repo: &P,
    tenant_id: Uuid,
) -> anyhow::Result<TenantPluginPermission>
where
    P: PermissionRepository + ?Sized,
{
    Ok(repo.get(tenant_id).await?.unwrap_or_default())
}

pub async fn require<P>(
    repo: &P,
    tenant_id: Uuid,
    role: TenantRole,
    action: PluginAction,
) -> Result<(), Forbidden>
where
    P: PermissionRepository + ?Sized,
{
    let policy = match effective_permission(repo, tenant_id).await {
        Ok(policy) => policy,
        // Storage trouble denies; only a confirmed absent row falls open.
        Err(err) => {
            tracing::warn!(tenant = %tenant_id, error = ?err, "permission_lookup_failed");
            return Err(Forbidden { action });
        }
    };
    let level = match action {
        PluginAction::Install => policy.install_permission,
        PluginAction::Debug => policy.debug_permission,
    };
    if level.permits(role) {
        Ok(())
    } else {
        Err(Forbidden { action })
    }
}
