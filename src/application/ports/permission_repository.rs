use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::plugins::permission::TenantPluginPermission;

/// One policy row per tenant; `None` means no row has ever been written and
/// the default policy applies at read time.
#[async_trait]
pub trait PermissionRepository: Send + Sync {
    async fn get(&self, tenant_id: Uuid) -> anyhow::Result<Option<TenantPluginPermission>>;

    async fn put(
        &self,
        tenant_id: Uuid,
        permission: TenantPluginPermission,
    ) -> anyhow::Result<()>;
}
