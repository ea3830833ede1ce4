use uuid::Uuid;

use crate::application::access::{self, Forbidden, PluginAction};
use crate::application::ports::debugging_key_repository::DebuggingKeyRepository;
use crate::application::ports::permission_repository::PermissionRepository;
use crate::domain::plugins::DebuggingKey;
use crate::domain::plugins::permission::TenantRole;

#[derive(thiserror::Error, Debug)]
pub enum DebuggingKeyError {
    #[error(transparent)]
    Forbidden(#[from] Forbidden),
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

/// Hands out the tenant's remote-debugging coordinates: a persisted key plus
/// the daemon host and port from config.
pub struct GetDebuggingKey<'a, P, K>
where
    P: PermissionRepository + ?Sized,
    K: DebuggingKeyRepository + ?Sized,
{
    pub permissions: &'a P,
    pub keys: &'a K,
    pub host: &'a str,
    pub port: u16,
}

impl<'a, P, K> GetDebuggingKey<'a, P, K>
where
    P: PermissionRepository + ?Sized,
    K: DebuggingKeyRepository + ?Sized,
{
    pub async fn execute(
        &self,
        tenant_id: Uuid,
        role: TenantRole,
    ) -> Result<DebuggingKey, DebuggingKeyError> {
        access::require(self.permissions, tenant_id, role, PluginAction::Debug).await?;
        let key = self.keys.get_or_create(tenant_id).await?;
        Ok(DebuggingKey {
            key,
            host: self.host.to_string(),
            port: self.port,
        })
    }
}
