use async_trait::async_trait;
use uuid::Uuid;

#[async_trait]
pub trait DebuggingKeyRepository: Send + Sync {
    /// Returns the tenant's remote-debugging key, minting one on first use.
    async fn get_or_create(&self, tenant_id: Uuid) -> anyhow::Result<String>;
}
