use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::plugins::PluginInstallation;
use crate::domain::plugins::identifier::PluginIdentifier;
use crate::domain::plugins::manifest::PluginManifest;
use crate::domain::plugins::source::SourceKind;

/// The durable record of what is installed for each tenant. Mutated only by
/// worker commit steps and uninstall, both of which run inside the
/// per-(tenant, identifier) critical section.
#[async_trait]
pub trait PluginRegistryRepository: Send + Sync {
    async fn commit(
        &self,
        tenant_id: Uuid,
        manifest: &PluginManifest,
        source: SourceKind,
    ) -> anyhow::Result<PluginInstallation>;

    async fn get_by_identifier(
        &self,
        tenant_id: Uuid,
        identifier: &PluginIdentifier,
    ) -> anyhow::Result<Option<PluginInstallation>>;

    async fn get_by_installation_id(
        &self,
        tenant_id: Uuid,
        installation_id: Uuid,
    ) -> anyhow::Result<Option<PluginInstallation>>;

    async fn list_for_tenant(&self, tenant_id: Uuid) -> anyhow::Result<Vec<PluginInstallation>>;

    async fn remove(
        &self,
        tenant_id: Uuid,
        identifier: &PluginIdentifier,
    ) -> anyhow::Result<bool>;
}
