use async_trait::async_trait;
use sqlx::Row;
use uuid::Uuid;

use crate::application::ports::plugin_registry_repository::PluginRegistryRepository;
use crate::domain::plugins::PluginInstallation;
use crate::domain::plugins::identifier::PluginIdentifier;
use crate::domain::plugins::manifest::PluginManifest;
use crate::domain::plugins::source::SourceKind;
use crate::infrastructure::db::PgPool;

pub struct SqlxPluginRegistryRepository {
    pub pool: PgPool,
}

impl SqlxPluginRegistryRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn row_to_installation(row: &sqlx::postgres::PgRow) -> anyhow::Result<PluginInstallation> {
    let identifier: String = row.get("identifier");
    let source: String = row.get("source");
    Ok(PluginInstallation {
        id: row.get("id"),
        tenant_id: row.get("tenant_id"),
        identifier: PluginIdentifier::parse(&identifier)?,
        source: source.parse::<SourceKind>()?,
        checksum: row.get("checksum"),
        installed_at: row.get("installed_at"),
    })
}

#[async_trait]
impl PluginRegistryRepository for SqlxPluginRegistryRepository {
    async fn commit(
        &self,
        tenant_id: Uuid,
        manifest: &PluginManifest,
        source: SourceKind,
    ) -> anyhow::Result<PluginInstallation> {
        let row = sqlx::query(
            r#"INSERT INTO plugin_installations
               (id, tenant_id, identifier, source, checksum, capabilities, installed_at)
               VALUES ($1, $2, $3, $4, $5, $6, now())
               ON CONFLICT (tenant_id, identifier)
               DO UPDATE SET
                 source = EXCLUDED.source,
                 checksum = EXCLUDED.checksum,
                 capabilities = EXCLUDED.capabilities,
                 installed_at = now()
               RETURNING id, tenant_id, identifier, source, checksum, installed_at"#,
        )
        .bind(Uuid::new_v4())
        .bind(tenant_id)
        .bind(manifest.identifier.as_str())
        .bind(source.as_str())
        .bind(&manifest.checksum)
        .bind(serde_json::to_value(&manifest.capabilities)?)
        .fetch_one(&self.pool)
        .await?;
        row_to_installation(&row)
    }

    async fn get_by_identifier(
        &self,
        tenant_id: Uuid,
        identifier: &PluginIdentifier,
    ) -> anyhow::Result<Option<PluginInstallation>> {
        let row = sqlx::query(
            r#"SELECT id, tenant_id, identifier, source, checksum, installed_at
               FROM plugin_installations
               WHERE tenant_id = $1 AND identifier = $2"#,
        )
        .bind(tenant_id)
        .bind(identifier.as_str())
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(row_to_installation).transpose()
    }

    async fn get_by_installation_id(
        &self,
        tenant_id: Uuid,
        installation_id: Uuid,
    ) -> anyhow::Result<Option<PluginInstallation>> {
        let row = sqlx::query(
            r#"SELECT id, tenant_id, identifier, source, checksum, installed_at
               FROM plugin_installations
               WHERE tenant_id = $1 AND id = $2"#,
        )
        .bind(tenant_id)
        .bind(installation_id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(row_to_installation).transpose()
    }

    async fn list_for_tenant(&self, tenant_id: Uuid) -> anyhow::Result<Vec<PluginInstallation>> {
        let rows = sqlx::query(
            r#"SELECT id, tenant_id, identifier, source, checksum, installed_at
               FROM plugin_installations
               WHERE tenant_id = $1
               ORDER BY installed_at DESC"#,
        )
        .bind(tenant_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_installation).collect()
    }

    async fn remove(
        &self,
        tenant_id: Uuid,
        identifier: &PluginIdentifier,
    ) -> anyhow::Result<bool> {
        let res = sqlx::query(
            "DELETE FROM plugin_installations WHERE tenant_id = $1 AND identifier = $2",
        )
        .bind(tenant_id)
        .bind(identifier.as_str())
        .execute(&self.pool)
        .await?;
        Ok(res.rows_affected() > 0)
    }
}
