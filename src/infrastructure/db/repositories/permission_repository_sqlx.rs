use async_trait::async_trait;
use sqlx::Row;
use uuid::Uuid;

use crate::application::ports::permission_repository::PermissionRepository;
use crate::domain::plugins::permission::{PermissionLevel, TenantPluginPermission};
use crate::infrastructure::db::PgPool;

pub struct SqlxPermissionRepository {
    pub pool: PgPool,
}

impl SqlxPermissionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PermissionRepository for SqlxPermissionRepository {
    async fn get(&self, tenant_id: Uuid) -> anyhow::Result<Option<TenantPluginPermission>> {
        let row = sqlx::query(
            r#"SELECT install_permission, debug_permission
               FROM tenant_plugin_permissions
               WHERE tenant_id = $1"#,
        )
        .bind(tenant_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let install: String = row.get("install_permission");
        let debug: String = row.get("debug_permission");
        Ok(Some(TenantPluginPermission {
            install_permission: install.parse::<PermissionLevel>()?,
            debug_permission: debug.parse::<PermissionLevel>()?,
        }))
    }

    async fn put(
        &self,
        tenant_id: Uuid,
        permission: TenantPluginPermission,
    ) -> anyhow::Result<()> {
        sqlx::query(
            r#"INSERT INTO tenant_plugin_permissions
               (tenant_id, install_permission, debug_permission)
               VALUES ($1, $2, $3)
               ON CONFLICT (tenant_id)
               DO UPDATE SET
                 install_permission = EXCLUDED.install_permission,
                 debug_permission = EXCLUDED.debug_permission,
                 updated_at = now()"#,
        )
        .bind(tenant_id)
        .bind(permission.install_permission.as_str())
        .bind(permission.debug_permission.as_str())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
