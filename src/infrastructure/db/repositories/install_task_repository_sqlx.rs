use async_trait::async_trait;
use sqlx::Row;
use uuid::Uuid;

use crate::application::ports::install_task_repository::{
    InstallTaskRepository, ItemDeleteOutcome,
};
use crate::domain::plugins::identifier::PluginIdentifier;
use crate::domain::plugins::task::{InstallTask, InstallTaskItem, ItemStatus};
use crate::infrastructure::db::PgPool;

pub struct SqlxInstallTaskRepository {
    pub pool: PgPool,
}

impl SqlxInstallTaskRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn load_items(&self, task_id: Uuid) -> anyhow::Result<Vec<InstallTaskItem>> {
        let rows = sqlx::query(
            r#"SELECT identifier, status, error, warning, updated_at
               FROM install_task_items
               WHERE task_id = $1
               ORDER BY position"#,
        )
        .bind(task_id)
        .fetch_all(&self.pool)
        .await?;

        let mut items = Vec::with_capacity(rows.len());
        for row in rows {
            let identifier: String = row.get("identifier");
            let status: String = row.get("status");
            items.push(InstallTaskItem {
                identifier: PluginIdentifier::parse(&identifier)?,
                status: status.parse::<ItemStatus>()?,
                error: row.try_get("error").ok(),
                warning: row.try_get("warning").ok(),
                updated_at: row.get("updated_at"),
            });
        }
        Ok(items)
    }
}

#[async_trait]
impl InstallTaskRepository for SqlxInstallTaskRepository {
    async fn insert(&self, task: &InstallTask) -> anyhow::Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            r#"INSERT INTO install_tasks (id, tenant_id, created_at)
               VALUES ($1, $2, $3)"#,
        )
        .bind(task.id)
        .bind(task.tenant_id)
        .bind(task.created_at)
        .execute(&mut *tx)
        .await?;

        for (position, item) in task.items.iter().enumerate() {
            sqlx::query(
                r#"INSERT INTO install_task_items
                   (task_id, identifier, position, status, error, warning, updated_at)
                   VALUES ($1, $2, $3, $4, $5, $6, $7)"#,
            )
            .bind(task.id)
            .bind(item.identifier.as_str())
            .bind(position as i32)
            .bind(item.status.as_str())
            .bind(item.error.as_deref())
            .bind(item.warning.as_deref())
            .bind(item.updated_at)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn get(&self, tenant_id: Uuid, task_id: Uuid) -> anyhow::Result<Option<InstallTask>> {
        let row = sqlx::query(
            r#"SELECT id, tenant_id, created_at
               FROM install_tasks
               WHERE id = $1 AND tenant_id = $2"#,
        )
        .bind(task_id)
        .bind(tenant_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let items = self.load_items(task_id).await?;
        Ok(Some(InstallTask {
            id: row.get("id"),
            tenant_id: row.get("tenant_id"),
            created_at: row.get("created_at"),
            items,
        }))
    }

    async fn list(
        &self,
        tenant_id: Uuid,
        offset: i64,
        limit: i64,
    ) -> anyhow::Result<Vec<InstallTask>> {
        let rows = sqlx::query(
            r#"SELECT id, tenant_id, created_at
               FROM install_tasks
               WHERE tenant_id = $1
               ORDER BY created_at DESC, id DESC
               OFFSET $2 LIMIT $3"#,
        )
        .bind(tenant_id)
        .bind(offset)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        let mut tasks = Vec::with_capacity(rows.len());
        for row in rows {
            let id: Uuid = row.get("id");
            let items = self.load_items(id).await?;
            tasks.push(InstallTask {
                id,
                tenant_id: row.get("tenant_id"),
                created_at: row.get("created_at"),
                items,
            });
        }
        Ok(tasks)
    }

    async fn delete(&self, tenant_id: Uuid, task_id: Uuid) -> anyhow::Result<bool> {
        // Items go with the task via ON DELETE CASCADE.
        let res = sqlx::query("DELETE FROM install_tasks WHERE id = $1 AND tenant_id = $2")
            .bind(task_id)
            .bind(tenant_id)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    async fn update_item(
        &self,
        tenant_id: Uuid,
        task_id: Uuid,
        identifier: &PluginIdentifier,
        status: ItemStatus,
        error: Option<&str>,
        warning: Option<&str>,
    ) -> anyhow::Result<()> {
        sqlx::query(
            r#"UPDATE install_task_items
               SET status = $4, error = $5, warning = $6, updated_at = now()
               WHERE task_id = $1 AND identifier = $2
                 AND task_id IN (SELECT id FROM install_tasks WHERE tenant_id = $3)"#,
        )
        .bind(task_id)
        .bind(identifier.as_str())
        .bind(tenant_id)
        .bind(status.as_str())
        .bind(error)
        .bind(warning)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete_item(
        &self,
        tenant_id: Uuid,
        task_id: Uuid,
        identifier: &PluginIdentifier,
    ) -> anyhow::Result<ItemDeleteOutcome> {
        let mut tx = self.pool.begin().await?;
        let res = sqlx::query(
            r#"DELETE FROM install_task_items
               WHERE task_id = $1 AND identifier = $2
                 AND task_id IN (SELECT id FROM install_tasks WHERE tenant_id = $3)"#,
        )
        .bind(task_id)
        .bind(identifier.as_str())
        .bind(tenant_id)
        .execute(&mut *tx)
        .await?;
        if res.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(ItemDeleteOutcome::Missing);
        }

        let remaining: i64 =
            sqlx::query_scalar("SELECT count(*) FROM install_task_items WHERE task_id = $1")
                .bind(task_id)
                .fetch_one(&mut *tx)
                .await?;
        if remaining == 0 {
            sqlx::query("DELETE FROM install_tasks WHERE id = $1 AND tenant_id = $2")
                .bind(task_id)
                .bind(tenant_id)
                .execute(&mut *tx)
                .await?;
            tx.commit().await?;
            return Ok(ItemDeleteOutcome::RemovedTask);
        }
        tx.commit().await?;
        Ok(ItemDeleteOutcome::Removed)
    }
}
