use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::plugins::identifier::PluginIdentifier;
use crate::domain::plugins::task::{InstallTask, ItemStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemDeleteOutcome {
    Missing,
    Removed,
    /// The removed item was the task's last one, so the task went with it.
    RemovedTask,
}

/// Durable, paginated record of install tasks and their items per tenant.
/// All mutations are scoped to a single task.
#[async_trait]
pub trait InstallTaskRepository: Send + Sync {
    async fn insert(&self, task: &InstallTask) -> anyhow::Result<()>;

    async fn get(&self, tenant_id: Uuid, task_id: Uuid) -> anyhow::Result<Option<InstallTask>>;

    /// Most-recent-first slice. Offsets beyond the range yield an empty
    /// vector, never an error.
    async fn list(
        &self,
        tenant_id: Uuid,
        offset: i64,
        limit: i64,
    ) -> anyhow::Result<Vec<InstallTask>>;

    async fn delete(&self, tenant_id: Uuid, task_id: Uuid) -> anyhow::Result<bool>;

    async fn update_item(
        &self,
        tenant_id: Uuid,
        task_id: Uuid,
        identifier: &PluginIdentifier,
        status: ItemStatus,
        error: Option<&str>,
        warning: Option<&str>,
    ) -> anyhow::Result<()>;

    async fn delete_item(
        &self,
        tenant_id: Uuid,
        task_id: Uuid,
        identifier: &PluginIdentifier,
    ) -> anyhow::Result<ItemDeleteOutcome>;
}
