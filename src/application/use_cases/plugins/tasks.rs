use std::sync::Arc;

use uuid::Uuid;

use crate::application::access::{self, Forbidden, PluginAction};
use crate::application::ports::permission_repository::PermissionRepository;
use crate::application::services::install::{InstallOrchestrator, TaskQueryError};
use crate::domain::plugins::identifier::PluginIdentifier;
use crate::domain::plugins::permission::TenantRole;
use crate::domain::plugins::task::InstallTask;

// Task reads carry no permission gate of their own: a task is only readable
// through the tenant id the token asserts, and creation was already gated.
// Deletes mutate, so they sit behind the Debug gate like the rest of the
// task-management tooling.

pub struct FetchInstallTask {
    pub orchestrator: Arc<InstallOrchestrator>,
}

impl FetchInstallTask {
    pub async fn execute(
        &self,
        tenant_id: Uuid,
        task_id: Uuid,
    ) -> Result<InstallTask, TaskQueryError> {
        self.orchestrator.fetch_task(tenant_id, task_id).await
    }
}

pub struct ListInstallTasks {
    pub orchestrator: Arc<InstallOrchestrator>,
}

impl ListInstallTasks {
    pub async fn execute(
        &self,
        tenant_id: Uuid,
        page: u32,
        page_size: u32,
    ) -> anyhow::Result<Vec<InstallTask>> {
        self.orchestrator.list_tasks(tenant_id, page, page_size).await
    }
}

#[derive(thiserror::Error, Debug)]
pub enum DeleteTaskError {
    #[error(transparent)]
    Forbidden(#[from] Forbidden),
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

pub struct DeleteInstallTask<'a, P>
where
    P: PermissionRepository + ?Sized,
{
    pub permissions: &'a P,
    pub orchestrator: Arc<InstallOrchestrator>,
}

impl<'a, P> DeleteInstallTask<'a, P>
where
    P: PermissionRepository + ?Sized,
{
    /// Returns whether anything was deleted; deleting twice is not an error.
    pub async fn execute(
        &self,
        tenant_id: Uuid,
        role: TenantRole,
        task_id: Uuid,
    ) -> Result<bool, DeleteTaskError> {
        access::require(self.permissions, tenant_id, role, PluginAction::Debug).await?;
        Ok(self.orchestrator.delete_task(tenant_id, task_id).await?)
    }
}

pub struct DeleteInstallTaskItem<'a, P>
where
    P: PermissionRepository + ?Sized,
{
    pub permissions: &'a P,
    pub orchestrator: Arc<InstallOrchestrator>,
}

impl<'a, P> DeleteInstallTaskItem<'a, P>
where
    P: PermissionRepository + ?Sized,
{
    pub async fn execute(
        &self,
        tenant_id: Uuid,
        role: TenantRole,
        task_id: Uuid,
        identifier: &PluginIdentifier,
    ) -> Result<bool, DeleteTaskError> {
        access::require(self.permissions, tenant_id, role, PluginAction::Debug).await?;
        Ok(self
            .orchestrator
            .delete_task_item(tenant_id, task_id, identifier)
            .await?)
    }
}
