pub mod acquirer;
pub mod cache;

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::application::ports::install_task_repository::{
    InstallTaskRepository, ItemDeleteOutcome,
};
use crate::application::ports::plugin_registry_repository::PluginRegistryRepository;
use crate::application::services::resolver::{ManifestResolver, ResolveError};
use crate::domain::plugins::PluginInstallation;
use crate::domain::plugins::identifier::PluginIdentifier;
use crate::domain::plugins::manifest::PluginManifest;
use crate::domain::plugins::source::InstallSource;
use crate::domain::plugins::task::{InstallTask, InstallTaskItem, ItemStatus};

pub use acquirer::{AcquireError, PackageAcquirer};
pub use cache::PackageCache;

const MAX_PAGE_SIZE: u32 = 100;

/// One planned unit of install work. The identifier is always known before
/// a task exists: upload flows resolve it synchronously, GitHub and
/// marketplace flows require the caller to assert it (and the worker's
/// resolve step verifies the assertion).
#[derive(Debug, Clone)]
pub struct InstallRequest {
    pub identifier: PluginIdentifier,
    pub source: InstallSource,
}

#[derive(thiserror::Error, Debug)]
pub enum CreateTaskError {
    #[error("an install of {0} is already in flight for this tenant")]
    AlreadyInstalling(PluginIdentifier),
    #[error("no uploaded package for {0}")]
    UnknownUpload(PluginIdentifier),
    #[error("install batch is empty")]
    EmptyBatch,
    #[error("failed to persist install task")]
    Storage(#[source] anyhow::Error),
}

#[derive(thiserror::Error, Debug)]
pub enum TaskQueryError {
    #[error("install task not found")]
    NotFound,
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

#[derive(thiserror::Error, Debug)]
pub enum UninstallError {
    #[error("an install of {0} is in flight for this tenant")]
    Busy(PluginIdentifier),
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

#[derive(thiserror::Error, Debug)]
pub enum UploadError {
    #[error(transparent)]
    Acquire(#[from] AcquireError),
    #[error(transparent)]
    Resolve(#[from] ResolveError),
}

type InFlightSet = Arc<Mutex<HashSet<(Uuid, PluginIdentifier)>>>;

/// Releases the (tenant, identifier) exclusivity slot when the holding
/// worker (or synchronous critical section) ends.
struct InFlightGuard {
    set: InFlightSet,
    key: (Uuid, PluginIdentifier),
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if let Ok(mut set) = self.set.lock() {
            set.remove(&self.key);
        }
    }
}

/// Per-task in-process state: the single-writer lock for store updates,
/// cancellation flags for dispatched items, and the live worker count that
/// decides when the entry can be dropped.
struct TaskRuntime {
    write_lock: tokio::sync::Mutex<()>,
    active: AtomicUsize,
    cancels: Mutex<HashMap<PluginIdentifier, Arc<AtomicBool>>>,
}

impl TaskRuntime {
    fn new(workers: usize) -> Self {
        Self {
            write_lock: tokio::sync::Mutex::new(()),
            active: AtomicUsize::new(workers),
            cancels: Mutex::new(HashMap::new()),
        }
    }

    fn register_cancel(&self, identifier: &PluginIdentifier) -> Arc<AtomicBool> {
        let flag = Arc::new(AtomicBool::new(false));
        if let Ok(mut cancels) = self.cancels.lock() {
            cancels.insert(identifier.clone(), flag.clone());
        }
        flag
    }

    fn cancel(&self, identifier: &PluginIdentifier) {
        if let Ok(cancels) = self.cancels.lock() {
            if let Some(flag) = cancels.get(identifier) {
                flag.store(true, Ordering::Release);
            }
        }
    }

    fn cancel_all(&self) {
        if let Ok(cancels) = self.cancels.lock() {
            for flag in cancels.values() {
                flag.store(true, Ordering::Release);
            }
        }
    }
}

/// The scheduler at the center of the service: turns install and upgrade
/// requests into tasks, runs one worker per item, and owns the exclusivity
/// and cancellation state the workers rely on. Task creation never blocks
/// on item completion.
pub struct InstallOrchestrator {
    tasks: Arc<dyn InstallTaskRepository>,
    registry: Arc<dyn PluginRegistryRepository>,
    acquirer: PackageAcquirer,
    resolver: ManifestResolver,
    uploads: PackageCache,
    inflight: InFlightSet,
    runtime: Mutex<HashMap<Uuid, Arc<TaskRuntime>>>,
}

impl InstallOrchestrator {
    pub fn new(
        tasks: Arc<dyn InstallTaskRepository>,
        registry: Arc<dyn PluginRegistryRepository>,
        acquirer: PackageAcquirer,
        upload_ttl: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            tasks,
            registry,
            acquirer,
            resolver: ManifestResolver,
            uploads: PackageCache::new(upload_ttl),
            inflight: Arc::new(Mutex::new(HashSet::new())),
            runtime: Mutex::new(HashMap::new()),
        })
    }

    /// Resolves an uploaded package and parks its bytes for a follow-up
    /// install-by-identifier call. Nothing is installed here.
    pub async fn upload_package(
        &self,
        tenant_id: Uuid,
        bytes: Vec<u8>,
    ) -> Result<PluginManifest, UploadError> {
        self.acquirer.ensure_within_limit(bytes.len())?;
        let (identifier, manifest) = self.resolver.resolve(&bytes, None)?;
        self.uploads
            .put(tenant_id, identifier.clone(), bytes, manifest.clone())
            .await;
        info!(tenant = %tenant_id, identifier = %identifier, "package_uploaded");
        Ok(manifest)
    }

    /// Downloads a GitHub release asset and resolves it, without installing.
    pub async fn upload_from_github(
        &self,
        tenant_id: Uuid,
        repo: &str,
        version: &str,
        asset: &str,
    ) -> Result<PluginManifest, UploadError> {
        let source = InstallSource::GitHubRelease {
            repo: repo.to_string(),
            version: version.to_string(),
            asset: asset.to_string(),
        };
        let bytes = self.acquirer.acquire(&source).await?;
        let (identifier, manifest) = self.resolver.resolve(&bytes, None)?;
        self.uploads
            .put(tenant_id, identifier.clone(), bytes, manifest.clone())
            .await;
        Ok(manifest)
    }

    /// Builds install requests from previously uploaded packages.
    pub async fn requests_from_uploads(
        &self,
        tenant_id: Uuid,
        identifiers: Vec<PluginIdentifier>,
    ) -> Result<Vec<InstallRequest>, CreateTaskError> {
        let mut requests = Vec::with_capacity(identifiers.len());
        for identifier in identifiers {
            let bytes = self
                .uploads
                .package(tenant_id, &identifier)
                .await
                .ok_or_else(|| CreateTaskError::UnknownUpload(identifier.clone()))?;
            requests.push(InstallRequest {
                identifier,
                source: InstallSource::LocalPackage { bytes },
            });
        }
        Ok(requests)
    }

    /// Accepts a batch, writes the task with every item pending, and
    /// schedules one worker per item. Returns immediately; callers poll the
    /// task afterwards. A batch member whose identifier is already being
    /// installed rejects the whole call before any task row exists.
    pub async fn create_install_task(
        self: &Arc<Self>,
        tenant_id: Uuid,
        requests: Vec<InstallRequest>,
    ) -> Result<InstallTask, CreateTaskError> {
        if requests.is_empty() {
            return Err(CreateTaskError::EmptyBatch);
        }
        let guards = self.lock_batch(tenant_id, &requests)?;
        let task = self.persist_task(tenant_id, &requests).await?;
        self.dispatch(tenant_id, &task, requests, guards, None);
        Ok(task)
    }

    /// Wraps install-new-then-uninstall-old as a single-item task. The two
    /// phases run strictly sequentially in one worker; the second only
    /// starts after the first commits.
    pub async fn create_upgrade_task(
        self: &Arc<Self>,
        tenant_id: Uuid,
        old_identifier: PluginIdentifier,
        request: InstallRequest,
    ) -> Result<InstallTask, CreateTaskError> {
        let requests = vec![request];
        let guards = self.lock_batch(tenant_id, &requests)?;
        let task = self.persist_task(tenant_id, &requests).await?;
        self.dispatch(tenant_id, &task, requests, guards, Some(old_identifier));
        Ok(task)
    }

    pub async fn fetch_task(
        &self,
        tenant_id: Uuid,
        task_id: Uuid,
    ) -> Result<InstallTask, TaskQueryError> {
        self.tasks
            .get(tenant_id, task_id)
            .await?
            .ok_or(TaskQueryError::NotFound)
    }

    /// Most-recent-first, 1-indexed pages. Pages beyond the range are empty,
    /// never an error.
    pub async fn list_tasks(
        &self,
        tenant_id: Uuid,
        page: u32,
        page_size: u32,
    ) -> anyhow::Result<Vec<InstallTask>> {
        let page = i64::from(page.max(1));
        let page_size = i64::from(page_size.clamp(1, MAX_PAGE_SIZE));
        self.tasks
            .list(tenant_id, (page - 1) * page_size, page_size)
            .await
    }

    /// Idempotent; deleting an absent task reports false rather than failing.
    pub async fn delete_task(&self, tenant_id: Uuid, task_id: Uuid) -> anyhow::Result<bool> {
        if let Some(rt) = self.task_runtime(task_id) {
            rt.cancel_all();
        }
        self.tasks.delete(tenant_id, task_id).await
    }

    /// Removes one item; removing the last item removes the task. A running
    /// item gets a best-effort cancellation request, not a forced abort.
    pub async fn delete_task_item(
        &self,
        tenant_id: Uuid,
        task_id: Uuid,
        identifier: &PluginIdentifier,
    ) -> anyhow::Result<bool> {
        if let Some(rt) = self.task_runtime(task_id) {
            rt.cancel(identifier);
        }
        let outcome = self.tasks.delete_item(tenant_id, task_id, identifier).await?;
        Ok(!matches!(outcome, ItemDeleteOutcome::Missing))
    }

    /// Removes an active installation directly, independent of any task.
    pub async fn uninstall(
        &self,
        tenant_id: Uuid,
        installation_id: Uuid,
    ) -> Result<bool, UninstallError> {
        let Some(installation) = self
            .registry
            .get_by_installation_id(tenant_id, installation_id)
            .await?
        else {
            return Ok(false);
        };
        let Some(_guard) = self.try_lock(tenant_id, &installation.identifier) else {
            return Err(UninstallError::Busy(installation.identifier));
        };
        Ok(self
            .registry
            .remove(tenant_id, &installation.identifier)
            .await?)
    }

    pub async fn list_installations(
        &self,
        tenant_id: Uuid,
    ) -> anyhow::Result<Vec<PluginInstallation>> {
        self.registry.list_for_tenant(tenant_id).await
    }

    /// Read-only manifest lookup: a fresh upload if one is cached, otherwise
    /// the marketplace copy, identity-verified either way.
    pub async fn fetch_manifest(
        &self,
        tenant_id: Uuid,
        identifier: &PluginIdentifier,
    ) -> Result<PluginManifest, UploadError> {
        if let Some(manifest) = self.uploads.manifest(tenant_id, identifier).await {
            return Ok(manifest);
        }
        let source = InstallSource::Marketplace {
            identifier: identifier.clone(),
        };
        let bytes = self.acquirer.acquire(&source).await?;
        let (_, manifest) = self.resolver.resolve(&bytes, Some(identifier))?;
        Ok(manifest)
    }

    pub async fn prune_uploads(&self) -> usize {
        self.uploads.prune_expired().await
    }

    fn lock_batch(
        &self,
        tenant_id: Uuid,
        requests: &[InstallRequest],
    ) -> Result<Vec<InFlightGuard>, CreateTaskError> {
        let mut guards = Vec::with_capacity(requests.len());
        for request in requests {
            match self.try_lock(tenant_id, &request.identifier) {
                Some(guard) => guards.push(guard),
                // Dropping the partial guards releases the slots taken so far.
                None => {
                    return Err(CreateTaskError::AlreadyInstalling(
                        request.identifier.clone(),
                    ));
                }
            }
        }
        Ok(guards)
    }

    async fn persist_task(
        &self,
        tenant_id: Uuid,
        requests: &[InstallRequest],
    ) -> Result<InstallTask, CreateTaskError> {
        let now = Utc::now();
        let items = requests
            .iter()
            .map(|r| InstallTaskItem::pending(r.identifier.clone(), now))
            .collect();
        let task = InstallTask::new(tenant_id, items);
        self.tasks
            .insert(&task)
            .await
            .map_err(CreateTaskError::Storage)?;
        Ok(task)
    }

    fn dispatch(
        self: &Arc<Self>,
        tenant_id: Uuid,
        task: &InstallTask,
        requests: Vec<InstallRequest>,
        guards: Vec<InFlightGuard>,
        upgrade_from: Option<PluginIdentifier>,
    ) {
        let rt = Arc::new(TaskRuntime::new(requests.len()));
        if let Ok(mut runtime) = self.runtime.lock() {
            runtime.insert(task.id, rt.clone());
        }
        for (request, guard) in requests.into_iter().zip(guards) {
            let cancel = rt.register_cancel(&request.identifier);
            let this = self.clone();
            let rt = rt.clone();
            let task_id = task.id;
            let upgrade_from = upgrade_from.clone();
            tokio::spawn(async move {
                let _slot = guard;
                this.run_item(tenant_id, task_id, request, &rt, cancel, upgrade_from)
                    .await;
                if rt.active.fetch_sub(1, Ordering::AcqRel) == 1 {
                    if let Ok(mut runtime) = this.runtime.lock() {
                        runtime.remove(&task_id);
                    }
                }
            });
        }
        info!(tenant = %tenant_id, task = %task.id, "install_task_scheduled");
    }

    /// The per-item worker: pending -> running -> acquire -> resolve ->
    /// commit -> succeeded, any failure captured verbatim into the item.
    /// Cancellation is observed at checkpoints only; once the registry
    /// commit has happened it is a no-op.
    async fn run_item(
        &self,
        tenant_id: Uuid,
        task_id: Uuid,
        request: InstallRequest,
        rt: &TaskRuntime,
        cancel: Arc<AtomicBool>,
        upgrade_from: Option<PluginIdentifier>,
    ) {
        let identifier = request.identifier;
        if cancel.load(Ordering::Acquire) {
            self.write_item(rt, tenant_id, task_id, &identifier, ItemStatus::Failed,
                Some("installation cancelled"), None)
                .await;
            return;
        }
        self.write_item(rt, tenant_id, task_id, &identifier, ItemStatus::Running, None, None)
            .await;

        let bytes = match self.acquirer.acquire(&request.source).await {
            Ok(bytes) => bytes,
            Err(err) => {
                self.write_item(rt, tenant_id, task_id, &identifier, ItemStatus::Failed,
                    Some(&err.to_string()), None)
                    .await;
                return;
            }
        };

        let manifest = match self.resolver.resolve(&bytes, Some(&identifier)) {
            Ok((_, manifest)) => manifest,
            Err(err) => {
                self.write_item(rt, tenant_id, task_id, &identifier, ItemStatus::Failed,
                    Some(&err.to_string()), None)
                    .await;
                return;
            }
        };

        if cancel.load(Ordering::Acquire) {
            self.write_item(rt, tenant_id, task_id, &identifier, ItemStatus::Failed,
                Some("installation cancelled"), None)
                .await;
            return;
        }

        match self
            .registry
            .commit(tenant_id, &manifest, request.source.kind())
            .await
        {
            Ok(_) => {
                let warning = match upgrade_from {
                    Some(old) if old != identifier => self.retire_old(tenant_id, &old).await,
                    _ => None,
                };
                self.write_item(rt, tenant_id, task_id, &identifier, ItemStatus::Succeeded,
                    None, warning.as_deref())
                    .await;
            }
            Err(err) => {
                self.write_item(rt, tenant_id, task_id, &identifier, ItemStatus::Failed,
                    Some(&err.to_string()), None)
                    .await;
            }
        }
    }

    /// Second phase of an upgrade. The new plugin is already committed, so
    /// failure here never demotes the item; it only leaves a warning about
    /// the stale old registration.
    async fn retire_old(&self, tenant_id: Uuid, old: &PluginIdentifier) -> Option<String> {
        let Some(_guard) = self.try_lock(tenant_id, old) else {
            return Some(format!(
                "previous plugin {old} is busy; stale registration left in place"
            ));
        };
        match self.registry.remove(tenant_id, old).await {
            Ok(_) => None,
            Err(err) => {
                warn!(tenant = %tenant_id, identifier = %old, error = ?err,
                    "upgrade_old_uninstall_failed");
                Some(format!(
                    "new plugin installed but removing previous plugin {old} failed: {err}"
                ))
            }
        }
    }

    async fn write_item(
        &self,
        rt: &TaskRuntime,
        tenant_id: Uuid,
        task_id: Uuid,
        identifier: &PluginIdentifier,
        status: ItemStatus,
        error: Option<&str>,
        warning: Option<&str>,
    ) {
        // Single writer per task so sibling workers never lose updates.
        let _write = rt.write_lock.lock().await;
        if let Err(err) = self
            .tasks
            .update_item(tenant_id, task_id, identifier, status, error, warning)
            .await
        {
            warn!(tenant = %tenant_id, task = %task_id, identifier = %identifier,
                error = ?err, "task_item_update_failed");
        }
    }

    fn try_lock(&self, tenant_id: Uuid, identifier: &PluginIdentifier) -> Option<InFlightGuard> {
        let key = (tenant_id, identifier.clone());
        let mut set = self.inflight.lock().ok()?;
        if set.insert(key.clone()) {
            Some(InFlightGuard {
                set: self.inflight.clone(),
                key,
            })
        } else {
            None
        }
    }

    fn task_runtime(&self, task_id: Uuid) -> Option<Arc<TaskRuntime>> {
        self.runtime.lock().ok()?.get(&task_id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicBool;

    use crate::application::ports::package_sources::{
        GithubReleaseClient, MarketplaceClient, SourceError,
    };
    use crate::application::services::resolver::tests::{package_bytes, resolved_identifier};
    use crate::domain::plugins::source::SourceKind;
    use crate::domain::plugins::task::TaskStatus;

    #[derive(Default)]
    struct MemTasks {
        rows: Mutex<Vec<InstallTask>>,
    }

    #[async_trait]
    impl InstallTaskRepository for MemTasks {
        async fn insert(&self, task: &InstallTask) -> anyhow::Result<()> {
            self.rows.lock().unwrap().push(task.clone());
            Ok(())
        }

        async fn get(&self, tenant_id: Uuid, task_id: Uuid) -> anyhow::Result<Option<InstallTask>> {
            Ok(self
                .rows
                .lock()
                .unwrap()
                .iter()
                .find(|t| t.tenant_id == tenant_id && t.id == task_id)
                .cloned())
        }

        async fn list(
            &self,
            tenant_id: Uuid,
            offset: i64,
            limit: i64,
        ) -> anyhow::Result<Vec<InstallTask>> {
            let mut tasks: Vec<InstallTask> = self
                .rows
                .lock()
                .unwrap()
                .iter()
                .filter(|t| t.tenant_id == tenant_id)
                .cloned()
                .collect();
            tasks.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            Ok(tasks
                .into_iter()
                .skip(offset as usize)
                .take(limit as usize)
                .collect())
        }

        async fn delete(&self, tenant_id: Uuid, task_id: Uuid) -> anyhow::Result<bool> {
            let mut rows = self.rows.lock().unwrap();
            let before = rows.len();
            rows.retain(|t| !(t.tenant_id == tenant_id && t.id == task_id));
            Ok(rows.len() < before)
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
            let mut rows = self.rows.lock().unwrap();
            if let Some(task) = rows
                .iter_mut()
                .find(|t| t.tenant_id == tenant_id && t.id == task_id)
            {
                if let Some(item) = task.items.iter_mut().find(|i| &i.identifier == identifier) {
                    item.status = status;
                    item.error = error.map(|s| s.to_string());
                    item.warning = warning.map(|s| s.to_string());
                    item.updated_at = Utc::now();
                }
            }
            Ok(())
        }

        async fn delete_item(
            &self,
            tenant_id: Uuid,
            task_id: Uuid,
            identifier: &PluginIdentifier,
        ) -> anyhow::Result<ItemDeleteOutcome> {
            let mut rows = self.rows.lock().unwrap();
            let Some(pos) = rows
                .iter()
                .position(|t| t.tenant_id == tenant_id && t.id == task_id)
            else {
                return Ok(ItemDeleteOutcome::Missing);
            };
            let before = rows[pos].items.len();
            rows[pos].items.retain(|i| &i.identifier != identifier);
            if rows[pos].items.len() == before {
                return Ok(ItemDeleteOutcome::Missing);
            }
            if rows[pos].items.is_empty() {
                rows.remove(pos);
                return Ok(ItemDeleteOutcome::RemovedTask);
            }
            Ok(ItemDeleteOutcome::Removed)
        }
    }

    #[derive(Default)]
    struct MemRegistry {
        rows: Mutex<HashMap<(Uuid, PluginIdentifier), PluginInstallation>>,
        fail_remove: AtomicBool,
    }

    #[async_trait]
    impl PluginRegistryRepository for MemRegistry {
        async fn commit(
            &self,
            tenant_id: Uuid,
            manifest: &PluginManifest,
            source: SourceKind,
        ) -> anyhow::Result<PluginInstallation> {
            let installation = PluginInstallation {
                id: Uuid::new_v4(),
                tenant_id,
                identifier: manifest.identifier.clone(),
                source,
                checksum: manifest.checksum.clone(),
                installed_at: Utc::now(),
            };
            self.rows.lock().unwrap().insert(
                (tenant_id, manifest.identifier.clone()),
                installation.clone(),
            );
            Ok(installation)
        }

        async fn get_by_identifier(
            &self,
            tenant_id: Uuid,
            identifier: &PluginIdentifier,
        ) -> anyhow::Result<Option<PluginInstallation>> {
            Ok(self
                .rows
                .lock()
                .unwrap()
                .get(&(tenant_id, identifier.clone()))
                .cloned())
        }

        async fn get_by_installation_id(
            &self,
            tenant_id: Uuid,
            installation_id: Uuid,
        ) -> anyhow::Result<Option<PluginInstallation>> {
            Ok(self
                .rows
                .lock()
                .unwrap()
                .values()
                .find(|i| i.tenant_id == tenant_id && i.id == installation_id)
                .cloned())
        }

        async fn list_for_tenant(
            &self,
            tenant_id: Uuid,
        ) -> anyhow::Result<Vec<PluginInstallation>> {
            Ok(self
                .rows
                .lock()
                .unwrap()
                .values()
                .filter(|i| i.tenant_id == tenant_id)
                .cloned()
                .collect())
        }

        async fn remove(
            &self,
            tenant_id: Uuid,
            identifier: &PluginIdentifier,
        ) -> anyhow::Result<bool> {
            if self.fail_remove.load(Ordering::Acquire) {
                anyhow::bail!("registry write refused");
            }
            Ok(self
                .rows
                .lock()
                .unwrap()
                .remove(&(tenant_id, identifier.clone()))
                .is_some())
        }
    }

    #[derive(Default)]
    struct FakeGithub {
        assets: HashMap<(String, String, String), Vec<u8>>,
    }

    #[async_trait]
    impl GithubReleaseClient for FakeGithub {
        async fn fetch_release_asset(
            &self,
            repo: &str,
            version: &str,
            asset: &str,
        ) -> Result<Vec<u8>, SourceError> {
            self.assets
                .get(&(repo.to_string(), version.to_string(), asset.to_string()))
                .cloned()
                .ok_or(SourceError::NotFound)
        }
    }

    #[derive(Default)]
    struct FakeMarketplace {
        packages: Mutex<HashMap<String, Vec<u8>>>,
        gate: Option<Arc<tokio::sync::Semaphore>>,
    }

    impl FakeMarketplace {
        fn publish(&self, identifier: &PluginIdentifier, bytes: Vec<u8>) {
            self.packages
                .lock()
                .unwrap()
                .insert(identifier.as_str().to_string(), bytes);
        }
    }

    #[async_trait]
    impl MarketplaceClient for FakeMarketplace {
        async fn fetch_package(
            &self,
            identifier: &PluginIdentifier,
        ) -> Result<Vec<u8>, SourceError> {
            if let Some(gate) = &self.gate {
                let permit = gate
                    .acquire()
                    .await
                    .map_err(|e| SourceError::Unreachable(anyhow::anyhow!(e)))?;
                permit.forget();
            }
            self.packages
                .lock()
                .unwrap()
                .get(identifier.as_str())
                .cloned()
                .ok_or(SourceError::NotFound)
        }
    }

    struct Fixture {
        orch: Arc<InstallOrchestrator>,
        registry: Arc<MemRegistry>,
        market: Arc<FakeMarketplace>,
        tenant: Uuid,
    }

    fn fixture_with(github: FakeGithub, market: FakeMarketplace) -> Fixture {
        let registry = Arc::new(MemRegistry::default());
        let market = Arc::new(market);
        let acquirer = PackageAcquirer::new(
            Arc::new(github),
            market.clone(),
            5 * 1024 * 1024,
            Duration::from_secs(5),
        );
        let orch = InstallOrchestrator::new(
            Arc::new(MemTasks::default()),
            registry.clone(),
            acquirer,
            Duration::from_secs(60),
        );
        Fixture {
            orch,
            registry,
            market,
            tenant: Uuid::new_v4(),
        }
    }

    fn fixture() -> Fixture {
        fixture_with(FakeGithub::default(), FakeMarketplace::default())
    }

    fn marketplace_request(market: &FakeMarketplace, name: &str, version: &str) -> InstallRequest {
        let bytes = package_bytes("acme", name, version);
        let identifier = resolved_identifier("acme", name, version);
        market.publish(&identifier, bytes);
        InstallRequest {
            identifier: identifier.clone(),
            source: InstallSource::Marketplace { identifier },
        }
    }

    async fn wait_terminal(fx: &Fixture, task_id: Uuid) -> InstallTask {
        for _ in 0..1000 {
            if let Ok(task) = fx.orch.fetch_task(fx.tenant, task_id).await {
                if task.is_terminal() {
                    // Workers release their exclusivity slots just after the
                    // final status write; wait for that too so follow-up
                    // submissions never race the release.
                    wait_idle(fx).await;
                    return task;
                }
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("task {task_id} never reached a terminal state");
    }

    async fn wait_idle(fx: &Fixture) {
        for _ in 0..1000 {
            if fx.orch.inflight.lock().unwrap().is_empty() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        panic!("in-flight installs never drained");
    }

    #[tokio::test]
    async fn batch_tolerates_partial_failure() {
        let mut github = FakeGithub::default();
        let good = package_bytes("acme", "alpha", "1.0.0");
        let good_id = resolved_identifier("acme", "alpha", "1.0.0");
        github.assets.insert(
            ("acme/alpha".into(), "v1.0.0".into(), "alpha.zip".into()),
            good,
        );
        let fx = fixture_with(github, FakeMarketplace::default());

        let missing_id = resolved_identifier("acme", "beta", "1.0.0");
        let requests = vec![
            InstallRequest {
                identifier: good_id.clone(),
                source: InstallSource::GitHubRelease {
                    repo: "acme/alpha".into(),
                    version: "v1.0.0".into(),
                    asset: "alpha.zip".into(),
                },
            },
            InstallRequest {
                identifier: missing_id.clone(),
                source: InstallSource::GitHubRelease {
                    repo: "acme/beta".into(),
                    version: "v1.0.0".into(),
                    asset: "beta.zip".into(),
                },
            },
        ];

        let task = fx.orch.create_install_task(fx.tenant, requests).await.unwrap();
        assert_eq!(task.status(), TaskStatus::Pending);

        let done = wait_terminal(&fx, task.id).await;
        assert_eq!(done.status(), TaskStatus::PartiallySucceeded);
        let alpha = done.item(&good_id).unwrap();
        assert_eq!(alpha.status, ItemStatus::Succeeded);
        assert!(alpha.error.is_none());
        let beta = done.item(&missing_id).unwrap();
        assert_eq!(beta.status, ItemStatus::Failed);
        assert_eq!(beta.error.as_deref(), Some("package not found at source"));

        assert!(fx.registry.get_by_identifier(fx.tenant, &good_id).await.unwrap().is_some());
        assert!(fx.registry.get_by_identifier(fx.tenant, &missing_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn concurrent_duplicate_is_rejected_not_queued() {
        let market = FakeMarketplace {
            gate: Some(Arc::new(tokio::sync::Semaphore::new(0))),
            ..Default::default()
        };
        let fx = fixture_with(FakeGithub::default(), market);
        let request = marketplace_request(&fx.market, "alpha", "1.0.0");
        let identifier = request.identifier.clone();

        let task = fx
            .orch
            .create_install_task(fx.tenant, vec![request.clone()])
            .await
            .unwrap();

        // The worker is parked inside acquisition; a duplicate submission
        // must fail fast instead of queuing behind it.
        let err = fx
            .orch
            .create_install_task(fx.tenant, vec![request.clone()])
            .await
            .unwrap_err();
        assert!(matches!(err, CreateTaskError::AlreadyInstalling(ref id) if id == &identifier));

        // Another tenant is unaffected by this tenant's in-flight install.
        let other_tenant = Uuid::new_v4();
        assert!(fx
            .orch
            .create_install_task(other_tenant, vec![request.clone()])
            .await
            .is_ok());

        fx.market.gate.as_ref().unwrap().add_permits(2);
        let done = wait_terminal(&fx, task.id).await;
        assert_eq!(done.status(), TaskStatus::Succeeded);

        // The slot is released once the worker finishes.
        assert!(fx.orch.create_install_task(fx.tenant, vec![request]).await.is_ok());
    }

    #[tokio::test]
    async fn failed_upgrade_leaves_old_installation_untouched() {
        let fx = fixture();
        let old = marketplace_request(&fx.market, "alpha", "1.0.0");
        let seeded = fx
            .orch
            .create_install_task(fx.tenant, vec![old.clone()])
            .await
            .unwrap();
        wait_terminal(&fx, seeded.id).await;

        // New version was never published, so its acquisition fails.
        let new_id = resolved_identifier("acme", "alpha", "2.0.0");
        let task = fx
            .orch
            .create_upgrade_task(
                fx.tenant,
                old.identifier.clone(),
                InstallRequest {
                    identifier: new_id.clone(),
                    source: InstallSource::Marketplace {
                        identifier: new_id.clone(),
                    },
                },
            )
            .await
            .unwrap();
        let done = wait_terminal(&fx, task.id).await;
        assert_eq!(done.status(), TaskStatus::Failed);

        assert!(fx.registry.get_by_identifier(fx.tenant, &old.identifier).await.unwrap().is_some());
        assert!(fx.registry.get_by_identifier(fx.tenant, &new_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn upgrade_success_survives_failed_old_uninstall() {
        let fx = fixture();
        let old = marketplace_request(&fx.market, "alpha", "1.0.0");
        let seeded = fx
            .orch
            .create_install_task(fx.tenant, vec![old.clone()])
            .await
            .unwrap();
        wait_terminal(&fx, seeded.id).await;

        let new = marketplace_request(&fx.market, "alpha", "2.0.0");
        fx.registry.fail_remove.store(true, Ordering::Release);

        let task = fx
            .orch
            .create_upgrade_task(fx.tenant, old.identifier.clone(), new.clone())
            .await
            .unwrap();
        let done = wait_terminal(&fx, task.id).await;
        assert_eq!(done.status(), TaskStatus::Succeeded);
        let item = done.item(&new.identifier).unwrap();
        assert!(item.error.is_none());
        assert!(item.warning.as_deref().unwrap_or("").contains("removing previous plugin"));

        // Forward progress wins: the new plugin is active, the stale old
        // registration awaits a later uninstall.
        assert!(fx.registry.get_by_identifier(fx.tenant, &new.identifier).await.unwrap().is_some());
        assert!(fx.registry.get_by_identifier(fx.tenant, &old.identifier).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn successful_upgrade_replaces_old_installation() {
        let fx = fixture();
        let old = marketplace_request(&fx.market, "alpha", "1.0.0");
        let seeded = fx
            .orch
            .create_install_task(fx.tenant, vec![old.clone()])
            .await
            .unwrap();
        wait_terminal(&fx, seeded.id).await;

        let new = marketplace_request(&fx.market, "alpha", "2.0.0");
        let task = fx
            .orch
            .create_upgrade_task(fx.tenant, old.identifier.clone(), new.clone())
            .await
            .unwrap();
        let done = wait_terminal(&fx, task.id).await;
        assert_eq!(done.status(), TaskStatus::Succeeded);
        assert!(done.item(&new.identifier).unwrap().warning.is_none());

        assert!(fx.registry.get_by_identifier(fx.tenant, &old.identifier).await.unwrap().is_none());
        assert!(fx.registry.get_by_identifier(fx.tenant, &new.identifier).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn deleting_last_item_removes_the_task() {
        let fx = fixture();
        let request = marketplace_request(&fx.market, "alpha", "1.0.0");
        let identifier = request.identifier.clone();
        let task = fx
            .orch
            .create_install_task(fx.tenant, vec![request])
            .await
            .unwrap();
        wait_terminal(&fx, task.id).await;

        assert!(fx.orch.delete_task_item(fx.tenant, task.id, &identifier).await.unwrap());
        let err = fx.orch.fetch_task(fx.tenant, task.id).await.unwrap_err();
        assert!(matches!(err, TaskQueryError::NotFound));

        // Idempotent afterwards.
        assert!(!fx.orch.delete_task_item(fx.tenant, task.id, &identifier).await.unwrap());
    }

    #[tokio::test]
    async fn delete_task_is_idempotent() {
        let fx = fixture();
        let request = marketplace_request(&fx.market, "alpha", "1.0.0");
        let task = fx
            .orch
            .create_install_task(fx.tenant, vec![request])
            .await
            .unwrap();
        wait_terminal(&fx, task.id).await;

        assert!(fx.orch.delete_task(fx.tenant, task.id).await.unwrap());
        assert!(!fx.orch.delete_task(fx.tenant, task.id).await.unwrap());
    }

    #[tokio::test]
    async fn page_beyond_range_is_empty_not_an_error() {
        let fx = fixture();
        for n in 0..5 {
            let request = marketplace_request(&fx.market, "alpha", &format!("1.0.{n}"));
            let task = fx
                .orch
                .create_install_task(fx.tenant, vec![request])
                .await
                .unwrap();
            wait_terminal(&fx, task.id).await;
        }

        let page = fx.orch.list_tasks(fx.tenant, 1000, 10).await.unwrap();
        assert!(page.is_empty());

        let first = fx.orch.list_tasks(fx.tenant, 1, 3).await.unwrap();
        assert_eq!(first.len(), 3);
        // Most recent first.
        assert!(first[0].created_at >= first[1].created_at);
        let second = fx.orch.list_tasks(fx.tenant, 2, 3).await.unwrap();
        assert_eq!(second.len(), 2);
    }

    #[tokio::test]
    async fn oversized_upload_is_rejected_without_a_task() {
        let fx = fixture();
        let err = fx
            .orch
            .upload_package(fx.tenant, vec![0u8; 10 * 1024 * 1024])
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            UploadError::Acquire(AcquireError::PackageTooLarge { .. })
        ));
        assert!(fx.orch.list_tasks(fx.tenant, 1, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn install_from_uploaded_package() {
        let fx = fixture();
        let bytes = package_bytes("acme", "alpha", "1.0.0");
        let manifest = fx.orch.upload_package(fx.tenant, bytes).await.unwrap();
        let identifier = manifest.identifier.clone();

        let requests = fx
            .orch
            .requests_from_uploads(fx.tenant, vec![identifier.clone()])
            .await
            .unwrap();
        let task = fx.orch.create_install_task(fx.tenant, requests).await.unwrap();
        let done = wait_terminal(&fx, task.id).await;
        assert_eq!(done.status(), TaskStatus::Succeeded);
        assert!(fx.registry.get_by_identifier(fx.tenant, &identifier).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn install_by_unknown_upload_identifier_fails_synchronously() {
        let fx = fixture();
        let identifier = resolved_identifier("acme", "alpha", "1.0.0");
        let err = fx
            .orch
            .requests_from_uploads(fx.tenant, vec![identifier])
            .await
            .unwrap_err();
        assert!(matches!(err, CreateTaskError::UnknownUpload(_)));
    }

    #[tokio::test]
    async fn tampered_marketplace_package_fails_identity_check() {
        let fx = fixture();
        // Publish different bytes under a trusted identifier.
        let trusted = resolved_identifier("acme", "alpha", "1.0.0");
        fx.market.publish(&trusted, package_bytes("evil", "alpha", "1.0.0"));

        let task = fx
            .orch
            .create_install_task(
                fx.tenant,
                vec![InstallRequest {
                    identifier: trusted.clone(),
                    source: InstallSource::Marketplace {
                        identifier: trusted.clone(),
                    },
                }],
            )
            .await
            .unwrap();
        let done = wait_terminal(&fx, task.id).await;
        let item = done.item(&trusted).unwrap();
        assert_eq!(item.status, ItemStatus::Failed);
        assert!(item.error.as_deref().unwrap().contains("expected"));
        assert!(fx.registry.get_by_identifier(fx.tenant, &trusted).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn cancelling_a_running_item_prevents_commit() {
        let market = FakeMarketplace {
            gate: Some(Arc::new(tokio::sync::Semaphore::new(0))),
            ..Default::default()
        };
        let fx = fixture_with(FakeGithub::default(), market);
        let request = marketplace_request(&fx.market, "alpha", "1.0.0");
        let identifier = request.identifier.clone();

        let task = fx
            .orch
            .create_install_task(fx.tenant, vec![request])
            .await
            .unwrap();

        // Wait for the worker to reach acquisition.
        for _ in 0..1000 {
            let t = fx.orch.fetch_task(fx.tenant, task.id).await.unwrap();
            if t.items[0].status == ItemStatus::Running {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        assert!(fx.orch.delete_task_item(fx.tenant, task.id, &identifier).await.unwrap());
        fx.market.gate.as_ref().unwrap().add_permits(1);

        // Single item, so the task is gone; and the cancelled worker must
        // not have committed anything.
        wait_idle(&fx).await;
        assert!(matches!(
            fx.orch.fetch_task(fx.tenant, task.id).await.unwrap_err(),
            TaskQueryError::NotFound
        ));
        assert!(fx.registry.get_by_identifier(fx.tenant, &identifier).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn uninstall_removes_committed_installation() {
        let fx = fixture();
        let request = marketplace_request(&fx.market, "alpha", "1.0.0");
        let identifier = request.identifier.clone();
        let task = fx
            .orch
            .create_install_task(fx.tenant, vec![request])
            .await
            .unwrap();
        wait_terminal(&fx, task.id).await;

        let installation = fx
            .registry
            .get_by_identifier(fx.tenant, &identifier)
            .await
            .unwrap()
            .unwrap();
        assert!(fx.orch.uninstall(fx.tenant, installation.id).await.unwrap());
        assert!(!fx.orch.uninstall(fx.tenant, installation.id).await.unwrap());
        assert!(fx.orch.list_installations(fx.tenant).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn fetch_manifest_prefers_upload_then_marketplace() {
        let fx = fixture();
        let bytes = package_bytes("acme", "alpha", "1.0.0");
        let uploaded = fx.orch.upload_package(fx.tenant, bytes).await.unwrap();
        let fetched = fx
            .orch
            .fetch_manifest(fx.tenant, &uploaded.identifier)
            .await
            .unwrap();
        assert_eq!(fetched.identifier, uploaded.identifier);

        let published = marketplace_request(&fx.market, "beta", "1.0.0");
        let fetched = fx
            .orch
            .fetch_manifest(fx.tenant, &published.identifier)
            .await
            .unwrap();
        assert_eq!(fetched.identifier, published.identifier);

        let unknown = resolved_identifier("acme", "gamma", "1.0.0");
        assert!(fx.orch.fetch_manifest(fx.tenant, &unknown).await.is_err());
    }
}
