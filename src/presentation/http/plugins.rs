use axum::{
    Json, Router,
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    routing::{get, post},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::application::services::install::{
    AcquireError, CreateTaskError, TaskQueryError, UninstallError, UploadError,
};
use crate::application::use_cases::plugins::debugging::{DebuggingKeyError, GetDebuggingKey};
use crate::application::use_cases::plugins::install::{
    InstallError, InstallFromGithub, InstallFromMarketplace, InstallFromUploads,
};
use crate::application::use_cases::plugins::list::{
    FetchManifest, FetchManifestError, ListInstallations,
};
use crate::application::use_cases::plugins::permissions::{
    ChangePermission, ChangePermissionError, GetPermission,
};
use crate::application::use_cases::plugins::tasks::{
    DeleteInstallTask, DeleteInstallTaskItem, DeleteTaskError, FetchInstallTask, ListInstallTasks,
};
use crate::application::use_cases::plugins::uninstall::{UninstallPlugin, UninstallPluginError};
use crate::application::use_cases::plugins::upgrade::{UpgradeError, UpgradePlugin};
use crate::application::use_cases::plugins::upload::{
    UploadFromGithub, UploadPackage, UploadPackageError,
};
use crate::bootstrap::app_context::AppContext;
use crate::domain::plugins::PluginInstallation;
use crate::domain::plugins::identifier::PluginIdentifier;
use crate::domain::plugins::manifest::PluginManifest;
use crate::domain::plugins::permission::{PermissionLevel, TenantPluginPermission};
use crate::domain::plugins::task::{InstallTask, TaskStatus};
use crate::presentation::http::auth::{self, Bearer};

pub fn routes(ctx: AppContext) -> Router {
    Router::new()
        .route("/plugin/debugging-key", get(debugging_key))
        .route("/plugin/list", get(list_installations))
        .route("/plugin/upload/pkg", post(upload_pkg))
        .route("/plugin/upload/github", post(upload_from_github))
        .route("/plugin/install/pkg", post(install_from_pkg))
        .route("/plugin/install/github", post(install_from_github))
        .route("/plugin/install/marketplace", post(install_from_marketplace))
        .route("/plugin/upgrade/marketplace", post(upgrade_from_marketplace))
        .route("/plugin/upgrade/github", post(upgrade_from_github))
        .route("/plugin/fetch-manifest", get(fetch_manifest))
        .route("/plugin/tasks", get(list_tasks))
        .route("/plugin/tasks/:task_id", get(fetch_task))
        .route("/plugin/tasks/:task_id/delete", post(delete_task))
        // Identifiers contain slashes, so the item segment is a wildcard.
        .route(
            "/plugin/tasks/:task_id/delete/*identifier",
            post(delete_task_item),
        )
        .route("/plugin/uninstall", post(uninstall))
        .route("/plugin/permission/fetch", get(fetch_permission))
        .route("/plugin/permission/change", post(change_permission))
        .with_state(ctx)
}

// --- Response / request shapes ---

#[derive(Debug, Serialize, ToSchema)]
pub struct TaskItemResponse {
    pub identifier: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TaskResponse {
    pub id: Uuid,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub items: Vec<TaskItemResponse>,
}

fn task_status_str(status: TaskStatus) -> &'static str {
    match status {
        TaskStatus::Pending => "pending",
        TaskStatus::Running => "running",
        TaskStatus::Succeeded => "succeeded",
        TaskStatus::PartiallySucceeded => "partially_succeeded",
        TaskStatus::Failed => "failed",
    }
}

impl From<InstallTask> for TaskResponse {
    fn from(task: InstallTask) -> Self {
        let status = task_status_str(task.status()).to_string();
        Self {
            id: task.id,
            status,
            created_at: task.created_at,
            items: task
                .items
                .into_iter()
                .map(|i| TaskItemResponse {
                    identifier: i.identifier.as_str().to_string(),
                    status: i.status.as_str().to_string(),
                    error: i.error,
                    warning: i.warning,
                    updated_at: i.updated_at,
                })
                .collect(),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TaskListResponse {
    pub tasks: Vec<TaskResponse>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ManifestResponse {
    pub identifier: String,
    pub capabilities: Vec<String>,
    pub min_platform_version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_platform_version: Option<String>,
    pub size_bytes: u64,
    pub checksum: String,
}

impl From<PluginManifest> for ManifestResponse {
    fn from(m: PluginManifest) -> Self {
        Self {
            identifier: m.identifier.as_str().to_string(),
            capabilities: m.capabilities,
            min_platform_version: m.min_platform_version.to_string(),
            max_platform_version: m.max_platform_version.map(|v| v.to_string()),
            size_bytes: m.size_bytes,
            checksum: m.checksum,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct InstallationItem {
    pub id: Uuid,
    pub identifier: String,
    pub source: String,
    pub checksum: String,
    pub installed_at: DateTime<Utc>,
}

impl From<PluginInstallation> for InstallationItem {
    fn from(i: PluginInstallation) -> Self {
        Self {
            id: i.id,
            identifier: i.identifier.as_str().to_string(),
            source: i.source.as_str().to_string(),
            checksum: i.checksum,
            installed_at: i.installed_at,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct InstallationListResponse {
    pub plugins: Vec<InstallationItem>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct DeletedResponse {
    pub deleted: bool,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct DebuggingKeyResponse {
    pub key: String,
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UploadGithubBody {
    pub repo: String,
    pub version: String,
    pub asset: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct InstallPkgBody {
    pub identifiers: Vec<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct InstallGithubBody {
    pub identifier: String,
    pub repo: String,
    pub version: String,
    pub asset: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct InstallMarketplaceBody {
    pub identifiers: Vec<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpgradeMarketplaceBody {
    pub old_identifier: String,
    pub new_identifier: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpgradeGithubBody {
    pub old_identifier: String,
    pub new_identifier: String,
    pub repo: String,
    pub version: String,
    pub asset: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UninstallBody {
    pub installation_id: Uuid,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct PermissionBody {
    pub install_permission: String,
    pub debug_permission: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PermissionResponse {
    pub install_permission: String,
    pub debug_permission: String,
}

impl From<TenantPluginPermission> for PermissionResponse {
    fn from(p: TenantPluginPermission) -> Self {
        Self {
            install_permission: p.install_permission.as_str().to_string(),
            debug_permission: p.debug_permission.as_str().to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct TasksQuery {
    pub page: Option<u32>,
    pub page_size: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct FetchManifestQuery {
    pub identifier: String,
}

// --- Error mapping ---

fn acquire_status(err: &AcquireError) -> StatusCode {
    match err {
        AcquireError::PackageTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
        AcquireError::NotFound => StatusCode::NOT_FOUND,
        AcquireError::Unreachable(_) => StatusCode::BAD_GATEWAY,
    }
}

fn upload_error_status(err: &UploadError) -> StatusCode {
    match err {
        UploadError::Acquire(e) => acquire_status(e),
        UploadError::Resolve(_) => StatusCode::UNPROCESSABLE_ENTITY,
    }
}

fn upload_status(err: &UploadPackageError) -> StatusCode {
    match err {
        UploadPackageError::Forbidden(_) => StatusCode::FORBIDDEN,
        UploadPackageError::Upload(e) => upload_error_status(e),
    }
}

fn install_status(err: &InstallError) -> StatusCode {
    match err {
        InstallError::Forbidden(_) => StatusCode::FORBIDDEN,
        InstallError::Create(CreateTaskError::AlreadyInstalling(_)) => StatusCode::CONFLICT,
        InstallError::Create(CreateTaskError::UnknownUpload(_))
        | InstallError::Create(CreateTaskError::EmptyBatch) => StatusCode::BAD_REQUEST,
        InstallError::Create(CreateTaskError::Storage(_)) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn delete_task_status(err: &DeleteTaskError) -> StatusCode {
    match err {
        DeleteTaskError::Forbidden(_) => StatusCode::FORBIDDEN,
        DeleteTaskError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn upgrade_status(err: &UpgradeError) -> StatusCode {
    match err {
        UpgradeError::Forbidden(_) => StatusCode::FORBIDDEN,
        UpgradeError::Create(CreateTaskError::AlreadyInstalling(_)) => StatusCode::CONFLICT,
        UpgradeError::Create(CreateTaskError::UnknownUpload(_))
        | UpgradeError::Create(CreateTaskError::EmptyBatch) => StatusCode::BAD_REQUEST,
        UpgradeError::Create(CreateTaskError::Storage(_)) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn parse_identifier(raw: &str) -> Result<PluginIdentifier, StatusCode> {
    PluginIdentifier::parse(raw).map_err(|_| StatusCode::BAD_REQUEST)
}

fn parse_identifiers(raw: Vec<String>) -> Result<Vec<PluginIdentifier>, StatusCode> {
    raw.iter().map(|s| parse_identifier(s)).collect()
}

// --- Handlers ---

#[utoipa::path(get, path = "/api/plugin/debugging-key", tag = "Plugins", responses(
    (status = 200, body = DebuggingKeyResponse)
))]
pub async fn debugging_key(
    State(ctx): State<AppContext>,
    bearer: Result<Bearer, StatusCode>,
) -> Result<Json<DebuggingKeyResponse>, StatusCode> {
    let auth = auth::validate_bearer(&ctx.cfg, bearer?)?;
    let permissions = ctx.permission_repo();
    let keys = ctx.debugging_keys();
    let uc = GetDebuggingKey {
        permissions: permissions.as_ref(),
        keys: keys.as_ref(),
        host: &ctx.cfg.debug_host,
        port: ctx.cfg.debug_port,
    };
    let key = uc.execute(auth.tenant_id, auth.role).await.map_err(|e| match e {
        DebuggingKeyError::Forbidden(_) => StatusCode::FORBIDDEN,
        DebuggingKeyError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
    })?;
    Ok(Json(DebuggingKeyResponse {
        key: key.key,
        host: key.host,
        port: key.port,
    }))
}

#[utoipa::path(get, path = "/api/plugin/list", tag = "Plugins", responses(
    (status = 200, body = InstallationListResponse)
))]
pub async fn list_installations(
    State(ctx): State<AppContext>,
    bearer: Result<Bearer, StatusCode>,
) -> Result<Json<InstallationListResponse>, StatusCode> {
    let auth = auth::validate_bearer(&ctx.cfg, bearer?)?;
    let uc = ListInstallations {
        orchestrator: ctx.orchestrator(),
    };
    let plugins = uc
        .execute(auth.tenant_id)
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
        .into_iter()
        .map(InstallationItem::from)
        .collect();
    Ok(Json(InstallationListResponse { plugins }))
}

#[utoipa::path(post, path = "/api/plugin/upload/pkg", tag = "Plugins", responses(
    (status = 200, body = ManifestResponse)
))]
pub async fn upload_pkg(
    State(ctx): State<AppContext>,
    bearer: Result<Bearer, StatusCode>,
    mut multipart: Multipart,
) -> Result<Json<ManifestResponse>, StatusCode> {
    let auth = auth::validate_bearer(&ctx.cfg, bearer?)?;
    let mut bytes: Option<Vec<u8>> = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|_| StatusCode::BAD_REQUEST)?
    {
        if field.name() == Some("pkg") {
            bytes = Some(
                field
                    .bytes()
                    .await
                    .map_err(|_| StatusCode::BAD_REQUEST)?
                    .to_vec(),
            );
            break;
        }
    }
    let bytes = bytes.ok_or(StatusCode::BAD_REQUEST)?;

    let permissions = ctx.permission_repo();
    let uc = UploadPackage {
        permissions: permissions.as_ref(),
        orchestrator: ctx.orchestrator(),
    };
    let manifest = uc
        .execute(auth.tenant_id, auth.role, bytes)
        .await
        .map_err(|e| upload_status(&e))?;
    Ok(Json(manifest.into()))
}

#[utoipa::path(post, path = "/api/plugin/upload/github", tag = "Plugins", request_body = UploadGithubBody, responses(
    (status = 200, body = ManifestResponse)
))]
pub async fn upload_from_github(
    State(ctx): State<AppContext>,
    bearer: Result<Bearer, StatusCode>,
    Json(body): Json<UploadGithubBody>,
) -> Result<Json<ManifestResponse>, StatusCode> {
    let auth = auth::validate_bearer(&ctx.cfg, bearer?)?;
    let permissions = ctx.permission_repo();
    let uc = UploadFromGithub {
        permissions: permissions.as_ref(),
        orchestrator: ctx.orchestrator(),
    };
    let manifest = uc
        .execute(
            auth.tenant_id,
            auth.role,
            &body.repo,
            &body.version,
            &body.asset,
        )
        .await
        .map_err(|e| upload_status(&e))?;
    Ok(Json(manifest.into()))
}

#[utoipa::path(post, path = "/api/plugin/install/pkg", tag = "Plugins", request_body = InstallPkgBody, responses(
    (status = 200, body = TaskResponse)
))]
pub async fn install_from_pkg(
    State(ctx): State<AppContext>,
    bearer: Result<Bearer, StatusCode>,
    Json(body): Json<InstallPkgBody>,
) -> Result<Json<TaskResponse>, StatusCode> {
    let auth = auth::validate_bearer(&ctx.cfg, bearer?)?;
    let identifiers = parse_identifiers(body.identifiers)?;
    let permissions = ctx.permission_repo();
    let uc = InstallFromUploads {
        permissions: permissions.as_ref(),
        orchestrator: ctx.orchestrator(),
    };
    let task = uc
        .execute(auth.tenant_id, auth.role, identifiers)
        .await
        .map_err(|e| install_status(&e))?;
    Ok(Json(task.into()))
}

#[utoipa::path(post, path = "/api/plugin/install/github", tag = "Plugins", request_body = InstallGithubBody, responses(
    (status = 200, body = TaskResponse)
))]
pub async fn install_from_github(
    State(ctx): State<AppContext>,
    bearer: Result<Bearer, StatusCode>,
    Json(body): Json<InstallGithubBody>,
) -> Result<Json<TaskResponse>, StatusCode> {
    let auth = auth::validate_bearer(&ctx.cfg, bearer?)?;
    let identifier = parse_identifier(&body.identifier)?;
    let permissions = ctx.permission_repo();
    let uc = InstallFromGithub {
        permissions: permissions.as_ref(),
        orchestrator: ctx.orchestrator(),
    };
    let task = uc
        .execute(
            auth.tenant_id,
            auth.role,
            identifier,
            body.repo,
            body.version,
            body.asset,
        )
        .await
        .map_err(|e| install_status(&e))?;
    Ok(Json(task.into()))
}

#[utoipa::path(post, path = "/api/plugin/install/marketplace", tag = "Plugins", request_body = InstallMarketplaceBody, responses(
    (status = 200, body = TaskResponse)
))]
pub async fn install_from_marketplace(
    State(ctx): State<AppContext>,
    bearer: Result<Bearer, StatusCode>,
    Json(body): Json<InstallMarketplaceBody>,
) -> Result<Json<TaskResponse>, StatusCode> {
    let auth = auth::validate_bearer(&ctx.cfg, bearer?)?;
    let identifiers = parse_identifiers(body.identifiers)?;
    let permissions = ctx.permission_repo();
    let uc = InstallFromMarketplace {
        permissions: permissions.as_ref(),
        orchestrator: ctx.orchestrator(),
    };
    let task = uc
        .execute(auth.tenant_id, auth.role, identifiers)
        .await
        .map_err(|e| install_status(&e))?;
    Ok(Json(task.into()))
}

#[utoipa::path(post, path = "/api/plugin/upgrade/marketplace", tag = "Plugins", request_body = UpgradeMarketplaceBody, responses(
    (status = 200, body = TaskResponse)
))]
pub async fn upgrade_from_marketplace(
    State(ctx): State<AppContext>,
    bearer: Result<Bearer, StatusCode>,
    Json(body): Json<UpgradeMarketplaceBody>,
) -> Result<Json<TaskResponse>, StatusCode> {
    let auth = auth::validate_bearer(&ctx.cfg, bearer?)?;
    let old = parse_identifier(&body.old_identifier)?;
    let new = parse_identifier(&body.new_identifier)?;
    let permissions = ctx.permission_repo();
    let uc = UpgradePlugin {
        permissions: permissions.as_ref(),
        orchestrator: ctx.orchestrator(),
    };
    let task = uc
        .from_marketplace(auth.tenant_id, auth.role, old, new)
        .await
        .map_err(|e| upgrade_status(&e))?;
    Ok(Json(task.into()))
}

#[utoipa::path(post, path = "/api/plugin/upgrade/github", tag = "Plugins", request_body = UpgradeGithubBody, responses(
    (status = 200, body = TaskResponse)
))]
pub async fn upgrade_from_github(
    State(ctx): State<AppContext>,
    bearer: Result<Bearer, StatusCode>,
    Json(body): Json<UpgradeGithubBody>,
) -> Result<Json<TaskResponse>, StatusCode> {
    let auth = auth::validate_bearer(&ctx.cfg, bearer?)?;
    let old = parse_identifier(&body.old_identifier)?;
    let new = parse_identifier(&body.new_identifier)?;
    let permissions = ctx.permission_repo();
    let uc = UpgradePlugin {
        permissions: permissions.as_ref(),
        orchestrator: ctx.orchestrator(),
    };
    let task = uc
        .from_github(
            auth.tenant_id,
            auth.role,
            old,
            new,
            body.repo,
            body.version,
            body.asset,
        )
        .await
        .map_err(|e| upgrade_status(&e))?;
    Ok(Json(task.into()))
}

#[utoipa::path(get, path = "/api/plugin/fetch-manifest", tag = "Plugins", params(
    ("identifier" = String, Query, description = "Plugin identifier")
), responses((status = 200, body = ManifestResponse)))]
pub async fn fetch_manifest(
    State(ctx): State<AppContext>,
    bearer: Result<Bearer, StatusCode>,
    Query(q): Query<FetchManifestQuery>,
) -> Result<Json<ManifestResponse>, StatusCode> {
    let auth = auth::validate_bearer(&ctx.cfg, bearer?)?;
    let identifier = parse_identifier(&q.identifier)?;
    let permissions = ctx.permission_repo();
    let uc = FetchManifest {
        permissions: permissions.as_ref(),
        orchestrator: ctx.orchestrator(),
    };
    let manifest = uc
        .execute(auth.tenant_id, auth.role, &identifier)
        .await
        .map_err(|e| match e {
            FetchManifestError::Forbidden(_) => StatusCode::FORBIDDEN,
            FetchManifestError::Upload(e) => upload_error_status(&e),
        })?;
    Ok(Json(manifest.into()))
}

#[utoipa::path(get, path = "/api/plugin/tasks", tag = "Plugins", params(
    ("page" = Option<u32>, Query, description = "1-indexed page"),
    ("page_size" = Option<u32>, Query, description = "Items per page")
), responses((status = 200, body = TaskListResponse)))]
pub async fn list_tasks(
    State(ctx): State<AppContext>,
    bearer: Result<Bearer, StatusCode>,
    Query(q): Query<TasksQuery>,
) -> Result<Json<TaskListResponse>, StatusCode> {
    let auth = auth::validate_bearer(&ctx.cfg, bearer?)?;
    let uc = ListInstallTasks {
        orchestrator: ctx.orchestrator(),
    };
    let tasks = uc
        .execute(
            auth.tenant_id,
            q.page.unwrap_or(1),
            q.page_size.unwrap_or(20),
        )
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
        .into_iter()
        .map(TaskResponse::from)
        .collect();
    Ok(Json(TaskListResponse { tasks }))
}

#[utoipa::path(get, path = "/api/plugin/tasks/{task_id}", tag = "Plugins", params(
    ("task_id" = Uuid, Path, description = "Task ID")
), responses((status = 200, body = TaskResponse)))]
pub async fn fetch_task(
    State(ctx): State<AppContext>,
    bearer: Result<Bearer, StatusCode>,
    Path(task_id): Path<Uuid>,
) -> Result<Json<TaskResponse>, StatusCode> {
    let auth = auth::validate_bearer(&ctx.cfg, bearer?)?;
    let uc = FetchInstallTask {
        orchestrator: ctx.orchestrator(),
    };
    let task = uc.execute(auth.tenant_id, task_id).await.map_err(|e| match e {
        TaskQueryError::NotFound => StatusCode::NOT_FOUND,
        TaskQueryError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
    })?;
    Ok(Json(task.into()))
}

#[utoipa::path(post, path = "/api/plugin/tasks/{task_id}/delete", tag = "Plugins", params(
    ("task_id" = Uuid, Path, description = "Task ID")
), responses((status = 200, body = DeletedResponse)))]
pub async fn delete_task(
    State(ctx): State<AppContext>,
    bearer: Result<Bearer, StatusCode>,
    Path(task_id): Path<Uuid>,
) -> Result<Json<DeletedResponse>, StatusCode> {
    let auth = auth::validate_bearer(&ctx.cfg, bearer?)?;
    let permissions = ctx.permission_repo();
    let uc = DeleteInstallTask {
        permissions: permissions.as_ref(),
        orchestrator: ctx.orchestrator(),
    };
    let deleted = uc
        .execute(auth.tenant_id, auth.role, task_id)
        .await
        .map_err(|e| delete_task_status(&e))?;
    Ok(Json(DeletedResponse { deleted }))
}

#[utoipa::path(post, path = "/api/plugin/tasks/{task_id}/delete/{identifier}", tag = "Plugins", params(
    ("task_id" = Uuid, Path, description = "Task ID"),
    ("identifier" = String, Path, description = "Plugin identifier")
), responses((status = 200, body = DeletedResponse)))]
pub async fn delete_task_item(
    State(ctx): State<AppContext>,
    bearer: Result<Bearer, StatusCode>,
    Path((task_id, identifier)): Path<(Uuid, String)>,
) -> Result<Json<DeletedResponse>, StatusCode> {
    let auth = auth::validate_bearer(&ctx.cfg, bearer?)?;
    let identifier = parse_identifier(identifier.trim_start_matches('/'))?;
    let permissions = ctx.permission_repo();
    let uc = DeleteInstallTaskItem {
        permissions: permissions.as_ref(),
        orchestrator: ctx.orchestrator(),
    };
    let deleted = uc
        .execute(auth.tenant_id, auth.role, task_id, &identifier)
        .await
        .map_err(|e| delete_task_status(&e))?;
    Ok(Json(DeletedResponse { deleted }))
}

#[utoipa::path(post, path = "/api/plugin/uninstall", tag = "Plugins", request_body = UninstallBody, responses(
    (status = 200, body = DeletedResponse)
))]
pub async fn uninstall(
    State(ctx): State<AppContext>,
    bearer: Result<Bearer, StatusCode>,
    Json(body): Json<UninstallBody>,
) -> Result<Json<DeletedResponse>, StatusCode> {
    let auth = auth::validate_bearer(&ctx.cfg, bearer?)?;
    let permissions = ctx.permission_repo();
    let uc = UninstallPlugin {
        permissions: permissions.as_ref(),
        orchestrator: ctx.orchestrator(),
    };
    let deleted = uc
        .execute(auth.tenant_id, auth.role, body.installation_id)
        .await
        .map_err(|e| match e {
            UninstallPluginError::Forbidden(_) => StatusCode::FORBIDDEN,
            UninstallPluginError::Uninstall(UninstallError::Busy(_)) => StatusCode::CONFLICT,
            UninstallPluginError::Uninstall(UninstallError::Storage(_)) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        })?;
    Ok(Json(DeletedResponse { deleted }))
}

#[utoipa::path(get, path = "/api/plugin/permission/fetch", tag = "Plugins", responses(
    (status = 200, body = PermissionResponse)
))]
pub async fn fetch_permission(
    State(ctx): State<AppContext>,
    bearer: Result<Bearer, StatusCode>,
) -> Result<Json<PermissionResponse>, StatusCode> {
    let auth = auth::validate_bearer(&ctx.cfg, bearer?)?;
    let permissions = ctx.permission_repo();
    let uc = GetPermission {
        permissions: permissions.as_ref(),
    };
    let permission = uc
        .execute(auth.tenant_id)
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    Ok(Json(permission.into()))
}

#[utoipa::path(post, path = "/api/plugin/permission/change", tag = "Plugins", request_body = PermissionBody, responses(
    (status = 200, body = PermissionResponse)
))]
pub async fn change_permission(
    State(ctx): State<AppContext>,
    bearer: Result<Bearer, StatusCode>,
    Json(body): Json<PermissionBody>,
) -> Result<Json<PermissionResponse>, StatusCode> {
    let auth = auth::validate_bearer(&ctx.cfg, bearer?)?;
    let permission = TenantPluginPermission {
        install_permission: body
            .install_permission
            .parse::<PermissionLevel>()
            .map_err(|_| StatusCode::BAD_REQUEST)?,
        debug_permission: body
            .debug_permission
            .parse::<PermissionLevel>()
            .map_err(|_| StatusCode::BAD_REQUEST)?,
    };
    let permissions = ctx.permission_repo();
    let uc = ChangePermission {
        permissions: permissions.as_ref(),
    };
    uc.execute(auth.tenant_id, auth.role, permission)
        .await
        .map_err(|e| match e {
            ChangePermissionError::Forbidden => StatusCode::FORBIDDEN,
            ChangePermissionError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        })?;
    Ok(Json(permission.into()))
}
