use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::extract::MatchedPath;
use dotenvy::dotenv;
use http::HeaderValue;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use api::application::services::install::{InstallOrchestrator, PackageAcquirer};
use api::bootstrap::app_context::{AppContext, AppServices};
use api::bootstrap::config::Config;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
        paths(
            api::presentation::http::plugins::debugging_key,
            api::presentation::http::plugins::list_installations,
            api::presentation::http::plugins::upload_pkg,
            api::presentation::http::plugins::upload_from_github,
            api::presentation::http::plugins::install_from_pkg,
            api::presentation::http::plugins::install_from_github,
            api::presentation::http::plugins::install_from_marketplace,
            api::presentation::http::plugins::upgrade_from_marketplace,
            api::presentation::http::plugins::upgrade_from_github,
            api::presentation::http::plugins::fetch_manifest,
            api::presentation::http::plugins::list_tasks,
            api::presentation::http::plugins::fetch_task,
            api::presentation::http::plugins::delete_task,
            api::presentation::http::plugins::delete_task_item,
            api::presentation::http::plugins::uninstall,
            api::presentation::http::plugins::fetch_permission,
            api::presentation::http::plugins::change_permission,
            api::presentation::http::health::health,
        ),
        components(schemas(
            api::presentation::http::plugins::TaskResponse,
            api::presentation::http::plugins::TaskItemResponse,
            api::presentation::http::plugins::TaskListResponse,
            api::presentation::http::plugins::ManifestResponse,
            api::presentation::http::plugins::InstallationItem,
            api::presentation::http::plugins::InstallationListResponse,
            api::presentation::http::plugins::DeletedResponse,
            api::presentation::http::plugins::DebuggingKeyResponse,
            api::presentation::http::plugins::UploadGithubBody,
            api::presentation::http::plugins::InstallPkgBody,
            api::presentation::http::plugins::InstallGithubBody,
            api::presentation::http::plugins::InstallMarketplaceBody,
            api::presentation::http::plugins::UpgradeMarketplaceBody,
            api::presentation::http::plugins::UpgradeGithubBody,
            api::presentation::http::plugins::UninstallBody,
            api::presentation::http::plugins::PermissionBody,
            api::presentation::http::plugins::PermissionResponse,
            api::presentation::http::health::HealthStatus,
        )),
        tags(
            (name = "Plugins", description = "Plugin installation & lifecycle"),
            (name = "Health", description = "System health checks")
        )
    )]
struct ApiDoc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "api=debug,axum=info,tower_http=info".into()),
        )
        .init();

    let cfg = Config::from_env()?;
    info!(?cfg, "Starting plugin service");

    // Database
    let pool = api::infrastructure::db::connect_pool(&cfg.database_url).await?;
    api::infrastructure::db::migrate(&pool).await?;

    let task_repo = Arc::new(
        api::infrastructure::db::repositories::install_task_repository_sqlx::SqlxInstallTaskRepository::new(
            pool.clone(),
        ),
    );
    let registry_repo = Arc::new(
        api::infrastructure::db::repositories::plugin_registry_repository_sqlx::SqlxPluginRegistryRepository::new(
            pool.clone(),
        ),
    );
    let permission_repo = Arc::new(
        api::infrastructure::db::repositories::permission_repository_sqlx::SqlxPermissionRepository::new(
            pool.clone(),
        ),
    );
    let debugging_keys = Arc::new(
        api::infrastructure::db::repositories::debugging_key_repository_sqlx::SqlxDebuggingKeyRepository::new(
            pool.clone(),
        ),
    );
    let github_client = Arc::new(
        api::infrastructure::sources::github_reqwest::ReqwestGithubReleaseClient::new(),
    );
    let marketplace_client = Arc::new(
        api::infrastructure::sources::marketplace_reqwest::ReqwestMarketplaceClient::new(
            &cfg.marketplace_api_url,
        ),
    );

    let acquirer = PackageAcquirer::new(
        github_client,
        marketplace_client,
        cfg.max_package_size,
        Duration::from_secs(cfg.remote_fetch_timeout_secs),
    );
    let orchestrator = InstallOrchestrator::new(
        task_repo,
        registry_repo,
        acquirer,
        Duration::from_secs(cfg.upload_cache_ttl_secs),
    );

    let services = AppServices::new(permission_repo, debugging_keys, orchestrator.clone());
    let ctx = AppContext::new(cfg.clone(), services);

    // Build CORS
    let cors = if let Some(origin) = cfg.frontend_url.clone() {
        match HeaderValue::from_str(&origin) {
            Ok(v) => CorsLayer::new()
                .allow_origin(v)
                .allow_methods([http::Method::GET, http::Method::POST, http::Method::OPTIONS])
                .allow_headers([http::header::CONTENT_TYPE, http::header::AUTHORIZATION])
                .allow_credentials(true),
            Err(_) => CorsLayer::new()
                .allow_origin(AllowOrigin::mirror_request())
                .allow_methods([http::Method::GET, http::Method::POST, http::Method::OPTIONS])
                .allow_headers([http::header::CONTENT_TYPE, http::header::AUTHORIZATION])
                .allow_credentials(true),
        }
    } else if cfg.is_production {
        // FRONTEND_URL is mandatory in production (enforced earlier); deny all
        // as a fallback rather than mirroring.
        CorsLayer::new()
            .allow_origin(AllowOrigin::exact(HeaderValue::from_static("http://invalid")))
            .allow_methods([http::Method::GET, http::Method::POST, http::Method::OPTIONS])
            .allow_headers([http::header::CONTENT_TYPE, http::header::AUTHORIZATION])
    } else {
        // Development convenience
        CorsLayer::new()
            .allow_origin(AllowOrigin::mirror_request())
            .allow_methods([http::Method::GET, http::Method::POST, http::Method::OPTIONS])
            .allow_headers([http::header::CONTENT_TYPE, http::header::AUTHORIZATION])
            .allow_credentials(true)
    };

    let app = Router::new()
        .nest(
            "/api",
            api::presentation::http::health::routes(pool.clone()),
        )
        .nest(
            "/api",
            api::presentation::http::plugins::routes(ctx.clone()),
        )
        .merge(SwaggerUi::new("/api/docs").url("/api/openapi.json", ApiDoc::openapi()))
        .layer(cors)
        // Body limit sized from the package limit so oversized uploads are
        // rejected before buffering.
        .layer(DefaultBodyLimit::max(cfg.max_package_size))
        .layer(
            TraceLayer::new_for_http().make_span_with(|req: &http::Request<_>| {
                let method = req.method().clone();
                let uri = req.uri().clone();
                let matched = req
                    .extensions()
                    .get::<MatchedPath>()
                    .map(|p| p.as_str().to_string())
                    .unwrap_or_default();
                tracing::info_span!("http", %method, %uri, matched_path = %matched)
            }),
        );

    let api_addr = SocketAddr::from(([0, 0, 0, 0], cfg.api_port));
    info!(%api_addr, "HTTP API listening");
    let listener = tokio::net::TcpListener::bind(api_addr).await?;

    let api_handle: JoinHandle<anyhow::Result<()>> = tokio::spawn(async move {
        axum::serve(listener, app).await?;
        Ok(())
    });

    // Background eviction of expired uploaded packages
    let prune_orchestrator = orchestrator.clone();
    let prune_interval = Duration::from_secs(cfg.upload_cache_ttl_secs.max(60));
    let prune_handle: JoinHandle<anyhow::Result<()>> = tokio::spawn(async move {
        loop {
            sleep(prune_interval).await;
            let evicted = prune_orchestrator.prune_uploads().await;
            if evicted > 0 {
                tracing::debug!(evicted, "upload_cache_pruned");
            }
        }
    });

    match api_handle.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!(?e, "API server task failed"),
        Err(e) => error!(?e, "API server task panicked"),
    }

    prune_handle.abort();
    Ok(())
}
