use axum::{Json, Router, extract::State, routing::get};
use serde::Serialize;
use sqlx::PgPool;
use utoipa::ToSchema;

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthStatus {
    pub status: &'static str,
    pub database: &'static str,
}

/// Liveness plus a database reachability probe. Install workers depend on
/// Postgres for every status write, so a degraded answer here means tasks
/// will stall.
#[utoipa::path(
    get,
    path = "/api/health",
    tag = "Health",
    responses((status = 200, body = HealthStatus))
)]
pub async fn health(State(pool): State<PgPool>) -> Json<HealthStatus> {
    let (status, database) = match sqlx::query_scalar::<_, i32>("SELECT 1")
        .fetch_one(&pool)
        .await
    {
        Ok(_) => ("ok", "reachable"),
        Err(_) => ("degraded", "unreachable"),
    };
    Json(HealthStatus { status, database })
}

pub fn routes(pool: PgPool) -> Router {
    Router::new().route("/health", get(health)).with_state(pool)
}
