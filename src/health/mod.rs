//! Health endpoints. `/health` pings the database; `/health/live` and
//! `/health/version` answer without touching it.

use crate::db::{self, DbPool};
use axum::{extract::State, http::StatusCode, response::Json, routing::get, Router};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Instant;
use tracing::warn;
use utoipa::ToSchema;

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Up,
    Down,
}

#[derive(Serialize, Debug, Clone, ToSchema)]
pub struct HealthInfo {
    pub status: HealthStatus,
    pub database: HealthStatus,
    /// Round trip of the database ping
    pub database_latency_ms: u64,
    pub version: String,
    pub timestamp: DateTime<Utc>,
    pub uptime_seconds: u64,
}

pub struct HealthState {
    pool: Arc<DbPool>,
    started: Instant,
}

/// Database ping plus uptime.
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service and database are up", body = HealthInfo),
        (status = 503, description = "Database unreachable", body = HealthInfo)
    ),
    tag = "health"
)]
pub async fn health_check(State(health): State<Arc<HealthState>>) -> (StatusCode, Json<HealthInfo>) {
    let ping_started = Instant::now();
    let database = match db::check_connection(&health.pool).await {
        Ok(()) => HealthStatus::Up,
        Err(e) => {
            warn!(error = %e, "health check could not reach the database");
            HealthStatus::Down
        }
    };
    let info = HealthInfo {
        status: database,
        database,
        database_latency_ms: ping_started.elapsed().as_millis() as u64,
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now(),
        uptime_seconds: health.started.elapsed().as_secs(),
    };

    let code = if database == HealthStatus::Up {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (code, Json(info))
}

async fn liveness(State(health): State<Arc<HealthState>>) -> Json<Value> {
    Json(json!({
        "alive": true,
        "uptime_seconds": health.started.elapsed().as_secs(),
    }))
}

async fn version() -> Json<Value> {
    Json(json!({
        "name": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Health routes carry their own state so they merge into any router.
pub fn health_routes<S>(pool: Arc<DbPool>) -> Router<S> {
    let health = Arc::new(HealthState {
        pool,
        started: Instant::now(),
    });
    Router::new()
        .route("/health", get(health_check))
        .route("/health/live", get(liveness))
        .route("/health/version", get(version))
        .with_state(health)
}
