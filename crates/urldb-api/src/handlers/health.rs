//! Health check handler.

use axum::Json;
use axum::extract::State;

use crate::dto::response::{ApiResponse, HealthResponse};
use crate::state::AppState;

/// GET /api/health
pub async fn health(State(state): State<AppState>) -> Json<ApiResponse<HealthResponse>> {
    let database = match &state.database {
        None => "memory",
        Some(pool) => match pool.health_check().await {
            Ok(true) => "connected",
            _ => "unreachable",
        },
    };
    let (plugins_total, plugins_enabled) = state.plugins.counts().await;

    Json(ApiResponse::ok(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.started_at.elapsed().as_secs(),
        database: database.to_string(),
        plugins_total,
        plugins_enabled,
    }))
}
