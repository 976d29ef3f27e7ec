//! Plugin administration handlers.

use axum::Json;
use axum::extract::{Path, Query, State};
use serde_json::{Map, Value};

use urldb_plugin::PluginInfo;
use urldb_plugin::config::PluginConfig;
use urldb_plugin::cron::JobOutcome;
use urldb_plugin::loader::CatalogueEntry;
use urldb_plugin::logs::PluginLogEntry;
use urldb_plugin::manager::PluginDetail;

use crate::dto::request::{InstallPluginRequest, LogsQuery, RollbackQuery};
use crate::dto::response::{ApiResponse, MigrationResult, PluginStatsEntry};
use crate::error::ApiError;
use crate::state::AppState;

type ApiResult<T> = Result<Json<ApiResponse<T>>, ApiError>;

/// GET /api/plugins
pub async fn list_plugins(State(state): State<AppState>) -> Json<ApiResponse<Vec<PluginInfo>>> {
    Json(ApiResponse::ok(state.plugins.list_plugins().await))
}

/// GET /api/plugins/stats
pub async fn all_stats(State(state): State<AppState>) -> Json<ApiResponse<Vec<PluginStatsEntry>>> {
    let entries = state
        .plugins
        .all_stats()
        .into_iter()
        .map(|(plugin, stats)| PluginStatsEntry { plugin, stats })
        .collect();
    Json(ApiResponse::ok(entries))
}

/// GET /api/plugins/market
pub async fn market(State(state): State<AppState>) -> Json<ApiResponse<Vec<CatalogueEntry>>> {
    Json(ApiResponse::ok(state.plugins.market().await))
}

/// POST /api/plugins/install
pub async fn install(
    State(state): State<AppState>,
    Json(req): Json<InstallPluginRequest>,
) -> ApiResult<PluginInfo> {
    let info = state.plugins.install_from_catalogue(&req.name).await?;
    Ok(Json(ApiResponse::ok(info)))
}

/// GET /api/plugins/{name}
pub async fn get_plugin(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<PluginDetail> {
    Ok(Json(ApiResponse::ok(state.plugins.plugin_detail(&name).await?)))
}

/// DELETE /api/plugins/{name}
pub async fn uninstall(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<PluginInfo> {
    Ok(Json(ApiResponse::ok(state.plugins.uninstall(&name).await?)))
}

/// POST /api/plugins/{name}/enable
pub async fn enable(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<PluginInfo> {
    Ok(Json(ApiResponse::ok(state.plugins.enable(&name).await?)))
}

/// POST /api/plugins/{name}/disable
pub async fn disable(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<PluginInfo> {
    Ok(Json(ApiResponse::ok(state.plugins.disable(&name).await?)))
}

/// POST /api/plugins/{name}/reload
pub async fn reload(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<PluginInfo> {
    Ok(Json(ApiResponse::ok(
        state.plugins.reload_from_catalogue(&name).await?,
    )))
}

/// GET /api/plugins/{name}/config
pub async fn get_config(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<PluginConfig> {
    let config = state.plugins.get_config(&name).await?;
    Ok(Json(ApiResponse::ok(config.as_ref().clone())))
}

/// PUT /api/plugins/{name}/config
pub async fn update_config(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(values): Json<Map<String, Value>>,
) -> ApiResult<PluginConfig> {
    let config = state.plugins.update_config(&name, &values).await?;
    Ok(Json(ApiResponse::ok(config.as_ref().clone())))
}

/// GET /api/plugins/{name}/logs
pub async fn logs(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(query): Query<LogsQuery>,
) -> ApiResult<Vec<PluginLogEntry>> {
    Ok(Json(ApiResponse::ok(
        state.plugins.logs(&name, query.limit).await?,
    )))
}

/// POST /api/plugins/{name}/migrations/apply
pub async fn apply_migrations(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<MigrationResult> {
    let migrations = state.plugins.apply_migrations(&name).await?;
    Ok(Json(ApiResponse::ok(MigrationResult {
        plugin: name,
        migrations,
    })))
}

/// POST /api/plugins/{name}/migrations/rollback?steps=n
pub async fn rollback_migrations(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(query): Query<RollbackQuery>,
) -> ApiResult<MigrationResult> {
    let migrations = state
        .plugins
        .rollback_migrations(&name, query.steps)
        .await?;
    Ok(Json(ApiResponse::ok(MigrationResult {
        plugin: name,
        migrations,
    })))
}

/// POST /api/plugins/{name}/cron/{job}/run
pub async fn run_cron_job(
    State(state): State<AppState>,
    Path((name, job)): Path<(String, String)>,
) -> ApiResult<JobOutcome> {
    Ok(Json(ApiResponse::ok(
        state.plugins.trigger_cron(&name, &job).await?,
    )))
}
