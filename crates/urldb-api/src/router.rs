//! Route definitions for the URLDB HTTP API.
//!
//! Administrative routes live under `/api`. Anything they do not claim
//! falls through to the plugin route table.

use std::time::Duration;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    middleware as axum_middleware,
    routing::{get, post},
};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::middleware;
use crate::state::AppState;

/// Build the complete Axum router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    let max_body = state.config.server.max_body_bytes;
    let timeout = Duration::from_secs(state.config.server.request_timeout_seconds);

    let api_routes = Router::new()
        .merge(health_routes())
        .merge(plugin_routes());

    Router::new()
        .nest("/api", api_routes)
        .fallback(handlers::dispatch::plugin_route)
        .layer(DefaultBodyLimit::max(max_body))
        .layer(TimeoutLayer::new(timeout))
        .layer(TraceLayer::new_for_http())
        .layer(axum_middleware::from_fn(middleware::logging::request_logging))
        .with_state(state)
}

fn health_routes() -> Router<AppState> {
    Router::new().route("/health", get(handlers::health::health))
}

/// Plugin administration: lifecycle, config, logs, migrations, cron
fn plugin_routes() -> Router<AppState> {
    use handlers::plugin;

    Router::new()
        .route("/plugins", get(plugin::list_plugins))
        .route("/plugins/stats", get(plugin::all_stats))
        .route("/plugins/market", get(plugin::market))
        .route("/plugins/install", post(plugin::install))
        .route(
            "/plugins/{name}",
            get(plugin::get_plugin).delete(plugin::uninstall),
        )
        .route("/plugins/{name}/enable", post(plugin::enable))
        .route("/plugins/{name}/disable", post(plugin::disable))
        .route("/plugins/{name}/reload", post(plugin::reload))
        .route(
            "/plugins/{name}/config",
            get(plugin::get_config).put(plugin::update_config),
        )
        .route("/plugins/{name}/logs", get(plugin::logs))
        .route(
            "/plugins/{name}/migrations/apply",
            post(plugin::apply_migrations),
        )
        .route(
            "/plugins/{name}/migrations/rollback",
            post(plugin::rollback_migrations),
        )
        .route("/plugins/{name}/cron/{job}/run", post(plugin::run_cron_job))
}
