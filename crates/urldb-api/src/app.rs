//! Application builder: wires the plugin runtime, storage and router into
//! a running server.

use std::path::Path;
use std::sync::Arc;

use axum::Router;

use urldb_core::config::AppConfig;
use urldb_core::error::AppError;
use urldb_core::events::AppInfo;
use urldb_core::traits::{PluginDatabase, PluginStateStore};
use urldb_database::{DatabasePool, PgPluginDatabase, PgPluginStateStore};
use urldb_plugin::PluginManager;
use urldb_plugin::api::services::UnavailableDatabase;
use urldb_plugin::manager::LoadReport;
use urldb_plugin::store::MemoryStateStore;

use crate::router::build_router;
use crate::state::AppState;

/// Builds the complete Axum application.
pub fn build_app(state: AppState) -> Router {
    build_router(state)
}

/// Runs the URLDB server until a shutdown signal arrives.
pub async fn run_server(config: AppConfig) -> Result<(), AppError> {
    tracing::info!("Starting URLDB v{}", env!("CARGO_PKG_VERSION"));

    // ── Step 1: Create data directories ──────────────────────────
    create_data_directories(&config).await?;

    // ── Step 2: Database connection + migrations ─────────────────
    let database = DatabasePool::connect_if_configured(&config.database).await?;
    if let Some(db) = &database {
        tracing::info!("Running database migrations...");
        urldb_database::migration::run_migrations(db.pool()).await?;
    } else {
        tracing::warn!("No database configured; plugin state is kept in memory");
    }

    // ── Step 3: Plugin state stores ──────────────────────────────
    let (store, plugin_db): (Arc<dyn PluginStateStore>, Arc<dyn PluginDatabase>) = match &database
    {
        Some(db) => (
            Arc::new(PgPluginStateStore::new(db.pool().clone())),
            Arc::new(PgPluginDatabase::new(db.pool().clone())),
        ),
        None => (Arc::new(MemoryStateStore::new()), Arc::new(UnavailableDatabase)),
    };

    // ── Step 4: Initialize plugin manager ────────────────────────
    let app_info = AppInfo {
        name: "URLDB".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    };
    let plugins = Arc::new(PluginManager::new(&config.plugins, store, plugin_db, app_info)?);

    for source in urldb_builtin_plugins::catalogue() {
        plugins.catalogue().add(source).await.map_err(|e| {
            AppError::plugin(format!("Built-in plugin rejected by the catalogue: {e}"))
        })?;
    }

    // ── Step 5: Load plugins ─────────────────────────────────────
    if config.plugins.auto_install_builtin {
        let report = plugins.load_all(urldb_builtin_plugins::catalogue()).await;
        log_report("builtin", &report);
    }

    if config.plugins.auto_load {
        let report = plugins
            .load_directory(Path::new(&config.plugins.directory))
            .await;
        log_report(&config.plugins.directory, &report);
    }

    plugins.start().await?;

    // ── Step 6: Build application ────────────────────────────────
    let state = AppState::new(Arc::new(config.clone()), Arc::clone(&plugins), database.clone());
    let app = build_app(state);

    // ── Step 7: Start HTTP server ────────────────────────────────
    let addr = config.server.bind_address();
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| AppError::internal(format!("Failed to bind to {addr}: {e}")))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| AppError::internal(format!("Server error: {e}")))?;

    // ── Step 8: Shutdown ─────────────────────────────────────────
    tracing::info!("Shutting down...");
    if let Err(e) = plugins.shutdown().await {
        tracing::warn!("Cron scheduler did not stop cleanly: {}", e);
    }
    if let Some(db) = database {
        db.close().await;
    }

    tracing::info!("Server stopped");
    Ok(())
}

fn log_report(origin: &str, report: &LoadReport) {
    for failure in &report.failed {
        tracing::error!(
            origin = %origin,
            location = %failure.location,
            plugin = ?failure.plugin,
            error = %failure.error,
            "Plugin not started"
        );
    }
    tracing::info!(
        origin = %origin,
        loaded = report.loaded.len(),
        enabled = report.enabled.len(),
        failed = report.failed.len(),
        "Plugin load finished"
    );
}

/// Creates required data directories.
async fn create_data_directories(config: &AppConfig) -> Result<(), AppError> {
    for dir in [&config.plugins.data_directory, &config.plugins.directory] {
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| AppError::internal(format!("Failed to create directory '{dir}': {e}")))?;
    }
    Ok(())
}

/// Waits for Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
