//! Application state shared across all handlers and middleware.

use std::sync::Arc;
use std::time::Instant;

use urldb_core::config::AppConfig;
use urldb_database::DatabasePool;
use urldb_plugin::PluginManager;

/// Shared handler state, passed via `State<AppState>`.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Application configuration
    pub config: Arc<AppConfig>,
    /// Plugin runtime
    pub plugins: Arc<PluginManager>,
    /// PostgreSQL pool, absent when running with in-memory state
    pub database: Option<DatabasePool>,
    /// Process start, for uptime reporting
    pub started_at: Instant,
}

impl AppState {
    /// Creates state for a running plugin runtime.
    pub fn new(
        config: Arc<AppConfig>,
        plugins: Arc<PluginManager>,
        database: Option<DatabasePool>,
    ) -> Self {
        Self {
            config,
            plugins,
            database,
            started_at: Instant::now(),
        }
    }
}
