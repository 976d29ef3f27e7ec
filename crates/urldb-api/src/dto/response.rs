//! Response DTOs.

use serde::{Deserialize, Serialize};

use urldb_plugin::stats::PluginStatsSnapshot;

/// Standard success response wrapper.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T: Serialize> {
    /// Whether the request was successful.
    pub success: bool,
    /// Response data.
    pub data: T,
}

impl<T: Serialize> ApiResponse<T> {
    /// Creates a successful response.
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data,
        }
    }
}

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Status.
    pub status: String,
    /// Version.
    pub version: String,
    /// Uptime.
    pub uptime_seconds: u64,
    /// `connected`, `unreachable` or `memory`.
    pub database: String,
    /// Loaded plugins.
    pub plugins_total: usize,
    /// Enabled plugins.
    pub plugins_enabled: usize,
}

/// One row of `GET /api/plugins/stats`.
#[derive(Debug, Clone, Serialize)]
pub struct PluginStatsEntry {
    /// Plugin name.
    pub plugin: String,
    /// Counters.
    #[serde(flatten)]
    pub stats: PluginStatsSnapshot,
}

/// Result of a migration apply or rollback.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationResult {
    /// Plugin name.
    pub plugin: String,
    /// Migration ids run, in execution order.
    pub migrations: Vec<u32>,
}
