//! Request DTOs.

use serde::Deserialize;

/// Body of `POST /api/plugins/install`.
#[derive(Debug, Clone, Deserialize)]
pub struct InstallPluginRequest {
    /// Catalogue entry to install.
    pub name: String,
}

/// Query of `POST /api/plugins/{name}/migrations/rollback`.
#[derive(Debug, Clone, Deserialize)]
pub struct RollbackQuery {
    /// Number of migrations to revert, most recent first.
    #[serde(default = "default_steps")]
    pub steps: usize,
}

fn default_steps() -> usize {
    1
}

/// Query of `GET /api/plugins/{name}/logs`.
#[derive(Debug, Clone, Deserialize)]
pub struct LogsQuery {
    /// Newest entries to return.
    pub limit: Option<usize>,
}
