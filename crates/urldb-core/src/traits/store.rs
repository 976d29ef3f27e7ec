//! Persistence seam for plugin runtime state.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::result::AppResult;

/// Persisted configuration values of one plugin.
///
/// Values are stored as JSON; the runtime converts them to typed values
/// against the plugin's schema on the way out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredConfig {
    /// Owning plugin.
    pub plugin_name: String,
    /// Field key to JSON value.
    pub values: serde_json::Map<String, serde_json::Value>,
    /// Time of the last write.
    pub updated_at: DateTime<Utc>,
}

/// A migration that has been applied for a plugin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedMigration {
    /// Owning plugin.
    pub plugin_name: String,
    /// Plugin-scoped migration identifier.
    pub migration_id: u32,
    /// When `up` completed.
    pub applied_at: DateTime<Utc>,
}

/// Durable storage for everything the runtime must remember across
/// restarts: enabled flags, configuration, and migration history.
///
/// Implementations must be safe for concurrent use; each call is atomic
/// with respect to the record it touches.
#[async_trait]
pub trait PluginStateStore: Send + Sync + std::fmt::Debug {
    /// Returns the persisted enabled flag, if one was ever written.
    async fn load_enabled(&self, plugin: &str) -> AppResult<Option<bool>>;

    /// Persists the enabled flag.
    async fn save_enabled(&self, plugin: &str, enabled: bool) -> AppResult<()>;

    /// Returns the persisted configuration, if any.
    async fn load_config(&self, plugin: &str) -> AppResult<Option<StoredConfig>>;

    /// Replaces the persisted configuration as a single write.
    async fn save_config(&self, config: &StoredConfig) -> AppResult<()>;

    /// Lists applied migrations for a plugin in ascending id order.
    async fn list_applied_migrations(&self, plugin: &str) -> AppResult<Vec<AppliedMigration>>;

    /// Records a migration as applied.
    async fn mark_migration_applied(&self, record: &AppliedMigration) -> AppResult<()>;

    /// Clears the applied marker of one migration.
    async fn clear_migration(&self, plugin: &str, migration_id: u32) -> AppResult<()>;

    /// Removes every record belonging to a plugin.
    async fn purge_plugin(&self, plugin: &str) -> AppResult<()>;
}
