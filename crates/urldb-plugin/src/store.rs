//! In-memory [`PluginStateStore`], used when no database is configured
//! and throughout the tests.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use tokio::sync::RwLock;

use urldb_core::result::AppResult;
use urldb_core::traits::{AppliedMigration, PluginStateStore, StoredConfig};

/// Process-local plugin state. Lost on restart.
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    enabled: RwLock<HashMap<String, bool>>,
    configs: RwLock<HashMap<String, StoredConfig>>,
    migrations: RwLock<HashMap<String, BTreeMap<u32, AppliedMigration>>>,
}

impl MemoryStateStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PluginStateStore for MemoryStateStore {
    async fn load_enabled(&self, plugin: &str) -> AppResult<Option<bool>> {
        Ok(self.enabled.read().await.get(plugin).copied())
    }

    async fn save_enabled(&self, plugin: &str, enabled: bool) -> AppResult<()> {
        self.enabled
            .write()
            .await
            .insert(plugin.to_string(), enabled);
        Ok(())
    }

    async fn load_config(&self, plugin: &str) -> AppResult<Option<StoredConfig>> {
        Ok(self.configs.read().await.get(plugin).cloned())
    }

    async fn save_config(&self, config: &StoredConfig) -> AppResult<()> {
        self.configs
            .write()
            .await
            .insert(config.plugin_name.clone(), config.clone());
        Ok(())
    }

    async fn list_applied_migrations(&self, plugin: &str) -> AppResult<Vec<AppliedMigration>> {
        Ok(self
            .migrations
            .read()
            .await
            .get(plugin)
            .map(|m| m.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn mark_migration_applied(&self, record: &AppliedMigration) -> AppResult<()> {
        self.migrations
            .write()
            .await
            .entry(record.plugin_name.clone())
            .or_default()
            .insert(record.migration_id, record.clone());
        Ok(())
    }

    async fn clear_migration(&self, plugin: &str, migration_id: u32) -> AppResult<()> {
        if let Some(applied) = self.migrations.write().await.get_mut(plugin) {
            applied.remove(&migration_id);
        }
        Ok(())
    }

    async fn purge_plugin(&self, plugin: &str) -> AppResult<()> {
        self.enabled.write().await.remove(plugin);
        self.configs.write().await.remove(plugin);
        self.migrations.write().await.remove(plugin);
        Ok(())
    }
}
