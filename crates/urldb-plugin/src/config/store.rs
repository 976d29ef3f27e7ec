//! Canonical per-plugin config: schema registry, cache, and persistence.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use serde_json::{Map, Value};
use tokio::sync::{Mutex, RwLock};
use tracing::info;

use urldb_core::traits::{PluginStateStore, StoredConfig};

use super::schema::{ConfigSchema, PluginConfig};
use super::validator;
use crate::error::{PluginError, PluginResult};

/// Holds each plugin's schema and serves its merged, validated config.
///
/// Writes are serialized per plugin. Readers get an `Arc` snapshot, so a
/// concurrent `set` is observed either fully or not at all.
#[derive(Debug)]
pub struct ConfigStore {
    store: Arc<dyn PluginStateStore>,
    schemas: RwLock<HashMap<String, Arc<ConfigSchema>>>,
    cache: RwLock<HashMap<String, Arc<PluginConfig>>>,
    write_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl ConfigStore {
    /// Creates a config store over `store`.
    pub fn new(store: Arc<dyn PluginStateStore>) -> Self {
        Self {
            store,
            schemas: RwLock::new(HashMap::new()),
            cache: RwLock::new(HashMap::new()),
            write_locks: DashMap::new(),
        }
    }

    /// Installs or replaces the schema of `plugin`.
    pub async fn register_schema(&self, plugin: &str, schema: ConfigSchema) {
        let lock = self.write_lock(plugin);
        let _guard = lock.lock().await;
        self.schemas
            .write()
            .await
            .insert(plugin.to_string(), Arc::new(schema));
        self.cache.write().await.remove(plugin);
    }

    /// Forgets the schema and cached values of `plugin`.
    pub async fn forget(&self, plugin: &str) {
        let lock = self.write_lock(plugin);
        let _guard = lock.lock().await;
        self.schemas.write().await.remove(plugin);
        self.cache.write().await.remove(plugin);
        self.write_locks.remove(plugin);
    }

    /// Returns the schema of `plugin`.
    pub async fn schema(&self, plugin: &str) -> PluginResult<Arc<ConfigSchema>> {
        self.schemas
            .read()
            .await
            .get(plugin)
            .cloned()
            .ok_or_else(|| PluginError::NotFound(plugin.to_string()))
    }

    /// Validates `submitted` without persisting it.
    pub async fn validate(
        &self,
        plugin: &str,
        submitted: &Map<String, Value>,
    ) -> PluginResult<PluginConfig> {
        let schema = self.schema(plugin).await?;
        let values = validator::validate(plugin, &schema, submitted)?;
        Ok(PluginConfig {
            plugin_name: plugin.to_string(),
            values,
            updated_at: None,
        })
    }

    /// Returns persisted values merged over schema defaults.
    pub async fn get(&self, plugin: &str) -> PluginResult<Arc<PluginConfig>> {
        if let Some(cached) = self.cache.read().await.get(plugin) {
            return Ok(cached.clone());
        }

        let lock = self.write_lock(plugin);
        let _guard = lock.lock().await;
        if let Some(cached) = self.cache.read().await.get(plugin) {
            return Ok(cached.clone());
        }

        let schema = self.schema(plugin).await?;
        let stored = self.store.load_config(plugin).await?;
        let (values, updated_at) = match &stored {
            Some(s) => (validator::merge_stored(plugin, &schema, &s.values), Some(s.updated_at)),
            None => (schema.defaults(), None),
        };

        let config = Arc::new(PluginConfig {
            plugin_name: plugin.to_string(),
            values,
            updated_at,
        });
        self.cache
            .write()
            .await
            .insert(plugin.to_string(), config.clone());
        Ok(config)
    }

    /// Validates and persists a full replacement of `plugin`'s config.
    pub async fn set(
        &self,
        plugin: &str,
        submitted: &Map<String, Value>,
    ) -> PluginResult<Arc<PluginConfig>> {
        let lock = self.write_lock(plugin);
        let _guard = lock.lock().await;

        let mut config = self.validate(plugin, submitted).await?;
        let now = Utc::now();
        self.store
            .save_config(&StoredConfig {
                plugin_name: plugin.to_string(),
                values: config.to_json(),
                updated_at: now,
            })
            .await?;

        config.updated_at = Some(now);
        let config = Arc::new(config);
        self.cache
            .write()
            .await
            .insert(plugin.to_string(), config.clone());

        info!(plugin = %plugin, fields = config.values.len(), "Plugin config updated");
        Ok(config)
    }

    /// Persists schema defaults when nothing has been stored yet.
    pub async fn seed_defaults(&self, plugin: &str) -> PluginResult<()> {
        let lock = self.write_lock(plugin);
        let _guard = lock.lock().await;

        if self.store.load_config(plugin).await?.is_some() {
            return Ok(());
        }
        let schema = self.schema(plugin).await?;
        let defaults: Map<String, Value> = schema
            .defaults()
            .into_iter()
            .map(|(k, v)| (k, v.to_json()))
            .collect();

        self.store
            .save_config(&StoredConfig {
                plugin_name: plugin.to_string(),
                values: defaults,
                updated_at: Utc::now(),
            })
            .await?;
        self.cache.write().await.remove(plugin);
        Ok(())
    }

    fn write_lock(&self, plugin: &str) -> Arc<Mutex<()>> {
        self.write_locks
            .entry(plugin.to_string())
            .or_default()
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::config::schema::{ConfigFieldDescriptor, ConfigValue, FieldType};
    use crate::store::MemoryStateStore;

    fn schema() -> ConfigSchema {
        schema_with_limit(10.0)
    }

    fn schema_with_limit(limit: f64) -> ConfigSchema {
        ConfigSchema::new(vec![
            ConfigFieldDescriptor {
                key: "limit".into(),
                field_type: FieldType::Number,
                label: "Limit".into(),
                description: String::new(),
                default_value: Some(ConfigValue::Number(limit)),
                optional: false,
                options: Vec::new(),
            },
            ConfigFieldDescriptor {
                key: "label".into(),
                field_type: FieldType::String,
                label: "Label".into(),
                description: String::new(),
                default_value: None,
                optional: true,
                options: Vec::new(),
            },
        ])
    }

    #[tokio::test]
    async fn test_set_then_get_round_trips() {
        let store = ConfigStore::new(Arc::new(MemoryStateStore::new()));
        store.register_schema("p", schema()).await;

        let submitted = json!({ "limit": 25, "label": "hi" });
        store
            .set("p", submitted.as_object().unwrap())
            .await
            .unwrap();

        let config = store.get("p").await.unwrap();
        assert_eq!(config.get_i64("limit"), Some(25));
        assert_eq!(config.get_str("label"), Some("hi"));
        assert!(config.updated_at.is_some());
    }

    #[tokio::test]
    async fn test_new_field_default_survives_old_storage() {
        let backing = Arc::new(MemoryStateStore::new());
        backing
            .save_config(&StoredConfig {
                plugin_name: "p".into(),
                values: json!({ "label": "old" }).as_object().cloned().unwrap(),
                updated_at: Utc::now(),
            })
            .await
            .unwrap();

        let store = ConfigStore::new(backing);
        store.register_schema("p", schema()).await;
        let config = store.get("p").await.unwrap();
        assert_eq!(config.get_i64("limit"), Some(10));
        assert_eq!(config.get_str("label"), Some("old"));
    }

    #[tokio::test]
    async fn test_rejected_set_keeps_previous_values() {
        let store = ConfigStore::new(Arc::new(MemoryStateStore::new()));
        store.register_schema("p", schema()).await;

        let bad = json!({ "limit": "many" });
        let err = store.set("p", bad.as_object().unwrap()).await.unwrap_err();
        assert!(matches!(err, PluginError::Validation(_)));
        assert_eq!(store.get("p").await.unwrap().get_i64("limit"), Some(10));
    }

    #[tokio::test]
    async fn test_schema_swap_waits_for_pending_write() {
        let store = Arc::new(ConfigStore::new(Arc::new(MemoryStateStore::new())));
        store.register_schema("p", schema()).await;
        assert_eq!(store.get("p").await.unwrap().get_i64("limit"), Some(10));

        let lock = store.write_lock("p");
        let guard = lock.lock().await;

        let swapping = tokio::spawn({
            let store = store.clone();
            async move { store.register_schema("p", schema_with_limit(50.0)).await }
        });
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert!(!swapping.is_finished());
        assert_eq!(store.get("p").await.unwrap().get_i64("limit"), Some(10));

        drop(guard);
        swapping.await.unwrap();
        assert_eq!(store.get("p").await.unwrap().get_i64("limit"), Some(50));

        let lock = store.write_lock("p");
        let guard = lock.lock().await;
        let forgetting = tokio::spawn({
            let store = store.clone();
            async move { store.forget("p").await }
        });
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert!(!forgetting.is_finished());
        drop(guard);
        forgetting.await.unwrap();
        assert!(matches!(store.get("p").await, Err(PluginError::NotFound(_))));
    }
}
