//! Plugin state repository: enabled flags, config values, migration history.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use sqlx::types::Json;

use urldb_core::error::{AppError, ErrorKind};
use urldb_core::result::AppResult;
use urldb_core::traits::{AppliedMigration, PluginStateStore, StoredConfig};

/// [`PluginStateStore`] backed by the `plugin_*` tables.
#[derive(Debug, Clone)]
pub struct PgPluginStateStore {
    pool: PgPool,
}

impl PgPluginStateStore {
    /// Create a new plugin state repository.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn db_error(context: &'static str) -> impl FnOnce(sqlx::Error) -> AppError {
    move |e| AppError::with_source(ErrorKind::Database, context, e)
}

#[async_trait]
impl PluginStateStore for PgPluginStateStore {
    async fn load_enabled(&self, plugin: &str) -> AppResult<Option<bool>> {
        sqlx::query_scalar::<_, bool>("SELECT enabled FROM plugin_states WHERE plugin_name = $1")
            .bind(plugin)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error("Failed to load plugin state"))
    }

    async fn save_enabled(&self, plugin: &str, enabled: bool) -> AppResult<()> {
        sqlx::query(
            "INSERT INTO plugin_states (plugin_name, enabled, updated_at) VALUES ($1, $2, NOW()) \
             ON CONFLICT (plugin_name) DO UPDATE SET enabled = EXCLUDED.enabled, updated_at = NOW()",
        )
        .bind(plugin)
        .bind(enabled)
        .execute(&self.pool)
        .await
        .map_err(db_error("Failed to save plugin state"))?;
        Ok(())
    }

    async fn load_config(&self, plugin: &str) -> AppResult<Option<StoredConfig>> {
        let row = sqlx::query_as::<_, (Json<serde_json::Map<String, serde_json::Value>>, DateTime<Utc>)>(
            "SELECT settings, updated_at FROM plugin_configs WHERE plugin_name = $1",
        )
        .bind(plugin)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error("Failed to load plugin config"))?;

        Ok(row.map(|(Json(values), updated_at)| StoredConfig {
            plugin_name: plugin.to_string(),
            values,
            updated_at,
        }))
    }

    async fn save_config(&self, config: &StoredConfig) -> AppResult<()> {
        sqlx::query(
            "INSERT INTO plugin_configs (plugin_name, settings, updated_at) VALUES ($1, $2, $3) \
             ON CONFLICT (plugin_name) DO UPDATE SET settings = EXCLUDED.settings, \
             updated_at = EXCLUDED.updated_at",
        )
        .bind(&config.plugin_name)
        .bind(Json(&config.values))
        .bind(config.updated_at)
        .execute(&self.pool)
        .await
        .map_err(db_error("Failed to save plugin config"))?;
        Ok(())
    }

    async fn list_applied_migrations(&self, plugin: &str) -> AppResult<Vec<AppliedMigration>> {
        let rows = sqlx::query_as::<_, (i32, DateTime<Utc>)>(
            "SELECT migration_id, applied_at FROM plugin_migrations \
             WHERE plugin_name = $1 ORDER BY migration_id",
        )
        .bind(plugin)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error("Failed to list plugin migrations"))?;

        Ok(rows
            .into_iter()
            .map(|(id, applied_at)| AppliedMigration {
                plugin_name: plugin.to_string(),
                migration_id: id as u32,
                applied_at,
            })
            .collect())
    }

    async fn mark_migration_applied(&self, record: &AppliedMigration) -> AppResult<()> {
        sqlx::query(
            "INSERT INTO plugin_migrations (plugin_name, migration_id, applied_at) \
             VALUES ($1, $2, $3) ON CONFLICT (plugin_name, migration_id) DO NOTHING",
        )
        .bind(&record.plugin_name)
        .bind(record.migration_id as i32)
        .bind(record.applied_at)
        .execute(&self.pool)
        .await
        .map_err(db_error("Failed to record plugin migration"))?;
        Ok(())
    }

    async fn clear_migration(&self, plugin: &str, migration_id: u32) -> AppResult<()> {
        sqlx::query("DELETE FROM plugin_migrations WHERE plugin_name = $1 AND migration_id = $2")
            .bind(plugin)
            .bind(migration_id as i32)
            .execute(&self.pool)
            .await
            .map_err(db_error("Failed to clear plugin migration"))?;
        Ok(())
    }

    async fn purge_plugin(&self, plugin: &str) -> AppResult<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(db_error("Failed to begin transaction"))?;
        for table in ["plugin_states", "plugin_configs", "plugin_migrations"] {
            sqlx::query(&format!("DELETE FROM {table} WHERE plugin_name = $1"))
                .bind(plugin)
                .execute(&mut *tx)
                .await
                .map_err(db_error("Failed to purge plugin state"))?;
        }
        tx.commit()
            .await
            .map_err(db_error("Failed to commit plugin purge"))?;
        Ok(())
    }
}
