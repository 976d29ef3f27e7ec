//! Plugin migrations: declared with `migrate(up, down)`, applied once each
//! in ascending id order, reversible most-recent-first.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use futures::FutureExt;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{error, info};

use urldb_core::traits::{AppliedMigration, PluginStateStore};

use crate::api::context::PluginContext;
use crate::error::{HandlerError, MigrationDirection, MigrationError, PluginResult};
use crate::hooks::dispatcher::panic_message;
use crate::logs::{LogLevel, PluginLogBook};

/// One direction of a migration.
#[async_trait]
pub trait MigrationStep: Send + Sync {
    /// Runs the step against the plugin's capabilities.
    async fn run(&self, ctx: &PluginContext) -> Result<(), HandlerError>;
}

/// A declared migration. Ids are 1-based in declaration order.
#[derive(Clone)]
pub struct Migration {
    /// Plugin-scoped id.
    pub id: u32,
    /// Forward step.
    pub up: Arc<dyn MigrationStep>,
    /// Reverse step.
    pub down: Arc<dyn MigrationStep>,
}

impl std::fmt::Debug for Migration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Migration").field("id", &self.id).finish()
    }
}

/// Applied state of one declared migration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationStatus {
    /// Migration id.
    pub id: u32,
    /// When `up` completed; `None` when pending.
    pub applied_at: Option<DateTime<Utc>>,
}

/// Runs plugin migrations and records their history.
#[derive(Debug)]
pub struct MigrationRunner {
    store: Arc<dyn PluginStateStore>,
    log_book: Arc<PluginLogBook>,
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl MigrationRunner {
    /// Creates a runner recording history in `store`.
    pub fn new(store: Arc<dyn PluginStateStore>, log_book: Arc<PluginLogBook>) -> Self {
        Self {
            store,
            log_book,
            locks: DashMap::new(),
        }
    }

    /// Runs `up` for every pending migration, lowest id first.
    ///
    /// Stops at the first failure; already applied steps stay applied.
    /// Returns the ids applied by this call.
    pub async fn apply(
        &self,
        ctx: &PluginContext,
        migrations: &[Migration],
    ) -> PluginResult<Vec<u32>> {
        let plugin = ctx.plugin_name();
        let lock = self.lock_for(plugin);
        let _guard = lock.lock().await;

        let applied: Vec<u32> = self
            .store
            .list_applied_migrations(plugin)
            .await?
            .into_iter()
            .map(|m| m.migration_id)
            .collect();

        let mut pending: Vec<&Migration> = migrations
            .iter()
            .filter(|m| !applied.contains(&m.id))
            .collect();
        pending.sort_by_key(|m| m.id);

        let mut done = Vec::new();
        for migration in pending {
            self.run_step(ctx, migration.id, MigrationDirection::Up, &migration.up)
                .await?;
            self.store
                .mark_migration_applied(&AppliedMigration {
                    plugin_name: plugin.to_string(),
                    migration_id: migration.id,
                    applied_at: Utc::now(),
                })
                .await?;
            done.push(migration.id);
        }

        if !done.is_empty() {
            info!(plugin = %plugin, applied = ?done, "Plugin migrations applied");
        }
        Ok(done)
    }

    /// Runs `down` for the `steps` most recently applied migrations,
    /// most recent first. Returns the ids rolled back.
    pub async fn rollback(
        &self,
        ctx: &PluginContext,
        migrations: &[Migration],
        steps: usize,
    ) -> PluginResult<Vec<u32>> {
        let plugin = ctx.plugin_name();
        let lock = self.lock_for(plugin);
        let _guard = lock.lock().await;

        let mut applied: Vec<u32> = self
            .store
            .list_applied_migrations(plugin)
            .await?
            .into_iter()
            .map(|m| m.migration_id)
            .collect();
        applied.sort_unstable();

        let mut reverted = Vec::new();
        for id in applied.into_iter().rev().take(steps) {
            let Some(migration) = migrations.iter().find(|m| m.id == id) else {
                return Err(MigrationError {
                    plugin: plugin.to_string(),
                    migration_id: id,
                    direction: MigrationDirection::Down,
                    reason: "migration is recorded as applied but no longer declared".to_string(),
                }
                .into());
            };
            self.run_step(ctx, id, MigrationDirection::Down, &migration.down)
                .await?;
            self.store.clear_migration(plugin, id).await?;
            reverted.push(id);
        }

        if !reverted.is_empty() {
            info!(plugin = %plugin, reverted = ?reverted, "Plugin migrations rolled back");
        }
        Ok(reverted)
    }

    /// Applied state of every declared migration.
    pub async fn status(
        &self,
        plugin: &str,
        migrations: &[Migration],
    ) -> PluginResult<Vec<MigrationStatus>> {
        let applied = self.store.list_applied_migrations(plugin).await?;
        Ok(migrations
            .iter()
            .map(|m| MigrationStatus {
                id: m.id,
                applied_at: applied
                    .iter()
                    .find(|a| a.migration_id == m.id)
                    .map(|a| a.applied_at),
            })
            .collect())
    }

    /// Drops the lock entry of an uninstalled plugin.
    pub fn forget(&self, plugin: &str) {
        self.locks.remove(plugin);
    }

    async fn run_step(
        &self,
        ctx: &PluginContext,
        id: u32,
        direction: MigrationDirection,
        step: &Arc<dyn MigrationStep>,
    ) -> Result<(), MigrationError> {
        let result = AssertUnwindSafe(step.run(ctx)).catch_unwind().await;
        let reason = match result {
            Ok(Ok(())) => return Ok(()),
            Ok(Err(err)) => err.message,
            Err(panic) => panic_message(panic.as_ref()),
        };

        let plugin = ctx.plugin_name();
        error!(
            plugin = %plugin,
            migration = id,
            direction = %direction,
            error = %reason,
            "Plugin migration failed"
        );
        self.log_book.append(
            plugin,
            LogLevel::Error,
            format!("migration {id} ({direction}) failed: {reason}"),
            Some("migration"),
        );
        Err(MigrationError {
            plugin: plugin.to_string(),
            migration_id: id,
            direction,
            reason,
        })
    }

    fn lock_for(&self, plugin: &str) -> Arc<Mutex<()>> {
        self.locks.entry(plugin.to_string()).or_default().clone()
    }
}
