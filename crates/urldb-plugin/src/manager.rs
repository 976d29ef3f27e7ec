//! Plugin manager: lifecycle management for all plugins.
//!
//! `Discovered -> Loaded -> Enabled <-> Disabled -> Uninstalled`.
//! Transitions are serialized by one lifecycle lock; dispatch, route
//! resolution and cron ticks never take it.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use serde::Serialize;
use serde_json::{Map, Value, json};
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use urldb_core::config::PluginsConfig;
use urldb_core::events::AppInfo;
use urldb_core::result::AppResult;
use urldb_core::traits::{PluginDatabase, PluginStateStore};

use crate::api::context::HostServices;
use crate::api::services::{HttpClient, UnavailableDatabase};
use crate::config::{ConfigStore, PluginConfig};
use crate::cron::{CronJobInfo, CronScheduler, JobOutcome};
use crate::dependencies::DependencyGraph;
use crate::error::{LoadError, PluginError, PluginResult};
use crate::hooks::dispatcher::panic_message;
use crate::hooks::{
    DispatchOutcome, HookDispatcher, HookEntry, HookEvent, HookRegistry, HookSubscription,
    RegistrationOrder,
};
use crate::loader::{CatalogueEntry, DynamicLoader, PluginSource, ScriptCatalogue, ScriptLoader};
use crate::logs::{LogLevel, PluginLogBook, PluginLogEntry};
use crate::migration::{MigrationRunner, MigrationStatus};
use crate::registry::{PluginInfo, PluginRecord, PluginRegistry, PluginState, PluginStates};
use crate::routes::{RouteEntry, RouteInfo, RouteRegistry, RouteRequest, RouteResponse};
use crate::stats::{PluginStats, PluginStatsSnapshot, StatEvent};
use crate::store::MemoryStateStore;

/// One unit that failed to load or start.
#[derive(Debug, Clone, Serialize)]
pub struct LoadFailure {
    /// Source location.
    pub location: String,
    /// Plugin name, when it got that far.
    pub plugin: Option<String>,
    /// Error message.
    pub error: String,
}

/// Result of loading a batch of units.
#[derive(Debug, Clone, Default, Serialize)]
pub struct LoadReport {
    /// Plugins registered, in discovery order.
    pub loaded: Vec<String>,
    /// Plugins that ended up enabled.
    pub enabled: Vec<String>,
    /// Units that failed; the rest of the batch is unaffected.
    pub failed: Vec<LoadFailure>,
}

impl LoadReport {
    fn merge(&mut self, other: LoadReport) {
        self.loaded.extend(other.loaded);
        self.enabled.extend(other.enabled);
        self.failed.extend(other.failed);
    }
}

/// Everything the admin API shows for one plugin.
#[derive(Debug, Clone, Serialize)]
pub struct PluginDetail {
    /// Metadata and state.
    #[serde(flatten)]
    pub info: PluginInfo,
    /// Merged config values.
    pub config: Map<String, Value>,
    /// Live hook subscriptions.
    pub subscriptions: Vec<HookSubscription>,
    /// Live routes.
    pub routes: Vec<RouteInfo>,
    /// Cron jobs, including paused ones.
    pub cron_jobs: Vec<CronJobInfo>,
    /// Declared migrations and their applied state.
    pub migrations: Vec<MigrationStatus>,
    /// Execution counters.
    pub stats: PluginStatsSnapshot,
}

/// Manages the full lifecycle of plugins and routes host events into them.
pub struct PluginManager {
    host: Arc<HostServices>,
    store: Arc<dyn PluginStateStore>,
    registry: Arc<PluginRegistry>,
    hook_registry: Arc<HookRegistry>,
    dispatcher: Arc<HookDispatcher>,
    routes: Arc<RouteRegistry>,
    scheduler: Arc<CronScheduler>,
    migrations: Arc<MigrationRunner>,
    catalogue: Arc<ScriptCatalogue>,
    stats: Arc<PluginStats>,
    loader: ScriptLoader,
    lifecycle: Mutex<()>,
    // Declared last so libraries are unloaded after every script.
    dynamic: Mutex<DynamicLoader>,
}

impl std::fmt::Debug for PluginManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginManager")
            .field("data_root", &self.host.data_root)
            .finish()
    }
}

impl PluginManager {
    /// Creates a manager persisting through `store`.
    pub fn new(
        settings: &PluginsConfig,
        store: Arc<dyn PluginStateStore>,
        database: Arc<dyn PluginDatabase>,
        app: AppInfo,
    ) -> AppResult<Self> {
        let http = HttpClient::new(Duration::from_secs(settings.http_timeout_seconds))?;
        Ok(Self::assemble(settings, store, database, http, app))
    }

    /// Creates a self-contained manager with in-memory state and no database.
    pub fn in_memory(data_root: impl Into<PathBuf>) -> Self {
        let settings = PluginsConfig {
            data_directory: data_root.into().display().to_string(),
            ..PluginsConfig::default()
        };
        Self::assemble(
            &settings,
            Arc::new(MemoryStateStore::new()),
            Arc::new(UnavailableDatabase),
            HttpClient::default(),
            AppInfo::default(),
        )
    }

    fn assemble(
        settings: &PluginsConfig,
        store: Arc<dyn PluginStateStore>,
        database: Arc<dyn PluginDatabase>,
        http: HttpClient,
        app: AppInfo,
    ) -> Self {
        let log_book = Arc::new(PluginLogBook::new(settings.log_buffer_size));
        let stats = Arc::new(PluginStats::new());
        let states = Arc::new(PluginStates::default());

        let host = Arc::new(HostServices {
            config: Arc::new(ConfigStore::new(store.clone())),
            log_book: log_book.clone(),
            states: states.clone(),
            database,
            http,
            data_root: PathBuf::from(&settings.data_directory),
            app,
        });

        let hook_registry = Arc::new(HookRegistry::new());
        let dispatcher = Arc::new(HookDispatcher::new(
            hook_registry.clone(),
            log_book.clone(),
            stats.clone(),
        ));
        let scheduler = Arc::new(CronScheduler::new(
            Duration::from_secs(settings.cron_job_timeout_seconds),
            log_book.clone(),
            stats.clone(),
        ));

        Self {
            loader: ScriptLoader::new(host.clone()),
            registry: Arc::new(PluginRegistry::new(states)),
            migrations: Arc::new(MigrationRunner::new(store.clone(), log_book)),
            routes: Arc::new(RouteRegistry::new()),
            catalogue: Arc::new(ScriptCatalogue::new()),
            lifecycle: Mutex::new(()),
            dynamic: Mutex::new(DynamicLoader::new()),
            host,
            store,
            hook_registry,
            dispatcher,
            scheduler,
            stats,
        }
    }

    // ── Loading ───────────────────────────────────────────────────

    /// Compiles and registers a unit in state `Loaded`.
    pub async fn load(&self, source: PluginSource) -> PluginResult<PluginInfo> {
        let _guard = self.lifecycle.lock().await;
        Ok(self.load_locked(source).await?.info())
    }

    /// Loads a batch, then starts each plugin unless its persisted flag
    /// says it was disabled. Failures are isolated per unit.
    ///
    /// Units are loaded in dependency order, ties kept in discovery order;
    /// plugins on a dependency cycle fail. Starting a plugin applies its
    /// pending migrations before its registrations go live.
    pub async fn load_all(&self, sources: Vec<PluginSource>) -> LoadReport {
        let _guard = self.lifecycle.lock().await;
        let mut report = LoadReport::default();

        // ── Step 1: Read headers ──────────────────────────────────
        let mut graph = DependencyGraph::new();
        let mut units: HashMap<String, PluginSource> = HashMap::new();
        let mut discovered = Vec::new();
        let mut duplicates = Vec::new();
        for source in sources {
            match self.loader.parse(&source) {
                Ok(meta) if graph.contains(&meta.name) => duplicates.push(source),
                Ok(meta) => {
                    graph.add(&meta.name, &meta.dependencies);
                    discovered.push(meta.name.clone());
                    units.insert(meta.name, source);
                }
                Err(err) => report.fail(&source.location, err.into()),
            }
        }

        // ── Step 2: Order by dependencies ─────────────────────────
        let plan = graph.load_order();
        for name in &discovered {
            if let (Some(cycle), Some(source)) = (plan.cycle_of(name), units.get(name)) {
                let err = PluginError::DependencyCycle {
                    cycle: cycle.to_vec(),
                };
                error!(plugin = %name, error = %err, "Plugin not loaded");
                report.failed.push(LoadFailure {
                    location: source.location.clone(),
                    plugin: Some(name.clone()),
                    error: err.to_string(),
                });
            }
        }

        // ── Step 3: Compile and register ──────────────────────────
        let mut ordered: Vec<PluginSource> =
            plan.order.iter().filter_map(|name| units.remove(name)).collect();
        ordered.extend(duplicates);
        for source in ordered {
            let location = source.location.clone();
            match self.load_locked(source).await {
                Ok(record) => report.loaded.push(record.compiled.metadata.name.clone()),
                Err(err) => report.fail(&location, err),
            }
        }

        // ── Step 4: Migrate and enable ────────────────────────────
        for name in report.loaded.clone() {
            match self.restore_locked(&name).await {
                Ok(true) => report.enabled.push(name),
                Ok(false) => {}
                Err(err) => {
                    let location = self
                        .registry
                        .get(&name)
                        .await
                        .map(|r| r.compiled.location.clone())
                        .unwrap_or_default();
                    report.fail(&location, err);
                }
            }
        }

        info!(
            loaded = report.loaded.len(),
            enabled = report.enabled.len(),
            failed = report.failed.len(),
            "Plugins loaded"
        );
        report
    }

    /// Discovers shared-library plugins in `dir` and loads them like
    /// [`load_all`](Self::load_all).
    pub async fn load_directory(&self, dir: &Path) -> LoadReport {
        // SAFETY: the plugin directory is operator-controlled configuration;
        // libraries found there are trusted by deployment.
        let discovered = unsafe { self.dynamic.lock().await.discover(dir) };

        let mut sources = Vec::new();
        let mut report = LoadReport::default();
        for result in discovered {
            match result {
                Ok(source) => sources.push(source),
                Err(err) => report.failed.push(LoadFailure {
                    location: dir.display().to_string(),
                    plugin: None,
                    error: err.to_string(),
                }),
            }
        }

        report.merge(self.load_all(sources).await);
        report
    }

    async fn load_locked(&self, source: PluginSource) -> PluginResult<PluginRecord> {
        let metadata = self.loader.parse(&source)?;
        if let Some(existing) = self.registry.get(&metadata.name).await {
            return Err(LoadError::DuplicatePlugin {
                plugin: metadata.name,
                existing: existing.compiled.location.clone(),
            }
            .into());
        }

        let compiled = self.loader.compile(&source)?;
        let name = compiled.metadata.name.clone();
        let schema = compiled.metadata.config_schema.clone();

        let record = self.registry.register(compiled, source).await?;
        self.host.config.register_schema(&name, schema).await;
        Ok(record)
    }

    async fn restore_locked(&self, name: &str) -> PluginResult<bool> {
        if self.store.load_enabled(name).await? == Some(false) {
            self.registry.set_state(name, PluginState::Disabled).await;
            info!(plugin = %name, "Plugin left disabled");
            return Ok(false);
        }

        let record = self.record(name).await?;
        self.require_dependencies(name, &record.compiled.metadata.dependencies)?;
        self.host.config.seed_defaults(name).await?;
        self.migrate_or_disable(&record).await?;
        self.enable_locked(name).await?;
        Ok(true)
    }

    /// Applies pending migrations; on failure the plugin is left disabled.
    async fn migrate_or_disable(&self, record: &PluginRecord) -> PluginResult<()> {
        let name = record.compiled.metadata.name.as_str();
        let applied = self
            .migrations
            .apply(&record.compiled.context, &record.compiled.declarations.migrations)
            .await;

        match applied {
            Ok(ids) => {
                if !ids.is_empty() {
                    info!(plugin = %name, applied = ?ids, "Plugin migrations applied");
                }
                Ok(())
            }
            Err(err) => {
                self.registry.set_state(name, PluginState::Disabled).await;
                self.store.save_enabled(name, false).await?;
                warn!(plugin = %name, error = %err, "Plugin left disabled after migration failure");
                Err(err)
            }
        }
    }

    /// Fails unless every dependency is registered and enabled.
    fn require_dependencies(&self, name: &str, dependencies: &[String]) -> PluginResult<()> {
        let states = self.registry.states();
        let missing: Vec<String> = dependencies
            .iter()
            .filter(|dep| !states.is_enabled(dep))
            .cloned()
            .collect();
        if missing.is_empty() {
            return Ok(());
        }
        Err(PluginError::UnmetDependencies {
            plugin: name.to_string(),
            missing,
        })
    }

    /// Fails while an enabled plugin depends on `name`.
    async fn require_no_dependents(&self, name: &str, action: &'static str) -> PluginResult<()> {
        let states = self.registry.states();
        let dependents: Vec<String> = self
            .registry
            .dependency_graph()
            .await
            .dependents(name)
            .into_iter()
            .filter(|p| p != name && states.is_enabled(p))
            .collect();
        if dependents.is_empty() {
            return Ok(());
        }
        Err(PluginError::RequiredBy {
            plugin: name.to_string(),
            dependents,
            action,
        })
    }

    // ── Lifecycle ─────────────────────────────────────────────────

    /// Loads a unit, seeds its config defaults, applies its migrations and
    /// enables it.
    ///
    /// Every declared dependency must already be enabled. If a migration
    /// fails the plugin stays registered but disabled and the migration
    /// error is returned.
    pub async fn install(&self, source: PluginSource) -> PluginResult<PluginInfo> {
        let _guard = self.lifecycle.lock().await;
        let metadata = self.loader.parse(&source)?;
        self.require_dependencies(&metadata.name, &metadata.dependencies)?;

        let record = self.load_locked(source).await?;
        let name = record.compiled.metadata.name.clone();

        self.host.config.seed_defaults(&name).await?;
        self.migrate_or_disable(&record).await?;

        let info = self.enable_locked(&name).await?;
        info!(plugin = %name, version = %info.version, "Plugin installed");
        Ok(info)
    }

    /// Installs the catalogue unit named `name`.
    pub async fn install_from_catalogue(&self, name: &str) -> PluginResult<PluginInfo> {
        let source = self
            .catalogue
            .get(name)
            .await
            .ok_or_else(|| PluginError::NotFound(name.to_string()))?;
        self.install(source).await
    }

    /// Installs the plugin's registrations from its compiled unit.
    ///
    /// Migrations are not run. Enabling an enabled plugin is a no-op; a
    /// plugin whose dependencies are not all enabled is refused.
    pub async fn enable(&self, name: &str) -> PluginResult<PluginInfo> {
        let _guard = self.lifecycle.lock().await;
        self.enable_locked(name).await
    }

    async fn enable_locked(&self, name: &str) -> PluginResult<PluginInfo> {
        let record = self.record(name).await?;
        match record.state {
            PluginState::Enabled => return Ok(record.info()),
            PluginState::Loaded | PluginState::Disabled => {}
            state => return Err(PluginError::invalid_state(name, state, "enable")),
        }
        self.require_dependencies(name, &record.compiled.metadata.dependencies)?;

        self.activate(&record).await?;
        self.registry.set_state(name, PluginState::Enabled).await;
        self.store.save_enabled(name, true).await?;

        info!(plugin = %name, "Plugin enabled");
        Ok(self.record(name).await?.info())
    }

    /// Removes the plugin's hooks and routes and pauses its cron jobs.
    /// Config and migration history are kept. Refused while an enabled
    /// plugin depends on it.
    pub async fn disable(&self, name: &str) -> PluginResult<PluginInfo> {
        let _guard = self.lifecycle.lock().await;
        let record = self.record(name).await?;
        match record.state {
            PluginState::Enabled => {
                self.require_no_dependents(name, "disable").await?;
                self.deactivate(name).await;
            }
            PluginState::Loaded | PluginState::Disabled => {}
            state => return Err(PluginError::invalid_state(name, state, "disable")),
        }

        self.registry.set_state(name, PluginState::Disabled).await;
        self.store.save_enabled(name, false).await?;

        info!(plugin = %name, "Plugin disabled");
        Ok(self.record(name).await?.info())
    }

    /// Drops a disabled plugin together with its config and migration
    /// history.
    pub async fn uninstall(&self, name: &str) -> PluginResult<PluginInfo> {
        let _guard = self.lifecycle.lock().await;
        let record = self.record(name).await?;
        if record.state == PluginState::Enabled {
            return Err(PluginError::invalid_state(name, record.state, "uninstall"));
        }
        self.require_no_dependents(name, "uninstall").await?;

        self.scheduler.remove_plugin(name).await;
        self.host.config.forget(name).await;
        self.store.purge_plugin(name).await?;
        self.migrations.forget(name);
        self.registry.remove(name).await;
        self.stats.forget(name);
        self.host.log_book.clear(name);

        let mut info = record.info();
        info.state = PluginState::Uninstalled;
        info.enabled = false;

        info!(plugin = %name, "Plugin uninstalled");
        Ok(info)
    }

    /// Recompiles `name` from `source`.
    ///
    /// An enabled plugin has its hooks swapped, its routes replaced and its
    /// cron jobs reconciled. On a route conflict nothing changes.
    pub async fn reload(&self, name: &str, source: PluginSource) -> PluginResult<PluginInfo> {
        let _guard = self.lifecycle.lock().await;
        let record = self.record(name).await?;

        let compiled = self.loader.compile(&source)?;
        if compiled.metadata.name != name {
            return Err(LoadError::NameMismatch {
                plugin: name.to_string(),
                found: compiled.metadata.name,
            }
            .into());
        }

        let schema = compiled.metadata.config_schema.clone();
        let compiled = Arc::new(compiled);
        if record.state == PluginState::Enabled {
            let candidate = PluginRecord {
                compiled: compiled.clone(),
                source: source.clone(),
                ..record.clone()
            };
            self.activate(&candidate).await?;
        }

        self.registry.replace_unit(name, compiled, source).await;
        self.host.config.register_schema(name, schema).await;

        info!(plugin = %name, "Plugin reloaded");
        Ok(self.record(name).await?.info())
    }

    /// Reloads `name` from its catalogue unit.
    pub async fn reload_from_catalogue(&self, name: &str) -> PluginResult<PluginInfo> {
        let source = self
            .catalogue
            .get(name)
            .await
            .ok_or_else(|| PluginError::NotFound(name.to_string()))?;
        self.reload(name, source).await
    }

    async fn activate(&self, record: &PluginRecord) -> PluginResult<()> {
        let compiled = &record.compiled;
        let name = compiled.metadata.name.as_str();
        let declarations = &compiled.declarations;

        let routes = declarations
            .routes
            .iter()
            .map(|decl| RouteEntry {
                method: decl.method.clone(),
                pattern: decl.pattern.clone(),
                plugin: name.to_string(),
                handler: decl.handler.clone(),
                context: compiled.context.clone(),
            })
            .collect();
        self.routes.replace_plugin(name, routes).await?;

        let hooks = declarations
            .hooks
            .iter()
            .map(|decl| {
                let entry = HookEntry {
                    plugin: name.to_string(),
                    order: RegistrationOrder {
                        plugin: record.seq,
                        declaration: decl.declaration,
                    },
                    handler: decl.handler.clone(),
                    context: compiled.context.clone(),
                };
                (decl.hook, entry)
            })
            .collect();
        self.hook_registry.replace_plugin(name, hooks).await;

        self.scheduler
            .activate_plugin(name, &declarations.cron_jobs, &compiled.context)
            .await;
        Ok(())
    }

    async fn deactivate(&self, name: &str) {
        self.hook_registry.unregister_plugin(name).await;
        self.routes.unregister_plugin(name).await;
        self.scheduler.pause_plugin(name).await;
    }

    // ── Migrations ────────────────────────────────────────────────

    /// Applies pending migrations of an enabled plugin.
    pub async fn apply_migrations(&self, name: &str) -> PluginResult<Vec<u32>> {
        let _guard = self.lifecycle.lock().await;
        let record = self.enabled_record(name, "apply migrations").await?;
        self.migrations
            .apply(&record.compiled.context, &record.compiled.declarations.migrations)
            .await
    }

    /// Rolls back the `steps` most recent migrations of an enabled plugin.
    pub async fn rollback_migrations(&self, name: &str, steps: usize) -> PluginResult<Vec<u32>> {
        let _guard = self.lifecycle.lock().await;
        let record = self.enabled_record(name, "roll back migrations").await?;
        self.migrations
            .rollback(
                &record.compiled.context,
                &record.compiled.declarations.migrations,
                steps,
            )
            .await
    }

    /// Applied state of every declared migration.
    pub async fn migration_status(&self, name: &str) -> PluginResult<Vec<MigrationStatus>> {
        let record = self.record(name).await?;
        self.migrations
            .status(name, &record.compiled.declarations.migrations)
            .await
    }

    // ── Config ────────────────────────────────────────────────────

    /// Merged config of `name`.
    pub async fn get_config(&self, name: &str) -> PluginResult<Arc<PluginConfig>> {
        self.record(name).await?;
        self.host.config.get(name).await
    }

    /// Validates and stores a full replacement of `name`'s config.
    pub async fn update_config(
        &self,
        name: &str,
        values: &Map<String, Value>,
    ) -> PluginResult<Arc<PluginConfig>> {
        self.record(name).await?;
        self.host.config.set(name, values).await
    }

    // ── Runtime entry points ──────────────────────────────────────

    /// Runs the hook chain for `event`.
    pub async fn dispatch(&self, event: &mut HookEvent) -> DispatchOutcome {
        self.dispatcher.dispatch(event).await
    }

    /// Serves `request` from the plugin route table.
    ///
    /// Returns `None` when no route matches. A failing handler yields a
    /// 500 response; the failure is logged against its plugin.
    pub async fn handle_request(&self, mut request: RouteRequest) -> Option<RouteResponse> {
        let resolved = self.routes.resolve(&request.method, &request.path).await?;
        let entry = resolved.entry;
        request.params = resolved.params;

        let route = format!("{} {}", entry.method, entry.pattern.as_str());
        self.stats.record(&entry.plugin, StatEvent::RouteInvoked);

        let result = AssertUnwindSafe(entry.handler.handle(&entry.context, request))
            .catch_unwind()
            .await;
        let message = match result {
            Ok(Ok(response)) => return Some(response),
            Ok(Err(err)) => err.message,
            Err(payload) => panic_message(payload.as_ref()),
        };

        error!(plugin = %entry.plugin, route = %route, error = %message, "Route handler failed");
        self.stats.record(&entry.plugin, StatEvent::RouteFailed);
        self.host.log_book.append(
            &entry.plugin,
            LogLevel::Error,
            format!("{route} failed: {message}"),
            Some("route"),
        );

        Some(RouteResponse::json(
            500,
            json!({
                "error": "PLUGIN",
                "message": format!("plugin '{}' failed to handle {route}", entry.plugin),
            }),
        ))
    }

    /// Runs one cron job of an enabled plugin now and waits for it.
    pub async fn trigger_cron(&self, name: &str, job: &str) -> PluginResult<JobOutcome> {
        self.enabled_record(name, "run cron jobs").await?;
        let handle =
            self.scheduler
                .run_now(name, job)
                .await
                .ok_or_else(|| PluginError::JobNotFound {
                    plugin: name.to_string(),
                    job: job.to_string(),
                })?;
        Ok(handle
            .await
            .unwrap_or_else(|join| JobOutcome::Failed(join.to_string())))
    }

    /// Starts the cron ticker.
    pub async fn start(&self) -> AppResult<()> {
        self.scheduler.start().await
    }

    /// Stops the cron ticker.
    pub async fn shutdown(&self) -> AppResult<()> {
        self.scheduler.shutdown().await
    }

    // ── Queries ───────────────────────────────────────────────────

    /// Lists all loaded plugins in discovery order.
    pub async fn list_plugins(&self) -> Vec<PluginInfo> {
        self.registry.list().await
    }

    /// Metadata, config, registrations and stats of one plugin.
    pub async fn plugin_detail(&self, name: &str) -> PluginResult<PluginDetail> {
        let record = self.record(name).await?;
        let config = self.host.config.get(name).await?.to_json();
        Ok(PluginDetail {
            info: record.info(),
            config,
            subscriptions: self.hook_registry.subscriptions(Some(name)).await,
            routes: self.routes.routes(Some(name)).await,
            cron_jobs: self.scheduler.jobs(Some(name)).await,
            migrations: self
                .migrations
                .status(name, &record.compiled.declarations.migrations)
                .await?,
            stats: self.stats.snapshot(name),
        })
    }

    /// Recent log entries of `name`, oldest first.
    pub async fn logs(&self, name: &str, limit: Option<usize>) -> PluginResult<Vec<PluginLogEntry>> {
        self.record(name).await?;
        Ok(self.host.log_book.entries(name, limit))
    }

    /// Execution counters of `name`.
    pub async fn stats(&self, name: &str) -> PluginResult<PluginStatsSnapshot> {
        self.record(name).await?;
        Ok(self.stats.snapshot(name))
    }

    /// Execution counters of every plugin that ran.
    pub fn all_stats(&self) -> Vec<(String, PluginStatsSnapshot)> {
        self.stats.all()
    }

    /// Catalogue units not installed yet.
    pub async fn market(&self) -> Vec<CatalogueEntry> {
        let mut available = Vec::new();
        for entry in self.catalogue.list().await {
            if !self.registry.contains(&entry.name).await {
                available.push(entry);
            }
        }
        available
    }

    /// `(total, enabled)` plugin counts.
    pub async fn counts(&self) -> (usize, usize) {
        self.registry.counts().await
    }

    /// The market catalogue.
    pub fn catalogue(&self) -> &Arc<ScriptCatalogue> {
        &self.catalogue
    }

    /// Returns the hook dispatcher for firing hooks.
    pub fn dispatcher(&self) -> &Arc<HookDispatcher> {
        &self.dispatcher
    }

    /// Returns the hook registry.
    pub fn hook_registry(&self) -> &Arc<HookRegistry> {
        &self.hook_registry
    }

    /// Returns the route registry.
    pub fn routes(&self) -> &Arc<RouteRegistry> {
        &self.routes
    }

    /// Returns the cron scheduler.
    pub fn scheduler(&self) -> &Arc<CronScheduler> {
        &self.scheduler
    }

    /// Returns the plugin registry.
    pub fn plugin_registry(&self) -> &Arc<PluginRegistry> {
        &self.registry
    }

    /// Shared host services.
    pub fn host(&self) -> &Arc<HostServices> {
        &self.host
    }

    async fn record(&self, name: &str) -> PluginResult<PluginRecord> {
        self.registry
            .get(name)
            .await
            .ok_or_else(|| PluginError::NotFound(name.to_string()))
    }

    async fn enabled_record(&self, name: &str, action: &'static str) -> PluginResult<PluginRecord> {
        let record = self.record(name).await?;
        if record.state != PluginState::Enabled {
            return Err(PluginError::invalid_state(name, record.state, action));
        }
        Ok(record)
    }
}

impl LoadReport {
    fn fail(&mut self, location: &str, err: PluginError) {
        let plugin = plugin_of(&err);
        error!(location = %location, plugin = ?plugin, error = %err, "Plugin failed to start");
        self.failed.push(LoadFailure {
            location: location.to_string(),
            plugin,
            error: err.to_string(),
        });
    }
}

fn plugin_of(err: &PluginError) -> Option<String> {
    match err {
        PluginError::Load(load) => load.plugin().map(str::to_string),
        PluginError::DuplicateRoute(dup) => Some(dup.plugin.clone()),
        PluginError::UnmetDependencies { plugin, .. }
        | PluginError::RequiredBy { plugin, .. }
        | PluginError::InvalidState { plugin, .. }
        | PluginError::NotFound(plugin) => Some(plugin.clone()),
        PluginError::Migration(failed) => Some(failed.plugin.clone()),
        PluginError::Validation(invalid) => Some(invalid.plugin.clone()),
        _ => None,
    }
}
