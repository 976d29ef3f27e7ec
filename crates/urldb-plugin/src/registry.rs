//! Plugin registry: the catalogue of loaded units and their lifecycle state.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::info;

use crate::config::ConfigSchema;
use crate::dependencies::DependencyGraph;
use crate::error::LoadError;
use crate::loader::{CompiledPlugin, PluginSource, ScheduledTaskInfo};

/// Lifecycle state of a plugin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PluginState {
    /// Found but not yet compiled.
    Discovered,
    /// Compiled; registrations not installed.
    Loaded,
    /// Registrations installed.
    Enabled,
    /// Registrations removed; config and history kept.
    Disabled,
    /// Removed from the runtime.
    Uninstalled,
}

impl std::fmt::Display for PluginState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Discovered => "discovered",
            Self::Loaded => "loaded",
            Self::Enabled => "enabled",
            Self::Disabled => "disabled",
            Self::Uninstalled => "uninstalled",
        };
        f.write_str(name)
    }
}

/// Lock-free view of every plugin's state, shared with plugin contexts.
#[derive(Debug, Default)]
pub struct PluginStates {
    states: DashMap<String, PluginState>,
}

impl PluginStates {
    /// Current state of `plugin`, if it is known.
    pub fn get(&self, plugin: &str) -> Option<PluginState> {
        self.states.get(plugin).map(|s| *s)
    }

    /// Whether `plugin` is enabled.
    pub fn is_enabled(&self, plugin: &str) -> bool {
        self.get(plugin) == Some(PluginState::Enabled)
    }

    fn set(&self, plugin: &str, state: PluginState) {
        self.states.insert(plugin.to_string(), state);
    }

    fn remove(&self, plugin: &str) {
        self.states.remove(plugin);
    }
}

/// Metadata about a loaded plugin.
#[derive(Debug, Clone, Serialize)]
pub struct PluginInfo {
    /// Unique plugin name.
    pub name: String,
    /// Human-readable name.
    pub display_name: String,
    /// Version string.
    pub version: String,
    /// Author or maintainer.
    pub author: String,
    /// Category.
    pub category: String,
    /// Description.
    pub description: String,
    /// License.
    pub license: String,
    /// Declared dependencies.
    pub dependencies: Vec<String>,
    /// Declared permissions.
    pub permissions: Vec<String>,
    /// Hook points the plugin subscribes to.
    pub hooks: Vec<String>,
    /// Config schema.
    pub config_schema: ConfigSchema,
    /// Whether the plugin is enabled.
    pub enabled: bool,
    /// Lifecycle state.
    pub state: PluginState,
    /// Where the unit was loaded from.
    pub source_location: String,
    /// Cron literals found in the unit's text.
    pub scheduled_tasks: Vec<ScheduledTaskInfo>,
}

/// A registry row.
#[derive(Debug, Clone)]
pub struct PluginRecord {
    /// Compiled unit.
    pub compiled: Arc<CompiledPlugin>,
    /// The unit it was compiled from.
    pub source: PluginSource,
    /// Discovery sequence, fixed for the plugin's lifetime in the registry.
    pub seq: u64,
    /// Lifecycle state.
    pub state: PluginState,
}

impl PluginRecord {
    /// Builds the admin view of this record.
    pub fn info(&self) -> PluginInfo {
        let meta = &self.compiled.metadata;
        let mut hooks: Vec<String> = Vec::new();
        for decl in &self.compiled.declarations.hooks {
            let name = decl.hook.binding_name();
            if !hooks.iter().any(|h| h == name) {
                hooks.push(name.to_string());
            }
        }
        if hooks.is_empty() {
            hooks = meta.hooks.clone();
        }

        PluginInfo {
            name: meta.name.clone(),
            display_name: meta.display_name.clone(),
            version: meta.version.clone(),
            author: meta.author.clone(),
            category: meta.category.clone(),
            description: meta.description.clone(),
            license: meta.license.clone(),
            dependencies: meta.dependencies.clone(),
            permissions: meta.permissions.clone(),
            hooks,
            config_schema: meta.config_schema.clone(),
            enabled: self.state == PluginState::Enabled,
            state: self.state,
            source_location: self.compiled.location.clone(),
            scheduled_tasks: meta.scheduled_tasks.clone(),
        }
    }
}

/// Registry of all loaded plugins, keyed by name.
#[derive(Debug)]
pub struct PluginRegistry {
    plugins: RwLock<HashMap<String, PluginRecord>>,
    states: Arc<PluginStates>,
    next_seq: AtomicU64,
}

impl PluginRegistry {
    /// Creates an empty registry publishing states into `states`.
    pub fn new(states: Arc<PluginStates>) -> Self {
        Self {
            plugins: RwLock::new(HashMap::new()),
            states,
            next_seq: AtomicU64::new(0),
        }
    }

    /// Registers a freshly compiled unit in state `Loaded`.
    ///
    /// Fails with [`LoadError::DuplicatePlugin`] if the name is taken.
    pub async fn register(
        &self,
        compiled: CompiledPlugin,
        source: PluginSource,
    ) -> Result<PluginRecord, LoadError> {
        let name = compiled.metadata.name.clone();
        let mut plugins = self.plugins.write().await;

        if let Some(existing) = plugins.get(&name) {
            return Err(LoadError::DuplicatePlugin {
                plugin: name,
                existing: existing.compiled.location.clone(),
            });
        }

        let record = PluginRecord {
            compiled: Arc::new(compiled),
            source,
            seq: self.next_seq.fetch_add(1, Ordering::SeqCst),
            state: PluginState::Loaded,
        };

        info!(
            plugin = %name,
            version = %record.compiled.metadata.version,
            seq = record.seq,
            "Registering plugin"
        );

        plugins.insert(name.clone(), record.clone());
        self.states.set(&name, PluginState::Loaded);
        Ok(record)
    }

    /// Swaps the compiled unit of `name`, keeping its sequence and state.
    pub async fn replace_unit(
        &self,
        name: &str,
        compiled: Arc<CompiledPlugin>,
        source: PluginSource,
    ) -> Option<PluginRecord> {
        let mut plugins = self.plugins.write().await;
        let record = plugins.get_mut(name)?;
        record.compiled = compiled;
        record.source = source;
        Some(record.clone())
    }

    /// Updates the lifecycle state of `name`.
    pub async fn set_state(&self, name: &str, state: PluginState) -> bool {
        let mut plugins = self.plugins.write().await;
        match plugins.get_mut(name) {
            Some(record) => {
                record.state = state;
                self.states.set(name, state);
                true
            }
            None => false,
        }
    }

    /// Removes `name` from the registry.
    pub async fn remove(&self, name: &str) -> Option<PluginRecord> {
        let mut plugins = self.plugins.write().await;
        let record = plugins.remove(name)?;
        self.states.remove(name);
        info!(plugin = %name, "Plugin unregistered");
        Some(record)
    }

    /// Gets a plugin by name.
    pub async fn get(&self, name: &str) -> Option<PluginRecord> {
        self.plugins.read().await.get(name).cloned()
    }

    /// Checks whether a plugin is registered.
    pub async fn contains(&self, name: &str) -> bool {
        self.plugins.read().await.contains_key(name)
    }

    /// Lists all plugins in discovery order.
    pub async fn list(&self) -> Vec<PluginInfo> {
        let plugins = self.plugins.read().await;
        let mut records: Vec<&PluginRecord> = plugins.values().collect();
        records.sort_by_key(|r| r.seq);
        records.into_iter().map(PluginRecord::info).collect()
    }

    /// Dependency graph of every registered plugin, in discovery order.
    pub async fn dependency_graph(&self) -> DependencyGraph {
        let plugins = self.plugins.read().await;
        let mut records: Vec<&PluginRecord> = plugins.values().collect();
        records.sort_by_key(|r| r.seq);

        let mut graph = DependencyGraph::new();
        for record in records {
            let meta = &record.compiled.metadata;
            graph.add(&meta.name, &meta.dependencies);
        }
        graph
    }

    /// Returns `(total, enabled)` counts.
    pub async fn counts(&self) -> (usize, usize) {
        let plugins = self.plugins.read().await;
        let enabled = plugins
            .values()
            .filter(|r| r.state == PluginState::Enabled)
            .count();
        (plugins.len(), enabled)
    }

    /// The shared state view.
    pub fn states(&self) -> &Arc<PluginStates> {
        &self.states
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::bindings::PluginBindings;
    use crate::api::context::HostServices;
    use crate::error::HandlerError;
    use crate::loader::{PluginScript, ScriptLoader};

    struct Empty;

    impl PluginScript for Empty {
        fn setup(&self, _bindings: &mut PluginBindings) -> Result<(), HandlerError> {
            Ok(())
        }
    }

    fn compile(loader: &ScriptLoader, header: &str) -> (CompiledPlugin, PluginSource) {
        let source = PluginSource::new("unit.rs", header.to_string(), Empty);
        (loader.compile(&source).unwrap(), source)
    }

    #[tokio::test]
    async fn test_register_assigns_sequence_and_rejects_duplicates() {
        let loader = ScriptLoader::new(Arc::new(HostServices::in_memory(std::env::temp_dir())));
        let registry = PluginRegistry::new(Arc::new(PluginStates::default()));

        let (a, src_a) = compile(&loader, "// @name alpha");
        let (b, src_b) = compile(&loader, "// @name beta");
        assert_eq!(registry.register(a, src_a).await.unwrap().seq, 0);
        assert_eq!(registry.register(b, src_b).await.unwrap().seq, 1);

        let (dup, src_dup) = compile(&loader, "// @name alpha\n// @version 2.0");
        assert!(matches!(
            registry.register(dup, src_dup).await,
            Err(LoadError::DuplicatePlugin { .. })
        ));

        let names: Vec<String> = registry.list().await.into_iter().map(|p| p.name).collect();
        assert_eq!(names, vec!["alpha", "beta"]);
    }

    #[tokio::test]
    async fn test_state_changes_are_published() {
        let loader = ScriptLoader::new(Arc::new(HostServices::in_memory(std::env::temp_dir())));
        let states = Arc::new(PluginStates::default());
        let registry = PluginRegistry::new(states.clone());

        let (a, src) = compile(&loader, "// @name alpha");
        registry.register(a, src).await.unwrap();
        assert_eq!(states.get("alpha"), Some(PluginState::Loaded));

        assert!(registry.set_state("alpha", PluginState::Enabled).await);
        assert!(states.is_enabled("alpha"));
        assert_eq!(registry.counts().await, (1, 1));

        registry.remove("alpha").await;
        assert_eq!(states.get("alpha"), None);
        assert!(!registry.set_state("alpha", PluginState::Enabled).await);
    }
}
