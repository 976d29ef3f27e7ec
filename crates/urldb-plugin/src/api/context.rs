//! Plugin context: the capability object every handler receives.
//!
//! A context is bound to one plugin. Config access, logging and the
//! filesystem sandbox are attributed to that plugin.

use std::path::PathBuf;
use std::sync::Arc;

use serde_json::{Map, Value};

use urldb_core::events::AppInfo;
use urldb_core::result::AppResult;
use urldb_core::traits::PluginDatabase;

use super::services::{HttpClient, PluginFs, Security, UnavailableDatabase};
use crate::config::{ConfigStore, PluginConfig};
use crate::logs::{LogLevel, PluginLogBook};
use crate::registry::PluginStates;
use crate::store::MemoryStateStore;

/// Shared host services behind every [`PluginContext`].
#[derive(Debug)]
pub struct HostServices {
    /// Config store.
    pub config: Arc<ConfigStore>,
    /// Plugin log book.
    pub log_book: Arc<PluginLogBook>,
    /// Live plugin states, for `is_plugin_enabled`.
    pub states: Arc<PluginStates>,
    /// Raw database access.
    pub database: Arc<dyn PluginDatabase>,
    /// Outbound HTTP.
    pub http: HttpClient,
    /// Parent of every plugin's data directory.
    pub data_root: PathBuf,
    /// Host application info.
    pub app: AppInfo,
}

impl HostServices {
    /// Self-contained services with in-memory state and no database.
    pub fn in_memory(data_root: impl Into<PathBuf>) -> Self {
        Self {
            config: Arc::new(ConfigStore::new(Arc::new(MemoryStateStore::new()))),
            log_book: Arc::new(PluginLogBook::default()),
            states: Arc::new(PluginStates::default()),
            database: Arc::new(UnavailableDatabase),
            http: HttpClient::default(),
            data_root: data_root.into(),
            app: AppInfo::default(),
        }
    }
}

/// Capabilities handed to plugin code.
#[derive(Clone)]
pub struct PluginContext {
    plugin: Arc<str>,
    host: Arc<HostServices>,
}

impl std::fmt::Debug for PluginContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginContext")
            .field("plugin", &self.plugin)
            .finish()
    }
}

impl PluginContext {
    /// Binds `host` to `plugin`.
    pub fn new(plugin: &str, host: Arc<HostServices>) -> Self {
        Self {
            plugin: Arc::from(plugin),
            host,
        }
    }

    /// Name of the plugin this context belongs to.
    pub fn plugin_name(&self) -> &str {
        &self.plugin
    }

    /// Host application info.
    pub fn app(&self) -> &AppInfo {
        &self.host.app
    }

    /// This plugin's merged config.
    pub async fn config(&self) -> AppResult<Arc<PluginConfig>> {
        self.get_plugin_config(&self.plugin).await
    }

    /// Any plugin's merged config (`getPluginConfig`).
    pub async fn get_plugin_config(&self, name: &str) -> AppResult<Arc<PluginConfig>> {
        Ok(self.host.config.get(name).await?)
    }

    /// Validates and replaces a plugin's config (`setPluginConfig`).
    pub async fn set_plugin_config(
        &self,
        name: &str,
        values: &Map<String, Value>,
    ) -> AppResult<Arc<PluginConfig>> {
        Ok(self.host.config.set(name, values).await?)
    }

    /// Whether the named plugin is currently enabled.
    pub fn is_plugin_enabled(&self, name: &str) -> bool {
        self.host.states.is_enabled(name)
    }

    /// Writes to this plugin's log book (`log(level, message, source)`).
    pub fn log(&self, level: LogLevel, message: impl Into<String>, source: Option<&str>) {
        self.host.log_book.append(&self.plugin, level, message, source);
    }

    /// `log(Debug, ..)`.
    pub fn debug(&self, message: impl Into<String>) {
        self.log(LogLevel::Debug, message, None);
    }

    /// `log(Info, ..)`.
    pub fn info(&self, message: impl Into<String>) {
        self.log(LogLevel::Info, message, None);
    }

    /// `log(Warn, ..)`.
    pub fn warn(&self, message: impl Into<String>) {
        self.log(LogLevel::Warn, message, None);
    }

    /// `log(Error, ..)`.
    pub fn error(&self, message: impl Into<String>) {
        self.log(LogLevel::Error, message, None);
    }

    /// Hashing and token helpers.
    pub fn security(&self) -> Security {
        Security
    }

    /// Outbound HTTP client.
    pub fn http(&self) -> &HttpClient {
        &self.host.http
    }

    /// Filesystem sandbox under `<data_root>/<plugin>`.
    pub fn fs(&self) -> PluginFs {
        PluginFs::new(self.host.data_root.join(&*self.plugin))
    }

    /// Raw database access.
    pub fn db(&self) -> &dyn PluginDatabase {
        self.host.database.as_ref()
    }
}
