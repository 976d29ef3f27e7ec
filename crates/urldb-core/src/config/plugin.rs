//! Plugin runtime configuration.

use serde::{Deserialize, Serialize};

/// Plugin runtime configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginsConfig {
    /// Directory scanned for dynamic plugin libraries.
    #[serde(default = "default_plugin_directory")]
    pub directory: String,
    /// Root directory for per-plugin sandboxed file storage.
    #[serde(default = "default_data_directory")]
    pub data_directory: String,
    /// Whether to automatically load plugins on startup.
    #[serde(default = "default_true")]
    pub auto_load: bool,
    /// Whether compiled-in plugins are installed on first start.
    #[serde(default = "default_true")]
    pub auto_install_builtin: bool,
    /// Wall-clock budget for a single cron job execution.
    #[serde(default = "default_cron_timeout")]
    pub cron_job_timeout_seconds: u64,
    /// Entries retained per plugin in the in-memory log book.
    #[serde(default = "default_log_buffer")]
    pub log_buffer_size: usize,
    /// Timeout for outbound HTTP calls made by plugins.
    #[serde(default = "default_http_timeout")]
    pub http_timeout_seconds: u64,
}

impl Default for PluginsConfig {
    fn default() -> Self {
        Self {
            directory: default_plugin_directory(),
            data_directory: default_data_directory(),
            auto_load: true,
            auto_install_builtin: true,
            cron_job_timeout_seconds: default_cron_timeout(),
            log_buffer_size: default_log_buffer(),
            http_timeout_seconds: default_http_timeout(),
        }
    }
}

fn default_plugin_directory() -> String {
    "./plugins".to_string()
}

fn default_data_directory() -> String {
    "./data/plugins".to_string()
}

fn default_true() -> bool {
    true
}

fn default_cron_timeout() -> u64 {
    30
}

fn default_log_buffer() -> usize {
    200
}

fn default_http_timeout() -> u64 {
    15
}
