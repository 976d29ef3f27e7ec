//! # urldb-builtin-plugins
//!
//! Plugins compiled into the server. They populate the market catalogue and
//! are installed on first start when `plugins.auto_install_builtin` is set.

pub mod access_stats;
pub mod login_guard;
pub mod url_category;

use urldb_plugin::PluginSource;

pub use access_stats::AccessStatsPlugin;
pub use login_guard::LoginGuardPlugin;
pub use url_category::UrlCategoryPlugin;

/// Every built-in unit, in discovery order.
pub fn catalogue() -> Vec<PluginSource> {
    vec![
        url_category::source(),
        access_stats::source(),
        login_guard::source(),
    ]
}

#[cfg(test)]
mod tests {
    use urldb_plugin::PluginManager;

    use super::*;

    #[tokio::test]
    async fn test_every_builtin_compiles_and_enables() {
        let dir = tempfile::tempdir().unwrap();
        let manager = PluginManager::in_memory(dir.path());
        let report = manager.load_all(catalogue()).await;
        assert!(report.failed.is_empty(), "{:?}", report.failed);
        assert_eq!(
            report.enabled,
            vec!["url_category", "access_stats", "login_guard"]
        );
    }
}
