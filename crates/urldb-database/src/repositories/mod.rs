//! PostgreSQL implementations of the plugin runtime's persistence seams.

pub mod plugin_sql;
pub mod plugin_state;

pub use plugin_sql::PgPluginDatabase;
pub use plugin_state::PgPluginStateStore;
