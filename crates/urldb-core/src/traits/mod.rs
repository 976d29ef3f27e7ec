//! Core traits defined in `urldb-core` and implemented by other crates.

pub mod database;
pub mod store;

pub use database::PluginDatabase;
pub use store::{AppliedMigration, PluginStateStore, StoredConfig};
