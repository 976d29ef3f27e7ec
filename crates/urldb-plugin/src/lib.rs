//! # urldb-plugin
//!
//! Plugin hook runtime for URLDB. Provides:
//!
//! - Script loading: doc-comment metadata and `setup`-time bindings
//! - Hook registry and `next()`-chained dispatcher with veto support
//! - Plugin HTTP route table with conflict detection
//! - Per-plugin cron jobs with timeout and panic isolation
//! - Typed config schema, validation and storage
//! - Reversible, exactly-once plugin migrations
//! - Lifecycle management (install, enable, disable, reload, uninstall)
//!   honouring `@dependencies`
//! - Optional dynamic loading via `libloading`

pub mod api;
pub mod config;
pub mod cron;
pub mod dependencies;
pub mod error;
pub mod hooks;
pub mod loader;
pub mod logs;
pub mod macros;
pub mod manager;
pub mod migration;
pub mod prelude;
pub mod registry;
pub mod routes;
pub mod stats;
pub mod store;
pub mod traits;

pub use api::bindings::PluginBindings;
pub use api::context::PluginContext;
pub use error::{HandlerError, LoadError, PluginError, PluginResult};
pub use hooks::definitions::{HookEvent, HookPoint};
pub use hooks::dispatcher::{DispatchOutcome, HookDispatcher, Next};
pub use hooks::registry::HookRegistry;
pub use loader::{PluginScript, PluginSource};
pub use manager::PluginManager;
pub use registry::{PluginInfo, PluginRegistry, PluginState};
