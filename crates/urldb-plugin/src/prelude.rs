//! Prelude for plugin authors.

pub use async_trait::async_trait;
pub use futures::future::BoxFuture;
pub use serde_json::{Value, json};

pub use urldb_core::events::{ApiRequestRecord, ReadyResourceRecord, UrlRecord, UserRecord};

pub use crate::api::bindings::PluginBindings;
pub use crate::api::context::PluginContext;
pub use crate::cron::CronHandler;
pub use crate::error::HandlerError;
pub use crate::hooks::definitions::{HookEvent, HookPoint};
pub use crate::hooks::dispatcher::Next;
pub use crate::hooks::registry::HookHandler;
pub use crate::loader::{PluginExport, PluginScript, PluginSource};
pub use crate::logs::LogLevel;
pub use crate::migration::MigrationStep;
pub use crate::routes::{RouteHandler, RouteRequest, RouteResponse};
pub use crate::traits::{cron_fn, hook_fn, migration_fn, route_fn};

pub use crate::{export_plugin, hook_event};
