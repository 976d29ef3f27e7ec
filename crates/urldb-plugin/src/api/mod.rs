//! Capability surface exposed to plugin code.

pub mod bindings;
pub mod context;
pub mod services;

pub use bindings::{Declarations, HookDecl, PluginBindings, RouteDecl};
pub use context::{HostServices, PluginContext};
pub use services::{HttpClient, HttpResponse, PluginFs, Security, UnavailableDatabase};
