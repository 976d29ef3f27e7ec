//! Route registry: `(method, path)` to the owning plugin's handler.
//!
//! The table is copy-on-write. Readers clone an `Arc` of the current table
//! and never observe a half-applied enable or disable.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::info;

use super::pattern::RoutePattern;
use crate::api::context::PluginContext;
use crate::error::{DuplicateRouteError, HandlerError};

/// An HTTP request routed into a plugin.
#[derive(Debug, Clone, Default)]
pub struct RouteRequest {
    /// Upper-case method.
    pub method: String,
    /// Request path.
    pub path: String,
    /// Values captured by `:param` segments.
    pub params: BTreeMap<String, String>,
    /// Query string pairs.
    pub query: BTreeMap<String, String>,
    /// Request headers, lower-case names.
    pub headers: BTreeMap<String, String>,
    /// Parsed JSON body, `Null` when absent or not JSON.
    pub body: serde_json::Value,
}

impl RouteRequest {
    /// Creates a request with no params, query, headers or body.
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            path: path.into(),
            ..Self::default()
        }
    }

    /// Returns a path parameter.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    /// Returns a query parameter.
    pub fn query(&self, name: &str) -> Option<&str> {
        self.query.get(name).map(String::as_str)
    }

    /// Returns a header by lower-case name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }

    /// Deserializes the JSON body.
    pub fn json<T: serde::de::DeserializeOwned>(&self) -> Result<T, HandlerError> {
        Ok(serde_json::from_value(self.body.clone())?)
    }
}

/// Response body produced by a plugin route.
#[derive(Debug, Clone, PartialEq)]
pub enum RouteBody {
    /// `application/json`.
    Json(serde_json::Value),
    /// `text/plain`.
    Text(String),
    /// No body.
    Empty,
}

/// A plugin route's response.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteResponse {
    /// HTTP status code.
    pub status: u16,
    /// Extra headers.
    pub headers: BTreeMap<String, String>,
    /// Body.
    pub body: RouteBody,
}

impl RouteResponse {
    /// JSON response.
    pub fn json(status: u16, body: serde_json::Value) -> Self {
        Self {
            status,
            headers: BTreeMap::new(),
            body: RouteBody::Json(body),
        }
    }

    /// Plain-text response.
    pub fn text(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            headers: BTreeMap::new(),
            body: RouteBody::Text(body.into()),
        }
    }

    /// 204 with no body.
    pub fn no_content() -> Self {
        Self {
            status: 204,
            headers: BTreeMap::new(),
            body: RouteBody::Empty,
        }
    }

    /// Adds a header.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }
}

/// Handler for a plugin-registered HTTP route.
#[async_trait]
pub trait RouteHandler: Send + Sync {
    /// Handles one request.
    async fn handle(
        &self,
        ctx: &PluginContext,
        request: RouteRequest,
    ) -> Result<RouteResponse, HandlerError>;
}

/// One row of the route table.
#[derive(Clone)]
pub struct RouteEntry {
    /// Upper-case method.
    pub method: String,
    /// Path pattern.
    pub pattern: RoutePattern,
    /// Owning plugin.
    pub plugin: String,
    /// Handler.
    pub handler: Arc<dyn RouteHandler>,
    /// Context handed to the handler.
    pub context: PluginContext,
}

impl std::fmt::Debug for RouteEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouteEntry")
            .field("method", &self.method)
            .field("path", &self.pattern.as_str())
            .field("plugin", &self.plugin)
            .finish()
    }
}

/// A route matched against a concrete request path.
#[derive(Debug, Clone)]
pub struct ResolvedRoute {
    /// The matched row.
    pub entry: RouteEntry,
    /// Extracted parameters.
    pub params: BTreeMap<String, String>,
}

/// Read-only view of a route for the admin API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RouteInfo {
    /// Method.
    pub method: String,
    /// Declared path.
    pub path: String,
    /// Owning plugin.
    pub plugin: String,
}

/// The process-wide plugin route table.
#[derive(Debug, Default)]
pub struct RouteRegistry {
    table: RwLock<Arc<Vec<RouteEntry>>>,
}

impl RouteRegistry {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds one route.
    ///
    /// The same plugin re-registering the same route replaces its entry.
    /// Any other overlap fails with [`DuplicateRouteError`].
    pub async fn register(&self, entry: RouteEntry) -> Result<(), DuplicateRouteError> {
        let mut table = self.table.write().await;
        let mut next = table.as_ref().clone();
        place(&mut next, entry.clone())?;
        *table = Arc::new(next);

        info!(
            plugin = %entry.plugin,
            method = %entry.method,
            path = %entry.pattern.as_str(),
            "Plugin route registered"
        );
        Ok(())
    }

    /// Replaces every route of `plugin` with `entries`, all or nothing.
    ///
    /// On conflict the table is left untouched.
    pub async fn replace_plugin(
        &self,
        plugin: &str,
        entries: Vec<RouteEntry>,
    ) -> Result<(), DuplicateRouteError> {
        let count = entries.len();
        let mut table = self.table.write().await;
        let mut next: Vec<RouteEntry> = table
            .iter()
            .filter(|e| e.plugin != plugin)
            .cloned()
            .collect();
        for entry in entries {
            place(&mut next, entry)?;
        }
        *table = Arc::new(next);

        info!(plugin = %plugin, routes = count, "Plugin routes registered");
        Ok(())
    }

    /// Removes every route of `plugin`.
    pub async fn unregister_plugin(&self, plugin: &str) -> usize {
        let mut table = self.table.write().await;
        let before = table.len();
        let next: Vec<RouteEntry> = table
            .iter()
            .filter(|e| e.plugin != plugin)
            .cloned()
            .collect();
        let removed = before - next.len();
        *table = Arc::new(next);

        info!(plugin = %plugin, removed, "Plugin routes unregistered");
        removed
    }

    /// Finds the route serving `method path`.
    pub async fn resolve(&self, method: &str, path: &str) -> Option<ResolvedRoute> {
        let table = self.table.read().await.clone();
        table.iter().find_map(|entry| {
            if !entry.method.eq_ignore_ascii_case(method) {
                return None;
            }
            entry.pattern.matches(path).map(|params| ResolvedRoute {
                entry: entry.clone(),
                params,
            })
        })
    }

    /// Lists routes, optionally for one plugin.
    pub async fn routes(&self, plugin: Option<&str>) -> Vec<RouteInfo> {
        let table = self.table.read().await.clone();
        table
            .iter()
            .filter(|e| plugin.is_none_or(|p| e.plugin == p))
            .map(|e| RouteInfo {
                method: e.method.clone(),
                path: e.pattern.as_str().to_string(),
                plugin: e.plugin.clone(),
            })
            .collect()
    }
}

fn place(table: &mut Vec<RouteEntry>, entry: RouteEntry) -> Result<(), DuplicateRouteError> {
    let mut replace_at = None;
    for (idx, existing) in table.iter().enumerate() {
        if existing.method != entry.method || !existing.pattern.overlaps(&entry.pattern) {
            continue;
        }
        let same_route = existing.pattern.shape() == entry.pattern.shape();
        if existing.plugin == entry.plugin && same_route {
            replace_at = Some(idx);
            continue;
        }
        return Err(DuplicateRouteError {
            method: entry.method.clone(),
            path: entry.pattern.as_str().to_string(),
            plugin: entry.plugin.clone(),
            existing_path: existing.pattern.as_str().to_string(),
            existing_plugin: existing.plugin.clone(),
        });
    }

    match replace_at {
        Some(idx) => table[idx] = entry,
        None => table.push(entry),
    }
    Ok(())
}
