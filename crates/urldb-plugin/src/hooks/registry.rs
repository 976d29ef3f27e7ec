//! Hook registry: event type to handlers in registration order.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, info};

use super::definitions::{HookEvent, HookPoint};
use super::dispatcher::Next;
use crate::api::context::PluginContext;
use crate::error::HandlerError;

/// A subscriber to one hook point.
///
/// Call `next.run(event).await` to pass control down the chain. Returning
/// without calling it vetoes the rest of the dispatch.
#[async_trait]
pub trait HookHandler: Send + Sync {
    /// Handles one event occurrence.
    async fn handle(
        &self,
        ctx: &PluginContext,
        event: &mut HookEvent,
        next: Next<'_>,
    ) -> Result<(), HandlerError>;
}

/// Position of a registration in dispatch order.
///
/// `plugin` is the plugin's discovery sequence number and `declaration`
/// the index of the subscription within its `setup`, so ordering follows
/// load order and survives disable/enable cycles unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct RegistrationOrder {
    /// Plugin discovery sequence.
    pub plugin: u64,
    /// Declaration index within the plugin.
    pub declaration: u32,
}

/// One registered subscription.
#[derive(Clone)]
pub struct HookEntry {
    /// Owning plugin.
    pub plugin: String,
    /// Dispatch position.
    pub order: RegistrationOrder,
    /// Handler.
    pub handler: Arc<dyn HookHandler>,
    /// Context handed to the handler.
    pub context: PluginContext,
}

impl std::fmt::Debug for HookEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HookEntry")
            .field("plugin", &self.plugin)
            .field("order", &self.order)
            .finish()
    }
}

/// Read-only view of one subscription for the admin API.
#[derive(Debug, Clone, Serialize)]
pub struct HookSubscription {
    /// Event type.
    pub hook: HookPoint,
    /// Owning plugin.
    pub plugin: String,
    /// Dispatch position.
    pub order: RegistrationOrder,
}

/// Registry of hook handlers organized by hook point.
#[derive(Debug, Default)]
pub struct HookRegistry {
    handlers: RwLock<HashMap<HookPoint, Vec<HookEntry>>>,
}

impl HookRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds one subscription at its ordered position.
    pub async fn subscribe(&self, hook: HookPoint, entry: HookEntry) {
        let mut handlers = self.handlers.write().await;
        insert_ordered(handlers.entry(hook).or_default(), entry);
        debug!(hook = %hook, "Hook handler registered");
    }

    /// Replaces every subscription of `plugin` with `entries` in one write.
    ///
    /// Used on enable (the plugin has none) and on hot reload.
    pub async fn replace_plugin(&self, plugin: &str, entries: Vec<(HookPoint, HookEntry)>) {
        let count = entries.len();
        let mut handlers = self.handlers.write().await;
        for list in handlers.values_mut() {
            list.retain(|e| e.plugin != plugin);
        }
        for (hook, entry) in entries {
            insert_ordered(handlers.entry(hook).or_default(), entry);
        }
        handlers.retain(|_, list| !list.is_empty());

        info!(plugin = %plugin, hooks = count, "Hook handlers registered");
    }

    /// Removes every subscription of `plugin` in one write.
    pub async fn unregister_plugin(&self, plugin: &str) -> usize {
        let mut handlers = self.handlers.write().await;
        let mut removed = 0;
        for list in handlers.values_mut() {
            let before = list.len();
            list.retain(|e| e.plugin != plugin);
            removed += before - list.len();
        }
        handlers.retain(|_, list| !list.is_empty());

        info!(plugin = %plugin, removed, "Hook handlers unregistered");
        removed
    }

    /// Returns a snapshot of the chain for `hook`.
    pub async fn snapshot(&self, hook: HookPoint) -> Vec<HookEntry> {
        let handlers = self.handlers.read().await;
        handlers.get(&hook).cloned().unwrap_or_default()
    }

    /// Returns the number of handlers for `hook`.
    pub async fn handler_count(&self, hook: HookPoint) -> usize {
        let handlers = self.handlers.read().await;
        handlers.get(&hook).map(Vec::len).unwrap_or(0)
    }

    /// Lists subscriptions, optionally for one plugin.
    pub async fn subscriptions(&self, plugin: Option<&str>) -> Vec<HookSubscription> {
        let handlers = self.handlers.read().await;
        let mut subs: Vec<HookSubscription> = handlers
            .iter()
            .flat_map(|(hook, list)| {
                list.iter().map(move |e| HookSubscription {
                    hook: *hook,
                    plugin: e.plugin.clone(),
                    order: e.order,
                })
            })
            .filter(|s| plugin.is_none_or(|p| s.plugin == p))
            .collect();
        subs.sort_by_key(|s| (s.hook, s.order));
        subs
    }
}

fn insert_ordered(list: &mut Vec<HookEntry>, entry: HookEntry) {
    let at = list.partition_point(|e| e.order <= entry.order);
    list.insert(at, entry);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::context::HostServices;
    use crate::traits::hook_fn;

    fn entry(plugin: &str, seq: u64, declaration: u32) -> HookEntry {
        let host = Arc::new(HostServices::in_memory(std::env::temp_dir()));
        HookEntry {
            plugin: plugin.to_string(),
            order: RegistrationOrder {
                plugin: seq,
                declaration,
            },
            handler: Arc::new(hook_fn(|_ctx, event, next| {
                Box::pin(async move {
                    next.run(event).await;
                    Ok(())
                })
            })),
            context: PluginContext::new(plugin, host),
        }
    }

    fn plugins(chain: &[HookEntry]) -> Vec<&str> {
        chain.iter().map(|e| e.plugin.as_str()).collect()
    }

    #[tokio::test]
    async fn test_reenabled_plugin_keeps_its_position() {
        let registry = HookRegistry::new();
        registry.subscribe(HookPoint::UrlAdd, entry("first", 0, 0)).await;
        registry.subscribe(HookPoint::UrlAdd, entry("second", 1, 0)).await;
        registry.subscribe(HookPoint::UrlAdd, entry("third", 2, 0)).await;

        assert_eq!(registry.unregister_plugin("first").await, 1);
        registry
            .replace_plugin("first", vec![(HookPoint::UrlAdd, entry("first", 0, 0))])
            .await;

        let chain = registry.snapshot(HookPoint::UrlAdd).await;
        assert_eq!(plugins(&chain), vec!["first", "second", "third"]);
    }

    #[tokio::test]
    async fn test_replace_plugin_swaps_all_subscriptions() {
        let registry = HookRegistry::new();
        registry
            .replace_plugin(
                "a",
                vec![
                    (HookPoint::UrlAdd, entry("a", 0, 0)),
                    (HookPoint::UserLogin, entry("a", 0, 1)),
                ],
            )
            .await;
        registry
            .replace_plugin("a", vec![(HookPoint::UrlDelete, entry("a", 0, 0))])
            .await;

        assert_eq!(registry.handler_count(HookPoint::UrlAdd).await, 0);
        assert_eq!(registry.handler_count(HookPoint::UserLogin).await, 0);
        let subs = registry.subscriptions(Some("a")).await;
        assert_eq!(subs.len(), 1);
        assert_eq!(subs[0].hook, HookPoint::UrlDelete);
    }
}
