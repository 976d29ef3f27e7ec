//! Hook dispatcher: runs a handler chain with `next()` continuation.
//!
//! - Handlers run one after another in registration order, never in parallel.
//! - A handler passes control on by calling [`Next::run`]; returning without
//!   calling it stops the chain (a veto). The veto is recorded, not raised.
//! - A handler that errors or panics is logged with its plugin name and the
//!   chain resumes with the following handler, unless the failing handler had
//!   already called `next`.
//! - The chain is a snapshot taken when dispatch starts, so concurrent
//!   enable/disable never affects an in-flight dispatch.

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use futures::FutureExt;
use futures::future::BoxFuture;
use serde::Serialize;
use tracing::{debug, error, info};

use urldb_core::error::AppError;

use super::definitions::{HookEvent, HookPoint};
use super::registry::{HookEntry, HookRegistry};
use crate::logs::{LogLevel, PluginLogBook};
use crate::stats::{PluginStats, StatEvent};

/// Continuation handed to each handler.
pub struct Next<'a> {
    rest: &'a [HookEntry],
    chain: &'a ChainState,
    called: &'a AtomicBool,
}

impl Next<'_> {
    /// Runs the remaining handlers of the chain against `event`.
    pub async fn run(self, event: &mut HookEvent) {
        self.called.store(true, Ordering::SeqCst);
        run_chain(self.rest, event, self.chain).await;
    }

    /// Number of handlers still waiting downstream.
    pub fn remaining(&self) -> usize {
        self.rest.len()
    }
}

/// A handler failure recorded during dispatch.
#[derive(Debug, Clone, Serialize)]
pub struct HandlerFailure {
    /// Plugin that owns the handler.
    pub plugin: String,
    /// Error or panic message.
    pub error: String,
}

/// What happened during one dispatch.
#[derive(Debug, Clone, Serialize)]
pub struct DispatchOutcome {
    /// Event type.
    pub hook: HookPoint,
    /// Plugins whose handlers were invoked, in order.
    pub invoked: Vec<String>,
    /// Handlers that errored or panicked.
    pub failures: Vec<HandlerFailure>,
    /// Plugin that stopped the chain by not calling `next`.
    pub vetoed_by: Option<String>,
    /// Whether control reached the end of the chain.
    pub completed: bool,
}

impl DispatchOutcome {
    fn new(hook: HookPoint) -> Self {
        Self {
            hook,
            invoked: Vec::new(),
            failures: Vec::new(),
            vetoed_by: None,
            completed: false,
        }
    }

    /// Whether a handler vetoed the event.
    pub fn is_vetoed(&self) -> bool {
        self.vetoed_by.is_some()
    }
}

struct ChainState {
    outcome: Mutex<DispatchOutcome>,
    log_book: Arc<PluginLogBook>,
    stats: Arc<PluginStats>,
}

impl ChainState {
    fn with_outcome(&self, f: impl FnOnce(&mut DispatchOutcome)) {
        if let Ok(mut outcome) = self.outcome.lock() {
            f(&mut outcome);
        }
    }

    fn invoked(&self, entry: &HookEntry) {
        self.stats.record(&entry.plugin, StatEvent::HookInvoked);
        self.with_outcome(|o| o.invoked.push(entry.plugin.clone()));
    }

    fn failed(&self, entry: &HookEntry, hook: HookPoint, message: String) {
        error!(
            plugin = %entry.plugin,
            hook = %hook,
            error = %message,
            "Hook handler failed"
        );
        self.log_book.append(
            &entry.plugin,
            LogLevel::Error,
            format!("{} handler failed: {message}", hook.binding_name()),
            Some(hook.as_str()),
        );
        self.stats.record(&entry.plugin, StatEvent::HookFailed);
        self.with_outcome(|o| {
            o.failures.push(HandlerFailure {
                plugin: entry.plugin.clone(),
                error: message,
            })
        });
    }

    fn vetoed(&self, entry: &HookEntry, hook: HookPoint, skipped: usize) {
        info!(
            plugin = %entry.plugin,
            hook = %hook,
            skipped,
            "Hook chain stopped by handler"
        );
        self.stats.record(&entry.plugin, StatEvent::HookVetoed);
        self.with_outcome(|o| o.vetoed_by = Some(entry.plugin.clone()));
    }

    fn completed(&self) {
        self.with_outcome(|o| o.completed = true);
    }
}

fn run_chain<'a>(
    chain: &'a [HookEntry],
    event: &'a mut HookEvent,
    state: &'a ChainState,
) -> BoxFuture<'a, ()> {
    Box::pin(async move {
        let hook = event.hook;
        let mut remaining = chain;

        while let Some((entry, rest)) = remaining.split_first() {
            let called = AtomicBool::new(false);
            let next = Next {
                rest,
                chain: state,
                called: &called,
            };

            state.invoked(entry);
            let result = AssertUnwindSafe(entry.handler.handle(&entry.context, event, next))
                .catch_unwind()
                .await;
            let passed_on = called.load(Ordering::SeqCst);

            match result {
                Ok(Ok(())) => {
                    if !passed_on {
                        state.vetoed(entry, hook, rest.len());
                    }
                    return;
                }
                Ok(Err(err)) => state.failed(entry, hook, err.message),
                Err(panic) => state.failed(entry, hook, panic_message(panic.as_ref())),
            }

            if passed_on {
                return;
            }
            remaining = rest;
        }

        state.completed();
    })
}

/// Extracts a readable message from a panic payload.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panicked: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panicked: {s}")
    } else {
        "panicked".to_string()
    }
}

/// Dispatches events to the registered handler chain.
#[derive(Debug)]
pub struct HookDispatcher {
    registry: Arc<HookRegistry>,
    log_book: Arc<PluginLogBook>,
    stats: Arc<PluginStats>,
}

impl HookDispatcher {
    /// Creates a dispatcher over `registry`.
    pub fn new(
        registry: Arc<HookRegistry>,
        log_book: Arc<PluginLogBook>,
        stats: Arc<PluginStats>,
    ) -> Self {
        Self {
            registry,
            log_book,
            stats,
        }
    }

    /// Runs the chain for `event.hook`, mutating `event` in place.
    pub async fn dispatch(&self, event: &mut HookEvent) -> DispatchOutcome {
        let chain = self.registry.snapshot(event.hook).await;
        let state = ChainState {
            outcome: Mutex::new(DispatchOutcome::new(event.hook)),
            log_book: self.log_book.clone(),
            stats: self.stats.clone(),
        };

        debug!(hook = %event.hook, handlers = chain.len(), "Dispatching hook");
        run_chain(&chain, event, &state).await;

        state
            .outcome
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Owned variant of [`dispatch`](Self::dispatch).
    pub async fn fire(&self, mut event: HookEvent) -> (HookEvent, DispatchOutcome) {
        let outcome = self.dispatch(&mut event).await;
        (event, outcome)
    }

    /// Dispatches and converts a veto into a `FORBIDDEN` error.
    pub async fn fire_or_veto(&self, event: &mut HookEvent) -> Result<DispatchOutcome, AppError> {
        let outcome = self.dispatch(event).await;
        match &outcome.vetoed_by {
            Some(plugin) => Err(AppError::forbidden(format!(
                "{} was rejected by plugin '{plugin}'",
                outcome.hook
            ))),
            None => Ok(outcome),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::context::{HostServices, PluginContext};
    use crate::error::HandlerError;
    use crate::hooks::registry::{HookHandler, RegistrationOrder};
    use crate::traits::hook_fn;

    fn entry(plugin: &str, seq: u64, handler: impl HookHandler + 'static) -> HookEntry {
        let host = Arc::new(HostServices::in_memory(std::env::temp_dir()));
        HookEntry {
            plugin: plugin.to_string(),
            order: RegistrationOrder {
                plugin: seq,
                declaration: 0,
            },
            handler: Arc::new(handler),
            context: PluginContext::new(plugin, host),
        }
    }

    fn appender(mark: &'static str) -> impl HookHandler {
        hook_fn(move |_ctx, event, next| {
            Box::pin(async move {
                let seen = event.get_string("seen").unwrap_or_default().to_string();
                event.set("seen", serde_json::json!(format!("{seen}{mark}")));
                next.run(event).await;
                Ok(())
            })
        })
    }

    struct Harness {
        dispatcher: HookDispatcher,
        registry: Arc<HookRegistry>,
        stats: Arc<PluginStats>,
        log_book: Arc<PluginLogBook>,
    }

    async fn dispatcher_with(entries: Vec<HookEntry>) -> Harness {
        let registry = Arc::new(HookRegistry::new());
        for e in entries {
            registry.subscribe(HookPoint::UrlAdd, e).await;
        }
        let stats = Arc::new(PluginStats::new());
        let log_book = Arc::new(PluginLogBook::default());
        let dispatcher = HookDispatcher::new(registry.clone(), log_book.clone(), stats.clone());
        Harness {
            dispatcher,
            registry,
            stats,
            log_book,
        }
    }

    #[tokio::test]
    async fn test_handlers_run_in_order_and_see_mutations() {
        let Harness { dispatcher, .. } = dispatcher_with(vec![
            entry("c", 2, appender("c")),
            entry("a", 0, appender("a")),
            entry("b", 1, appender("b")),
        ])
        .await;

        let mut event = HookEvent::new(HookPoint::UrlAdd);
        let outcome = dispatcher.dispatch(&mut event).await;
        assert_eq!(event.get_string("seen"), Some("abc"));
        assert_eq!(outcome.invoked, vec!["a", "b", "c"]);
        assert!(outcome.completed);
        assert!(!outcome.is_vetoed());
    }

    #[tokio::test]
    async fn test_missing_next_vetoes_the_rest() {
        let stop = hook_fn(|_ctx, _event, _next| Box::pin(async { Ok(()) }));
        let Harness {
            dispatcher, stats, ..
        } = dispatcher_with(vec![
            entry("a", 0, appender("a")),
            entry("gate", 1, stop),
            entry("c", 2, appender("c")),
        ])
        .await;

        let mut event = HookEvent::new(HookPoint::UrlAdd);
        let outcome = dispatcher.dispatch(&mut event).await;
        assert_eq!(event.get_string("seen"), Some("a"));
        assert_eq!(outcome.vetoed_by.as_deref(), Some("gate"));
        assert!(!outcome.completed);
        assert_eq!(stats.snapshot("gate").hook_vetoes, 1);

        let err = dispatcher.fire_or_veto(&mut event).await.unwrap_err();
        assert_eq!(err.kind, urldb_core::error::ErrorKind::Forbidden);
    }

    #[tokio::test]
    async fn test_failures_are_isolated() {
        let fails = hook_fn(|_ctx, _event, _next| {
            Box::pin(async { Err(HandlerError::new("database down")) })
        });
        let panics = hook_fn(|_ctx, _event, _next| Box::pin(async { panic!("bad plugin") }));
        let Harness {
            dispatcher,
            stats,
            log_book,
            ..
        } = dispatcher_with(vec![
            entry("fails", 0, fails),
            entry("panics", 1, panics),
            entry("last", 2, appender("z")),
        ])
        .await;

        let mut event = HookEvent::new(HookPoint::UrlAdd);
        let outcome = dispatcher.dispatch(&mut event).await;
        assert_eq!(event.get_string("seen"), Some("z"));
        assert!(outcome.completed);
        assert_eq!(outcome.failures.len(), 2);
        assert_eq!(outcome.failures[0].plugin, "fails");
        assert!(outcome.failures[1].error.contains("bad plugin"));
        assert_eq!(stats.snapshot("fails").hook_failures, 1);

        let logged = log_book.entries("fails", None);
        assert_eq!(logged.len(), 1);
        assert_eq!(logged[0].plugin, "fails");
        assert_eq!(logged[0].level, LogLevel::Error);
        assert!(logged[0].message.contains("database down"));
        assert!(
            log_book.entries("panics", None)[0]
                .message
                .contains("bad plugin")
        );
        assert!(log_book.entries("last", None).is_empty());
    }

    #[tokio::test]
    async fn test_failure_after_next_does_not_rerun_downstream() {
        let late = hook_fn(|_ctx, event, next| {
            Box::pin(async move {
                next.run(event).await;
                Err(HandlerError::new("after the fact"))
            })
        });
        let Harness { dispatcher, .. } =
            dispatcher_with(vec![entry("late", 0, late), entry("b", 1, appender("b"))]).await;

        let mut event = HookEvent::new(HookPoint::UrlAdd);
        let outcome = dispatcher.dispatch(&mut event).await;
        assert_eq!(event.get_string("seen"), Some("b"));
        assert_eq!(outcome.invoked, vec!["late", "b"]);
        assert_eq!(outcome.failures.len(), 1);
    }

    #[tokio::test]
    async fn test_unsubscribing_mid_dispatch_keeps_the_snapshot() {
        let registry_cell: Arc<std::sync::OnceLock<Arc<HookRegistry>>> = Arc::default();
        let cell = registry_cell.clone();
        let remover = hook_fn(move |_ctx, event, next| {
            let registry = cell.get().cloned();
            Box::pin(async move {
                if let Some(registry) = registry {
                    registry.unregister_plugin("b").await;
                }
                next.run(event).await;
                Ok(())
            })
        });
        let Harness {
            dispatcher,
            registry,
            ..
        } = dispatcher_with(vec![
            entry("a", 0, remover),
            entry("b", 1, appender("b")),
            entry("c", 2, appender("c")),
        ])
        .await;
        let _ = registry_cell.set(registry.clone());

        let mut event = HookEvent::new(HookPoint::UrlAdd);
        let outcome = dispatcher.dispatch(&mut event).await;
        assert_eq!(outcome.invoked, vec!["a", "b", "c"]);
        assert_eq!(event.get_string("seen"), Some("bc"));
        assert_eq!(registry.handler_count(HookPoint::UrlAdd).await, 2);

        let mut event = HookEvent::new(HookPoint::UrlAdd);
        let outcome = dispatcher.dispatch(&mut event).await;
        assert_eq!(outcome.invoked, vec!["a", "c"]);
        assert_eq!(event.get_string("seen"), Some("c"));
    }
}
