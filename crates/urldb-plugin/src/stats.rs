//! Per-plugin execution counters.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use serde::Serialize;

/// Something worth counting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatEvent {
    /// A hook handler was entered.
    HookInvoked,
    /// A hook handler errored or panicked.
    HookFailed,
    /// A hook handler stopped the chain.
    HookVetoed,
    /// A route handler was entered.
    RouteInvoked,
    /// A route handler errored or panicked.
    RouteFailed,
    /// A cron job started.
    CronRun,
    /// A cron job errored or panicked.
    CronFailed,
    /// A cron job hit its timeout.
    CronTimedOut,
}

#[derive(Debug, Default)]
struct Counters {
    hook_invocations: AtomicU64,
    hook_failures: AtomicU64,
    hook_vetoes: AtomicU64,
    route_invocations: AtomicU64,
    route_failures: AtomicU64,
    cron_runs: AtomicU64,
    cron_failures: AtomicU64,
    cron_timeouts: AtomicU64,
}

/// Point-in-time copy of a plugin's counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PluginStatsSnapshot {
    /// Hook handler invocations.
    pub hook_invocations: u64,
    /// Hook handler failures.
    pub hook_failures: u64,
    /// Vetoes.
    pub hook_vetoes: u64,
    /// Route handler invocations.
    pub route_invocations: u64,
    /// Route handler failures.
    pub route_failures: u64,
    /// Cron job runs.
    pub cron_runs: u64,
    /// Cron job failures.
    pub cron_failures: u64,
    /// Cron job timeouts.
    pub cron_timeouts: u64,
}

/// Counters for every plugin that ever ran.
#[derive(Debug, Default)]
pub struct PluginStats {
    counters: DashMap<String, Arc<Counters>>,
}

impl PluginStats {
    /// Creates an empty stats table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Increments the counter for `event`.
    pub fn record(&self, plugin: &str, event: StatEvent) {
        let counters = self
            .counters
            .entry(plugin.to_string())
            .or_default()
            .clone();
        let counter = match event {
            StatEvent::HookInvoked => &counters.hook_invocations,
            StatEvent::HookFailed => &counters.hook_failures,
            StatEvent::HookVetoed => &counters.hook_vetoes,
            StatEvent::RouteInvoked => &counters.route_invocations,
            StatEvent::RouteFailed => &counters.route_failures,
            StatEvent::CronRun => &counters.cron_runs,
            StatEvent::CronFailed => &counters.cron_failures,
            StatEvent::CronTimedOut => &counters.cron_timeouts,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns the counters of `plugin` (zero when it never ran).
    pub fn snapshot(&self, plugin: &str) -> PluginStatsSnapshot {
        self.counters
            .get(plugin)
            .map(|c| snapshot_of(&c))
            .unwrap_or_default()
    }

    /// Returns every plugin's counters.
    pub fn all(&self) -> Vec<(String, PluginStatsSnapshot)> {
        let mut all: Vec<_> = self
            .counters
            .iter()
            .map(|e| (e.key().clone(), snapshot_of(e.value())))
            .collect();
        all.sort_by(|a, b| a.0.cmp(&b.0));
        all
    }

    /// Drops the counters of `plugin`.
    pub fn forget(&self, plugin: &str) {
        self.counters.remove(plugin);
    }
}

fn snapshot_of(c: &Counters) -> PluginStatsSnapshot {
    PluginStatsSnapshot {
        hook_invocations: c.hook_invocations.load(Ordering::Relaxed),
        hook_failures: c.hook_failures.load(Ordering::Relaxed),
        hook_vetoes: c.hook_vetoes.load(Ordering::Relaxed),
        route_invocations: c.route_invocations.load(Ordering::Relaxed),
        route_failures: c.route_failures.load(Ordering::Relaxed),
        cron_runs: c.cron_runs.load(Ordering::Relaxed),
        cron_failures: c.cron_failures.load(Ordering::Relaxed),
        cron_timeouts: c.cron_timeouts.load(Ordering::Relaxed),
    }
}
