//! Integration tests for the plugin lifecycle against the in-memory runtime.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock, Weak};

use serde_json::{Map, json};

use urldb_plugin::cron::JobOutcome;
use urldb_plugin::error::PluginError;
use urldb_plugin::prelude::*;
use urldb_plugin::routes::RouteBody;
use urldb_plugin::{PluginManager, PluginState};

const FULL_HEADER: &str = r#"/**
 * @name full
 * @version 1.0.0
 * @config
 * @field {string} api_key API key "Key for the lookup service"
 * @field {number} batch Batch size "Rows per run" @default 50
 * @config
 */"#;

/// Three hooks, two routes, one cron job and one migration.
struct Full {
    runs: Arc<AtomicUsize>,
    migrated: Arc<AtomicUsize>,
}

impl PluginScript for Full {
    fn setup(&self, b: &mut PluginBindings) -> Result<(), HandlerError> {
        for hook in [HookPoint::UrlAdd, HookPoint::UrlDelete, HookPoint::UserLogin] {
            b.on(
                hook,
                hook_fn(|_ctx, event, next| {
                    Box::pin(async move {
                        event.set("seen_by_full", json!(true));
                        next.run(event).await;
                        Ok(())
                    })
                }),
            );
        }

        b.router_add(
            "GET",
            "/api/full/status",
            route_fn(|ctx, _req| {
                Box::pin(async move {
                    let config = ctx.config().await.map_err(|e| HandlerError::new(e.message))?;
                    Ok(RouteResponse::json(200, json!({ "batch": config.get_f64("batch") })))
                })
            }),
        )?;
        b.router_add(
            "POST",
            "/api/full/fail",
            route_fn(|_ctx, _req| Box::pin(async { Err(HandlerError::new("upstream timeout")) })),
        )?;

        let runs = self.runs.clone();
        b.cron_add(
            "x",
            "0 3 * * *",
            cron_fn(move |_ctx| {
                let runs = runs.clone();
                Box::pin(async move {
                    runs.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                })
            }),
        )?;

        let up = self.migrated.clone();
        let down = self.migrated.clone();
        b.migrate(
            migration_fn(move |_ctx| {
                let up = up.clone();
                Box::pin(async move {
                    up.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                })
            }),
            migration_fn(move |_ctx| {
                let down = down.clone();
                Box::pin(async move {
                    down.fetch_sub(1, Ordering::SeqCst);
                    Ok(())
                })
            }),
        );
        Ok(())
    }
}

/// Declares a cron job with the same name as `full` and a clashing route.
struct Neighbour {
    runs: Arc<AtomicUsize>,
    clash: bool,
}

impl PluginScript for Neighbour {
    fn setup(&self, b: &mut PluginBindings) -> Result<(), HandlerError> {
        b.on_url_add(hook_fn(|_ctx, event, next| {
            Box::pin(async move {
                event.set("seen_by_neighbour", json!(true));
                next.run(event).await;
                Ok(())
            })
        }));
        let path = if self.clash { "/api/full/:id" } else { "/api/neighbour" };
        b.router_add(
            "GET",
            path,
            route_fn(|_ctx, _req| Box::pin(async { Ok(RouteResponse::text(200, "neighbour")) })),
        )?;
        let runs = self.runs.clone();
        b.cron_add(
            "x",
            "0 3 * * *",
            cron_fn(move |_ctx| {
                let runs = runs.clone();
                Box::pin(async move {
                    runs.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                })
            }),
        )?;
        Ok(())
    }
}

/// Disables `neighbour` from inside the hook chain it belongs to.
struct Switch {
    manager: Arc<OnceLock<Weak<PluginManager>>>,
}

impl PluginScript for Switch {
    fn setup(&self, b: &mut PluginBindings) -> Result<(), HandlerError> {
        let manager = self.manager.clone();
        b.on_url_add(hook_fn(move |_ctx, event, next| {
            let manager = manager.get().and_then(Weak::upgrade);
            Box::pin(async move {
                if let Some(manager) = manager {
                    manager
                        .disable("neighbour")
                        .await
                        .map_err(|e| HandlerError::new(e.to_string()))?;
                }
                next.run(event).await;
                Ok(())
            })
        }));
        Ok(())
    }
}

struct Counters {
    full_runs: Arc<AtomicUsize>,
    migrated: Arc<AtomicUsize>,
    neighbour_runs: Arc<AtomicUsize>,
}

impl Counters {
    fn new() -> Self {
        Self {
            full_runs: Arc::default(),
            migrated: Arc::default(),
            neighbour_runs: Arc::default(),
        }
    }

    fn full(&self) -> PluginSource {
        PluginSource::new(
            "plugins/full.plugin.rs",
            FULL_HEADER,
            Full {
                runs: self.full_runs.clone(),
                migrated: self.migrated.clone(),
            },
        )
    }

    fn neighbour(&self, clash: bool) -> PluginSource {
        PluginSource::new(
            "plugins/neighbour.plugin.rs",
            "// @name neighbour",
            Neighbour {
                runs: self.neighbour_runs.clone(),
                clash,
            },
        )
    }
}

fn manager() -> PluginManager {
    let dir = tempfile::tempdir().expect("temp dir");
    PluginManager::in_memory(dir.keep())
}

async fn footprint(manager: &PluginManager, plugin: &str) -> (usize, usize, Vec<bool>) {
    let hooks = manager.hook_registry().subscriptions(Some(plugin)).await.len();
    let routes = manager.routes().routes(Some(plugin)).await.len();
    let paused = manager
        .scheduler()
        .jobs(Some(plugin))
        .await
        .into_iter()
        .map(|j| j.paused)
        .collect();
    (hooks, routes, paused)
}

#[tokio::test]
async fn test_disable_and_enable_restore_every_binding() {
    let counters = Counters::new();
    let manager = manager();
    manager.install(counters.full()).await.unwrap();
    assert_eq!(footprint(&manager, "full").await, (3, 2, vec![false]));

    let info = manager.disable("full").await.unwrap();
    assert_eq!(info.state, PluginState::Disabled);
    assert_eq!(footprint(&manager, "full").await, (0, 0, vec![true]));
    assert!(
        manager
            .handle_request(RouteRequest::new("GET", "/api/full/status"))
            .await
            .is_none()
    );
    let mut event = HookEvent::new(HookPoint::UrlAdd);
    manager.dispatch(&mut event).await;
    assert!(event.get_data("seen_by_full").is_none());

    manager.enable("full").await.unwrap();
    assert_eq!(footprint(&manager, "full").await, (3, 2, vec![false]));
    let mut event = HookEvent::new(HookPoint::UrlAdd);
    manager.dispatch(&mut event).await;
    assert_eq!(event.get_bool("seen_by_full"), Some(true));
}

#[tokio::test]
async fn test_cron_jobs_with_the_same_name_stay_apart() {
    let counters = Counters::new();
    let manager = manager();
    manager.install(counters.full()).await.unwrap();
    manager.install(counters.neighbour(false)).await.unwrap();
    assert_eq!(manager.scheduler().jobs(None).await.len(), 2);

    let outcome = manager.trigger_cron("neighbour", "x").await.unwrap();
    assert_eq!(outcome, JobOutcome::Succeeded);
    assert_eq!(counters.neighbour_runs.load(Ordering::SeqCst), 1);
    assert_eq!(counters.full_runs.load(Ordering::SeqCst), 0);

    assert!(matches!(
        manager.trigger_cron("full", "y").await,
        Err(PluginError::JobNotFound { .. })
    ));
}

#[tokio::test]
async fn test_route_conflict_leaves_second_plugin_unbound() {
    let counters = Counters::new();
    let manager = manager();
    let report = manager
        .load_all(vec![counters.full(), counters.neighbour(true)])
        .await;

    assert_eq!(report.enabled, vec!["full"]);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].plugin.as_deref(), Some("neighbour"));
    assert_eq!(footprint(&manager, "neighbour").await.0, 0);
    assert_eq!(footprint(&manager, "neighbour").await.1, 0);

    let mut event = HookEvent::new(HookPoint::UrlAdd);
    manager.dispatch(&mut event).await;
    assert!(event.get_data("seen_by_neighbour").is_none());
}

#[tokio::test]
async fn test_config_defaults_and_required_fields() {
    let counters = Counters::new();
    let manager = manager();
    manager.install(counters.full()).await.unwrap();

    let config = manager.get_config("full").await.unwrap();
    assert_eq!(config.get_f64("batch"), Some(50.0));

    let mut missing = Map::new();
    missing.insert("batch".to_string(), json!(10));
    match manager.update_config("full", &missing).await {
        Err(PluginError::Validation(err)) => {
            assert_eq!(err.errors.len(), 1);
            assert_eq!(err.errors[0].key, "api_key");
        }
        other => panic!("expected validation error, got {other:?}"),
    }

    let mut complete = missing.clone();
    complete.insert("api_key".to_string(), json!("k-123"));
    let stored = manager.update_config("full", &complete).await.unwrap();
    assert_eq!(stored.get_str("api_key"), Some("k-123"));

    let response = manager
        .handle_request(RouteRequest::new("GET", "/api/full/status"))
        .await
        .unwrap();
    assert_eq!(response.body, RouteBody::Json(json!({ "batch": 10.0 })));
}

#[tokio::test]
async fn test_migrations_apply_once_and_roll_back() {
    let counters = Counters::new();
    let manager = manager();
    manager.install(counters.full()).await.unwrap();
    assert_eq!(counters.migrated.load(Ordering::SeqCst), 1);

    assert!(manager.apply_migrations("full").await.unwrap().is_empty());
    assert_eq!(manager.rollback_migrations("full", 1).await.unwrap(), vec![1]);
    assert_eq!(counters.migrated.load(Ordering::SeqCst), 0);
    assert!(manager.migration_status("full").await.unwrap()[0].applied_at.is_none());

    assert_eq!(manager.apply_migrations("full").await.unwrap(), vec![1]);
    assert_eq!(counters.migrated.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_failing_route_is_reported_and_logged() {
    let counters = Counters::new();
    let manager = manager();
    manager.install(counters.full()).await.unwrap();

    let response = manager
        .handle_request(RouteRequest::new("POST", "/api/full/fail"))
        .await
        .unwrap();
    assert_eq!(response.status, 500);

    let logs = manager.logs("full", None).await.unwrap();
    assert!(logs.iter().any(|l| l.message.contains("upstream timeout")));
    assert_eq!(manager.stats("full").await.unwrap().route_failures, 1);
}

#[tokio::test]
async fn test_disable_during_dispatch_spares_the_running_chain() {
    let counters = Counters::new();
    let manager = Arc::new(manager());
    let cell = Arc::new(OnceLock::new());
    cell.set(Arc::downgrade(&manager)).unwrap();

    manager
        .install(PluginSource::new(
            "plugins/switch.plugin.rs",
            "// @name switch",
            Switch {
                manager: cell.clone(),
            },
        ))
        .await
        .unwrap();
    manager.install(counters.neighbour(false)).await.unwrap();

    let mut event = HookEvent::new(HookPoint::UrlAdd);
    let outcome = manager.dispatch(&mut event).await;
    assert!(outcome.failures.is_empty(), "{:?}", outcome.failures);
    assert_eq!(outcome.invoked, vec!["switch", "neighbour"]);
    assert_eq!(event.get_bool("seen_by_neighbour"), Some(true));
    assert_eq!(footprint(&manager, "neighbour").await, (0, 0, vec![true]));

    let mut event = HookEvent::new(HookPoint::UrlAdd);
    let outcome = manager.dispatch(&mut event).await;
    assert_eq!(outcome.invoked, vec!["switch"]);
    assert!(event.get_data("seen_by_neighbour").is_none());
}
