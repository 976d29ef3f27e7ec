//! Counts URL accesses, serves the counters over HTTP and flushes a
//! snapshot to the plugin's data directory.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::info;

use urldb_plugin::PluginBindings;
use urldb_plugin::prelude::*;

/// Header of the built-in `access_stats` unit.
pub const HEADER: &str = r#"/**
 * @name access_stats
 * @display_name Access Statistics
 * @description Counts link visits and exposes the counters
 * @version 1.0.0
 * @author urldb
 * @category analytics
 * @license MIT
 * @hooks [onURLAccess]
 * @config
 * @field {number} top Top entries "Entries returned by the summary route" @default 10
 * @config
 */"#;

const SNAPSHOT_FILE: &str = "snapshot.json";

/// Returns the catalogue unit.
pub fn source() -> PluginSource {
    PluginSource::new(
        "builtin/access_stats.rs",
        HEADER,
        AccessStatsPlugin::default(),
    )
}

type Counters = Arc<DashMap<String, u64>>;

/// Plugin body. Counters survive reloads of the unit.
#[derive(Debug, Default)]
pub struct AccessStatsPlugin {
    counters: Counters,
}

/// Contents of `snapshot.json`.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Snapshot {
    /// When the snapshot was written, RFC 3339.
    pub written_at: Option<String>,
    /// Accesses per URL key.
    pub counts: BTreeMap<String, u64>,
}

impl PluginScript for AccessStatsPlugin {
    fn setup(&self, bindings: &mut PluginBindings) -> Result<(), HandlerError> {
        bindings.on_url_access(CountHook {
            counters: self.counters.clone(),
        });

        bindings.router_add(
            "GET",
            "/api/access-stats",
            SummaryRoute {
                counters: self.counters.clone(),
            },
        )?;
        bindings.router_add(
            "GET",
            "/api/access-stats/:key",
            KeyRoute {
                counters: self.counters.clone(),
            },
        )?;

        let counters = self.counters.clone();
        bindings.cron_add(
            "flush",
            "*/5 * * * *",
            cron_fn(move |ctx| Box::pin(flush(ctx, counters.clone()))),
        )?;

        let counters = self.counters.clone();
        bindings.migrate(
            migration_fn(move |ctx| Box::pin(restore(ctx, counters.clone()))),
            migration_fn(|ctx| Box::pin(discard(ctx))),
        );
        Ok(())
    }
}

/// Writes every counter to `snapshot.json`.
async fn flush(ctx: &PluginContext, counters: Counters) -> Result<(), HandlerError> {
    let snapshot = Snapshot {
        written_at: Some(Utc::now().to_rfc3339()),
        counts: sorted(&counters),
    };
    ctx.fs()
        .write(SNAPSHOT_FILE, serde_json::to_vec_pretty(&snapshot)?)
        .await?;
    ctx.debug(format!("flushed {} counters", snapshot.counts.len()));
    Ok(())
}

/// Seeds counters from an earlier snapshot, or writes an empty one.
async fn restore(ctx: &PluginContext, counters: Counters) -> Result<(), HandlerError> {
    let fs = ctx.fs();
    if !fs.exists(SNAPSHOT_FILE).await? {
        fs.write(SNAPSHOT_FILE, serde_json::to_vec_pretty(&Snapshot::default())?)
            .await?;
        return Ok(());
    }

    let snapshot: Snapshot = serde_json::from_str(&fs.read_to_string(SNAPSHOT_FILE).await?)?;
    for (key, count) in snapshot.counts {
        counters.insert(key, count);
    }
    info!(plugin = %ctx.plugin_name(), restored = counters.len(), "Restored access counters");
    Ok(())
}

async fn discard(ctx: &PluginContext) -> Result<(), HandlerError> {
    let fs = ctx.fs();
    if fs.exists(SNAPSHOT_FILE).await? {
        fs.remove(SNAPSHOT_FILE).await?;
    }
    Ok(())
}

fn sorted(counters: &DashMap<String, u64>) -> BTreeMap<String, u64> {
    counters
        .iter()
        .map(|e| (e.key().clone(), *e.value()))
        .collect()
}

struct CountHook {
    counters: Counters,
}

#[async_trait]
impl HookHandler for CountHook {
    async fn handle(
        &self,
        _ctx: &PluginContext,
        event: &mut HookEvent,
        next: Next<'_>,
    ) -> Result<(), HandlerError> {
        if let Some(url) = event.url() {
            let total = {
                let mut count = self.counters.entry(url.key).or_insert(0);
                *count += 1;
                *count
            };
            event.set("access_count", json!(total));
        }
        next.run(event).await;
        Ok(())
    }
}

/// `GET /api/access-stats?top=N`: the most visited keys.
struct SummaryRoute {
    counters: Counters,
}

#[async_trait]
impl RouteHandler for SummaryRoute {
    async fn handle(
        &self,
        ctx: &PluginContext,
        request: RouteRequest,
    ) -> Result<RouteResponse, HandlerError> {
        let configured = ctx.config().await?.get_i64("top").unwrap_or(10);
        let top = match request.query("top") {
            Some(raw) => match raw.parse::<usize>() {
                Ok(top) => top,
                Err(_) => {
                    return Ok(RouteResponse::json(
                        400,
                        json!({
                            "error": "VALIDATION",
                            "message": format!("'top' must be a non-negative integer, got '{raw}'"),
                        }),
                    ));
                }
            },
            None => usize::try_from(configured).unwrap_or(10),
        };

        let mut entries: Vec<(String, u64)> = sorted(&self.counters).into_iter().collect();
        entries.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        let total: u64 = entries.iter().map(|(_, c)| c).sum();
        let top: Vec<_> = entries
            .into_iter()
            .take(top)
            .map(|(key, count)| json!({ "key": key, "count": count }))
            .collect();

        Ok(RouteResponse::json(200, json!({ "total": total, "top": top })))
    }
}

/// `GET /api/access-stats/:key`.
struct KeyRoute {
    counters: Counters,
}

#[async_trait]
impl RouteHandler for KeyRoute {
    async fn handle(
        &self,
        _ctx: &PluginContext,
        request: RouteRequest,
    ) -> Result<RouteResponse, HandlerError> {
        let key = request.param("key").unwrap_or_default();
        match self.counters.get(key) {
            Some(count) => Ok(RouteResponse::json(
                200,
                json!({ "key": key, "count": *count }),
            )),
            None => Ok(RouteResponse::json(
                404,
                json!({ "error": "NOT_FOUND", "message": format!("No visits recorded for '{key}'") }),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use urldb_core::events::UrlRecord;
    use urldb_plugin::PluginManager;
    use urldb_plugin::cron::JobOutcome;
    use urldb_plugin::routes::RouteBody;

    use super::*;

    async fn visit(manager: &PluginManager, key: &str) {
        let url = UrlRecord::new(1, key, key, format!("https://example.com/{key}"));
        let mut event = HookEvent::url_access(&url);
        manager.dispatch(&mut event).await;
    }

    fn body(response: RouteResponse) -> Value {
        match response.body {
            RouteBody::Json(v) => v,
            other => panic!("expected json, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_counts_and_routes() {
        let dir = tempfile::tempdir().unwrap();
        let manager = PluginManager::in_memory(dir.path());
        manager.install(source()).await.unwrap();

        for key in ["a", "b", "a", "c", "a", "b"] {
            visit(&manager, key).await;
        }

        let one = manager
            .handle_request(RouteRequest::new("GET", "/api/access-stats/a"))
            .await
            .unwrap();
        assert_eq!(one.status, 200);
        assert_eq!(body(one)["count"], 3);

        let mut summary = RouteRequest::new("GET", "/api/access-stats");
        summary.query.insert("top".into(), "2".into());
        let summary = body(manager.handle_request(summary).await.unwrap());
        assert_eq!(summary["total"], 6);
        assert_eq!(summary["top"][0]["key"], "a");
        assert_eq!(summary["top"][1]["key"], "b");
        assert_eq!(summary["top"].as_array().unwrap().len(), 2);

        let mut bad = RouteRequest::new("GET", "/api/access-stats");
        bad.query.insert("top".into(), "lots".into());
        let bad = manager.handle_request(bad).await.unwrap();
        assert_eq!(bad.status, 400);
        assert_eq!(body(bad)["error"], "VALIDATION");

        let missing = manager
            .handle_request(RouteRequest::new("GET", "/api/access-stats/zzz"))
            .await
            .unwrap();
        assert_eq!(missing.status, 404);
    }

    #[tokio::test]
    async fn test_flush_writes_snapshot_and_rollback_removes_it() {
        let dir = tempfile::tempdir().unwrap();
        let manager = PluginManager::in_memory(dir.path());
        manager.install(source()).await.unwrap();
        let snapshot_path = dir.path().join("access_stats").join(SNAPSHOT_FILE);
        assert!(snapshot_path.exists());

        visit(&manager, "k").await;
        let outcome = manager.trigger_cron("access_stats", "flush").await.unwrap();
        assert_eq!(outcome, JobOutcome::Succeeded);

        let written: Snapshot =
            serde_json::from_str(&std::fs::read_to_string(&snapshot_path).unwrap()).unwrap();
        assert_eq!(written.counts.get("k"), Some(&1));
        assert!(written.written_at.is_some());

        manager.rollback_migrations("access_stats", 1).await.unwrap();
        assert!(!snapshot_path.exists());
    }

    #[tokio::test]
    async fn test_install_restores_counters_from_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let plugin_dir = dir.path().join("access_stats");
        std::fs::create_dir_all(&plugin_dir).unwrap();
        std::fs::write(
            plugin_dir.join(SNAPSHOT_FILE),
            r#"{"written_at":null,"counts":{"old":41}}"#,
        )
        .unwrap();

        let manager = PluginManager::in_memory(dir.path());
        manager.install(source()).await.unwrap();
        visit(&manager, "old").await;

        let response = manager
            .handle_request(RouteRequest::new("GET", "/api/access-stats/old"))
            .await
            .unwrap();
        assert_eq!(body(response)["count"], 42);
    }
}
