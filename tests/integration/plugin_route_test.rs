//! Integration tests for plugin routes served through the HTTP fallback.

mod helpers;

use std::time::Duration;

use http::StatusCode;
use serde_json::json;

use urldb_core::config::AppConfig;
use urldb_core::events::UrlRecord;
use urldb_plugin::prelude::*;

const GATE_HEADER: &str = r#"/**
 * @name gate
 * @version 0.1.0
 * @hooks [onAPIRequest]
 */"#;

/// Vetoes requests carrying `x-block` and echoes route input back.
#[derive(Default)]
struct Gate;

impl PluginScript for Gate {
    fn setup(&self, b: &mut PluginBindings) -> Result<(), HandlerError> {
        b.on_api_request(hook_fn(|ctx, event, next| {
            Box::pin(async move {
                let blocked = event
                    .request()
                    .is_some_and(|r| r.headers.contains_key("x-block"));
                if blocked {
                    ctx.warn("request blocked");
                    return Ok(());
                }
                next.run(event).await;
                Ok(())
            })
        }));

        b.router_add(
            "POST",
            "/api/gate/:id",
            route_fn(|_ctx, req| {
                Box::pin(async move {
                    Ok(RouteResponse::json(
                        201,
                        json!({
                            "id": req.param("id"),
                            "tag": req.query("tag"),
                            "body": req.body,
                        }),
                    ))
                })
            }),
        )?;
        b.router_add(
            "GET",
            "/api/gate/broken",
            route_fn(|_ctx, _req| Box::pin(async { Err(HandlerError::new("disk full")) })),
        )?;
        Ok(())
    }
}

/// Answers only after five seconds.
struct Slow;

impl PluginScript for Slow {
    fn setup(&self, b: &mut PluginBindings) -> Result<(), HandlerError> {
        b.router_add(
            "GET",
            "/api/slow",
            route_fn(|_ctx, _req| {
                Box::pin(async {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    Ok(RouteResponse::text(200, "late"))
                })
            }),
        )?;
        Ok(())
    }
}

async fn app_with_gate() -> helpers::TestApp {
    let app = helpers::TestApp::new().await;
    app.install(PluginSource::new("tests/gate.rs", GATE_HEADER, Gate))
        .await;
    app
}

#[tokio::test]
async fn test_plugin_route_receives_params_query_and_body() {
    let app = app_with_gate().await;

    let response = app
        .request(
            "POST",
            "/api/gate/42?tag=new",
            Some(json!({ "title": "Rust" })),
        )
        .await;

    assert_eq!(response.status, StatusCode::CREATED);
    assert_eq!(response.body["id"], "42");
    assert_eq!(response.body["tag"], "new");
    assert_eq!(response.body["body"]["title"], "Rust");
}

#[tokio::test]
async fn test_unmatched_path_is_404() {
    let app = app_with_gate().await;

    let response = app.request("GET", "/api/gate/42", None).await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
    assert_eq!(response.body["error"], "NOT_FOUND");

    let response = app.request("GET", "/nowhere", None).await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_api_request_veto_is_403() {
    let app = app_with_gate().await;

    let response = app
        .request_with_headers("POST", "/api/gate/1", None, &[("x-block", "1")])
        .await;

    assert_eq!(response.status, StatusCode::FORBIDDEN);
    assert_eq!(response.body["error"], "FORBIDDEN");
    let logs = app.plugins.logs("gate", None).await.unwrap();
    assert!(logs.iter().any(|l| l.message == "request blocked"));

    let admin = app
        .request_with_headers("GET", "/api/plugins", None, &[("x-block", "1")])
        .await;
    assert_eq!(admin.status, StatusCode::OK);
}

#[tokio::test]
async fn test_failing_route_is_500_and_counted() {
    let app = app_with_gate().await;

    let response = app.request("GET", "/api/gate/broken", None).await;

    assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(response.body["message"].as_str().unwrap().contains("gate"));
    let stats = app.plugins.stats("gate").await.unwrap();
    assert_eq!(stats.route_failures, 1);
}

#[tokio::test]
async fn test_access_stats_served_over_http() {
    let app = helpers::TestApp::new().await;
    let url = UrlRecord::new(7, "rust", "Rust", "https://www.rust-lang.org");
    for _ in 0..3 {
        app.plugins.dispatch(&mut HookEvent::url_access(&url)).await;
    }

    let response = app.request("GET", "/api/access-stats/rust", None).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["count"], 3);

    let response = app.request("GET", "/api/access-stats?top=1", None).await;
    assert_eq!(response.body["total"], 3);
    assert_eq!(response.body["top"][0]["key"], "rust");
}

#[tokio::test]
async fn test_slow_route_hits_request_timeout() {
    let mut config = AppConfig::default();
    config.server.request_timeout_seconds = 1;
    let app = helpers::TestApp::with_config(config).await;
    app.install(PluginSource::new("tests/slow.rs", "// @name slow", Slow))
        .await;

    let response = app.request("GET", "/api/slow", None).await;
    assert_eq!(response.status, StatusCode::REQUEST_TIMEOUT);

    let admin = app.request("GET", "/api/plugins/slow", None).await;
    assert_eq!(admin.status, StatusCode::OK);
}
