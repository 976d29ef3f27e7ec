//! Integration tests for the plugin administration endpoints.

mod helpers;

use http::StatusCode;
use serde_json::json;

#[tokio::test]
async fn test_list_plugins() {
    let app = helpers::TestApp::new().await;

    let response = app.request("GET", "/api/plugins", None).await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["success"], true);
    let names: Vec<&str> = response.body["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["url_category", "access_stats", "login_guard"]);
    assert_eq!(response.body["data"][0]["state"], "enabled");
}

#[tokio::test]
async fn test_plugin_detail_shows_registrations() {
    let app = helpers::TestApp::new().await;

    let response = app.request("GET", "/api/plugins/access_stats", None).await;

    assert_eq!(response.status, StatusCode::OK);
    let data = &response.body["data"];
    assert_eq!(data["name"], "access_stats");
    assert_eq!(data["config"]["top"], 10.0);
    assert_eq!(data["routes"].as_array().unwrap().len(), 2);
    assert_eq!(data["cron_jobs"][0]["name"], "flush");
    assert_eq!(data["cron_jobs"][0]["paused"], false);
    assert!(data["migrations"][0]["applied_at"].is_string());
}

#[tokio::test]
async fn test_unknown_plugin_is_404() {
    let app = helpers::TestApp::new().await;

    let response = app.request("GET", "/api/plugins/nope", None).await;

    assert_eq!(response.status, StatusCode::NOT_FOUND);
    assert_eq!(response.body["error"], "NOT_FOUND");
    assert_eq!(response.body["details"]["plugin"], "nope");
}

#[tokio::test]
async fn test_disable_then_enable() {
    let app = helpers::TestApp::new().await;

    let response = app
        .request("POST", "/api/plugins/access_stats/disable", None)
        .await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["data"]["state"], "disabled");

    let detail = app.request("GET", "/api/plugins/access_stats", None).await;
    assert!(detail.body["data"]["routes"].as_array().unwrap().is_empty());
    assert_eq!(detail.body["data"]["cron_jobs"][0]["paused"], true);

    let served = app.request("GET", "/api/access-stats", None).await;
    assert_eq!(served.status, StatusCode::NOT_FOUND);

    let response = app
        .request("POST", "/api/plugins/access_stats/enable", None)
        .await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["data"]["enabled"], true);

    let served = app.request("GET", "/api/access-stats", None).await;
    assert_eq!(served.status, StatusCode::OK);
}

#[tokio::test]
async fn test_config_update_validates() {
    let app = helpers::TestApp::new().await;

    let response = app
        .request(
            "PUT",
            "/api/plugins/url_category/config",
            Some(json!({ "mode": "regex", "overwrite": "maybe", "colour": 1 })),
        )
        .await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.body["error"], "VALIDATION");
    let fields: Vec<&str> = response.body["details"]["fields"]
        .as_array()
        .unwrap()
        .iter()
        .map(|f| f["key"].as_str().unwrap())
        .collect();
    assert!(fields.contains(&"mode"));
    assert!(fields.contains(&"overwrite"));
    assert!(fields.contains(&"colour"));

    let response = app
        .request(
            "PUT",
            "/api/plugins/url_category/config",
            Some(json!({ "mode": "keyword", "overwrite": true })),
        )
        .await;
    assert_eq!(response.status, StatusCode::OK);

    let response = app
        .request("GET", "/api/plugins/url_category/config", None)
        .await;
    assert_eq!(response.body["data"]["values"]["mode"], "keyword");
    assert_eq!(response.body["data"]["values"]["overwrite"], true);
    assert!(response.body["data"]["values"]["rules"].is_string());
}

#[tokio::test]
async fn test_uninstall_requires_disable() {
    let app = helpers::TestApp::new().await;

    let response = app.request("DELETE", "/api/plugins/login_guard", None).await;
    assert_eq!(response.status, StatusCode::CONFLICT);
    assert_eq!(response.body["details"]["state"], "enabled");

    app.request("POST", "/api/plugins/login_guard/disable", None)
        .await;
    let response = app.request("DELETE", "/api/plugins/login_guard", None).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["data"]["state"], "uninstalled");

    let market = app.request("GET", "/api/plugins/market", None).await;
    let names: Vec<&str> = market.body["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["login_guard"]);
}

#[tokio::test]
async fn test_install_from_market() {
    let app = helpers::TestApp::empty().await;

    let market = app.request("GET", "/api/plugins/market", None).await;
    assert_eq!(market.body["data"].as_array().unwrap().len(), 3);

    let response = app
        .request(
            "POST",
            "/api/plugins/install",
            Some(json!({ "name": "access_stats" })),
        )
        .await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["data"]["state"], "enabled");

    let again = app
        .request(
            "POST",
            "/api/plugins/install",
            Some(json!({ "name": "access_stats" })),
        )
        .await;
    assert_eq!(again.status, StatusCode::BAD_REQUEST);

    let missing = app
        .request("POST", "/api/plugins/install", Some(json!({ "name": "ghost" })))
        .await;
    assert_eq!(missing.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_migrations_and_cron_endpoints() {
    let app = helpers::TestApp::new().await;

    let response = app
        .request("POST", "/api/plugins/access_stats/migrations/apply", None)
        .await;
    assert_eq!(response.status, StatusCode::OK);
    assert!(response.body["data"]["migrations"].as_array().unwrap().is_empty());

    let response = app
        .request("POST", "/api/plugins/access_stats/cron/flush/run", None)
        .await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["data"]["status"], "succeeded");

    let response = app
        .request("POST", "/api/plugins/access_stats/cron/nightly/run", None)
        .await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);

    let response = app
        .request(
            "POST",
            "/api/plugins/access_stats/migrations/rollback?steps=1",
            None,
        )
        .await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["data"]["migrations"], json!([1]));
    assert!(!app.data_dir.path().join("access_stats/snapshot.json").exists());
}

#[tokio::test]
async fn test_stats_and_logs() {
    let app = helpers::TestApp::new().await;
    app.request("GET", "/api/access-stats", None).await;

    let response = app.request("GET", "/api/plugins/stats", None).await;
    assert_eq!(response.status, StatusCode::OK);
    let entry = response.body["data"]
        .as_array()
        .unwrap()
        .iter()
        .find(|e| e["plugin"] == "access_stats")
        .cloned()
        .unwrap();
    assert_eq!(entry["route_invocations"], 1);

    let response = app
        .request("GET", "/api/plugins/access_stats/logs?limit=5", None)
        .await;
    assert_eq!(response.status, StatusCode::OK);
    assert!(response.body["data"].as_array().unwrap().len() <= 5);
}
