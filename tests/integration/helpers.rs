//! Shared test helpers for integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use http::{Request, StatusCode};
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use urldb_api::AppState;
use urldb_api::router::build_router;
use urldb_core::config::AppConfig;
use urldb_plugin::{PluginManager, PluginSource};

/// Test application context
pub struct TestApp {
    /// The Axum router for making test requests
    pub router: Router,
    /// The plugin runtime behind the router
    pub plugins: Arc<PluginManager>,
    /// Plugin data directory, removed on drop
    pub data_dir: TempDir,
}

impl TestApp {
    /// Creates an app with every built-in plugin in the catalogue and
    /// installed.
    pub async fn new() -> Self {
        let app = Self::empty().await;
        for source in urldb_builtin_plugins::catalogue() {
            app.plugins.install(source).await.expect("Failed to install built-in plugin");
        }
        app
    }

    /// Creates an app whose catalogue holds the built-in plugins but where
    /// nothing is installed.
    pub async fn empty() -> Self {
        Self::with_config(AppConfig::default()).await
    }

    /// Like [`empty`](Self::empty) but serving with `config`.
    pub async fn with_config(config: AppConfig) -> Self {
        let data_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let plugins = Arc::new(PluginManager::in_memory(data_dir.path()));
        for source in urldb_builtin_plugins::catalogue() {
            plugins
                .catalogue()
                .add(source)
                .await
                .expect("Failed to add catalogue unit");
        }

        let state = AppState::new(Arc::new(config), Arc::clone(&plugins), None);
        Self {
            router: build_router(state),
            plugins,
            data_dir,
        }
    }

    /// Installs an extra unit.
    pub async fn install(&self, source: PluginSource) {
        self.plugins
            .install(source)
            .await
            .expect("Failed to install plugin");
    }

    /// Make an HTTP request to the test app
    pub async fn request(&self, method: &str, path: &str, body: Option<Value>) -> TestResponse {
        self.request_with_headers(method, path, body, &[]).await
    }

    /// Make an HTTP request with extra headers
    pub async fn request_with_headers(
        &self,
        method: &str,
        path: &str,
        body: Option<Value>,
        headers: &[(&str, &str)],
    ) -> TestResponse {
        let body_str = body
            .map(|b| serde_json::to_string(&b).expect("Failed to serialize body"))
            .unwrap_or_default();

        let mut req = Request::builder()
            .method(method)
            .uri(path)
            .header("Content-Type", "application/json");
        for (name, value) in headers {
            req = req.header(*name, *value);
        }

        let req = req
            .body(Body::from(body_str))
            .expect("Failed to build request");

        let response = self
            .router
            .clone()
            .oneshot(req)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let body_bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
            .await
            .expect("Failed to read body");

        let body: Value = serde_json::from_slice(&body_bytes).unwrap_or(Value::Null);

        TestResponse { status, body }
    }
}

/// Response from a test request
#[derive(Debug)]
pub struct TestResponse {
    /// HTTP status code
    pub status: StatusCode,
    /// Response body as JSON
    pub body: Value,
}
