//! Fallback handler serving plugin-registered routes.
//!
//! Every request no admin route claims is offered to `onAPIRequest`
//! subscribers first; a veto answers 403. Otherwise the plugin route table
//! is consulted and an unmatched request is a 404.

use std::collections::BTreeMap;

use axum::Json;
use axum::body::{Body, to_bytes};
use axum::extract::{Query, Request, State};
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use tracing::{debug, warn};

use urldb_core::error::AppError;
use urldb_core::events::ApiRequestRecord;
use urldb_plugin::HookEvent;
use urldb_plugin::routes::{RouteBody, RouteRequest, RouteResponse};

use crate::error::ApiError;
use crate::state::AppState;

/// Fallback for every unmatched method and path.
pub async fn plugin_route(
    State(state): State<AppState>,
    Query(query): Query<BTreeMap<String, String>>,
    request: Request,
) -> Result<Response, ApiError> {
    let (parts, body) = request.into_parts();
    let method = parts.method.as_str().to_ascii_uppercase();
    let path = parts.uri.path().to_string();
    let headers = header_map(&parts.headers);

    let mut record = ApiRequestRecord::new(&method, &path);
    record.query = query.clone();
    record.client_ip = client_ip(&headers);
    record.headers = headers.clone();
    let mut event = HookEvent::api_request(&record);
    state.plugins.dispatcher().fire_or_veto(&mut event).await?;

    let limit = state.config.server.max_body_bytes;
    let bytes = to_bytes(body, limit)
        .await
        .map_err(|e| AppError::validation(format!("Failed to read request body: {e}")))?;
    let body = if bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null)
    };

    let route_request = RouteRequest {
        method: method.clone(),
        path: path.clone(),
        params: BTreeMap::new(),
        query,
        headers,
        body,
    };

    match state.plugins.handle_request(route_request).await {
        Some(response) => Ok(into_http(response)),
        None => {
            debug!(method = %method, path = %path, "No plugin route matched");
            Err(AppError::not_found(format!("No route for {method} {path}")).into())
        }
    }
}

fn header_map(headers: &HeaderMap) -> BTreeMap<String, String> {
    headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
        })
        .collect()
}

fn client_ip(headers: &BTreeMap<String, String>) -> Option<String> {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.split(',').next())
        .or_else(|| headers.get("x-real-ip").map(String::as_str))
        .map(|ip| ip.trim().to_string())
}

/// Converts a plugin response into an HTTP response.
fn into_http(response: RouteResponse) -> Response {
    let status = StatusCode::from_u16(response.status).unwrap_or_else(|_| {
        warn!(status = response.status, "Plugin returned an invalid status code");
        StatusCode::INTERNAL_SERVER_ERROR
    });

    let mut http = match response.body {
        RouteBody::Json(value) => (status, Json(value)).into_response(),
        RouteBody::Text(text) => (status, text).into_response(),
        RouteBody::Empty => (status, Body::empty()).into_response(),
    };

    for (name, value) in response.headers {
        match (
            HeaderName::try_from(name.as_str()),
            HeaderValue::try_from(value.as_str()),
        ) {
            (Ok(name), Ok(value)) => {
                http.headers_mut().insert(name, value);
            }
            _ => warn!(header = %name, "Plugin returned an invalid header"),
        }
    }
    http
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plugin_response_keeps_status_and_headers() {
        let response = into_http(
            RouteResponse::text(201, "created").with_header("x-plugin", "stats"),
        );
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(response.headers()["x-plugin"], "stats");
    }

    #[test]
    fn test_forwarded_for_wins_over_real_ip() {
        let mut headers = BTreeMap::new();
        headers.insert("x-real-ip".to_string(), "10.0.0.2".to_string());
        assert_eq!(client_ip(&headers).as_deref(), Some("10.0.0.2"));
        headers.insert("x-forwarded-for".to_string(), "1.2.3.4, 10.0.0.1".to_string());
        assert_eq!(client_ip(&headers).as_deref(), Some("1.2.3.4"));
    }
}
