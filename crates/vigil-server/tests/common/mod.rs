#![allow(dead_code)]

use anyhow::Result;
use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use serde_json::{json, Value};
use std::io::Write;
use tempfile::NamedTempFile;
use tower::util::ServiceExt;
use vigil_server::app;
use vigil_server::config::ServerConfig;
use vigil_server::state::AppState;

pub struct TestContext {
    pub state: AppState,
    pub app: axum::Router,
}

pub fn build_test_context() -> Result<TestContext> {
    build_test_context_with(ServerConfig::default())
}

pub fn build_test_context_with(config: ServerConfig) -> Result<TestContext> {
    let state = AppState::build(config)?;
    let app = app::build_http_app(state.clone());
    Ok(TestContext { state, app })
}

/// Writes `content` to a temp file that lives as long as the handle.
pub fn write_temp_file(content: &str, suffix: &str) -> Result<NamedTempFile> {
    let mut file = tempfile::Builder::new().suffix(suffix).tempfile()?;
    file.write_all(content.as_bytes())?;
    file.flush()?;
    Ok(file)
}

pub async fn request_json(
    app: &axum::Router,
    method: &str,
    uri: &str,
    body: Option<Value>,
) -> (StatusCode, Value, Option<String>) {
    let req = Request::builder()
        .method(method)
        .uri(uri)
        .header("Content-Type", "application/json")
        .body(Body::from(body.unwrap_or(Value::Null).to_string()))
        .expect("request should build");
    send(app, req).await
}

pub async fn request_no_body(
    app: &axum::Router,
    method: &str,
    uri: &str,
) -> (StatusCode, Value, Option<String>) {
    let req = Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .expect("request should build");
    send(app, req).await
}

async fn send(app: &axum::Router, req: Request<Body>) -> (StatusCode, Value, Option<String>) {
    let resp = app
        .clone()
        .oneshot(req)
        .await
        .expect("request should be handled");

    let status = resp.status();
    let trace_id = resp
        .headers()
        .get("x-trace-id")
        .and_then(|h| h.to_str().ok())
        .map(|s| s.to_string());
    let bytes = to_bytes(resp.into_body(), usize::MAX)
        .await
        .expect("body should read");
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice::<Value>(&bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).to_string()))
    };

    (status, json, trace_id)
}

/// A threshold rule on `metric` scoped to `host`, firing immediately.
pub fn threshold_rule(id: &str, metric: &str, threshold: f64, host: &str) -> Value {
    json!({
        "id": id,
        "name": format!("{metric} above {threshold}"),
        "conditions": [{
            "metric": metric,
            "operator": "gt",
            "threshold": threshold,
            "aggregation": "last",
            "window_secs": 300,
            "labels": { "host": host }
        }],
        "labels": { "host": host, "team": "infra" }
    })
}

pub async fn create_rule(app: &axum::Router, rule: Value) -> Value {
    let (status, body, _) = request_json(app, "POST", "/v1/rules", Some(rule)).await;
    assert_eq!(status, StatusCode::CREATED, "unexpected body: {body}");
    body["data"].clone()
}

pub async fn push_metric(app: &axum::Router, metric: &str, host: &str, value: f64) {
    let (status, body, _) = request_json(
        app,
        "POST",
        "/v1/metrics",
        Some(json!([{ "metric_name": metric, "value": value, "labels": { "host": host } }])),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "unexpected body: {body}");
}

pub async fn list_alerts(app: &axum::Router, query: &str) -> Vec<Value> {
    let uri = if query.is_empty() {
        "/v1/alerts".to_string()
    } else {
        format!("/v1/alerts?{query}")
    };
    let (status, body, _) = request_no_body(app, "GET", &uri).await;
    assert_eq!(status, StatusCode::OK);
    body["data"].as_array().cloned().unwrap_or_default()
}
