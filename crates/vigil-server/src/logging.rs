//! Per-request tracing for the admin API.

use axum::body::{Body, Bytes};
use axum::extract::Request;
use axum::http::{header, HeaderMap, HeaderValue, Method, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use rand::Rng;
use std::time::{Duration, Instant};
use vigil_notify::utils::truncate_string;

pub const TRACE_ID_HEADER: &str = "X-Trace-Id";

const LOGGED_BODY_BYTES: usize = 200;
const MAX_REQUEST_BODY_BYTES: usize = 4 * 1024 * 1024;

/// Trace ID of the current request, stored in request extensions.
#[derive(Clone)]
pub struct TraceId(pub String);

impl std::ops::Deref for TraceId {
    type Target = str;
    fn deref(&self) -> &str {
        &self.0
    }
}

impl TraceId {
    /// 16 lowercase hex characters.
    fn random() -> Self {
        Self(format!("{:016x}", rand::thread_rng().gen::<u64>()))
    }
}

fn snippet(bytes: &Bytes) -> String {
    truncate_string(&String::from_utf8_lossy(bytes), LOGGED_BODY_BYTES)
}

fn human_elapsed(elapsed: Duration) -> String {
    match elapsed.as_micros() {
        us if us < 1_000 => format!("{us}µs"),
        us if us < 1_000_000 => format!("{}ms", us / 1_000),
        _ => format!("{:.1}s", elapsed.as_secs_f64()),
    }
}

/// Metric batches are large and repetitive; their bodies stay out of the log.
fn loggable(method: &Method, path: &str) -> bool {
    path != "/v1/metrics" && matches!(*method, Method::POST | Method::PUT | Method::PATCH)
}

fn is_json(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("application/json"))
}

/// Assigns a trace ID, logs the request and response, and echoes the ID in
/// the `X-Trace-Id` response header.
pub async fn request_logging(mut req: Request, next: Next) -> Response {
    let trace_id = TraceId::random();
    req.extensions_mut().insert(trace_id.clone());

    let method = req.method().clone();
    let target = req
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_default();
    let log_bodies = loggable(&method, req.uri().path());

    let req = if log_bodies {
        let (parts, body) = req.into_parts();
        let bytes = match axum::body::to_bytes(body, MAX_REQUEST_BODY_BYTES).await {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(trace_id = %trace_id.0, error = %e, "Request body rejected");
                return (StatusCode::PAYLOAD_TOO_LARGE, "request body too large").into_response();
            }
        };
        tracing::info!(trace_id = %trace_id.0, %method, path = %target, body = %snippet(&bytes), "--> request");
        Request::from_parts(parts, Body::from(bytes))
    } else {
        tracing::info!(trace_id = %trace_id.0, %method, path = %target, "--> request");
        req
    };

    let started = Instant::now();
    let (mut parts, body) = next.run(req).await.into_parts();
    let elapsed = human_elapsed(started.elapsed());
    let status = parts.status.as_u16();

    let bytes = axum::body::to_bytes(body, usize::MAX)
        .await
        .unwrap_or_default();
    let body_log = if log_bodies && is_json(&parts.headers) {
        snippet(&bytes)
    } else {
        String::new()
    };

    match parts.status {
        s if s.is_server_error() => {
            tracing::error!(trace_id = %trace_id.0, status, %elapsed, body = %body_log, "<-- response")
        }
        s if s.is_client_error() => {
            tracing::warn!(trace_id = %trace_id.0, status, %elapsed, body = %body_log, "<-- response")
        }
        _ => tracing::info!(trace_id = %trace_id.0, status, %elapsed, "<-- response"),
    }

    if let Ok(value) = HeaderValue::from_str(&trace_id) {
        parts.headers.insert(TRACE_ID_HEADER, value);
    }
    Response::from_parts(parts, Body::from(bytes))
}
