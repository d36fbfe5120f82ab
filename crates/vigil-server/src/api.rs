pub mod alerts;
pub mod metrics;
pub mod rules;
pub mod silences;

use crate::logging::TraceId;
use crate::state::AppState;
use axum::extract::{Extension, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use vigil_alert::error::AlertError;
use vigil_notify::error::NotifyError;

/// Response envelope shared by every endpoint.
#[derive(Serialize)]
pub struct ApiResponse<T>
where
    T: Serialize,
{
    /// 0 on success.
    pub err_code: i32,
    pub err_msg: String,
    pub trace_id: String,
    pub data: Option<T>,
}

pub fn success_response<T>(status: StatusCode, trace_id: &str, data: T) -> Response
where
    T: Serialize,
{
    (
        status,
        Json(ApiResponse {
            err_code: 0,
            err_msg: "success".to_string(),
            trace_id: trace_id.to_string(),
            data: Some(data),
        }),
    )
        .into_response()
}

pub fn success_empty_response(status: StatusCode, trace_id: &str, msg: &str) -> Response {
    (
        status,
        Json(ApiResponse::<Value> {
            err_code: 0,
            err_msg: msg.to_string(),
            trace_id: trace_id.to_string(),
            data: None,
        }),
    )
        .into_response()
}

fn to_custom_error_code(code: &str) -> i32 {
    match code {
        "bad_request" => 1001,
        "not_found" => 1004,
        "conflict" => 1005,
        "invalid_rule" => 1201,
        "unknown_escalation_policy" => 1202,
        "invalid_silence" => 1301,
        "evaluation_failed" => 1502,
        "internal_error" => 1500,
        _ => 1999,
    }
}

pub fn error_response(status: StatusCode, trace_id: &str, code: &str, msg: &str) -> Response {
    (
        status,
        Json(ApiResponse::<Value> {
            err_code: to_custom_error_code(code),
            err_msg: msg.to_string(),
            trace_id: trace_id.to_string(),
            data: None,
        }),
    )
        .into_response()
}

/// Not-found errors become 404, configuration errors 400.
pub fn alert_error_response(trace_id: &str, err: &AlertError) -> Response {
    let (status, code) = match err {
        AlertError::RuleNotFound(_) | AlertError::AlertNotFound(_) => {
            (StatusCode::NOT_FOUND, "not_found")
        }
        AlertError::DuplicateRule(_) => (StatusCode::CONFLICT, "conflict"),
        AlertError::InvalidRule(_) => (StatusCode::BAD_REQUEST, "invalid_rule"),
        AlertError::UnknownEscalationPolicy(_) => {
            (StatusCode::BAD_REQUEST, "unknown_escalation_policy")
        }
        AlertError::Evaluation(_) => (StatusCode::BAD_GATEWAY, "evaluation_failed"),
    };
    error_response(status, trace_id, code, &err.to_string())
}

pub fn notify_error_response(trace_id: &str, err: &NotifyError) -> Response {
    match err {
        NotifyError::SilenceNotFound(_) => {
            error_response(StatusCode::NOT_FOUND, trace_id, "not_found", &err.to_string())
        }
        NotifyError::InvalidConfig(_) => error_response(
            StatusCode::BAD_REQUEST,
            trace_id,
            "invalid_silence",
            &err.to_string(),
        ),
        _ => {
            tracing::error!(error = %err, "Notification subsystem error");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                trace_id,
                "internal_error",
                &err.to_string(),
            )
        }
    }
}

#[derive(Serialize)]
struct HealthResponse {
    version: String,
    uptime_secs: i64,
    engine_running: bool,
    rule_count: usize,
    alert_count: usize,
    metric_series: usize,
}

async fn health(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    success_response(
        StatusCode::OK,
        &trace_id,
        HealthResponse {
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_secs: (Utc::now() - state.start_time).num_seconds(),
            engine_running: state.engine.is_running(),
            rule_count: state.engine.list_rules().len(),
            alert_count: state.engine.alert_store().len(),
            metric_series: state.metrics.series_count(),
        },
    )
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/health", get(health))
        .merge(rules::routes())
        .merge(alerts::routes())
        .merge(silences::routes())
        .merge(metrics::routes())
}
