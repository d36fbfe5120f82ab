use crate::api::{alert_error_response, error_response, success_response};
use crate::logging::TraceId;
use crate::state::AppState;
use axum::extract::{Extension, Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use vigil_alert::engine::EngineStats;
use vigil_alert::error::AlertError;
use vigil_alert::store::AlertFilter;
use vigil_notify::manager::NotifyStats;

/// Body of the acknowledge and resolve endpoints.
#[derive(Deserialize)]
struct UserRequest {
    user: String,
}

#[derive(Serialize)]
struct AlertStatsResponse {
    #[serde(flatten)]
    engine: EngineStats,
    notifications: NotifyStats,
    active_escalations: usize,
}

async fn list_alerts(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
    Query(filter): Query<AlertFilter>,
) -> impl IntoResponse {
    success_response(
        StatusCode::OK,
        &trace_id,
        state.engine.list_active_alerts(&filter),
    )
}

async fn get_alert(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
    Path(fingerprint): Path<String>,
) -> impl IntoResponse {
    match state.engine.get_alert(&fingerprint) {
        Some(alert) => success_response(StatusCode::OK, &trace_id, alert),
        None => alert_error_response(&trace_id, &AlertError::AlertNotFound(fingerprint)),
    }
}

async fn acknowledge_alert(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
    Path(fingerprint): Path<String>,
    Json(req): Json<UserRequest>,
) -> impl IntoResponse {
    if req.user.trim().is_empty() {
        return error_response(StatusCode::BAD_REQUEST, &trace_id, "bad_request", "user is required");
    }
    match state.engine.acknowledge(&fingerprint, &req.user) {
        Ok(alert) => success_response(StatusCode::OK, &trace_id, alert),
        Err(e) => alert_error_response(&trace_id, &e),
    }
}

async fn resolve_alert(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
    Path(fingerprint): Path<String>,
    Json(req): Json<UserRequest>,
) -> impl IntoResponse {
    if req.user.trim().is_empty() {
        return error_response(StatusCode::BAD_REQUEST, &trace_id, "bad_request", "user is required");
    }
    match state.engine.resolve(&fingerprint, &req.user) {
        Ok(alert) => success_response(StatusCode::OK, &trace_id, alert),
        Err(e) => alert_error_response(&trace_id, &e),
    }
}

async fn alert_stats(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    success_response(
        StatusCode::OK,
        &trace_id,
        AlertStatsResponse {
            engine: state.engine.stats(),
            notifications: state.notifications.stats(),
            active_escalations: state.escalation.active_count(),
        },
    )
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/alerts", get(list_alerts))
        .route("/v1/alerts/stats", get(alert_stats))
        .route("/v1/alerts/{fingerprint}", get(get_alert))
        .route("/v1/alerts/{fingerprint}/acknowledge", post(acknowledge_alert))
        .route("/v1/alerts/{fingerprint}/resolve", post(resolve_alert))
}
