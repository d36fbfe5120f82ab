use crate::api::{alert_error_response, success_empty_response, success_response};
use crate::config::RuleRequest;
use crate::logging::TraceId;
use crate::state::AppState;
use axum::extract::{Extension, Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

#[derive(Deserialize)]
struct EnableRequest {
    enabled: bool,
}

#[derive(Serialize)]
struct TestRuleResponse {
    rule_id: String,
    should_fire: bool,
    value: f64,
}

async fn list_rules(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    success_response(StatusCode::OK, &trace_id, state.engine.list_rules())
}

async fn create_rule(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
    Json(req): Json<RuleRequest>,
) -> impl IntoResponse {
    let rule = req.into_rule(state.config.alerting.default_severity);
    match state.engine.add_rule(rule) {
        Ok(id) => match state.engine.get_rule(&id) {
            Some(rule) => success_response(StatusCode::CREATED, &trace_id, rule),
            // Removed concurrently between add and read back.
            None => success_empty_response(StatusCode::CREATED, &trace_id, "created"),
        },
        Err(e) => alert_error_response(&trace_id, &e),
    }
}

async fn get_rule(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.engine.get_rule(&id) {
        Some(rule) => success_response(StatusCode::OK, &trace_id, rule),
        None => alert_error_response(
            &trace_id,
            &vigil_alert::error::AlertError::RuleNotFound(id),
        ),
    }
}

async fn update_rule(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<RuleRequest>,
) -> impl IntoResponse {
    let rule = req.into_rule(state.config.alerting.default_severity);
    match state.engine.update_rule(&id, rule) {
        Ok(rule) => success_response(StatusCode::OK, &trace_id, rule),
        Err(e) => alert_error_response(&trace_id, &e),
    }
}

async fn delete_rule(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.engine.remove_rule(&id) {
        Ok(_) => success_empty_response(StatusCode::OK, &trace_id, "deleted"),
        Err(e) => alert_error_response(&trace_id, &e),
    }
}

async fn set_rule_enabled(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<EnableRequest>,
) -> impl IntoResponse {
    match state.engine.set_rule_enabled(&id, req.enabled) {
        Ok(()) => match state.engine.get_rule(&id) {
            Some(rule) => success_response(StatusCode::OK, &trace_id, rule),
            None => success_empty_response(StatusCode::OK, &trace_id, "updated"),
        },
        Err(e) => alert_error_response(&trace_id, &e),
    }
}

/// Dry run: evaluates the rule once without changing any alert.
async fn test_rule(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.engine.test_rule(&id).await {
        Ok(eval) => success_response(
            StatusCode::OK,
            &trace_id,
            TestRuleResponse {
                rule_id: id,
                should_fire: eval.should_fire,
                value: eval.value,
            },
        ),
        Err(e) => alert_error_response(&trace_id, &e),
    }
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/rules", get(list_rules).post(create_rule))
        .route(
            "/v1/rules/{id}",
            get(get_rule).put(update_rule).delete(delete_rule),
        )
        .route("/v1/rules/{id}/enable", put(set_rule_enabled))
        .route("/v1/rules/{id}/test", post(test_rule))
}
