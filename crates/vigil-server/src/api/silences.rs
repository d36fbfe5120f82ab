use crate::api::{notify_error_response, success_empty_response, success_response};
use crate::config::SilenceRequest;
use crate::logging::TraceId;
use crate::state::AppState;
use axum::extract::{Extension, Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{delete, get};
use axum::{Json, Router};
use chrono::Utc;

async fn list_silences(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    success_response(StatusCode::OK, &trace_id, state.silences.list())
}

/// Alerts matching the new silence move to `suppressed` on their next
/// evaluation.
async fn create_silence(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
    Json(req): Json<SilenceRequest>,
) -> impl IntoResponse {
    match state.silences.add(req.into_rule(Utc::now())) {
        Ok(rule) => success_response(StatusCode::CREATED, &trace_id, rule),
        Err(e) => notify_error_response(&trace_id, &e),
    }
}

async fn delete_silence(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.silences.remove(&id) {
        Ok(_) => success_empty_response(StatusCode::OK, &trace_id, "deleted"),
        Err(e) => notify_error_response(&trace_id, &e),
    }
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/silences", get(list_silences).post(create_silence))
        .route("/v1/silences/{id}", delete(delete_silence))
}
