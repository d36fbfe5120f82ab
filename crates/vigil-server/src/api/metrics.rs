use crate::api::{error_response, success_response};
use crate::logging::TraceId;
use crate::state::AppState;
use axum::extract::{Extension, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};
use serde::Serialize;
use vigil_common::types::MetricDataPoint;

#[derive(Serialize)]
struct IngestResponse {
    accepted: usize,
    series: usize,
}

/// Feeds a batch of samples into the in-memory store read by the threshold
/// evaluator. Points without a timestamp are stamped with the receive time.
async fn ingest_metrics(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
    Json(points): Json<Vec<MetricDataPoint>>,
) -> impl IntoResponse {
    if points.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, &trace_id, "bad_request", "empty batch");
    }
    if let Some(bad) = points
        .iter()
        .find(|p| p.metric_name.trim().is_empty() || !p.value.is_finite())
    {
        let msg = format!("invalid data point for metric '{}'", bad.metric_name);
        return error_response(StatusCode::BAD_REQUEST, &trace_id, "bad_request", &msg);
    }

    let accepted = state.metrics.ingest_batch(points);
    tracing::debug!(accepted, "Metric batch ingested");
    success_response(
        StatusCode::OK,
        &trace_id,
        IngestResponse {
            accepted,
            series: state.metrics.series_count(),
        },
    )
}

pub fn routes() -> Router<AppState> {
    Router::new().route("/v1/metrics", post(ingest_metrics))
}
