//! REST API handlers for triggers and pipeline runs.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use tracing::warn;

use greenlight_core::SourceTrigger;
use greenlight_pipeline::{PipelineError, Submission};

use crate::{ApiResponse, ApiState, error_response};

/// Header consulted when the body carries no idempotency key.
pub const IDEMPOTENCY_KEY_HEADER: &str = "idempotency-key";

// ── Triggers ───────────────────────────────────────────────────

/// Trigger request body.
#[derive(serde::Deserialize)]
pub struct TriggerRequest {
    pub revision: String,
    pub idempotency_key: Option<String>,
    pub repository: Option<String>,
}

#[derive(serde::Serialize)]
struct TriggerAccepted {
    run_id: String,
    duplicate: bool,
}

/// POST /api/v1/triggers
///
/// 202 for a new run, 200 naming the existing run for a replayed key,
/// 503 when the queue is full (the key stays unclaimed).
pub async fn submit_trigger(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Json(req): Json<TriggerRequest>,
) -> impl IntoResponse {
    let key = req.idempotency_key.or_else(|| {
        headers
            .get(IDEMPOTENCY_KEY_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    });
    let Some(key) = key else {
        return error_response("idempotency key is required", StatusCode::BAD_REQUEST).into_response();
    };

    let trigger = SourceTrigger {
        revision: req.revision,
        idempotency_key: key,
        repository: req.repository,
    };

    match state.queue.submit(trigger).await {
        Ok(Submission::Accepted(run_id)) => (
            StatusCode::ACCEPTED,
            ApiResponse::ok(TriggerAccepted {
                run_id,
                duplicate: false,
            }),
        )
            .into_response(),
        Ok(Submission::Duplicate(run_id)) => ApiResponse::ok(TriggerAccepted {
            run_id,
            duplicate: true,
        })
        .into_response(),
        Err(PipelineError::Trigger(e)) => {
            error_response(&e.to_string(), StatusCode::BAD_REQUEST).into_response()
        }
        Err(e @ PipelineError::QueueFull(_)) => {
            warn!(error = %e, "trigger rejected");
            error_response(&e.to_string(), StatusCode::SERVICE_UNAVAILABLE).into_response()
        }
        Err(e) => error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response(),
    }
}

// ── Runs ───────────────────────────────────────────────────────

/// GET /api/v1/runs
///
/// Newest first.
pub async fn list_runs(State(state): State<ApiState>) -> impl IntoResponse {
    match state.store.list_runs() {
        Ok(mut runs) => {
            runs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            ApiResponse::ok(runs).into_response()
        }
        Err(e) => error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response(),
    }
}

/// GET /api/v1/runs/:id
pub async fn get_run(State(state): State<ApiState>, Path(id): Path<String>) -> impl IntoResponse {
    match state.store.get_run(&id) {
        Ok(Some(run)) => ApiResponse::ok(run).into_response(),
        Ok(None) => error_response("run not found", StatusCode::NOT_FOUND).into_response(),
        Err(e) => error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response(),
    }
}

/// GET /api/v1/runs/:id/events
pub async fn list_run_events(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.store.get_run(&id) {
        Ok(Some(_)) => {}
        Ok(None) => return error_response("run not found", StatusCode::NOT_FOUND).into_response(),
        Err(e) => {
            return error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response();
        }
    }
    match state.store.list_events_for_run(&id) {
        Ok(events) => ApiResponse::ok(events).into_response(),
        Err(e) => error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response(),
    }
}

// ── Liveness ───────────────────────────────────────────────────

/// GET /healthz
pub async fn healthz() -> impl IntoResponse {
    ApiResponse::ok("ok")
}
