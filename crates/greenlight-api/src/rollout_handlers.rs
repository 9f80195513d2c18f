//! REST API handlers for rollouts and deployment targets.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;

use greenlight_core::{Environment, RunId, WeightSplit};

use crate::{ApiResponse, ApiState, error_response};

/// Live view of the two environments.
#[derive(serde::Serialize)]
pub struct TargetsView {
    pub active: Environment,
    pub idle: Environment,
    pub weights: WeightSplit,
    /// Run whose rollout is in progress, if any.
    pub rollout_in_progress: Option<RunId>,
}

/// GET /api/v1/targets
pub async fn get_targets(State(state): State<ApiState>) -> impl IntoResponse {
    let snapshot = state.controller.targets().snapshot();
    ApiResponse::ok(TargetsView {
        active: snapshot.active,
        idle: snapshot.idle(),
        weights: snapshot.split(),
        rollout_in_progress: state.controller.active_run(),
    })
}

/// GET /api/v1/rollouts
pub async fn list_rollouts(State(state): State<ApiState>) -> impl IntoResponse {
    match state.store.list_rollouts() {
        Ok(reports) => ApiResponse::ok(reports).into_response(),
        Err(e) => error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response(),
    }
}

/// GET /api/v1/runs/:id/rollout
pub async fn get_rollout(State(state): State<ApiState>, Path(id): Path<String>) -> impl IntoResponse {
    match state.store.get_rollout(&id) {
        Ok(Some(report)) => ApiResponse::ok(report).into_response(),
        Ok(None) => error_response("rollout not found", StatusCode::NOT_FOUND).into_response(),
        Err(e) => error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response(),
    }
}

/// POST /api/v1/rollout/cancel
///
/// Reverses the rollout in progress. The run's Deploy stage then fails.
pub async fn cancel_rollout(State(state): State<ApiState>) -> impl IntoResponse {
    let Some(run_id) = state.controller.active_run() else {
        return error_response("no rollout in progress", StatusCode::CONFLICT).into_response();
    };
    if !state.controller.cancel_active() {
        return error_response("no rollout in progress", StatusCode::CONFLICT).into_response();
    }
    ApiResponse::ok(serde_json::json!({ "cancelled": run_id })).into_response()
}
