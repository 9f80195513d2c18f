//! greenlight-api — REST API for Greenlight.
//!
//! Accepts source triggers and exposes pipeline runs, their event logs,
//! archived rollouts, and the live deployment targets.
//!
//! # API Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | POST | `/api/v1/triggers` | Submit a source trigger |
//! | GET | `/api/v1/runs` | List pipeline runs |
//! | GET | `/api/v1/runs/{id}` | Get a run and its stage results |
//! | GET | `/api/v1/runs/{id}/events` | Event log for a run |
//! | GET | `/api/v1/runs/{id}/rollout` | Rollout report for a run |
//! | GET | `/api/v1/rollouts` | List archived rollouts |
//! | GET | `/api/v1/targets` | Active/idle environments and weights |
//! | POST | `/api/v1/rollout/cancel` | Cancel the rollout in progress |
//! | GET | `/healthz` | Liveness |

pub mod handlers;
pub mod rollout_handlers;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};

use greenlight_pipeline::TriggerQueue;
use greenlight_rollout::TrafficShiftController;
use greenlight_state::StateStore;

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub store: StateStore,
    pub queue: TriggerQueue,
    pub controller: Arc<TrafficShiftController>,
}

/// Build the complete API router.
pub fn build_router(state: ApiState) -> Router {
    let api_routes = Router::new()
        .route("/triggers", post(handlers::submit_trigger))
        .route("/runs", get(handlers::list_runs))
        .route("/runs/{id}", get(handlers::get_run))
        .route("/runs/{id}/events", get(handlers::list_run_events))
        .route("/runs/{id}/rollout", get(rollout_handlers::get_rollout))
        .route("/rollouts", get(rollout_handlers::list_rollouts))
        .route("/targets", get(rollout_handlers::get_targets))
        .route("/rollout/cancel", post(rollout_handlers::cancel_rollout))
        .with_state(state);

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/healthz", get(handlers::healthz))
}

/// Response wrapper for consistent API format.
#[derive(serde::Serialize)]
pub(crate) struct ApiResponse<T: serde::Serialize> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T: serde::Serialize> ApiResponse<T> {
    pub(crate) fn ok(data: T) -> axum::Json<Self> {
        axum::Json(Self {
            success: true,
            data: Some(data),
            error: None,
        })
    }
}

pub(crate) fn error_response(
    msg: &str,
    status: axum::http::StatusCode,
) -> impl axum::response::IntoResponse {
    (
        status,
        axum::Json(ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(msg.to_string()),
        }),
    )
}

#[cfg(test)]
pub(crate) mod test_support {
    use axum::response::Response;
    use greenlight_pipeline::PipelineWorker;
    use greenlight_pipeline::testing::Harness;

    use crate::ApiState;

    /// API state over the harness. The worker is returned unstarted.
    pub fn state(harness: &Harness) -> (ApiState, PipelineWorker) {
        state_with_capacity(harness, 8)
    }

    pub fn state_with_capacity(harness: &Harness, capacity: usize) -> (ApiState, PipelineWorker) {
        let (queue, worker) =
            greenlight_pipeline::channel(harness.store.clone(), harness.engine.clone(), capacity);
        let state = ApiState {
            store: harness.store.clone(),
            queue,
            controller: harness.controller.clone(),
        };
        (state, worker)
    }

    pub async fn body_json(resp: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }
}
