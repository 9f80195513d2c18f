//! API regression tests.
//!
//! Drives the full router with a running pipeline worker: triggers go in
//! over HTTP and the settled run, its event log and the swapped targets
//! come back out.

use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use tokio::sync::watch;
use tower::ServiceExt;

use greenlight_api::{ApiState, build_router};
use greenlight_pipeline::testing::Harness;
use greenlight_pipeline::{channel, spawn_event_recorder};

struct Daemon {
    harness: Harness,
    router: Router,
    shutdown: watch::Sender<bool>,
}

fn daemon() -> Daemon {
    let harness = Harness::new();
    spawn_event_recorder(&harness.events, harness.store.clone());
    let (queue, worker) = channel(harness.store.clone(), harness.engine.clone(), 8);
    let (shutdown, shutdown_rx) = watch::channel(false);
    tokio::spawn(worker.run(shutdown_rx));
    let router = build_router(ApiState {
        store: harness.store.clone(),
        queue,
        controller: harness.controller.clone(),
    });
    Daemon {
        harness,
        router,
        shutdown,
    }
}

async fn call(router: &Router, req: Request<Body>) -> (StatusCode, serde_json::Value) {
    let resp = router.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
    (status, body)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_trigger(revision: &str, key: &str) -> Request<Body> {
    let body = serde_json::json!({ "revision": revision, "idempotency_key": key });
    Request::builder()
        .method("POST")
        .uri("/api/v1/triggers")
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_vec(&body).unwrap()))
        .unwrap()
}

async fn wait_for_run(router: &Router, run_id: &str, status: &str) -> serde_json::Value {
    loop {
        let (code, body) = call(router, get(&format!("/api/v1/runs/{run_id}"))).await;
        if code == StatusCode::OK && body["data"]["status"] == status {
            return body["data"].clone();
        }
        tokio::time::sleep(Duration::from_secs(5)).await;
    }
}

#[tokio::test(start_paused = true)]
async fn trigger_runs_to_completion_over_http() {
    let daemon = daemon();

    let (status, body) = call(&daemon.router, post_trigger("r1", "delivery-1")).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let run_id = body["data"]["run_id"].as_str().unwrap().to_string();

    let run = wait_for_run(&daemon.router, &run_id, "succeeded").await;
    assert_eq!(run["stages"].as_array().unwrap().len(), 4);

    let (status, targets) = call(&daemon.router, get("/api/v1/targets")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(targets["data"]["active"], "green");
    assert_eq!(targets["data"]["weights"]["green"], 100);

    // Let the recorder drain the bus.
    tokio::time::sleep(Duration::from_millis(10)).await;
    let (_, events) = call(&daemon.router, get(&format!("/api/v1/runs/{run_id}/events"))).await;
    let outcomes: Vec<&str> = events["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["outcome"].as_str().unwrap())
        .collect();
    assert_eq!(outcomes.first(), Some(&"running"));
    assert!(outcomes.contains(&"entered"));

    let (status, rollout) = call(&daemon.router, get(&format!("/api/v1/runs/{run_id}/rollout"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(rollout["data"]["status"], "completed");

    let _ = daemon.shutdown.send(true);
}

#[tokio::test(start_paused = true)]
async fn replayed_delivery_is_reported_as_duplicate() {
    let daemon = daemon();

    let (status, first) = call(&daemon.router, post_trigger("r1", "delivery-2")).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let (status, second) = call(&daemon.router, post_trigger("r1", "delivery-2")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(second["data"]["duplicate"], true);
    assert_eq!(second["data"]["run_id"], first["data"]["run_id"]);

    let (_, runs) = call(&daemon.router, get("/api/v1/runs")).await;
    assert_eq!(runs["data"].as_array().unwrap().len(), 1);
    assert_eq!(daemon.harness.store.list_runs().unwrap().len(), 1);

    let _ = daemon.shutdown.send(true);
}

#[tokio::test(start_paused = true)]
async fn cancel_over_http_reverts_traffic() {
    let daemon = daemon();

    let (_, body) = call(&daemon.router, post_trigger("r1", "delivery-3")).await;
    let run_id = body["data"]["run_id"].as_str().unwrap().to_string();

    tokio::time::sleep(Duration::from_secs(150)).await;
    let (_, targets) = call(&daemon.router, get("/api/v1/targets")).await;
    assert_eq!(targets["data"]["rollout_in_progress"], run_id.as_str());

    let req = Request::builder()
        .method("POST")
        .uri("/api/v1/rollout/cancel")
        .body(Body::empty())
        .unwrap();
    let (status, _) = call(&daemon.router, req).await;
    assert_eq!(status, StatusCode::OK);

    let run = wait_for_run(&daemon.router, &run_id, "failed").await;
    assert_eq!(run["stages"][3]["stage"], "Deploy");
    let (_, targets) = call(&daemon.router, get("/api/v1/targets")).await;
    assert_eq!(targets["data"]["active"], "blue");
    assert_eq!(targets["data"]["weights"]["green"], 0);

    let _ = daemon.shutdown.send(true);
}

#[tokio::test]
async fn unknown_run_and_healthz() {
    let daemon = daemon();

    let (status, body) = call(&daemon.router, get("/api/v1/runs/run-missing")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], false);

    let (status, body) = call(&daemon.router, get("/healthz")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"], "ok");
}
