//! Integration tests for the gateway endpoints and the dispatcher.
//!
//! Tests drive the Axum `Router` directly via `tower::ServiceExt` against
//! the in-memory index and archive. Dispatcher tests use the in-process
//! compute unit, except the passthrough tests, which stand up a throwaway
//! upstream on `127.0.0.1:0`.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic, clippy::indexing_slicing)]

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::extract::Request as AxumRequest;
use axum::http::{Request, StatusCode};
use axum::response::IntoResponse;
use serde_json::{Value, json};
use tower::ServiceExt;
use worldgate_gateway::{AppState, ComputeTarget, HttpCompute, build_router};
use worldgate_types::WorldId;

const TOKEN: &str = "test-token";

fn test_state() -> AppState {
    AppState::in_memory().with_ingest_token(TOKEN)
}

fn world(id: &str) -> WorldId {
    WorldId::parse(id).unwrap()
}

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

async fn get(router: &Router, uri: &str) -> (StatusCode, Value) {
    send(router, Request::get(uri).body(Body::empty()).unwrap()).await
}

fn ingest_request(token: Option<&str>, body: &Value) -> Request<Body> {
    let mut builder = Request::post("/indexdb/ingest").header("content-type", "application/json");
    if let Some(token) = token {
        builder = builder.header("x-index-token", token);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn tick_event(world_id: &str, tick: usize) -> Value {
    json!({"kind": "tick", "world_id": world_id, "payload": {"tick": tick, "digest": "d"}})
}

/// Poll `/head` until `done` accepts the body.
async fn wait_for_head(router: &Router, world_id: &str, done: impl Fn(&Value) -> bool) -> Value {
    for _ in 0..200 {
        let (_, body) = get(router, &format!("/head?world={world_id}")).await;
        if done(&body) {
            return body;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("head for {world_id} never converged");
}

// =========================================================================
// Health and introspection
// =========================================================================

#[tokio::test]
async fn healthz_reports_both_stores() {
    let router = build_router(Arc::new(test_state()));
    let (status, body) = get(&router, "/healthz").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({"ok": true, "storage": {"relational": "ok", "object": "ok"}})
    );
}

#[tokio::test]
async fn healthz_fails_when_archive_is_down() {
    let state = test_state();
    state.persistence.memory_archive().unwrap().set_unavailable(true);
    let router = build_router(Arc::new(state));

    let (status, body) = get(&router, "/healthz").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["status"], 503);
}

#[tokio::test]
async fn healthz_fails_when_index_is_down() {
    let state = test_state();
    state.persistence.memory_index().unwrap().set_unavailable(true);
    let router = build_router(Arc::new(state));

    let (status, _) = get(&router, "/healthz").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn index_healthz_counts_one_world() {
    let router = build_router(Arc::new(test_state()));
    let batch = json!({"events": [
        tick_event("w1", 1),
        tick_event("w1", 2),
        tick_event("w2", 1),
        {"kind": "audit", "world_id": "w1", "payload": {"tick": 1, "seq": 1}},
        {"kind": "snapshot", "world_id": "w1", "payload": {"tick": 1, "path": "s/1"}}
    ]});
    let (status, _) = send(&router, ingest_request(Some(TOKEN), &batch)).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = get(&router, "/indexdb/healthz?world=w1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({"ok": true, "world_id": "w1", "index": {"ticks": 2, "audits": 1, "snapshots": 1}})
    );

    let (_, body) = get(&router, "/indexdb/healthz").await;
    assert_eq!(body["world_id"], "world_1");
    assert_eq!(body["index"]["ticks"], 0);
}

#[tokio::test]
async fn head_of_unseen_world_is_empty() {
    let router = build_router(Arc::new(test_state()));
    let (status, body) = get(&router, "/head?world=never-seen").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({"ok": true, "world_id": "never-seen", "row": null, "archive_doc": null})
    );
}

// =========================================================================
// Ingestion
// =========================================================================

#[tokio::test]
async fn ingest_without_token_is_forbidden() {
    let state = Arc::new(test_state());
    let router = build_router(Arc::clone(&state));

    let (status, body) = send(&router, ingest_request(None, &json!({"events": [tick_event("w1", 1)]}))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["status"], 403);

    let index = state.persistence.memory_index().unwrap();
    assert!(index.tick(&world("w1"), 1).is_none());
    assert_eq!(index.schema_runs(), 0, "rejected before any store access");
}

#[tokio::test]
async fn ingest_with_wrong_token_is_forbidden() {
    let router = build_router(Arc::new(test_state()));
    let (status, _) = send(
        &router,
        ingest_request(Some("nope"), &json!({"events": [tick_event("w1", 1)]})),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn ingest_is_disabled_without_configured_token() {
    let router = build_router(Arc::new(AppState::in_memory()));
    let (status, _) = send(
        &router,
        ingest_request(Some(""), &json!({"events": [tick_event("w1", 1)]})),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn ingest_with_token_is_accepted() {
    let state = Arc::new(test_state());
    let router = build_router(Arc::clone(&state));

    let (status, body) = send(&router, ingest_request(Some(TOKEN), &json!({"events": [tick_event("w1", 7)]}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ok"], true);
    assert_eq!(body["applied"], 1);

    let row = state
        .persistence
        .memory_index()
        .unwrap()
        .tick(&world("w1"), 7)
        .unwrap();
    assert_eq!(row.digest, "d");
}

#[tokio::test]
async fn ingest_rejects_other_methods() {
    let router = build_router(Arc::new(test_state()));
    let request = Request::get("/indexdb/ingest")
        .header("x-index-token", TOKEN)
        .body(Body::empty())
        .unwrap();
    let response = router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(response.headers()["allow"], "POST");
}

#[tokio::test]
async fn method_is_checked_before_token() {
    let router = build_router(Arc::new(test_state()));
    let request = Request::put("/indexdb/ingest").body(Body::empty()).unwrap();
    let (status, _) = send(&router, request).await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn ingest_rejects_malformed_bodies() {
    let router = build_router(Arc::new(test_state()));

    let request = Request::post("/indexdb/ingest")
        .header("x-index-token", TOKEN)
        .body(Body::from("{not json"))
        .unwrap();
    let (status, _) = send(&router, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    for body in [json!({}), json!({"events": {}}), json!({"events": []}), json!([1, 2])] {
        let (status, _) = send(&router, ingest_request(Some(TOKEN), &body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");
    }
}

#[tokio::test]
async fn oversize_batch_is_rejected_wholesale() {
    let state = Arc::new(test_state());
    let router = build_router(Arc::clone(&state));

    let events: Vec<Value> = (0..1025).map(|t| tick_event("w1", t)).collect();
    let (status, body) = send(&router, ingest_request(Some(TOKEN), &json!({ "events": events }))).await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert!(body.get("applied").is_none());
    assert!(state.persistence.memory_index().unwrap().tick(&world("w1"), 0).is_none());
}

#[tokio::test]
async fn full_batch_is_accepted() {
    let router = build_router(Arc::new(test_state()));
    let events: Vec<Value> = (0..1024).map(|t| tick_event("w1", t)).collect();
    let (status, body) = send(&router, ingest_request(Some(TOKEN), &json!({ "events": events }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["applied"], 1024);
}

#[tokio::test]
async fn oversize_body_is_rejected() {
    let router = build_router(Arc::new(test_state().with_max_body_bytes(64)));
    let events: Vec<Value> = (0..10).map(|t| tick_event("w1", t)).collect();
    let (status, _) = send(&router, ingest_request(Some(TOKEN), &json!({ "events": events }))).await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
}

#[tokio::test]
async fn unknown_kind_is_skipped_not_fatal() {
    let router = build_router(Arc::new(test_state()));
    let batch = json!({"events": [
        {"kind": "weather_report", "world_id": "w1", "payload": {"tick": 1}},
        tick_event("w1", 1)
    ]});
    let (status, body) = send(&router, ingest_request(Some(TOKEN), &batch)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["applied"], 1);
    assert_eq!(body["skipped"], 1);
    assert_eq!(body["total"], 2);
}

#[tokio::test]
async fn store_failure_mid_batch_reports_progress() {
    let state = Arc::new(test_state());
    state.persistence.memory_index().unwrap().reject_tick(2);
    let router = build_router(Arc::clone(&state));

    let batch = json!({"events": [tick_event("w1", 1), tick_event("w1", 2), tick_event("w1", 3)]});
    let (status, body) = send(&router, ingest_request(Some(TOKEN), &batch)).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["applied"], 1);

    let index = state.persistence.memory_index().unwrap();
    assert!(index.tick(&world("w1"), 1).is_some());
    assert!(index.tick(&world("w1"), 3).is_none());
}

#[tokio::test]
async fn snapshot_state_replaces_children() {
    let state = Arc::new(test_state());
    let router = build_router(Arc::clone(&state));

    let first = json!({"events": [{"kind": "snapshot_state", "world_id": "w1", "payload": {
        "tick": 5,
        "agents": [{"id": "a1"}, {"id": "a2"}],
        "boards": [{"board_id": "board@1,2,3", "posts": [{"post_id": "p1", "author": "a1"}]}]
    }}]});
    let second = json!({"events": [{"kind": "snapshot_state", "world_id": "w1", "payload": {
        "tick": 5,
        "agents": [{"id": "a2"}]
    }}]});

    send(&router, ingest_request(Some(TOKEN), &first)).await;
    let (status, _) = send(&router, ingest_request(Some(TOKEN), &second)).await;
    assert_eq!(status, StatusCode::OK);

    let index = state.persistence.memory_index().unwrap();
    let agents = index.agents(&world("w1"), 5);
    assert_eq!(agents.len(), 1);
    assert_eq!(agents[0].agent_id, "a2");
    assert!(index.boards(&world("w1"), 5).is_empty());
    assert!(index.posts(&world("w1"), 5).is_empty());
}

// =========================================================================
// Dispatcher
// =========================================================================

#[tokio::test]
async fn dispatch_routes_by_query_world() {
    let router = build_router(Arc::new(test_state()));
    let (status, body) = get(&router, "/look?world_id=world-42").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["world_id"], "world-42");
    assert_eq!(body["path"], "/look?world_id=world-42");
}

#[tokio::test]
async fn invalid_world_falls_back_to_default() {
    let state = test_state().with_default_world(world("lobby"));
    let router = build_router(Arc::new(state));
    let (_, body) = get(&router, "/look?world_id=My%20World!").await;
    assert_eq!(body["world_id"], "lobby");
}

#[tokio::test]
async fn dispatch_uses_world_header() {
    let router = build_router(Arc::new(test_state()));
    let request = Request::post("/act")
        .header("x-world", "w7")
        .body(Body::empty())
        .unwrap();
    let (_, body) = send(&router, request).await;
    assert_eq!(body["world_id"], "w7");
    assert_eq!(body["method"], "POST");
}

#[tokio::test]
async fn head_converges_after_dispatch() {
    let state = Arc::new(test_state());
    let router = build_router(Arc::clone(&state));

    let request = Request::get("/move?x=1")
        .header("x-world", "w1")
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(&router, request).await;
    assert_eq!(status, StatusCode::OK);

    let body = wait_for_head(&router, "w1", |b| b["row"].is_object()).await;
    assert_eq!(body["row"]["last_path"], "/move?x=1");
    assert_eq!(body["row"]["last_status"], 200);
    assert_eq!(body["row"]["request_count"], 1);
    assert_eq!(body["archive_doc"]["last_path"], "/move?x=1");
    assert_eq!(body["archive_doc"]["request_count"], 1);

    let request = Request::get("/move?x=2")
        .header("x-world", "w1")
        .body(Body::empty())
        .unwrap();
    send(&router, request).await;
    let body = wait_for_head(&router, "w1", |b| b["row"]["request_count"] == 2).await;
    assert_eq!(body["row"]["last_path"], "/move?x=2");
}

#[tokio::test]
async fn head_failure_does_not_affect_response() {
    let state = Arc::new(test_state());
    state.persistence.memory_archive().unwrap().set_unavailable(true);
    let router = build_router(Arc::clone(&state));

    let (status, body) = get(&router, "/look?world=w1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["world_id"], "w1");
}

async fn upstream_echo(request: AxumRequest) -> impl IntoResponse {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let body = axum::body::to_bytes(request.into_body(), usize::MAX)
        .await
        .unwrap_or_default();
    (
        StatusCode::CREATED,
        [("x-unit", "echo")],
        format!("{method} {uri} {}", String::from_utf8_lossy(&body)),
    )
}

#[tokio::test]
async fn http_compute_passes_response_through() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let upstream = Router::new().fallback(upstream_echo);
    tokio::spawn(async move {
        axum::serve(listener, upstream).await.unwrap();
    });

    let compute = HttpCompute::new(
        format!("http://127.0.0.1:{port}/unit/{{world_id}}"),
        Duration::from_secs(5),
    )
    .unwrap();
    let state = test_state();
    let state = AppState {
        compute: ComputeTarget::Http(compute),
        ..state
    };
    let router = build_router(Arc::new(state));

    let request = Request::post("/act?n=2&world=w9")
        .body(Body::from("payload"))
        .unwrap();
    let response = router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(response.headers()["x-unit"], "echo");
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(&bytes[..], b"POST /unit/w9/act?n=2&world=w9 payload");

    let body = wait_for_head(&router, "w9", |b| b["row"].is_object()).await;
    assert_eq!(body["row"]["last_status"], 201);
}

#[tokio::test]
async fn unreachable_compute_is_bad_gateway() {
    let port = {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    };
    let compute = HttpCompute::new(
        format!("http://127.0.0.1:{port}/unit/{{world_id}}"),
        Duration::from_secs(2),
    )
    .unwrap();
    let state = AppState {
        compute: ComputeTarget::Http(compute),
        ..test_state()
    };
    let router = build_router(Arc::new(state));

    let (status, body) = get(&router, "/look?world=w3").await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["status"], 502);

    let body = wait_for_head(&router, "w3", |b| b["row"].is_object()).await;
    assert_eq!(body["row"]["last_status"], 502);
    assert_eq!(body["row"]["last_path"], "/look?world=w3");
}
