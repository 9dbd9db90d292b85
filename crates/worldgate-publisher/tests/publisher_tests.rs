//! Integration tests for the ingest publisher.
//!
//! Each test binds a throwaway Axum receiver on `127.0.0.1:0` and points a
//! publisher at it. The last test delivers through the real gateway router
//! backed by the in-memory index.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic, clippy::indexing_slicing)]

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::Router;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use chrono::Utc;
use serde_json::{Value, json};
use tokio::net::TcpListener;
use worldgate_events::{AuditPayload, Fields, SeasonPayload, SnapshotStatePayload, TickPayload};
use worldgate_publisher::{Publisher, PublisherConfig};
use worldgate_types::WorldId;

#[derive(Clone, Default)]
struct Receiver {
    requests: Arc<Mutex<Vec<Value>>>,
    accepted: Arc<Mutex<Vec<Value>>>,
    tokens: Arc<Mutex<Vec<Option<String>>>>,
    failures_left: Arc<AtomicUsize>,
}

impl Receiver {
    fn accepted(&self) -> Vec<Value> {
        self.accepted.lock().unwrap().clone()
    }

    fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

async fn receive(
    State(receiver): State<Receiver>,
    headers: HeaderMap,
    axum::Json(body): axum::Json<Value>,
) -> StatusCode {
    receiver.requests.lock().unwrap().push(body.clone());
    receiver.tokens.lock().unwrap().push(
        headers
            .get("x-index-token")
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned),
    );
    if receiver
        .failures_left
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
    {
        return StatusCode::SERVICE_UNAVAILABLE;
    }
    receiver.accepted.lock().unwrap().push(body);
    StatusCode::OK
}

async fn spawn_receiver(failures: usize) -> (String, Receiver) {
    let receiver = Receiver::default();
    receiver.failures_left.store(failures, Ordering::SeqCst);
    let router = Router::new()
        .route("/indexdb/ingest", post(receive))
        .with_state(receiver.clone());
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    (format!("http://{addr}/indexdb/ingest"), receiver)
}

fn world(id: &str) -> WorldId {
    WorldId::parse(id).unwrap()
}

fn config(endpoint: &str) -> PublisherConfig {
    PublisherConfig::new(endpoint, world("w1")).with_flush_interval(Duration::from_secs(60))
}

fn tick(n: i64) -> TickPayload {
    TickPayload::from_fields(&Fields::new(&json!({"tick": n, "digest": format!("d{n}")})))
}

fn audit(tick: i64, actor: &str) -> AuditPayload {
    AuditPayload::from_fields(&Fields::new(
        &json!({"tick": tick, "actor": actor, "action": "SET_BLOCK", "pos": [1, 2, 3]}),
    ))
}

async fn eventually<F, Fut>(mut check: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..300 {
        if check().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition never became true");
}

fn event_ticks(batch: &Value) -> Vec<i64> {
    batch["events"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["payload"]["tick"].as_i64().unwrap())
        .collect()
}

#[tokio::test]
async fn full_batch_is_flushed_without_waiting() {
    let (url, receiver) = spawn_receiver(0).await;
    let publisher = Publisher::start(config(&url).with_batch_size(2)).unwrap();

    for n in 0..4 {
        assert!(publisher.publish_tick(&tick(n)));
    }
    eventually(|| {
        let receiver = receiver.clone();
        async move { receiver.accepted().len() == 2 }
    })
    .await;

    let batches = receiver.accepted();
    assert_eq!(event_ticks(&batches[0]), [0, 1]);
    assert_eq!(event_ticks(&batches[1]), [2, 3]);
    assert_eq!(batches[0]["events"][0]["kind"], "tick");
    assert_eq!(batches[0]["events"][0]["world_id"], "w1");
    publisher.close().await;
}

#[tokio::test]
async fn partial_batch_is_flushed_on_interval() {
    let (url, receiver) = spawn_receiver(0).await;
    let publisher = Publisher::start(
        config(&url)
            .with_batch_size(100)
            .with_flush_interval(Duration::from_millis(50)),
    )
    .unwrap();

    publisher.publish_tick(&tick(1));
    eventually(|| {
        let receiver = receiver.clone();
        async move { receiver.accepted().len() == 1 }
    })
    .await;
    publisher.close().await;
}

#[tokio::test]
async fn close_flushes_buffered_events() {
    let (url, receiver) = spawn_receiver(0).await;
    let publisher = Publisher::start(config(&url).with_batch_size(100)).unwrap();

    for n in 0..3 {
        publisher.publish_tick(&tick(n));
    }
    publisher.close().await;

    let batches = receiver.accepted();
    assert_eq!(batches.len(), 1);
    assert_eq!(event_ticks(&batches[0]), [0, 1, 2]);

    let stats = publisher.stats();
    assert_eq!(stats.enqueued, 3);
    assert_eq!(stats.events_sent, 3);
    assert_eq!(stats.batches_sent, 1);

    publisher.close().await;
    assert!(!publisher.publish_tick(&tick(9)));
}

#[tokio::test]
async fn token_header_is_sent_when_configured() {
    let (url, receiver) = spawn_receiver(0).await;
    let publisher = Publisher::start(config(&url).with_token("s3cret")).unwrap();
    publisher.publish_tick(&tick(1));
    publisher.close().await;

    let (url_plain, receiver_plain) = spawn_receiver(0).await;
    let plain = Publisher::start(config(&url_plain)).unwrap();
    plain.publish_tick(&tick(1));
    plain.close().await;

    assert_eq!(*receiver.tokens.lock().unwrap(), [Some(String::from("s3cret"))]);
    assert_eq!(*receiver_plain.tokens.lock().unwrap(), [None]);
}

#[tokio::test]
async fn failed_flush_is_retried() {
    let (url, receiver) = spawn_receiver(2).await;
    let publisher = Publisher::start(config(&url).with_batch_size(1)).unwrap();

    publisher.publish_tick(&tick(1));
    publisher.close().await;

    assert_eq!(receiver.request_count(), 3);
    assert_eq!(receiver.accepted().len(), 1);
    let stats = publisher.stats();
    assert_eq!(stats.attempts, 3);
    assert_eq!(stats.batches_sent, 1);
    assert_eq!(stats.batches_failed, 0);
}

#[tokio::test]
async fn batch_is_dropped_after_three_attempts() {
    let (url, receiver) = spawn_receiver(100).await;
    let publisher = Publisher::start(config(&url).with_batch_size(1)).unwrap();

    publisher.publish_tick(&tick(1));
    publisher.close().await;

    assert_eq!(receiver.request_count(), 3);
    assert!(receiver.accepted().is_empty());
    let stats = publisher.stats();
    assert_eq!(stats.attempts, 3);
    assert_eq!(stats.batches_failed, 1);
}

#[tokio::test]
async fn audits_are_numbered_per_tick() {
    let (url, receiver) = spawn_receiver(0).await;
    let publisher = Publisher::start(config(&url).with_batch_size(100)).unwrap();

    for (t, actor) in [(7, "a"), (7, "b"), (8, "c"), (8, "d"), (8, "e")] {
        publisher.publish_audit(audit(t, actor));
    }
    publisher.close().await;

    let batches = receiver.accepted();
    let seqs: Vec<(i64, i64)> = batches[0]["events"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| {
            (
                e["payload"]["tick"].as_i64().unwrap(),
                e["payload"]["seq"].as_i64().unwrap(),
            )
        })
        .collect();
    assert_eq!(seqs, [(7, 1), (7, 2), (8, 1), (8, 2), (8, 3)]);
}

#[tokio::test]
async fn unreachable_endpoint_counts_failure() {
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    };
    let publisher = Publisher::start(
        config(&format!("http://127.0.0.1:{port}/indexdb/ingest")).with_batch_size(1),
    )
    .unwrap();

    publisher.publish_tick(&tick(1));
    publisher.close().await;
    assert_eq!(publisher.stats().batches_failed, 1);
}

#[tokio::test]
async fn blank_endpoint_is_rejected() {
    let err = Publisher::start(PublisherConfig::new("  ", world("w1"))).unwrap_err();
    assert!(matches!(err, worldgate_publisher::PublishError::Config(_)));
}

#[tokio::test]
async fn events_land_in_the_gateway_index() {
    let state = Arc::new(worldgate_gateway::AppState::in_memory().with_ingest_token("tok"));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server_state = Arc::clone(&state);
    tokio::spawn(async move {
        worldgate_gateway::serve_listener(listener, server_state, std::future::pending())
            .await
            .unwrap();
    });

    let w = world("w-e2e");
    let publisher = Publisher::start(
        PublisherConfig::new(format!("http://{addr}/indexdb/ingest"), w.clone())
            .with_token("tok")
            .with_flush_interval(Duration::from_secs(60)),
    )
    .unwrap();

    publisher.publish_tick(&tick(3));
    publisher.publish_audit(audit(3, "alice"));
    publisher.publish_audit(audit(3, "bob"));
    publisher.publish_snapshot_state(&SnapshotStatePayload::from_fields(&Fields::new(&json!({
        "tick": 3,
        "weather": "RAIN",
        "agents": [{"id": "alice", "name": "Alice", "inventory": {"stone": 4}}],
        "boards": [{"board_id": "town-square", "posts": [{"post_id": "p1", "author": "alice"}]}]
    }))));
    publisher.publish_season(&SeasonPayload::from_fields(
        &Fields::new(&json!({"season": 1, "end_tick": 3, "path": "seasons/1.snap"})),
        Utc::now(),
    ));
    publisher.close().await;

    let stats = publisher.stats();
    assert_eq!(stats.batches_failed, 0);
    assert_eq!(stats.events_sent, 5);

    let index = state.persistence.memory_index().unwrap();
    assert_eq!(index.tick(&w, 3).unwrap().digest, "d3");
    assert_eq!(index.audit(&w, 3, 1).unwrap().actor, "alice");
    assert_eq!(index.audit(&w, 3, 2).unwrap().actor, "bob");
    assert_eq!(index.agents(&w, 3).len(), 1);
    assert_eq!(index.boards(&w, 3)[0].kind, "GLOBAL");
    assert_eq!(index.posts(&w, 3).len(), 1);
    assert!(index.season(&w, 1).is_some());
}
