//! Batching ingest client.
//!
//! Producers hand events to [`Publisher`] without waiting on the network:
//! each call serializes the payload and pushes it onto a bounded queue. A
//! single background worker drains the queue into batches and POSTs them
//! to the ingest endpoint.
//!
//! # Delivery
//!
//! - A batch is sent when it reaches `batch_size` events or when the flush
//!   interval elapses, whichever comes first.
//! - Each batch is tried up to [`MAX_ATTEMPTS`] times, sleeping 100 ms,
//!   200 ms, then 400 ms after successive failures. A batch that still
//!   fails is logged and dropped.
//! - When the queue is full, the event is dropped and counted per kind.
//!
//! Delivery is at most once per batch attempt sequence; the receiving side
//! is idempotent, so a retry after a lost acknowledgement is harmless.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{SecondsFormat, Utc};
use reqwest::header::CONTENT_TYPE;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{Notify, mpsc};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};
use worldgate_events::{
    AuditPayload, CatalogPayload, SeasonPayload, SnapshotPayload, SnapshotStatePayload,
    TickPayload,
};
use worldgate_types::{EventKind, WorldId};

use crate::config::PublisherConfig;
use crate::error::PublishError;
use crate::stats::{Counters, PublisherStats};

/// Request header carrying the shared secret.
pub const TOKEN_HEADER: &str = "x-index-token";

/// Tries per batch before it is dropped.
pub const MAX_ATTEMPTS: u32 = 3;

/// Sleep after the first failed attempt; doubles after each further one.
const RETRY_BASE: Duration = Duration::from_millis(100);

/// Characters of an error response body kept for the log.
const ERROR_BODY_LIMIT: usize = 16_384;

/// One event as sent on the wire.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutboundEvent {
    /// Kind tag.
    pub kind: EventKind,
    /// Owning world.
    pub world_id: WorldId,
    /// Serialized payload.
    pub payload: Value,
}

#[derive(Serialize)]
struct Envelope<'a> {
    events: &'a [OutboundEvent],
}

/// Per-tick audit numbering. Sequence numbers restart at 1 whenever the
/// tick changes.
#[derive(Debug, Default)]
struct AuditSequence {
    tick: i64,
    seq: i64,
}

impl AuditSequence {
    fn next(&mut self, tick: i64) -> i64 {
        if tick != self.tick {
            self.tick = tick;
            self.seq = 0;
        }
        self.seq = self.seq.saturating_add(1);
        self.seq
    }
}

#[derive(Debug, Default)]
struct Shared {
    counters: Counters,
    closed: AtomicBool,
    shutdown: Notify,
    audit_seq: Mutex<AuditSequence>,
}

/// Handle for publishing one world's events.
///
/// Must be created inside a Tokio runtime. Call [`close`](Self::close) to
/// flush buffered events before shutting down; dropping the handle also
/// flushes, but nothing waits for it.
#[derive(Debug)]
pub struct Publisher {
    world_id: WorldId,
    tx: mpsc::Sender<OutboundEvent>,
    shared: Arc<Shared>,
    worker: tokio::sync::Mutex<Option<JoinHandle<()>>>,
}

impl Publisher {
    /// Start the background worker.
    ///
    /// # Errors
    ///
    /// Returns [`PublishError::Config`] for a blank endpoint and
    /// [`PublishError::Http`] if the HTTP client cannot be built.
    pub fn start(config: PublisherConfig) -> Result<Self, PublishError> {
        let endpoint = config.endpoint.trim().to_owned();
        if endpoint.is_empty() {
            return Err(PublishError::Config(String::from("empty ingest endpoint")));
        }
        let client = reqwest::Client::builder()
            .timeout(config.http_timeout)
            .build()?;

        let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
        let shared = Arc::new(Shared::default());
        let worker = Worker {
            client,
            endpoint,
            token: config.token,
            batch_size: config.batch_size.max(1),
            flush_interval: config.flush_interval,
            shared: Arc::clone(&shared),
        };

        info!(
            world_id = %config.world_id,
            endpoint = %worker.endpoint,
            batch_size = worker.batch_size,
            flush_ms = u64::try_from(worker.flush_interval.as_millis()).unwrap_or(u64::MAX),
            "Ingest publisher started"
        );
        let handle = tokio::spawn(worker.run(rx));

        Ok(Self {
            world_id: config.world_id,
            tx,
            shared,
            worker: tokio::sync::Mutex::new(Some(handle)),
        })
    }

    /// The world every event is published under.
    pub const fn world_id(&self) -> &WorldId {
        &self.world_id
    }

    /// Current delivery counters.
    pub fn stats(&self) -> PublisherStats {
        self.shared.counters.snapshot()
    }

    /// Queue a tick summary.
    pub fn publish_tick(&self, payload: &TickPayload) -> bool {
        self.enqueue(EventKind::Tick, payload)
    }

    /// Queue an audit entry, assigning its sequence number.
    ///
    /// Any `seq` already on the payload is replaced.
    pub fn publish_audit(&self, mut payload: AuditPayload) -> bool {
        payload.seq = self.next_audit_seq(payload.tick);
        self.enqueue(EventKind::Audit, &payload)
    }

    /// Queue a snapshot file summary.
    pub fn publish_snapshot(&self, payload: &SnapshotPayload) -> bool {
        self.enqueue(EventKind::Snapshot, payload)
    }

    /// Queue a snapshot state with its child collections.
    pub fn publish_snapshot_state(&self, payload: &SnapshotStatePayload) -> bool {
        self.enqueue(EventKind::SnapshotState, payload)
    }

    /// Queue a season record.
    ///
    /// Seasons numbered zero or below, and seasons without an archive path,
    /// are not sent. A blank `recorded_at` is set to now.
    pub fn publish_season(&self, payload: &SeasonPayload) -> bool {
        if payload.season <= 0 || payload.path.trim().is_empty() {
            return false;
        }
        if payload.recorded_at.is_empty() {
            let mut payload = payload.clone();
            payload.recorded_at = now_rfc3339();
            return self.enqueue(EventKind::Season, &payload);
        }
        self.enqueue(EventKind::Season, payload)
    }

    /// Queue a catalog document.
    ///
    /// Catalogs missing a name, digest, or body are not sent. A blank
    /// `updated_at` is set to now.
    pub fn publish_catalog(&self, payload: &CatalogPayload) -> bool {
        if payload.name.is_empty() || payload.digest.is_empty() || payload.json.is_empty() {
            return false;
        }
        if payload.updated_at.is_empty() {
            let mut payload = payload.clone();
            payload.updated_at = now_rfc3339();
            return self.enqueue(EventKind::Catalog, &payload);
        }
        self.enqueue(EventKind::Catalog, payload)
    }

    /// Stop accepting events, flush what is buffered, and wait for the
    /// worker to finish.
    ///
    /// Safe to call more than once; later calls wait for the first.
    pub async fn close(&self) {
        if !self.shared.closed.swap(true, Ordering::AcqRel) {
            self.shared.shutdown.notify_one();
        }
        let mut worker = self.worker.lock().await;
        let Some(handle) = worker.take() else {
            return;
        };
        if let Err(e) = handle.await {
            warn!(error = %e, "Ingest publisher worker ended abnormally");
        }
    }

    fn next_audit_seq(&self, tick: i64) -> i64 {
        self.shared
            .audit_seq
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .next(tick)
    }

    fn enqueue<T: Serialize>(&self, kind: EventKind, payload: &T) -> bool {
        if self.shared.closed.load(Ordering::Acquire) {
            return false;
        }
        let payload = match serde_json::to_value(payload) {
            Ok(value) => value,
            Err(e) => {
                warn!(%kind, error = %e, "Failed to serialize event, dropping");
                return false;
            }
        };
        let event = OutboundEvent {
            kind,
            world_id: self.world_id.clone(),
            payload,
        };

        match self.tx.try_send(event) {
            Ok(()) => {
                self.shared.counters.record_enqueued();
                true
            }
            Err(TrySendError::Full(event)) => {
                self.shared.counters.record_dropped(kind);
                warn!(%kind, world_id = %event.world_id, "Ingest queue full, dropping event");
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }
}

fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Sleep after failed attempt number `attempt` (zero-based).
fn backoff(attempt: u32) -> Duration {
    RETRY_BASE.saturating_mul(2_u32.saturating_pow(attempt))
}

struct Worker {
    client: reqwest::Client,
    endpoint: String,
    token: String,
    batch_size: usize,
    flush_interval: Duration,
    shared: Arc<Shared>,
}

impl Worker {
    async fn run(self, mut rx: mpsc::Receiver<OutboundEvent>) {
        let mut ticker = tokio::time::interval(self.flush_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut batch: Vec<OutboundEvent> = Vec::with_capacity(self.batch_size);

        loop {
            tokio::select! {
                received = rx.recv() => match received {
                    Some(event) => {
                        batch.push(event);
                        if batch.len() >= self.batch_size {
                            self.flush(&mut batch).await;
                        }
                    }
                    None => break,
                },
                _ = ticker.tick() => self.flush(&mut batch).await,
                () = self.shared.shutdown.notified() => {
                    rx.close();
                    while let Some(event) = rx.recv().await {
                        batch.push(event);
                        if batch.len() >= self.batch_size {
                            self.flush(&mut batch).await;
                        }
                    }
                    break;
                }
            }
        }

        self.flush(&mut batch).await;
        debug!("Ingest publisher worker stopped");
    }

    async fn flush(&self, batch: &mut Vec<OutboundEvent>) {
        if batch.is_empty() {
            return;
        }
        let count = batch.len();
        match self.send_batch(batch).await {
            Ok(()) => {
                self.shared.counters.record_sent(count);
                debug!(events = count, "Flushed ingest batch");
            }
            Err(e) => {
                self.shared.counters.record_failed();
                warn!(events = count, error = %e, "Ingest flush failed, dropping batch");
            }
        }
        batch.clear();
    }

    async fn send_batch(&self, events: &[OutboundEvent]) -> Result<(), PublishError> {
        let body = serde_json::to_vec(&Envelope { events })?;

        let mut last_error = PublishError::Config(String::from("no delivery attempted"));
        for attempt in 0..MAX_ATTEMPTS {
            self.shared.counters.record_attempt();
            match self.post(body.clone()).await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    debug!(attempt, error = %e, "Ingest attempt failed");
                    last_error = e;
                }
            }
            tokio::time::sleep(backoff(attempt)).await;
        }
        Err(last_error)
    }

    async fn post(&self, body: Vec<u8>) -> Result<(), PublishError> {
        let mut request = self
            .client
            .post(&self.endpoint)
            .header(CONTENT_TYPE, "application/json")
            .body(body);
        if !self.token.is_empty() {
            request = request.header(TOKEN_HEADER, &self.token);
        }

        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let text = response.text().await.unwrap_or_default();
        Err(PublishError::Rejected {
            status: status.as_u16(),
            body: text.trim().chars().take(ERROR_BODY_LIMIT).collect(),
        })
    }
}
