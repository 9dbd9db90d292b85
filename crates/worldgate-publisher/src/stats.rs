//! Delivery counters.
//!
//! Counters are plain atomics updated by producers and the flush worker
//! without coordination; a [`PublisherStats`] snapshot may therefore mix
//! values from slightly different moments.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;
use worldgate_types::EventKind;

/// Events dropped because the queue was full, per kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DroppedByKind {
    /// Dropped `tick` events.
    pub tick: u64,
    /// Dropped `audit` events.
    pub audit: u64,
    /// Dropped `snapshot` events.
    pub snapshot: u64,
    /// Dropped `snapshot_state` events.
    pub snapshot_state: u64,
    /// Dropped `season` events.
    pub season: u64,
    /// Dropped `catalog` events.
    pub catalog: u64,
}

impl DroppedByKind {
    /// Count for one kind.
    pub const fn get(&self, kind: EventKind) -> u64 {
        match kind {
            EventKind::Tick => self.tick,
            EventKind::Audit => self.audit,
            EventKind::Snapshot => self.snapshot,
            EventKind::SnapshotState => self.snapshot_state,
            EventKind::Season => self.season,
            EventKind::Catalog => self.catalog,
        }
    }

    /// Sum over all kinds.
    pub const fn total(&self) -> u64 {
        self.tick
            .saturating_add(self.audit)
            .saturating_add(self.snapshot)
            .saturating_add(self.snapshot_state)
            .saturating_add(self.season)
            .saturating_add(self.catalog)
    }
}

/// Point-in-time view of a publisher's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PublisherStats {
    /// Events accepted into the queue.
    pub enqueued: u64,
    /// Events dropped on a full queue.
    pub dropped: DroppedByKind,
    /// HTTP requests made, including retries.
    pub attempts: u64,
    /// Batches acknowledged with a 2xx status.
    pub batches_sent: u64,
    /// Events in acknowledged batches.
    pub events_sent: u64,
    /// Batches given up on after the last retry.
    pub batches_failed: u64,
}

#[derive(Debug, Default)]
pub(crate) struct Counters {
    enqueued: AtomicU64,
    dropped_tick: AtomicU64,
    dropped_audit: AtomicU64,
    dropped_snapshot: AtomicU64,
    dropped_snapshot_state: AtomicU64,
    dropped_season: AtomicU64,
    dropped_catalog: AtomicU64,
    attempts: AtomicU64,
    batches_sent: AtomicU64,
    events_sent: AtomicU64,
    batches_failed: AtomicU64,
}

impl Counters {
    pub(crate) fn record_enqueued(&self) {
        self.enqueued.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_dropped(&self, kind: EventKind) {
        let slot = match kind {
            EventKind::Tick => &self.dropped_tick,
            EventKind::Audit => &self.dropped_audit,
            EventKind::Snapshot => &self.dropped_snapshot,
            EventKind::SnapshotState => &self.dropped_snapshot_state,
            EventKind::Season => &self.dropped_season,
            EventKind::Catalog => &self.dropped_catalog,
        };
        slot.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_attempt(&self) {
        self.attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_sent(&self, events: usize) {
        self.batches_sent.fetch_add(1, Ordering::Relaxed);
        self.events_sent
            .fetch_add(u64::try_from(events).unwrap_or(u64::MAX), Ordering::Relaxed);
    }

    pub(crate) fn record_failed(&self) {
        self.batches_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> PublisherStats {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        PublisherStats {
            enqueued: load(&self.enqueued),
            dropped: DroppedByKind {
                tick: load(&self.dropped_tick),
                audit: load(&self.dropped_audit),
                snapshot: load(&self.dropped_snapshot),
                snapshot_state: load(&self.dropped_snapshot_state),
                season: load(&self.dropped_season),
                catalog: load(&self.dropped_catalog),
            },
            attempts: load(&self.attempts),
            batches_sent: load(&self.batches_sent),
            events_sent: load(&self.events_sent),
            batches_failed: load(&self.batches_failed),
        }
    }
}
