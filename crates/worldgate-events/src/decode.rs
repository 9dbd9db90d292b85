//! Batch envelope decoding.
//!
//! The envelope (`{"events": [...]}`) is checked up front: shape and size
//! problems reject the whole batch. Entries are then validated one by one
//! and invalid entries are skipped, never reported.

use chrono::{DateTime, Utc};
use serde_json::Value;
use worldgate_types::{EventKind, WorldId};

use crate::coerce::Fields;
use crate::error::EventError;
use crate::payload::{
    AuditPayload, CatalogPayload, SeasonPayload, SnapshotPayload, SnapshotStatePayload,
    TickPayload,
};

/// Maximum number of entries a single batch may carry.
pub const MAX_BATCH_EVENTS: usize = 1024;

/// A decoded payload, tagged by kind.
#[derive(Debug, Clone, PartialEq)]
pub enum EventPayload {
    /// Tick summary.
    Tick(TickPayload),
    /// Audited state change.
    Audit(AuditPayload),
    /// Snapshot file summary.
    Snapshot(SnapshotPayload),
    /// World conditions and child collections at a tick.
    SnapshotState(SnapshotStatePayload),
    /// Season archive record.
    Season(SeasonPayload),
    /// Catalog document.
    Catalog(CatalogPayload),
}

impl EventPayload {
    /// Build the typed payload for `kind` from a raw payload object.
    pub fn decode(kind: EventKind, raw: &Value, received_at: DateTime<Utc>) -> Self {
        let f = Fields::new(raw);
        match kind {
            EventKind::Tick => Self::Tick(TickPayload::from_fields(&f)),
            EventKind::Audit => Self::Audit(AuditPayload::from_fields(&f)),
            EventKind::Snapshot => Self::Snapshot(SnapshotPayload::from_fields(&f)),
            EventKind::SnapshotState => {
                Self::SnapshotState(SnapshotStatePayload::from_fields(&f))
            }
            EventKind::Season => Self::Season(SeasonPayload::from_fields(&f, received_at)),
            EventKind::Catalog => Self::Catalog(CatalogPayload::from_fields(&f, received_at)),
        }
    }

    /// The kind tag of this payload.
    pub const fn kind(&self) -> EventKind {
        match self {
            Self::Tick(_) => EventKind::Tick,
            Self::Audit(_) => EventKind::Audit,
            Self::Snapshot(_) => EventKind::Snapshot,
            Self::SnapshotState(_) => EventKind::SnapshotState,
            Self::Season(_) => EventKind::Season,
            Self::Catalog(_) => EventKind::Catalog,
        }
    }
}

/// One validated entry of an ingestion batch.
#[derive(Debug, Clone, PartialEq)]
pub struct IngestEvent {
    /// Target world, already coerced.
    pub world_id: WorldId,
    /// Typed payload.
    pub payload: EventPayload,
    /// The payload object exactly as received.
    pub raw: Value,
}

impl IngestEvent {
    /// The kind tag of this event.
    pub const fn kind(&self) -> EventKind {
        self.payload.kind()
    }
}

/// Result of decoding one batch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecodedBatch {
    /// Entries that passed validation, in submission order.
    pub events: Vec<IngestEvent>,
    /// Number of entries dropped during validation.
    pub skipped: usize,
    /// Number of entries submitted.
    pub total: usize,
}

/// Decode a raw request body.
///
/// # Errors
///
/// Returns [`EventError::MalformedJson`] when the body is not JSON, and the
/// envelope errors of [`decode_batch`] otherwise.
pub fn decode_batch_bytes(
    body: &[u8],
    default_world: &WorldId,
    received_at: DateTime<Utc>,
) -> Result<DecodedBatch, EventError> {
    let value: Value = serde_json::from_slice(body)?;
    decode_batch(&value, default_world, received_at)
}

/// Decode a parsed batch envelope.
///
/// # Errors
///
/// Rejects the whole batch when `events` is missing, not a list, empty, or
/// longer than [`MAX_BATCH_EVENTS`].
pub fn decode_batch(
    body: &Value,
    default_world: &WorldId,
    received_at: DateTime<Utc>,
) -> Result<DecodedBatch, EventError> {
    let entries = body
        .as_object()
        .and_then(|o| o.get("events"))
        .ok_or(EventError::MissingEvents)?
        .as_array()
        .ok_or(EventError::NotAList)?;

    if entries.is_empty() {
        return Err(EventError::EmptyBatch);
    }
    if entries.len() > MAX_BATCH_EVENTS {
        return Err(EventError::TooManyEvents {
            count: entries.len(),
            max: MAX_BATCH_EVENTS,
        });
    }

    let mut batch = DecodedBatch {
        events: Vec::with_capacity(entries.len()),
        skipped: 0,
        total: entries.len(),
    };
    for (index, entry) in entries.iter().enumerate() {
        match decode_entry(entry, default_world, received_at) {
            Some(event) => batch.events.push(event),
            None => {
                tracing::debug!(index, "skipping invalid batch entry");
                batch.skipped = batch.skipped.saturating_add(1);
            }
        }
    }
    Ok(batch)
}

fn decode_entry(
    entry: &Value,
    default_world: &WorldId,
    received_at: DateTime<Utc>,
) -> Option<IngestEvent> {
    let obj = entry.as_object()?;
    let kind = obj
        .get("kind")
        .and_then(Value::as_str)
        .filter(|k| !k.is_empty())
        .and_then(EventKind::from_wire)?;
    let raw = obj.get("payload").filter(|p| p.is_object())?;
    let world_id = WorldId::coerce(obj.get("world_id").and_then(Value::as_str), default_world);

    Some(IngestEvent {
        world_id,
        payload: EventPayload::decode(kind, raw, received_at),
        raw: raw.clone(),
    })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn tick_event(n: usize) -> Value {
        json!({"kind": "tick", "world_id": "w1", "payload": {"tick": n, "digest": "d"}})
    }

    fn decode(body: &Value) -> Result<DecodedBatch, EventError> {
        decode_batch(body, &WorldId::default(), Utc::now())
    }

    #[test]
    fn envelope_shape_errors() {
        assert!(matches!(decode(&json!({})), Err(EventError::MissingEvents)));
        assert!(matches!(decode(&json!([1])), Err(EventError::MissingEvents)));
        assert!(matches!(decode(&json!({"events": {}})), Err(EventError::NotAList)));
        assert!(matches!(decode(&json!({"events": []})), Err(EventError::EmptyBatch)));
    }

    #[test]
    fn full_batch_is_accepted() {
        let events: Vec<Value> = (0..MAX_BATCH_EVENTS).map(tick_event).collect();
        let batch = decode(&json!({ "events": events })).unwrap_or_default();
        assert_eq!(batch.events.len(), MAX_BATCH_EVENTS);
        assert_eq!(batch.total, MAX_BATCH_EVENTS);
    }

    #[test]
    fn oversize_batch_is_rejected() {
        let events: Vec<Value> = (0..=MAX_BATCH_EVENTS).map(tick_event).collect();
        let err = decode(&json!({ "events": events }));
        assert!(err.as_ref().is_err_and(EventError::is_too_large), "{err:?}");
    }

    #[test]
    fn invalid_entries_are_skipped() {
        let body = json!({"events": [
            7,
            {"kind": "", "payload": {}},
            {"payload": {}},
            {"kind": "tick", "payload": [1]},
            {"kind": "weather", "payload": {}},
            {"kind": "tick", "payload": {"tick": 3}}
        ]});
        let batch = decode(&body).unwrap_or_default();
        assert_eq!(batch.events.len(), 1);
        assert_eq!(batch.skipped, 5);
        assert_eq!(batch.total, 6);
    }

    #[test]
    fn world_id_is_coerced_to_default() {
        let default = WorldId::parse("fallback").unwrap_or_default();
        let body = json!({"events": [
            {"kind": "tick", "world_id": "bad id!", "payload": {}},
            {"kind": "tick", "payload": {}},
            {"kind": "tick", "world_id": " w-2 ", "payload": {}}
        ]});
        let batch = decode_batch(&body, &default, Utc::now()).unwrap_or_default();
        let worlds: Vec<&str> = batch.events.iter().map(|e| e.world_id.as_str()).collect();
        assert_eq!(worlds, ["fallback", "fallback", "w-2"]);
    }

    #[test]
    fn raw_payload_is_preserved() {
        let body = json!({"events": [
            {"kind": "audit", "payload": {"tick": "5", "seq": 1, "extra": true}}
        ]});
        let batch = decode(&body).unwrap_or_default();
        let event = batch.events.first();
        assert_eq!(event.map(IngestEvent::kind), Some(EventKind::Audit));
        assert_eq!(event.map(|e| &e.raw), Some(&json!({"tick": "5", "seq": 1, "extra": true})));
        assert!(matches!(
            event.map(|e| &e.payload),
            Some(EventPayload::Audit(AuditPayload { tick: 5, seq: 1, .. }))
        ));
    }

    #[test]
    fn non_json_bytes_are_malformed() {
        let err = decode_batch_bytes(b"{not json", &WorldId::default(), Utc::now());
        assert!(matches!(err, Err(EventError::MalformedJson(_))));
    }
}
