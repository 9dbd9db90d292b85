//! Ingestion batch decoding for the Worldgate index.
//!
//! Producers push loosely typed events in batches. This crate turns a batch
//! envelope into a list of [`IngestEvent`]s, each carrying a strongly typed
//! [`EventPayload`] per [`EventKind`](worldgate_types::EventKind), without
//! ever failing on a bad field: coercion falls back to defaults instead.
//!
//! # Modules
//!
//! - [`coerce`] -- Best-effort field accessors over raw JSON
//! - [`payload`] -- One payload struct per event kind
//! - [`decode`] -- Envelope checks and per-entry validation
//! - [`board`] -- Board id to [`BoardLocation`] derivation
//! - [`error`] -- [`EventError`] for envelope rejections

pub mod board;
pub mod coerce;
pub mod decode;
pub mod error;
pub mod payload;

pub use board::BoardLocation;
pub use coerce::{Fields, JSON_FALLBACK, best_effort_int, encode_json};
pub use decode::{
    DecodedBatch, EventPayload, IngestEvent, MAX_BATCH_EVENTS, decode_batch, decode_batch_bytes,
};
pub use error::EventError;
pub use payload::{
    AgentRecord, AuditPayload, BoardRecord, CatalogPayload, PostRecord, SeasonPayload,
    SnapshotPayload, SnapshotStatePayload, TickPayload, TradeRecord,
};
