//! Data layer for Worldgate (`PostgreSQL` index + `Dragonfly` archive).
//!
//! The relational index holds the materialized projections of every world's
//! event stream plus one head row per world. The object archive holds a JSON
//! mirror of each head. Both stores have an in-process backend so the rest
//! of the system runs without external services.
//!
//! # Architecture
//!
//! ```text
//! Ingest batch ------> materialize --+
//!                                    +--> IndexBackend --> PostgreSQL | memory
//! Dispatched request -> head --------+
//!                        |
//!                        +-----------> ArchiveBackend --> Dragonfly | memory
//! ```
//!
//! Every entry point first passes through the [`SchemaGate`] owned by
//! [`Persistence`], so tables exist before any statement runs.
//!
//! # Modules
//!
//! - [`schema`] -- Idempotent DDL and the readiness gate
//! - [`postgres`] -- `PostgreSQL` connection pool and configuration
//! - [`head_store`], [`tick_store`], [`snapshot_store`], [`catalog_store`] -- Per-table SQL
//! - [`memory`] -- In-process index
//! - [`index`] -- [`IndexBackend`] dispatch
//! - [`dragonfly`] -- `Dragonfly` archive client
//! - [`archive`] -- [`ArchiveBackend`] dispatch and the in-process archive
//! - [`persistence`] -- The [`Persistence`] bundle
//! - [`materialize`] -- Event to row projection
//! - [`head`] -- World head tracking
//! - [`health`] -- Health and introspection probes
//! - [`error`] -- Shared error types

pub mod archive;
pub mod catalog_store;
pub mod dragonfly;
pub mod error;
pub mod head;
pub mod head_store;
pub mod health;
pub mod index;
pub mod materialize;
pub mod memory;
pub mod persistence;
pub mod postgres;
pub mod schema;
pub mod snapshot_store;
pub mod tick_store;

// Re-export primary types for convenience.
pub use archive::{ArchiveBackend, ArchiveObject, JSON_CONTENT_TYPE, MemoryArchive};
pub use catalog_store::{CatalogRow, CatalogStore, SeasonRow};
pub use dragonfly::DragonflyArchive;
pub use error::{DbError, MaterializeError};
pub use head::{HeadView, persist_head, read_head, spawn_persist_head};
pub use head_store::{HeadRow, HeadStore};
pub use health::{STORE_OK, StorageHealth, index_health, persistence_health};
pub use index::IndexBackend;
pub use materialize::{BatchOutcome, apply_batch, apply_event};
pub use memory::MemoryIndex;
pub use persistence::Persistence;
pub use postgres::{PostgresConfig, PostgresPool};
pub use schema::{SCHEMA_STATEMENTS, SchemaGate};
pub use snapshot_store::{
    BoardPostRow, SnapshotAgentRow, SnapshotBoardRow, SnapshotChild, SnapshotRow, SnapshotStore,
    SnapshotTradeRow, SnapshotWorldRow,
};
pub use tick_store::{AuditRow, TickRow, TickStore};
