//! Shared type definitions for the Worldgate dispatcher and index.
//!
//! This crate holds the vocabulary every other crate agrees on: the world id
//! shape rule, the closed set of event kinds, and the head document that is
//! mirrored into the object archive.
//!
//! # Modules
//!
//! - [`ids`] -- Validated [`WorldId`] and its coercion rule
//! - [`enums`] -- [`EventKind`] and [`BoardKind`]
//! - [`structs`] -- Archive documents and per-world index counts

pub mod enums;
pub mod ids;
pub mod structs;

// Re-export all public types at crate root for convenience.
pub use enums::{BoardKind, EventKind};
pub use ids::{DEFAULT_WORLD_ID, InvalidWorldId, MAX_WORLD_ID_LEN, WorldId, is_valid_world_id};
pub use structs::{
    ArchiveDocument, HEALTHCHECK_PROBE_KEY, HeadDocument, IndexCounts, head_archive_key,
};
