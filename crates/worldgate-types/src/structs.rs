//! Documents mirrored into the object archive.
//!
//! The archive holds one JSON document per world at
//! `worlds/<world_id>/head.json`. It is written after the relational head
//! row and is not transactional with it, so readers may briefly observe
//! the two copies disagreeing.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::WorldId;

/// Key probed by the persistence health check.
pub const HEALTHCHECK_PROBE_KEY: &str = "_healthcheck/probe.json";

/// Archive key for a world's head mirror.
pub fn head_archive_key(world_id: &WorldId) -> String {
    format!("worlds/{world_id}/head.json")
}

/// Archive mirror of a world's head row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeadDocument {
    /// World the head belongs to.
    pub world_id: WorldId,
    /// Path and query of the most recent dispatched request.
    pub last_path: String,
    /// HTTP status the compute unit answered with.
    pub last_status: u16,
    /// Cumulative dispatched requests, as stored after this update.
    pub request_count: i64,
    /// When the request was dispatched.
    pub last_request_at: DateTime<Utc>,
    /// When the head row was last written.
    pub updated_at: DateTime<Utc>,
}

/// What the archive returned for a head read.
///
/// A stored body that is not valid JSON is reported as
/// `{"parse_error": true}` instead of failing the read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ArchiveDocument {
    /// The stored body parsed as JSON.
    Parsed(serde_json::Value),
    /// The stored body could not be parsed.
    Unreadable {
        /// Always `true`.
        parse_error: bool,
    },
}

impl ArchiveDocument {
    /// Parse a raw archive body, never failing.
    pub fn from_body(body: &str) -> Self {
        serde_json::from_str(body).map_or(Self::Unreadable { parse_error: true }, Self::Parsed)
    }

    /// Whether this is the parse-error marker.
    pub const fn is_parse_error(&self) -> bool {
        matches!(self, Self::Unreadable { .. })
    }
}

/// Per-world row counts reported by the index health endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexCounts {
    /// Rows in `ticks`.
    pub ticks: i64,
    /// Rows in `audits`.
    pub audits: i64,
    /// Rows in `snapshots`.
    pub snapshots: i64,
}
