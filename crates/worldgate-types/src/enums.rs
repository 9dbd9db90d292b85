//! Closed enumerations shared across the ingestion pipeline.

use serde::{Deserialize, Serialize};

/// Kind tag of an ingested simulation event.
///
/// The wire form is the lowercase snake-case name (`"snapshot_state"`).
/// Unknown tags are rejected by [`EventKind::from_wire`] rather than mapped
/// to a catch-all variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// One tick's summary: digest plus joins, leaves, and actions.
    Tick,
    /// A single state-changing action recorded within a tick.
    Audit,
    /// Scalar summary of a persisted snapshot file.
    Snapshot,
    /// Transient world state plus agents, boards, and trades at a tick.
    SnapshotState,
    /// End-of-season archive record.
    Season,
    /// A named catalog document (block defs, recipes, tuning, ...).
    Catalog,
}

impl EventKind {
    /// Every kind, in wire-documentation order.
    pub const ALL: [Self; 6] = [
        Self::Tick,
        Self::Audit,
        Self::Snapshot,
        Self::SnapshotState,
        Self::Season,
        Self::Catalog,
    ];

    /// Map a wire tag to a kind. Matching is exact and case-sensitive.
    pub fn from_wire(tag: &str) -> Option<Self> {
        match tag {
            "tick" => Some(Self::Tick),
            "audit" => Some(Self::Audit),
            "snapshot" => Some(Self::Snapshot),
            "snapshot_state" => Some(Self::SnapshotState),
            "season" => Some(Self::Season),
            "catalog" => Some(Self::Catalog),
            _ => None,
        }
    }

    /// The wire tag for this kind.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Tick => "tick",
            Self::Audit => "audit",
            Self::Snapshot => "snapshot",
            Self::SnapshotState => "snapshot_state",
            Self::Season => "season",
            Self::Catalog => "catalog",
        }
    }
}

impl core::fmt::Display for EventKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether a message board is pinned to a block position or world-wide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BoardKind {
    /// Board placed in the world at `board@x,y,z`.
    Local,
    /// Any other board id.
    Global,
}

impl BoardKind {
    /// Stored column value (`"LOCAL"` or `"GLOBAL"`).
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Local => "LOCAL",
            Self::Global => "GLOBAL",
        }
    }
}
