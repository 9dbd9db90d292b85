//! Health and introspection probes.

use serde::Serialize;
use worldgate_types::{HEALTHCHECK_PROBE_KEY, IndexCounts, WorldId};

use crate::error::DbError;
use crate::persistence::Persistence;

/// Status reported for a reachable store.
pub const STORE_OK: &str = "ok";

/// Per-store status of a successful health probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StorageHealth {
    /// Relational index status.
    pub relational: &'static str,
    /// Object archive status.
    pub object: &'static str,
}

/// Probe both stores.
///
/// Ensures the schema, reads from the index, and probes the archive for
/// [`HEALTHCHECK_PROBE_KEY`]. The probe key need not exist.
///
/// # Errors
///
/// Returns the first [`DbError`] encountered.
pub async fn persistence_health(persistence: &Persistence) -> Result<StorageHealth, DbError> {
    persistence.ensure_schema().await?;
    persistence.index().ping().await?;
    let _ = persistence.archive().head(HEALTHCHECK_PROBE_KEY).await?;
    Ok(StorageHealth {
        relational: STORE_OK,
        object: STORE_OK,
    })
}

/// Row counts of one world's ticks, audits and snapshots.
///
/// # Errors
///
/// Returns the first [`DbError`] encountered.
pub async fn index_health(
    persistence: &Persistence,
    world_id: &WorldId,
) -> Result<IndexCounts, DbError> {
    persistence.ensure_schema().await?;
    persistence.index().ping().await?;
    persistence.index().index_counts(world_id).await
}
