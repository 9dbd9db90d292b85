//! Relational index backend selection.
//!
//! Uses enum dispatch rather than trait objects because async methods are
//! not dyn-compatible. The `PostgreSQL` arm delegates to the per-table
//! stores; the memory arm to [`MemoryIndex`].

use chrono::{DateTime, Utc};
use worldgate_types::{IndexCounts, WorldId};

use crate::catalog_store::{CatalogRow, CatalogStore, SeasonRow};
use crate::error::DbError;
use crate::head_store::{HeadRow, HeadStore};
use crate::memory::MemoryIndex;
use crate::postgres::PostgresPool;
use crate::snapshot_store::{
    BoardPostRow, SnapshotAgentRow, SnapshotBoardRow, SnapshotChild, SnapshotRow, SnapshotStore,
    SnapshotTradeRow, SnapshotWorldRow,
};
use crate::tick_store::{AuditRow, TickRow, TickStore};

/// The relational index.
#[derive(Clone, Debug)]
pub enum IndexBackend {
    /// `PostgreSQL` through a shared pool.
    Postgres(PostgresPool),
    /// In-process tables.
    Memory(MemoryIndex),
}

impl IndexBackend {
    /// Short backend name for logs and health output.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Postgres(_) => "postgres",
            Self::Memory(_) => "memory",
        }
    }

    /// Run the idempotent DDL.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] from the first failing statement.
    pub async fn apply_schema(&self) -> Result<(), DbError> {
        match self {
            Self::Postgres(pg) => pg.apply_schema().await,
            Self::Memory(mem) => mem.apply_schema(),
        }
    }

    /// Issue a trivial read.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the index is unreachable.
    pub async fn ping(&self) -> Result<(), DbError> {
        match self {
            Self::Postgres(pg) => pg.ping().await,
            Self::Memory(mem) => mem.ping(),
        }
    }

    /// Record a dispatched request against a world's head.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the upsert fails.
    pub async fn upsert_head(
        &self,
        world_id: &WorldId,
        path: &str,
        status: u16,
        at: DateTime<Utc>,
    ) -> Result<HeadRow, DbError> {
        match self {
            Self::Postgres(pg) => HeadStore::new(pg.pool()).upsert(world_id, path, status, at).await,
            Self::Memory(mem) => mem.upsert_head(world_id, path, status, at),
        }
    }

    /// Read a world's head row.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the query fails.
    pub async fn get_head(&self, world_id: &WorldId) -> Result<Option<HeadRow>, DbError> {
        match self {
            Self::Postgres(pg) => HeadStore::new(pg.pool()).get(world_id).await,
            Self::Memory(mem) => mem.get_head(world_id),
        }
    }

    /// Insert or overwrite a tick summary.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the write fails.
    pub async fn upsert_tick(&self, row: &TickRow) -> Result<(), DbError> {
        match self {
            Self::Postgres(pg) => TickStore::new(pg.pool()).upsert_tick(row).await,
            Self::Memory(mem) => mem.upsert_tick(row),
        }
    }

    /// Insert or overwrite an audit entry.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the write fails.
    pub async fn upsert_audit(&self, row: &AuditRow) -> Result<(), DbError> {
        match self {
            Self::Postgres(pg) => TickStore::new(pg.pool()).upsert_audit(row).await,
            Self::Memory(mem) => mem.upsert_audit(row),
        }
    }

    /// Insert or overwrite a snapshot summary.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the write fails.
    pub async fn upsert_snapshot(&self, row: &SnapshotRow) -> Result<(), DbError> {
        match self {
            Self::Postgres(pg) => SnapshotStore::new(pg.pool()).upsert_snapshot(row).await,
            Self::Memory(mem) => mem.upsert_snapshot(row),
        }
    }

    /// Insert or overwrite a snapshot state parent row.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the write fails.
    pub async fn upsert_snapshot_world(&self, row: &SnapshotWorldRow) -> Result<(), DbError> {
        match self {
            Self::Postgres(pg) => SnapshotStore::new(pg.pool()).upsert_world(row).await,
            Self::Memory(mem) => mem.upsert_snapshot_world(row),
        }
    }

    /// Delete one child collection of a snapshot state.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the delete fails.
    pub async fn delete_children(
        &self,
        world_id: &WorldId,
        tick: i64,
        child: SnapshotChild,
    ) -> Result<u64, DbError> {
        match self {
            Self::Postgres(pg) => {
                SnapshotStore::new(pg.pool())
                    .delete_children(world_id, tick, child)
                    .await
            }
            Self::Memory(mem) => mem.delete_children(world_id, tick, child),
        }
    }

    /// Insert one agent child row.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the write fails.
    pub async fn insert_agent(&self, row: &SnapshotAgentRow) -> Result<(), DbError> {
        match self {
            Self::Postgres(pg) => SnapshotStore::new(pg.pool()).insert_agent(row).await,
            Self::Memory(mem) => mem.insert_agent(row),
        }
    }

    /// Insert one board child row.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the write fails.
    pub async fn insert_board(&self, row: &SnapshotBoardRow) -> Result<(), DbError> {
        match self {
            Self::Postgres(pg) => SnapshotStore::new(pg.pool()).insert_board(row).await,
            Self::Memory(mem) => mem.insert_board(row),
        }
    }

    /// Insert one board post row.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the write fails.
    pub async fn insert_post(&self, row: &BoardPostRow) -> Result<(), DbError> {
        match self {
            Self::Postgres(pg) => SnapshotStore::new(pg.pool()).insert_post(row).await,
            Self::Memory(mem) => mem.insert_post(row),
        }
    }

    /// Insert one trade child row.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the write fails.
    pub async fn insert_trade(&self, row: &SnapshotTradeRow) -> Result<(), DbError> {
        match self {
            Self::Postgres(pg) => SnapshotStore::new(pg.pool()).insert_trade(row).await,
            Self::Memory(mem) => mem.insert_trade(row),
        }
    }

    /// Insert or update a season record.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the write fails.
    pub async fn upsert_season(&self, row: &SeasonRow) -> Result<(), DbError> {
        match self {
            Self::Postgres(pg) => CatalogStore::new(pg.pool()).upsert_season(row).await,
            Self::Memory(mem) => mem.upsert_season(row),
        }
    }

    /// Insert or update a catalog.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the write fails.
    pub async fn upsert_catalog(&self, row: &CatalogRow) -> Result<(), DbError> {
        match self {
            Self::Postgres(pg) => CatalogStore::new(pg.pool()).upsert_catalog(row).await,
            Self::Memory(mem) => mem.upsert_catalog(row),
        }
    }

    /// Count one world's tick, audit and snapshot rows.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the query fails.
    pub async fn index_counts(&self, world_id: &WorldId) -> Result<IndexCounts, DbError> {
        match self {
            Self::Postgres(pg) => pg.index_counts(world_id).await,
            Self::Memory(mem) => mem.index_counts(world_id),
        }
    }
}
