//! In-process relational index.
//!
//! Mirrors the key and overwrite semantics of the `PostgreSQL` tables with
//! ordered maps, so the materializer and the HTTP boundary can run without a
//! database (local development and tests). Nothing is persisted.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use worldgate_types::{IndexCounts, WorldId};

use crate::catalog_store::{CatalogRow, SeasonRow};
use crate::error::DbError;
use crate::head_store::HeadRow;
use crate::snapshot_store::{
    BoardPostRow, SnapshotAgentRow, SnapshotBoardRow, SnapshotChild, SnapshotRow,
    SnapshotTradeRow, SnapshotWorldRow,
};
use crate::tick_store::{AuditRow, TickRow};

type TickKey = (String, i64);
type ChildKey = (String, i64, String);
type PostKey = (String, i64, String, String);

#[derive(Default)]
struct Tables {
    schema_runs: usize,
    unavailable: bool,
    rejected_ticks: HashSet<i64>,
    heads: BTreeMap<String, HeadRow>,
    ticks: BTreeMap<TickKey, TickRow>,
    audits: BTreeMap<(String, i64, i64), AuditRow>,
    snapshots: BTreeMap<TickKey, SnapshotRow>,
    snapshot_world: BTreeMap<TickKey, SnapshotWorldRow>,
    agents: BTreeMap<ChildKey, SnapshotAgentRow>,
    boards: BTreeMap<ChildKey, SnapshotBoardRow>,
    posts: BTreeMap<PostKey, BoardPostRow>,
    trades: BTreeMap<ChildKey, SnapshotTradeRow>,
    seasons: BTreeMap<TickKey, SeasonRow>,
    catalogs: BTreeMap<(String, String), CatalogRow>,
}

/// Shared in-memory index. Clones share the same tables.
#[derive(Clone, Default)]
pub struct MemoryIndex {
    tables: Arc<Mutex<Tables>>,
}

impl MemoryIndex {
    /// An empty index.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Lock the tables, failing when the index is marked unavailable.
    fn open(&self) -> Result<MutexGuard<'_, Tables>, DbError> {
        let tables = self.lock();
        if tables.unavailable {
            return Err(DbError::Config("memory index is unavailable".to_owned()));
        }
        Ok(tables)
    }

    // =========================================================================
    // Fault injection and inspection
    // =========================================================================

    /// Make every subsequent operation fail (or succeed again).
    pub fn set_unavailable(&self, unavailable: bool) {
        self.lock().unavailable = unavailable;
    }

    /// Make tick upserts for `tick` fail.
    pub fn reject_tick(&self, tick: i64) {
        self.lock().rejected_ticks.insert(tick);
    }

    /// How many times the schema has been applied.
    pub fn schema_runs(&self) -> usize {
        self.lock().schema_runs
    }

    /// Stored tick row.
    pub fn tick(&self, world_id: &WorldId, tick: i64) -> Option<TickRow> {
        self.lock().ticks.get(&(world_id.to_string(), tick)).cloned()
    }

    /// Stored audit row.
    pub fn audit(&self, world_id: &WorldId, tick: i64, seq: i64) -> Option<AuditRow> {
        self.lock()
            .audits
            .get(&(world_id.to_string(), tick, seq))
            .cloned()
    }

    /// Stored snapshot summary.
    pub fn snapshot(&self, world_id: &WorldId, tick: i64) -> Option<SnapshotRow> {
        self.lock()
            .snapshots
            .get(&(world_id.to_string(), tick))
            .cloned()
    }

    /// Stored snapshot state parent.
    pub fn snapshot_world(&self, world_id: &WorldId, tick: i64) -> Option<SnapshotWorldRow> {
        self.lock()
            .snapshot_world
            .get(&(world_id.to_string(), tick))
            .cloned()
    }

    /// Agent rows of a snapshot state, ordered by agent id.
    pub fn agents(&self, world_id: &WorldId, tick: i64) -> Vec<SnapshotAgentRow> {
        child_rows(&self.lock().agents, world_id, tick)
    }

    /// Board rows of a snapshot state, ordered by board id.
    pub fn boards(&self, world_id: &WorldId, tick: i64) -> Vec<SnapshotBoardRow> {
        child_rows(&self.lock().boards, world_id, tick)
    }

    /// Post rows of a snapshot state, ordered by board then post id.
    pub fn posts(&self, world_id: &WorldId, tick: i64) -> Vec<BoardPostRow> {
        let world = world_id.as_str();
        self.lock()
            .posts
            .iter()
            .filter(|((w, t, _, _), _)| w == world && *t == tick)
            .map(|(_, row)| row.clone())
            .collect()
    }

    /// Trade rows of a snapshot state, ordered by trade id.
    pub fn trades(&self, world_id: &WorldId, tick: i64) -> Vec<SnapshotTradeRow> {
        child_rows(&self.lock().trades, world_id, tick)
    }

    /// Stored season row.
    pub fn season(&self, world_id: &WorldId, season: i64) -> Option<SeasonRow> {
        self.lock()
            .seasons
            .get(&(world_id.to_string(), season))
            .cloned()
    }

    /// Stored catalog row.
    pub fn catalog(&self, world_id: &WorldId, name: &str) -> Option<CatalogRow> {
        self.lock()
            .catalogs
            .get(&(world_id.to_string(), name.to_owned()))
            .cloned()
    }

    // =========================================================================
    // Index operations
    // =========================================================================

    pub(crate) fn apply_schema(&self) -> Result<(), DbError> {
        let mut tables = self.open()?;
        tables.schema_runs = tables.schema_runs.saturating_add(1);
        Ok(())
    }

    pub(crate) fn ping(&self) -> Result<(), DbError> {
        self.open().map(drop)
    }

    pub(crate) fn upsert_head(
        &self,
        world_id: &WorldId,
        path: &str,
        status: u16,
        at: DateTime<Utc>,
    ) -> Result<HeadRow, DbError> {
        let mut tables = self.open()?;
        let now = Utc::now();
        let row = tables
            .heads
            .entry(world_id.to_string())
            .and_modify(|row| {
                row.last_path = path.to_owned();
                row.last_status = i32::from(status);
                row.request_count = row.request_count.saturating_add(1);
                row.last_request_at = at;
                row.updated_at = now;
            })
            .or_insert_with(|| HeadRow {
                world_id: world_id.to_string(),
                last_path: path.to_owned(),
                last_status: i32::from(status),
                request_count: 1,
                last_request_at: at,
                updated_at: now,
            });
        Ok(row.clone())
    }

    pub(crate) fn get_head(&self, world_id: &WorldId) -> Result<Option<HeadRow>, DbError> {
        Ok(self.open()?.heads.get(world_id.as_str()).cloned())
    }

    pub(crate) fn upsert_tick(&self, row: &TickRow) -> Result<(), DbError> {
        let mut tables = self.open()?;
        if tables.rejected_ticks.contains(&row.tick) {
            return Err(DbError::Config(format!("tick {} rejected", row.tick)));
        }
        tables
            .ticks
            .insert((row.world_id.clone(), row.tick), row.clone());
        Ok(())
    }

    pub(crate) fn upsert_audit(&self, row: &AuditRow) -> Result<(), DbError> {
        self.open()?
            .audits
            .insert((row.world_id.clone(), row.tick, row.seq), row.clone());
        Ok(())
    }

    pub(crate) fn upsert_snapshot(&self, row: &SnapshotRow) -> Result<(), DbError> {
        self.open()?
            .snapshots
            .insert((row.world_id.clone(), row.tick), row.clone());
        Ok(())
    }

    pub(crate) fn upsert_snapshot_world(&self, row: &SnapshotWorldRow) -> Result<(), DbError> {
        self.open()?
            .snapshot_world
            .insert((row.world_id.clone(), row.tick), row.clone());
        Ok(())
    }

    pub(crate) fn delete_children(
        &self,
        world_id: &WorldId,
        tick: i64,
        child: SnapshotChild,
    ) -> Result<u64, DbError> {
        let mut tables = self.open()?;
        let world = world_id.as_str();
        let removed = match child {
            SnapshotChild::Agents => purge(&mut tables.agents, |(w, t, _)| w == world && *t == tick),
            SnapshotChild::Boards => purge(&mut tables.boards, |(w, t, _)| w == world && *t == tick),
            SnapshotChild::Posts => {
                purge(&mut tables.posts, |(w, t, _, _)| w == world && *t == tick)
            }
            SnapshotChild::Trades => purge(&mut tables.trades, |(w, t, _)| w == world && *t == tick),
        };
        Ok(removed)
    }

    pub(crate) fn insert_agent(&self, row: &SnapshotAgentRow) -> Result<(), DbError> {
        self.open()?.agents.insert(
            (row.world_id.clone(), row.tick, row.agent_id.clone()),
            row.clone(),
        );
        Ok(())
    }

    pub(crate) fn insert_board(&self, row: &SnapshotBoardRow) -> Result<(), DbError> {
        self.open()?.boards.insert(
            (row.world_id.clone(), row.tick, row.board_id.clone()),
            row.clone(),
        );
        Ok(())
    }

    pub(crate) fn insert_post(&self, row: &BoardPostRow) -> Result<(), DbError> {
        self.open()?.posts.insert(
            (
                row.world_id.clone(),
                row.tick,
                row.board_id.clone(),
                row.post_id.clone(),
            ),
            row.clone(),
        );
        Ok(())
    }

    pub(crate) fn insert_trade(&self, row: &SnapshotTradeRow) -> Result<(), DbError> {
        self.open()?.trades.insert(
            (row.world_id.clone(), row.tick, row.trade_id.clone()),
            row.clone(),
        );
        Ok(())
    }

    pub(crate) fn upsert_season(&self, row: &SeasonRow) -> Result<(), DbError> {
        self.open()?
            .seasons
            .insert((row.world_id.clone(), row.season), row.clone());
        Ok(())
    }

    pub(crate) fn upsert_catalog(&self, row: &CatalogRow) -> Result<(), DbError> {
        self.open()?
            .catalogs
            .insert((row.world_id.clone(), row.name.clone()), row.clone());
        Ok(())
    }

    pub(crate) fn index_counts(&self, world_id: &WorldId) -> Result<IndexCounts, DbError> {
        let tables = self.open()?;
        let world = world_id.as_str();
        let ticks = tables.ticks.keys().filter(|(w, _)| w == world).count();
        let audits = tables.audits.keys().filter(|(w, _, _)| w == world).count();
        let snapshots = tables.snapshots.keys().filter(|(w, _)| w == world).count();
        drop(tables);
        Ok(IndexCounts {
            ticks: i64::try_from(ticks).unwrap_or(i64::MAX),
            audits: i64::try_from(audits).unwrap_or(i64::MAX),
            snapshots: i64::try_from(snapshots).unwrap_or(i64::MAX),
        })
    }
}

impl core::fmt::Debug for MemoryIndex {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("MemoryIndex").finish_non_exhaustive()
    }
}

/// Remove every entry whose key matches, returning how many went.
fn purge<K: Ord, V>(map: &mut BTreeMap<K, V>, matches: impl Fn(&K) -> bool) -> u64 {
    let before = map.len();
    map.retain(|k, _| !matches(k));
    u64::try_from(before.saturating_sub(map.len())).unwrap_or(u64::MAX)
}

fn child_rows<R: Clone>(map: &BTreeMap<ChildKey, R>, world_id: &WorldId, tick: i64) -> Vec<R> {
    let world = world_id.as_str();
    map.iter()
        .filter(|((w, t, _), _)| w == world && *t == tick)
        .map(|(_, row)| row.clone())
        .collect()
}
