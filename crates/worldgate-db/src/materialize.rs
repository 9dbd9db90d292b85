//! Writes decoded events into the relational index.
//!
//! Events are applied one at a time, each as independent statements. A
//! failing event stops the batch; earlier events stay applied.
//!
//! A snapshot state is a full replace of its child collections: every child
//! row for `(world_id, tick)` is deleted, then the new rows are inserted in
//! list order. The replace is not atomic with respect to a concurrent replace
//! of the same key, so the last replace to finish wins.

use worldgate_events::{DecodedBatch, EventPayload, IngestEvent, SnapshotStatePayload};
use worldgate_types::WorldId;

use crate::catalog_store::{CatalogRow, SeasonRow};
use crate::error::{DbError, MaterializeError};
use crate::index::IndexBackend;
use crate::persistence::Persistence;
use crate::snapshot_store::{
    BoardPostRow, SnapshotAgentRow, SnapshotBoardRow, SnapshotChild, SnapshotRow,
    SnapshotTradeRow, SnapshotWorldRow,
};
use crate::tick_store::{AuditRow, TickRow};

/// Counts reported for a fully applied batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct BatchOutcome {
    /// Events written.
    pub applied: usize,
    /// Entries dropped by validation.
    pub skipped: usize,
    /// Entries submitted.
    pub total: usize,
}

/// Apply every event of a decoded batch, in order.
///
/// # Errors
///
/// Returns [`MaterializeError`] carrying the number of events applied before
/// the first failing one. Schema failures report zero applied.
pub async fn apply_batch(
    persistence: &Persistence,
    batch: &DecodedBatch,
) -> Result<BatchOutcome, MaterializeError> {
    let fail = |applied: usize, source: DbError| MaterializeError {
        applied,
        total: batch.total,
        source,
    };

    persistence.ensure_schema().await.map_err(|e| fail(0, e))?;

    let mut applied = 0;
    for event in &batch.events {
        apply_event(persistence.index(), event)
            .await
            .map_err(|e| fail(applied, e))?;
        applied = applied.saturating_add(1);
    }

    let outcome = BatchOutcome {
        applied,
        skipped: batch.skipped,
        total: batch.total,
    };
    tracing::info!(
        applied = outcome.applied,
        skipped = outcome.skipped,
        total = outcome.total,
        "Applied ingest batch"
    );
    Ok(outcome)
}

/// Apply one event against the index.
///
/// # Errors
///
/// Returns the first [`DbError`] any of the event's writes produced.
pub async fn apply_event(index: &IndexBackend, event: &IngestEvent) -> Result<(), DbError> {
    let world = &event.world_id;
    match &event.payload {
        EventPayload::Tick(p) => {
            index
                .upsert_tick(&TickRow::from_payload(world, p, &event.raw))
                .await?;
        }
        EventPayload::Audit(p) => {
            index
                .upsert_audit(&AuditRow::from_payload(world, p, &event.raw))
                .await?;
        }
        EventPayload::Snapshot(p) => {
            index
                .upsert_snapshot(&SnapshotRow::from_payload(world, p))
                .await?;
        }
        EventPayload::SnapshotState(p) => replace_snapshot_state(index, world, p).await?,
        EventPayload::Season(p) => {
            index
                .upsert_season(&SeasonRow::from_payload(world, p))
                .await?;
        }
        EventPayload::Catalog(p) => {
            index
                .upsert_catalog(&CatalogRow::from_payload(world, p))
                .await?;
        }
    }
    tracing::debug!(world_id = %world, kind = %event.kind(), "Applied event");
    Ok(())
}

async fn replace_snapshot_state(
    index: &IndexBackend,
    world: &WorldId,
    state: &SnapshotStatePayload,
) -> Result<(), DbError> {
    let tick = state.tick;

    index
        .upsert_snapshot_world(&SnapshotWorldRow::from_payload(world, state))
        .await?;

    for child in SnapshotChild::ALL {
        index.delete_children(world, tick, child).await?;
    }

    for agent in &state.agents {
        index
            .insert_agent(&SnapshotAgentRow::from_record(world, tick, agent))
            .await?;
    }
    for board in &state.boards {
        index
            .insert_board(&SnapshotBoardRow::from_record(world, tick, board))
            .await?;
        for post in &board.posts {
            index
                .insert_post(&BoardPostRow::from_record(world, tick, &board.board_id, post))
                .await?;
        }
    }
    for trade in &state.trades {
        index
            .insert_trade(&SnapshotTradeRow::from_record(world, tick, trade))
            .await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use serde_json::{Value, json};
    use worldgate_events::decode_batch;

    use super::*;
    use crate::memory::MemoryIndex;

    fn world(id: &str) -> WorldId {
        WorldId::parse(id).unwrap_or_default()
    }

    fn decode(events: Value) -> DecodedBatch {
        decode_batch(&json!({ "events": events }), &WorldId::default(), Utc::now())
            .unwrap_or_default()
    }

    async fn ingest(persistence: &Persistence, events: Value) -> BatchOutcome {
        apply_batch(persistence, &decode(events))
            .await
            .unwrap_or_default()
    }

    fn memory(persistence: &Persistence) -> MemoryIndex {
        persistence.memory_index().cloned().unwrap_or_default()
    }

    #[tokio::test]
    async fn tick_reingest_is_last_write_wins() {
        let p = Persistence::in_memory();
        let event = |digest: &str| {
            json!([{"kind": "tick", "world_id": "w1",
                    "payload": {"tick": 7, "digest": digest, "joins": [{"agent_id": "a"}], "leaves": [], "actions": [1, 2]}}])
        };

        ingest(&p, event("aaa")).await;
        ingest(&p, event("aaa")).await;
        let row = memory(&p).tick(&world("w1"), 7);
        assert_eq!(row.as_ref().map(|r| r.digest.as_str()), Some("aaa"));
        assert_eq!(row.as_ref().map(|r| (r.joins_count, r.leaves_count, r.actions_count)), Some((1, 0, 2)));
        assert_eq!(row.as_ref().map(|r| r.actions_json.as_str()), Some("[1,2]"));

        ingest(&p, event("bbb")).await;
        assert_eq!(memory(&p).tick(&world("w1"), 7).map(|r| r.digest), Some("bbb".to_owned()));
        assert_eq!(memory(&p).index_counts(&world("w1")).map(|c| c.ticks).ok(), Some(1));
    }

    #[tokio::test]
    async fn raw_payload_is_kept_verbatim() {
        let p = Persistence::in_memory();
        ingest(
            &p,
            json!([{"kind": "audit", "world_id": "w1",
                    "payload": {"tick": 3, "seq": 1, "actor": "a1", "action": "SET_BLOCK", "pos": [1, 2, 3], "from": 0, "to": 5, "custom": "x"}}]),
        )
        .await;
        let row = memory(&p).audit(&world("w1"), 3, 1);
        assert_eq!(row.as_ref().map(|r| (r.x, r.y, r.z, r.from_block, r.to_block)), Some((1, 2, 3, 0, 5)));
        let raw: Option<Value> = row.and_then(|r| serde_json::from_str(&r.raw_json).ok());
        assert_eq!(raw.as_ref().and_then(|v| v.get("custom")), Some(&json!("x")));
    }

    #[tokio::test]
    async fn snapshot_state_replace_leaves_no_residue() {
        let p = Persistence::in_memory();
        let w = world("w1");
        let state = |agents: Value, boards: Value| {
            json!([{"kind": "snapshot_state", "world_id": "w1",
                    "payload": {"tick": 10, "weather": "RAIN", "agents": agents, "boards": boards,
                                "trades": [{"trade_id": "t1", "from": "a1", "to": "a2", "offer": {"stone": 2}}]}}])
        };

        ingest(
            &p,
            state(
                json!([{"id": "a1"}, {"id": "a2"}, {"id": "a3"}]),
                json!([{"board_id": "board@1,2,3", "posts": [{"post_id": "p1"}, {"post_id": "p2"}]}]),
            ),
        )
        .await;
        assert_eq!(memory(&p).agents(&w, 10).len(), 3);
        assert_eq!(memory(&p).posts(&w, 10).len(), 2);

        ingest(
            &p,
            state(json!([{"id": "a2"}]), json!([{"board_id": "town-square"}])),
        )
        .await;
        let mem = memory(&p);
        let ids: Vec<String> = mem.agents(&w, 10).into_iter().map(|a| a.agent_id).collect();
        assert_eq!(ids, ["a2"]);
        assert!(mem.posts(&w, 10).is_empty());
        let boards = mem.boards(&w, 10);
        assert_eq!(boards.len(), 1);
        assert_eq!(boards.first().map(|b| b.kind.as_str()), Some("GLOBAL"));
        assert_eq!(mem.trades(&w, 10).first().map(|t| t.offer_json.as_str()), Some(r#"{"stone":2}"#));
        assert_eq!(mem.snapshot_world(&w, 10).map(|s| s.weather), Some("RAIN".to_owned()));
    }

    #[tokio::test]
    async fn replace_is_scoped_to_world_and_tick() {
        let p = Persistence::in_memory();
        let state = |world: &str, tick: i64| {
            json!({"kind": "snapshot_state", "world_id": world,
                   "payload": {"tick": tick, "agents": [{"id": "a1"}]}})
        };
        ingest(&p, json!([state("w1", 1), state("w1", 2), state("w2", 1)])).await;
        ingest(
            &p,
            json!([{"kind": "snapshot_state", "world_id": "w1", "payload": {"tick": 1, "agents": []}}]),
        )
        .await;

        let mem = memory(&p);
        assert!(mem.agents(&world("w1"), 1).is_empty());
        assert_eq!(mem.agents(&world("w1"), 2).len(), 1);
        assert_eq!(mem.agents(&world("w2"), 1).len(), 1);
    }

    #[tokio::test]
    async fn duplicate_child_ids_overwrite() {
        let p = Persistence::in_memory();
        ingest(
            &p,
            json!([{"kind": "snapshot_state", "world_id": "w1",
                    "payload": {"tick": 4, "agents": [{"id": "a1", "hp": 5}, {"id": "a1", "hp": 9}]}}]),
        )
        .await;
        let agents = memory(&p).agents(&world("w1"), 4);
        assert_eq!(agents.len(), 1);
        assert_eq!(agents.first().map(|a| a.hp), Some(9));
    }

    #[tokio::test]
    async fn unknown_kind_is_not_applied() {
        let p = Persistence::in_memory();
        let outcome = ingest(
            &p,
            json!([
                {"kind": "weather", "world_id": "w1", "payload": {}},
                {"kind": "tick", "world_id": "w1", "payload": {"tick": 1}}
            ]),
        )
        .await;
        assert_eq!(outcome.applied, 1);
        assert_eq!(outcome.skipped, 1);
        assert_eq!(outcome.total, 2);
    }

    #[tokio::test]
    async fn failing_event_keeps_earlier_ones() {
        let p = Persistence::in_memory();
        memory(&p).reject_tick(2);
        let batch = decode(json!([
            {"kind": "tick", "world_id": "w1", "payload": {"tick": 1}},
            {"kind": "tick", "world_id": "w1", "payload": {"tick": 2}},
            {"kind": "tick", "world_id": "w1", "payload": {"tick": 3}}
        ]));
        let err = apply_batch(&p, &batch).await.err();
        assert_eq!(err.as_ref().map(|e| (e.applied, e.total)), Some((1, 3)));
        assert!(memory(&p).tick(&world("w1"), 1).is_some());
        assert!(memory(&p).tick(&world("w1"), 3).is_none());
    }

    #[tokio::test]
    async fn seasons_and_catalogs_upsert_by_key() {
        let p = Persistence::in_memory();
        ingest(
            &p,
            json!([
                {"kind": "season", "world_id": "w1", "payload": {"season": 1, "end_tick": 100, "path": "a"}},
                {"kind": "season", "world_id": "w1", "payload": {"season": 1, "end_tick": 200, "path": "b"}},
                {"kind": "catalog", "world_id": "w1", "payload": {"name": "recipes", "digest": "d", "json": {"k": 1}}}
            ]),
        )
        .await;
        let mem = memory(&p);
        let season = mem.season(&world("w1"), 1);
        assert_eq!(season.as_ref().map(|s| (s.end_tick, s.path.as_str())), Some((200, "b")));
        assert!(season.is_some_and(|s| !s.recorded_at.is_empty()));
        assert_eq!(mem.catalog(&world("w1"), "recipes").map(|c| c.json), Some(r#"{"k":1}"#.to_owned()));
    }
}
