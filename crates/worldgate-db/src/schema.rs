//! Index DDL and the process-wide schema readiness gate.
//!
//! Every statement is `CREATE ... IF NOT EXISTS`, so the whole list can be
//! replayed safely. [`SchemaGate`] makes sure concurrent first callers share
//! a single attempt instead of racing each other through the list.

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};

use crate::error::DbError;

/// Idempotent DDL for the relational index, applied in order.
pub const SCHEMA_STATEMENTS: &[&str] = &[
    r"CREATE TABLE IF NOT EXISTS world_heads (
        world_id        TEXT PRIMARY KEY,
        last_path       TEXT NOT NULL,
        last_status     INTEGER NOT NULL,
        request_count   BIGINT NOT NULL DEFAULT 0,
        last_request_at TIMESTAMPTZ NOT NULL,
        updated_at      TIMESTAMPTZ NOT NULL
    )",
    r"CREATE INDEX IF NOT EXISTS world_heads_updated_at_idx
        ON world_heads (updated_at DESC)",
    r"CREATE TABLE IF NOT EXISTS ticks (
        world_id      TEXT NOT NULL,
        tick          BIGINT NOT NULL,
        digest        TEXT NOT NULL,
        joins_json    TEXT NOT NULL,
        leaves_json   TEXT NOT NULL,
        actions_json  TEXT NOT NULL,
        joins_count   BIGINT NOT NULL,
        leaves_count  BIGINT NOT NULL,
        actions_count BIGINT NOT NULL,
        raw_json      TEXT NOT NULL,
        PRIMARY KEY (world_id, tick)
    )",
    r"CREATE TABLE IF NOT EXISTS audits (
        world_id   TEXT NOT NULL,
        tick       BIGINT NOT NULL,
        seq        BIGINT NOT NULL,
        actor      TEXT NOT NULL,
        action     TEXT NOT NULL,
        x          BIGINT NOT NULL,
        y          BIGINT NOT NULL,
        z          BIGINT NOT NULL,
        from_block BIGINT NOT NULL,
        to_block   BIGINT NOT NULL,
        reason     TEXT NOT NULL,
        raw_json   TEXT NOT NULL,
        PRIMARY KEY (world_id, tick, seq)
    )",
    r"CREATE INDEX IF NOT EXISTS audits_actor_idx ON audits (world_id, actor, tick)",
    r"CREATE INDEX IF NOT EXISTS audits_pos_idx ON audits (world_id, x, y, z)",
    r"CREATE TABLE IF NOT EXISTS snapshots (
        world_id   TEXT NOT NULL,
        tick       BIGINT NOT NULL,
        path       TEXT NOT NULL,
        seed       BIGINT NOT NULL,
        height     BIGINT NOT NULL,
        chunks     BIGINT NOT NULL,
        agents     BIGINT NOT NULL,
        claims     BIGINT NOT NULL,
        containers BIGINT NOT NULL,
        contracts  BIGINT NOT NULL,
        laws       BIGINT NOT NULL,
        orgs       BIGINT NOT NULL,
        PRIMARY KEY (world_id, tick)
    )",
    r"CREATE TABLE IF NOT EXISTS snapshot_world (
        world_id                TEXT NOT NULL,
        tick                    BIGINT NOT NULL,
        weather                 TEXT NOT NULL,
        weather_until_tick      BIGINT NOT NULL,
        active_event_id         TEXT NOT NULL,
        active_event_start_tick BIGINT NOT NULL,
        active_event_ends_tick  BIGINT NOT NULL,
        active_event_center_x   BIGINT NOT NULL,
        active_event_center_y   BIGINT NOT NULL,
        active_event_center_z   BIGINT NOT NULL,
        active_event_radius     BIGINT NOT NULL,
        PRIMARY KEY (world_id, tick)
    )",
    r"CREATE TABLE IF NOT EXISTS snapshot_agents (
        world_id        TEXT NOT NULL,
        tick            BIGINT NOT NULL,
        agent_id        TEXT NOT NULL,
        name            TEXT NOT NULL,
        org_id          TEXT,
        x               BIGINT NOT NULL,
        y               BIGINT NOT NULL,
        z               BIGINT NOT NULL,
        yaw             BIGINT NOT NULL,
        hp              BIGINT NOT NULL,
        hunger          BIGINT NOT NULL,
        stamina_milli   BIGINT NOT NULL,
        rep_trade       BIGINT NOT NULL,
        rep_build       BIGINT NOT NULL,
        rep_social      BIGINT NOT NULL,
        rep_law         BIGINT NOT NULL,
        fun_novelty     BIGINT NOT NULL,
        fun_creation    BIGINT NOT NULL,
        fun_social      BIGINT NOT NULL,
        fun_influence   BIGINT NOT NULL,
        fun_narrative   BIGINT NOT NULL,
        fun_risk_rescue BIGINT NOT NULL,
        inventory_json  TEXT NOT NULL,
        PRIMARY KEY (world_id, tick, agent_id)
    )",
    r"CREATE INDEX IF NOT EXISTS snapshot_agents_agent_idx
        ON snapshot_agents (world_id, agent_id, tick)",
    r"CREATE TABLE IF NOT EXISTS snapshot_boards (
        world_id   TEXT NOT NULL,
        tick       BIGINT NOT NULL,
        board_id   TEXT NOT NULL,
        kind       TEXT NOT NULL,
        x          BIGINT,
        y          BIGINT,
        z          BIGINT,
        post_count BIGINT NOT NULL,
        PRIMARY KEY (world_id, tick, board_id)
    )",
    r"CREATE TABLE IF NOT EXISTS snapshot_board_posts (
        world_id  TEXT NOT NULL,
        tick      BIGINT NOT NULL,
        board_id  TEXT NOT NULL,
        post_id   TEXT NOT NULL,
        author    TEXT NOT NULL,
        title     TEXT NOT NULL,
        body      TEXT NOT NULL,
        post_tick BIGINT NOT NULL,
        PRIMARY KEY (world_id, tick, board_id, post_id)
    )",
    r"CREATE INDEX IF NOT EXISTS snapshot_board_posts_author_idx
        ON snapshot_board_posts (world_id, author, tick)",
    r"CREATE TABLE IF NOT EXISTS snapshot_trades (
        world_id     TEXT NOT NULL,
        tick         BIGINT NOT NULL,
        trade_id     TEXT NOT NULL,
        from_agent   TEXT NOT NULL,
        to_agent     TEXT NOT NULL,
        created_tick BIGINT NOT NULL,
        offer_json   TEXT NOT NULL,
        request_json TEXT NOT NULL,
        PRIMARY KEY (world_id, tick, trade_id)
    )",
    r"CREATE INDEX IF NOT EXISTS snapshot_trades_from_idx
        ON snapshot_trades (world_id, from_agent, tick)",
    r"CREATE INDEX IF NOT EXISTS snapshot_trades_to_idx
        ON snapshot_trades (world_id, to_agent, tick)",
    r"CREATE TABLE IF NOT EXISTS seasons (
        world_id    TEXT NOT NULL,
        season      BIGINT NOT NULL,
        end_tick    BIGINT NOT NULL,
        seed        BIGINT NOT NULL,
        path        TEXT NOT NULL,
        recorded_at TEXT NOT NULL,
        PRIMARY KEY (world_id, season)
    )",
    r"CREATE INDEX IF NOT EXISTS seasons_end_tick_idx ON seasons (world_id, end_tick)",
    r"CREATE TABLE IF NOT EXISTS catalogs (
        world_id   TEXT NOT NULL,
        name       TEXT NOT NULL,
        digest     TEXT NOT NULL,
        json       TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        PRIMARY KEY (world_id, name)
    )",
];

type Attempt = Shared<BoxFuture<'static, Result<(), Arc<DbError>>>>;

enum GateState {
    Uninitialized,
    InFlight { generation: u64, attempt: Attempt },
    Ready,
}

struct GateInner {
    state: GateState,
    generation: u64,
}

/// One-shot readiness flag with coalescing of concurrent first callers.
///
/// The first caller starts the migration; callers arriving while it runs
/// await the same attempt and observe the same outcome. A failed attempt
/// resets the gate so the next caller starts over.
pub struct SchemaGate {
    inner: Mutex<GateInner>,
}

impl SchemaGate {
    /// A gate that has not run yet.
    pub const fn new() -> Self {
        Self {
            inner: Mutex::new(GateInner {
                state: GateState::Uninitialized,
                generation: 0,
            }),
        }
    }

    /// Whether a migration attempt has succeeded.
    pub fn is_ready(&self) -> bool {
        matches!(self.lock().state, GateState::Ready)
    }

    /// Ensure the schema exists, running `migrate` only if no attempt has
    /// succeeded and none is in flight.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Schema`] wrapping the attempt's failure. Every
    /// caller that joined the failed attempt receives the same error.
    pub async fn ensure<F, Fut>(&self, migrate: F) -> Result<(), DbError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<(), DbError>> + Send + 'static,
    {
        let (generation, attempt) = {
            let mut inner = self.lock();
            match &inner.state {
                GateState::Ready => return Ok(()),
                GateState::InFlight {
                    generation,
                    attempt,
                } => (*generation, attempt.clone()),
                GateState::Uninitialized => {
                    inner.generation = inner.generation.wrapping_add(1);
                    let generation = inner.generation;
                    let attempt = migrate().map(|r| r.map_err(Arc::new)).boxed().shared();
                    inner.state = GateState::InFlight {
                        generation,
                        attempt: attempt.clone(),
                    };
                    (generation, attempt)
                }
            }
        };

        let outcome = attempt.await;

        let mut inner = self.lock();
        let current = matches!(
            &inner.state,
            GateState::InFlight { generation: g, .. } if *g == generation
        );
        if current {
            inner.state = if outcome.is_ok() {
                GateState::Ready
            } else {
                tracing::warn!(generation, "Schema initialization failed, will retry");
                GateState::Uninitialized
            };
        }
        drop(inner);

        outcome.map_err(DbError::Schema)
    }

    fn lock(&self) -> MutexGuard<'_, GateInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for SchemaGate {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Debug for SchemaGate {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SchemaGate")
            .field("ready", &self.is_ready())
            .finish()
    }
}
