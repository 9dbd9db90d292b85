//! Persistence for the `ticks` and `audits` tables.
//!
//! Both tables are last-write-wins: re-ingesting a key overwrites every
//! column of the existing row.

use serde_json::Value;
use sqlx::PgPool;
use worldgate_events::{AuditPayload, TickPayload, encode_json};
use worldgate_types::WorldId;

use crate::error::DbError;

/// Operations on the `ticks` and `audits` tables.
pub struct TickStore<'a> {
    pool: &'a PgPool,
}

impl<'a> TickStore<'a> {
    /// Create a new tick store bound to a connection pool.
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    // =========================================================================
    // Ticks
    // =========================================================================

    /// Insert or overwrite a tick summary.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Postgres`] if the upsert fails.
    pub async fn upsert_tick(&self, row: &TickRow) -> Result<(), DbError> {
        sqlx::query(
            r"INSERT INTO ticks
              (world_id, tick, digest, joins_json, leaves_json, actions_json,
               joins_count, leaves_count, actions_count, raw_json)
              VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
              ON CONFLICT (world_id, tick) DO UPDATE SET
                digest = EXCLUDED.digest,
                joins_json = EXCLUDED.joins_json,
                leaves_json = EXCLUDED.leaves_json,
                actions_json = EXCLUDED.actions_json,
                joins_count = EXCLUDED.joins_count,
                leaves_count = EXCLUDED.leaves_count,
                actions_count = EXCLUDED.actions_count,
                raw_json = EXCLUDED.raw_json",
        )
        .bind(&row.world_id)
        .bind(row.tick)
        .bind(&row.digest)
        .bind(&row.joins_json)
        .bind(&row.leaves_json)
        .bind(&row.actions_json)
        .bind(row.joins_count)
        .bind(row.leaves_count)
        .bind(row.actions_count)
        .bind(&row.raw_json)
        .execute(self.pool)
        .await?;

        Ok(())
    }

    /// Query one tick summary.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Postgres`] if the query fails.
    pub async fn get_tick(&self, world_id: &WorldId, tick: i64) -> Result<Option<TickRow>, DbError> {
        let row = sqlx::query_as::<_, TickRow>(
            r"SELECT world_id, tick, digest, joins_json, leaves_json, actions_json,
                     joins_count, leaves_count, actions_count, raw_json
              FROM ticks
              WHERE world_id = $1 AND tick = $2",
        )
        .bind(world_id.as_str())
        .bind(tick)
        .fetch_optional(self.pool)
        .await?;

        Ok(row)
    }

    // =========================================================================
    // Audits
    // =========================================================================

    /// Insert or overwrite an audit entry.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Postgres`] if the upsert fails.
    pub async fn upsert_audit(&self, row: &AuditRow) -> Result<(), DbError> {
        sqlx::query(
            r"INSERT INTO audits
              (world_id, tick, seq, actor, action, x, y, z, from_block, to_block, reason, raw_json)
              VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
              ON CONFLICT (world_id, tick, seq) DO UPDATE SET
                actor = EXCLUDED.actor,
                action = EXCLUDED.action,
                x = EXCLUDED.x,
                y = EXCLUDED.y,
                z = EXCLUDED.z,
                from_block = EXCLUDED.from_block,
                to_block = EXCLUDED.to_block,
                reason = EXCLUDED.reason,
                raw_json = EXCLUDED.raw_json",
        )
        .bind(&row.world_id)
        .bind(row.tick)
        .bind(row.seq)
        .bind(&row.actor)
        .bind(&row.action)
        .bind(row.x)
        .bind(row.y)
        .bind(row.z)
        .bind(row.from_block)
        .bind(row.to_block)
        .bind(&row.reason)
        .bind(&row.raw_json)
        .execute(self.pool)
        .await?;

        Ok(())
    }

    /// Query the audit entries of one tick, in sequence order.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Postgres`] if the query fails.
    pub async fn get_audits(&self, world_id: &WorldId, tick: i64) -> Result<Vec<AuditRow>, DbError> {
        let rows = sqlx::query_as::<_, AuditRow>(
            r"SELECT world_id, tick, seq, actor, action, x, y, z,
                     from_block, to_block, reason, raw_json
              FROM audits
              WHERE world_id = $1 AND tick = $2
              ORDER BY seq ASC",
        )
        .bind(world_id.as_str())
        .bind(tick)
        .fetch_all(self.pool)
        .await?;

        Ok(rows)
    }
}

/// A row from the `ticks` table.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct TickRow {
    /// Owning world.
    pub world_id: String,
    /// Tick number.
    pub tick: i64,
    /// Opaque state digest.
    pub digest: String,
    /// Serialized join list.
    pub joins_json: String,
    /// Serialized leave list.
    pub leaves_json: String,
    /// Serialized action list.
    pub actions_json: String,
    /// Number of joins.
    pub joins_count: i64,
    /// Number of leaves.
    pub leaves_count: i64,
    /// Number of actions.
    pub actions_count: i64,
    /// The payload exactly as ingested.
    pub raw_json: String,
}

impl TickRow {
    /// Build the row for a decoded tick payload.
    pub fn from_payload(world_id: &WorldId, payload: &TickPayload, raw: &Value) -> Self {
        Self {
            world_id: world_id.as_str().to_owned(),
            tick: payload.tick,
            digest: payload.digest.clone(),
            joins_json: encode_json(&payload.joins),
            leaves_json: encode_json(&payload.leaves),
            actions_json: encode_json(&payload.actions),
            joins_count: count(payload.joins.len()),
            leaves_count: count(payload.leaves.len()),
            actions_count: count(payload.actions.len()),
            raw_json: encode_json(raw),
        }
    }
}

/// A row from the `audits` table.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct AuditRow {
    /// Owning world.
    pub world_id: String,
    /// Tick number.
    pub tick: i64,
    /// Sequence within the tick.
    pub seq: i64,
    /// Responsible actor.
    pub actor: String,
    /// Action name.
    pub action: String,
    /// Position x.
    pub x: i64,
    /// Position y.
    pub y: i64,
    /// Position z.
    pub z: i64,
    /// Block kind before.
    pub from_block: i64,
    /// Block kind after.
    pub to_block: i64,
    /// Free-text reason.
    pub reason: String,
    /// The payload exactly as ingested.
    pub raw_json: String,
}

impl AuditRow {
    /// Build the row for a decoded audit payload.
    pub fn from_payload(world_id: &WorldId, payload: &AuditPayload, raw: &Value) -> Self {
        let [x, y, z] = payload.pos;
        Self {
            world_id: world_id.as_str().to_owned(),
            tick: payload.tick,
            seq: payload.seq,
            actor: payload.actor.clone(),
            action: payload.action.clone(),
            x,
            y,
            z,
            from_block: payload.from,
            to_block: payload.to,
            reason: payload.reason.clone(),
            raw_json: encode_json(raw),
        }
    }
}

/// Convert a collection length to a stored count.
pub(crate) fn count(len: usize) -> i64 {
    i64::try_from(len).unwrap_or(i64::MAX)
}
