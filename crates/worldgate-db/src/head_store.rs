//! Persistence for the `world_heads` table.
//!
//! One row per world, rewritten on every dispatched request. The
//! `request_count` column only ever grows.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use worldgate_types::{HeadDocument, WorldId};

use crate::error::DbError;

/// Operations on the `world_heads` table.
pub struct HeadStore<'a> {
    pool: &'a PgPool,
}

impl<'a> HeadStore<'a> {
    /// Create a new head store bound to a connection pool.
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Record a dispatched request against a world's head.
    ///
    /// Inserts the row with a count of 1, or overwrites the path, status and
    /// timestamps of the existing row and increments its count. Returns the
    /// row as stored.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Postgres`] if the upsert fails.
    pub async fn upsert(
        &self,
        world_id: &WorldId,
        path: &str,
        status: u16,
        at: DateTime<Utc>,
    ) -> Result<HeadRow, DbError> {
        let row = sqlx::query_as::<_, HeadRow>(
            r"INSERT INTO world_heads
              (world_id, last_path, last_status, request_count, last_request_at, updated_at)
              VALUES ($1, $2, $3, 1, $4, NOW())
              ON CONFLICT (world_id) DO UPDATE SET
                last_path = EXCLUDED.last_path,
                last_status = EXCLUDED.last_status,
                request_count = world_heads.request_count + 1,
                last_request_at = EXCLUDED.last_request_at,
                updated_at = EXCLUDED.updated_at
              RETURNING world_id, last_path, last_status, request_count,
                        last_request_at, updated_at",
        )
        .bind(world_id.as_str())
        .bind(path)
        .bind(i32::from(status))
        .bind(at)
        .fetch_one(self.pool)
        .await?;

        tracing::debug!(%world_id, count = row.request_count, "Upserted world head");
        Ok(row)
    }

    /// Query the head row for a world.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Postgres`] if the query fails.
    pub async fn get(&self, world_id: &WorldId) -> Result<Option<HeadRow>, DbError> {
        let row = sqlx::query_as::<_, HeadRow>(
            r"SELECT world_id, last_path, last_status, request_count,
                     last_request_at, updated_at
              FROM world_heads
              WHERE world_id = $1",
        )
        .bind(world_id.as_str())
        .fetch_optional(self.pool)
        .await?;

        Ok(row)
    }
}

/// A row from the `world_heads` table.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, sqlx::FromRow)]
pub struct HeadRow {
    /// World the head belongs to.
    pub world_id: String,
    /// Path and query of the most recent dispatched request.
    pub last_path: String,
    /// Status the compute unit answered with.
    pub last_status: i32,
    /// Cumulative dispatched requests.
    pub request_count: i64,
    /// When the most recent request was dispatched.
    pub last_request_at: DateTime<Utc>,
    /// When the row was last written.
    pub updated_at: DateTime<Utc>,
}

impl HeadRow {
    /// The archive mirror of this row.
    pub fn to_document(&self) -> HeadDocument {
        HeadDocument {
            world_id: WorldId::default_from(Some(&self.world_id)),
            last_path: self.last_path.clone(),
            last_status: u16::try_from(self.last_status).unwrap_or_default(),
            request_count: self.request_count,
            last_request_at: self.last_request_at,
            updated_at: self.updated_at,
        }
    }
}
