//! Persistence for the `seasons` and `catalogs` tables.

use sqlx::PgPool;
use worldgate_events::{CatalogPayload, SeasonPayload};
use worldgate_types::WorldId;

use crate::error::DbError;

/// Operations on the `seasons` and `catalogs` tables.
pub struct CatalogStore<'a> {
    pool: &'a PgPool,
}

impl<'a> CatalogStore<'a> {
    /// Create a new catalog store bound to a connection pool.
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Insert or update a season record keyed by `(world_id, season)`.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Postgres`] if the upsert fails.
    pub async fn upsert_season(&self, row: &SeasonRow) -> Result<(), DbError> {
        sqlx::query(
            r"INSERT INTO seasons (world_id, season, end_tick, seed, path, recorded_at)
              VALUES ($1, $2, $3, $4, $5, $6)
              ON CONFLICT (world_id, season) DO UPDATE SET
                end_tick = EXCLUDED.end_tick,
                seed = EXCLUDED.seed,
                path = EXCLUDED.path,
                recorded_at = EXCLUDED.recorded_at",
        )
        .bind(&row.world_id)
        .bind(row.season)
        .bind(row.end_tick)
        .bind(row.seed)
        .bind(&row.path)
        .bind(&row.recorded_at)
        .execute(self.pool)
        .await?;

        Ok(())
    }

    /// Insert or update a catalog keyed by `(world_id, name)`.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Postgres`] if the upsert fails.
    pub async fn upsert_catalog(&self, row: &CatalogRow) -> Result<(), DbError> {
        sqlx::query(
            r"INSERT INTO catalogs (world_id, name, digest, json, updated_at)
              VALUES ($1, $2, $3, $4, $5)
              ON CONFLICT (world_id, name) DO UPDATE SET
                digest = EXCLUDED.digest,
                json = EXCLUDED.json,
                updated_at = EXCLUDED.updated_at",
        )
        .bind(&row.world_id)
        .bind(&row.name)
        .bind(&row.digest)
        .bind(&row.json)
        .bind(&row.updated_at)
        .execute(self.pool)
        .await?;

        Ok(())
    }

    /// Query a catalog by name.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Postgres`] if the query fails.
    pub async fn get_catalog(
        &self,
        world_id: &WorldId,
        name: &str,
    ) -> Result<Option<CatalogRow>, DbError> {
        let row = sqlx::query_as::<_, CatalogRow>(
            r"SELECT world_id, name, digest, json, updated_at
              FROM catalogs
              WHERE world_id = $1 AND name = $2",
        )
        .bind(world_id.as_str())
        .bind(name)
        .fetch_optional(self.pool)
        .await?;

        Ok(row)
    }
}

/// A row from the `seasons` table.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct SeasonRow {
    /// Owning world.
    pub world_id: String,
    /// Season number.
    pub season: i64,
    /// Last tick of the season.
    pub end_tick: i64,
    /// World seed.
    pub seed: i64,
    /// Archive path.
    pub path: String,
    /// RFC 3339 timestamp.
    pub recorded_at: String,
}

impl SeasonRow {
    /// Build the row for a decoded season payload.
    pub fn from_payload(world_id: &WorldId, p: &SeasonPayload) -> Self {
        Self {
            world_id: world_id.as_str().to_owned(),
            season: p.season,
            end_tick: p.end_tick,
            seed: p.seed,
            path: p.path.clone(),
            recorded_at: p.recorded_at.clone(),
        }
    }
}

/// A row from the `catalogs` table.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct CatalogRow {
    /// Owning world.
    pub world_id: String,
    /// Catalog name.
    pub name: String,
    /// Content digest.
    pub digest: String,
    /// Serialized body.
    pub json: String,
    /// RFC 3339 timestamp.
    pub updated_at: String,
}

impl CatalogRow {
    /// Build the row for a decoded catalog payload.
    pub fn from_payload(world_id: &WorldId, p: &CatalogPayload) -> Self {
        Self {
            world_id: world_id.as_str().to_owned(),
            name: p.name.clone(),
            digest: p.digest.clone(),
            json: p.json.clone(),
            updated_at: p.updated_at.clone(),
        }
    }
}
