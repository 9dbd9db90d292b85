//! `Dragonfly` (Redis-compatible) object archive.
//!
//! Each archive object is stored as a hash so the content type travels with
//! the body.
//!
//! # Key Patterns
//!
//! | Pattern | Type | Description |
//! |---------|------|-------------|
//! | `worlds/{id}/head.json` | Hash | Head mirror of one world |
//! | `_healthcheck/probe.json` | Hash | Probed by the health check, may be absent |

use fred::prelude::*;

use crate::error::DbError;

/// Hash field holding the object body.
const FIELD_BODY: &str = "body";

/// Hash field holding the object content type.
const FIELD_CONTENT_TYPE: &str = "content_type";

/// Connection handle to a `Dragonfly` (Redis-compatible) instance.
///
/// Wraps a [`fred::prelude::Client`].
#[derive(Clone)]
pub struct DragonflyArchive {
    client: Client,
}

impl DragonflyArchive {
    /// Connect to `Dragonfly` at the given URL.
    ///
    /// The URL should follow the Redis URL scheme:
    /// `redis://host:port` or `redis://host:port/db`
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Config`] if the URL cannot be parsed.
    /// Returns [`DbError::Dragonfly`] if the connection fails.
    pub async fn connect(url: &str) -> Result<Self, DbError> {
        let config = Config::from_url(url)
            .map_err(|e| DbError::Config(format!("Invalid Dragonfly URL: {e}")))?;

        let client = Builder::from_config(config).build()?;
        client.init().await?;

        tracing::info!("Connected to Dragonfly");
        Ok(Self { client })
    }

    /// Store `body` at `key`, overwriting any previous object.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Dragonfly`] if the write fails.
    pub async fn put(&self, key: &str, body: &str, content_type: &str) -> Result<(), DbError> {
        let _: i64 = self
            .client
            .hset(key, vec![(FIELD_BODY, body), (FIELD_CONTENT_TYPE, content_type)])
            .await?;
        Ok(())
    }

    /// Read the body stored at `key`.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Dragonfly`] if the read fails.
    pub async fn get(&self, key: &str) -> Result<Option<String>, DbError> {
        let body: Option<String> = self.client.hget(key, FIELD_BODY).await?;
        Ok(body)
    }

    /// Whether an object exists at `key`.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Dragonfly`] if the probe fails.
    pub async fn head(&self, key: &str) -> Result<bool, DbError> {
        let found: i64 = self.client.exists(key).await?;
        Ok(found > 0)
    }

    /// Return a reference to the underlying [`Client`].
    pub const fn client(&self) -> &Client {
        &self.client
    }
}

impl core::fmt::Debug for DragonflyArchive {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("DragonflyArchive").finish_non_exhaustive()
    }
}
