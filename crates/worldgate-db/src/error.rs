//! Error types for the data layer.
//!
//! All store errors are propagated via [`DbError`], which wraps the
//! underlying [`sqlx`] and [`fred`] errors. Batch application wraps a
//! [`DbError`] in [`MaterializeError`] so callers can see how far the
//! batch got before it failed.

use std::sync::Arc;

/// Errors that can occur in the data layer.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    /// A `PostgreSQL` operation failed.
    #[error("PostgreSQL error: {0}")]
    Postgres(#[from] sqlx::Error),

    /// A `Dragonfly`/Redis operation failed.
    #[error("Dragonfly error: {0}")]
    Dragonfly(#[from] fred::error::Error),

    /// A serialization or deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Schema initialization failed. The same failure is shared by every
    /// caller that was waiting on the attempt.
    #[error("Schema initialization failed: {0}")]
    Schema(Arc<DbError>),
}

/// A batch stopped at a failing event.
///
/// Events before the failure stay applied; nothing is rolled back.
#[derive(Debug, thiserror::Error)]
#[error("batch failed after {applied} of {total} events: {source}")]
pub struct MaterializeError {
    /// Events applied before the failure.
    pub applied: usize,
    /// Entries submitted in the batch.
    pub total: usize,
    /// The store error that stopped the batch.
    #[source]
    pub source: DbError,
}
