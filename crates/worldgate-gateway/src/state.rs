//! Shared application state for the gateway.
//!
//! [`AppState`] is built once at startup and shared behind an `Arc` by
//! every handler. It carries no mutable data of its own; the only
//! process-wide mutable state is the schema gate inside [`Persistence`].

use worldgate_db::Persistence;
use worldgate_types::WorldId;

use crate::dispatch::{ComputeTarget, StaticCompute};

/// Largest request body accepted when nothing else is configured (32 MiB).
pub const DEFAULT_MAX_BODY_BYTES: usize = 33_554_432;

/// Shared state handed to every handler.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Relational index, object archive and schema gate.
    pub persistence: Persistence,
    /// Where dispatched requests go.
    pub compute: ComputeTarget,
    /// World used when a request names none (or an invalid one).
    pub default_world: WorldId,
    /// Shared secret for `/indexdb/ingest`. Empty disables ingestion.
    pub ingest_token: String,
    /// Largest request body read by the gateway.
    pub max_body_bytes: usize,
}

impl AppState {
    /// State with the given stores and compute target, the built-in
    /// default world, ingestion disabled, and the default body limit.
    pub fn new(persistence: Persistence, compute: ComputeTarget) -> Self {
        Self {
            persistence,
            compute,
            default_world: WorldId::default(),
            ingest_token: String::new(),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }

    /// In-memory stores and an in-process compute unit answering 200.
    pub fn in_memory() -> Self {
        Self::new(
            Persistence::in_memory(),
            ComputeTarget::Static(StaticCompute::default()),
        )
    }

    /// Replace the default world.
    #[must_use]
    pub fn with_default_world(mut self, world_id: WorldId) -> Self {
        self.default_world = world_id;
        self
    }

    /// Enable ingestion with a shared secret.
    #[must_use]
    pub fn with_ingest_token(mut self, token: impl Into<String>) -> Self {
        self.ingest_token = token.into();
        self
    }

    /// Replace the body size limit.
    #[must_use]
    pub const fn with_max_body_bytes(mut self, limit: usize) -> Self {
        self.max_body_bytes = limit;
        self
    }

    /// Whether `presented` matches the configured ingest token.
    ///
    /// Always false while ingestion is disabled. The comparison time does
    /// not depend on where the first mismatch is.
    pub fn ingest_token_matches(&self, presented: Option<&str>) -> bool {
        let Some(presented) = presented else {
            return false;
        };
        let expected = self.ingest_token.as_bytes();
        let presented = presented.as_bytes();
        if expected.is_empty() || expected.len() != presented.len() {
            return false;
        }
        expected
            .iter()
            .zip(presented)
            .fold(0_u8, |diff, (a, b)| diff | (a ^ b))
            == 0
    }
}
