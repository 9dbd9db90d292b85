//! Assembly of the gateway state from configuration.
//!
//! [`build_state`] turns a [`GatewayConfig`] into a ready [`AppState`]:
//! it opens the configured index and archive, builds the compute target,
//! and copies the routing and ingestion settings across.

use std::sync::Arc;

use worldgate_db::{
    ArchiveBackend, DbError, DragonflyArchive, IndexBackend, MemoryArchive, MemoryIndex,
    Persistence, PostgresConfig, PostgresPool,
};

use crate::config::{ArchiveKind, ComputeMode, GatewayConfig, IndexKind};
use crate::dispatch::{ComputeTarget, HttpCompute, StaticCompute};
use crate::error::GatewayError;
use crate::server::{ServerError, start_server};
use crate::state::AppState;

/// Errors that can occur while starting the gateway.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    /// A store could not be opened.
    #[error("store error: {0}")]
    Store(#[from] DbError),

    /// The compute target could not be built.
    #[error("compute target error: {0}")]
    Compute(#[from] GatewayError),

    /// The server failed to bind or start.
    #[error("server start error: {0}")]
    Server(#[from] ServerError),
}

/// Open the configured stores.
///
/// The `PostgreSQL` pool connects lazily; the `Dragonfly` client connects
/// eagerly.
///
/// # Errors
///
/// Returns [`StartupError::Store`] if a URL is invalid or `Dragonfly` is
/// unreachable.
pub async fn open_persistence(config: &GatewayConfig) -> Result<Persistence, StartupError> {
    let index = match config.index.backend {
        IndexKind::Postgres => {
            let pg = PostgresConfig::new(&config.index.postgres_url)
                .with_max_connections(config.index.max_connections)
                .with_connect_timeout(config.index.connect_timeout());
            IndexBackend::Postgres(PostgresPool::connect(&pg)?)
        }
        IndexKind::Memory => IndexBackend::Memory(MemoryIndex::new()),
    };

    let archive = match config.archive.backend {
        ArchiveKind::Dragonfly => {
            ArchiveBackend::Dragonfly(DragonflyArchive::connect(&config.archive.dragonfly_url).await?)
        }
        ArchiveKind::Memory => ArchiveBackend::Memory(MemoryArchive::new()),
    };

    tracing::info!(
        index = index.name(),
        archive = archive.name(),
        "Stores opened"
    );
    Ok(Persistence::new(index, archive))
}

/// Build the compute target named by the routing section.
///
/// # Errors
///
/// Returns [`StartupError::Compute`] if the HTTP client cannot be built.
pub fn compute_target(config: &GatewayConfig) -> Result<ComputeTarget, StartupError> {
    Ok(match config.routing.compute {
        ComputeMode::Http => ComputeTarget::Http(HttpCompute::new(
            config.routing.compute_url_template.clone(),
            config.routing.request_timeout(),
        )?),
        ComputeMode::Static => ComputeTarget::Static(StaticCompute::default()),
    })
}

/// Build the complete gateway state.
///
/// # Errors
///
/// Returns [`StartupError`] if a store or the compute target cannot be set
/// up.
pub async fn build_state(config: &GatewayConfig) -> Result<AppState, StartupError> {
    let persistence = open_persistence(config).await?;
    let compute = compute_target(config)?;

    if config.index.ingest_token.is_empty() {
        tracing::warn!("No ingest token configured; /indexdb/ingest will reject every request");
    }

    Ok(AppState::new(persistence, compute)
        .with_default_world(config.routing.default_world())
        .with_ingest_token(config.index.ingest_token.clone())
        .with_max_body_bytes(config.server.max_body_bytes))
}

/// Build the state, serve until `Ctrl-C`, then release the stores.
///
/// Schema creation is attempted once up front. A failure is logged and
/// retried on first use, so a late database does not stop the gateway.
///
/// # Errors
///
/// Returns [`StartupError`] if setup fails or the server cannot bind.
pub async fn run(config: &GatewayConfig) -> Result<(), StartupError> {
    let state = Arc::new(build_state(config).await?);

    if let Err(e) = state.persistence.ensure_schema().await {
        tracing::warn!(error = %e, "Schema not ready at startup, will retry on first use");
    }

    let result = start_server(&config.server, Arc::clone(&state)).await;

    if let IndexBackend::Postgres(pool) = state.persistence.index() {
        pool.close().await;
    }
    result.map_err(StartupError::from)
}
