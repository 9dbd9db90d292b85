//! HTTP gateway for Worldgate.
//!
//! This crate provides the Axum server that fronts every simulation world:
//!
//! - **Dispatcher** (every unclaimed path): resolves a world id from the
//!   request and forwards the request to that world's compute unit,
//!   returning the unit's response verbatim. Each dispatched request
//!   updates the world's head in the background.
//! - **Ingestion** (`POST /indexdb/ingest`): token-protected endpoint that
//!   decodes event batches and materializes them into the index.
//! - **Introspection** (`/healthz`, `/head`, `/indexdb/healthz`).
//!
//! # Architecture
//!
//! Handlers share one [`AppState`] holding the store bundle
//! ([`worldgate_db::Persistence`]) and the [`ComputeTarget`]. The gateway
//! keeps no per-world state in process; everything it learns goes to the
//! index and the archive.
//!
//! [`ComputeTarget`]: dispatch::ComputeTarget

pub mod config;
pub mod dispatch;
pub mod error;
pub mod handlers;
pub mod router;
pub mod server;
pub mod startup;
pub mod state;

// Re-export primary types for convenience.
pub use config::{ConfigError, GatewayConfig};
pub use dispatch::{ComputeTarget, HttpCompute, StaticCompute, resolve_world_id};
pub use error::GatewayError;
pub use router::build_router;
pub use server::{ServerError, serve_listener, shutdown_signal, start_server};
pub use startup::{StartupError, build_state, run};
pub use state::AppState;
