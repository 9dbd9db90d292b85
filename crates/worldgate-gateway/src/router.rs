//! Axum router construction for the gateway.
//!
//! Assembles the gateway's own endpoints and the dispatcher fallback into a
//! single [`Router`] with CORS and request tracing enabled.

use std::sync::Arc;

use axum::Router;
use axum::routing::{any, get};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::dispatch;
use crate::handlers;
use crate::state::AppState;

/// Build the complete Axum router for the gateway.
///
/// The router includes:
/// - `GET /healthz` -- store reachability
/// - `GET /head` -- a world's head, both copies
/// - `GET /indexdb/healthz` -- per-world index counts
/// - `ANY /indexdb/ingest` -- event ingestion (non-POST gets 405)
/// - everything else -- routed to the world's compute unit
pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/healthz", get(handlers::healthz))
        .route("/head", get(handlers::head))
        .route("/indexdb/healthz", get(handlers::index_healthz))
        .route("/indexdb/ingest", any(handlers::ingest))
        .fallback(dispatch::dispatch)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
