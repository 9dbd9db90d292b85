//! Endpoint handlers served by the gateway itself.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET` | `/healthz` | Probe the index and the archive |
//! | `GET` | `/head` | Both copies of a world's head |
//! | `GET` | `/indexdb/healthz` | Per-world index row counts |
//! | `POST` | `/indexdb/ingest` | Apply a batch of simulation events |
//!
//! `/head` and `/indexdb/healthz` resolve their world the same way the
//! dispatcher does.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Request, State};
use axum::http::{HeaderMap, Method};
use chrono::Utc;
use serde_json::{Value, json};
use worldgate_db::{apply_batch, index_health, persistence_health, read_head};
use worldgate_events::decode_batch_bytes;

use crate::dispatch::resolve_world_id;
use crate::error::GatewayError;
use crate::state::AppState;

/// Request header carrying the ingest shared secret.
pub const INGEST_TOKEN_HEADER: &str = "x-index-token";

// ---------------------------------------------------------------------------
// GET /healthz
// ---------------------------------------------------------------------------

/// Report whether both stores are reachable.
pub async fn healthz(State(state): State<Arc<AppState>>) -> Result<Json<Value>, GatewayError> {
    let storage = persistence_health(&state.persistence)
        .await
        .map_err(GatewayError::Unavailable)?;
    Ok(Json(json!({ "ok": true, "storage": storage })))
}

// ---------------------------------------------------------------------------
// GET /head
// ---------------------------------------------------------------------------

/// Return the relational head row and its archive mirror.
pub async fn head(
    State(state): State<Arc<AppState>>,
    request: Request,
) -> Result<Json<Value>, GatewayError> {
    let world_id = resolve_world_id(request.uri(), request.headers(), &state.default_world);
    let view = read_head(&state.persistence, &world_id).await?;
    Ok(Json(json!({
        "ok": true,
        "world_id": world_id,
        "row": view.row,
        "archive_doc": view.archive_doc,
    })))
}

// ---------------------------------------------------------------------------
// GET /indexdb/healthz
// ---------------------------------------------------------------------------

/// Return tick, audit and snapshot counts for one world.
pub async fn index_healthz(
    State(state): State<Arc<AppState>>,
    request: Request,
) -> Result<Json<Value>, GatewayError> {
    let world_id = resolve_world_id(request.uri(), request.headers(), &state.default_world);
    let counts = index_health(&state.persistence, &world_id)
        .await
        .map_err(GatewayError::Unavailable)?;
    Ok(Json(json!({ "ok": true, "world_id": world_id, "index": counts })))
}

// ---------------------------------------------------------------------------
// POST /indexdb/ingest
// ---------------------------------------------------------------------------

/// Apply a batch of events.
///
/// Checks run in order and the first failure wins: method (405), token
/// (403), body size (413), JSON and envelope shape (400), event count
/// (413). Nothing touches a store before all of them pass.
pub async fn ingest(
    State(state): State<Arc<AppState>>,
    request: Request,
) -> Result<Json<Value>, GatewayError> {
    if request.method() != Method::POST {
        return Err(GatewayError::MethodNotAllowed);
    }
    authorize(&state, request.headers())?;

    let body = axum::body::to_bytes(request.into_body(), state.max_body_bytes)
        .await
        .map_err(|e| {
            GatewayError::PayloadTooLarge(format!(
                "request body exceeds {} bytes: {e}",
                state.max_body_bytes
            ))
        })?;

    let batch = decode_batch_bytes(&body, &state.default_world, Utc::now())?;
    let outcome = apply_batch(&state.persistence, &batch).await?;

    Ok(Json(json!({
        "ok": true,
        "applied": outcome.applied,
        "skipped": outcome.skipped,
        "total": outcome.total,
    })))
}

fn authorize(state: &AppState, headers: &HeaderMap) -> Result<(), GatewayError> {
    let presented = headers
        .get(INGEST_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok());
    if state.ingest_token_matches(presented) {
        Ok(())
    } else {
        tracing::warn!(
            token_present = presented.is_some(),
            "Rejected ingest request with bad token"
        );
        Err(GatewayError::Forbidden)
    }
}
