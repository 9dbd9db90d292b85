//! World dispatcher.
//!
//! Every request the gateway does not serve itself is routed to the compute
//! unit of one world. The world is resolved from the request, the request is
//! forwarded, and the unit's response is returned unchanged. Once the
//! response exists, the world's head is updated in the background.
//!
//! # World resolution
//!
//! The first non-empty candidate of query `world_id`, query `world`, and
//! header `x-world` is coerced against the configured default. A malformed
//! candidate resolves to the default; later candidates are not consulted.

use std::sync::Arc;
use std::time::Duration;

use axum::Json;
use axum::body::Body;
use axum::extract::{Query, Request, State};
use axum::http::{HeaderMap, HeaderName, Method, StatusCode, Uri, header};
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use serde::Deserialize;
use worldgate_db::spawn_persist_head;
use worldgate_types::WorldId;

use crate::config::WORLD_ID_PLACEHOLDER;
use crate::error::GatewayError;
use crate::state::AppState;

/// Request header naming the target world.
pub const WORLD_HEADER: &str = "x-world";

#[derive(Debug, Default, Deserialize)]
struct WorldQuery {
    world_id: Option<String>,
    world: Option<String>,
}

/// Resolve the target world of a request.
pub fn resolve_world_id(uri: &Uri, headers: &HeaderMap, default: &WorldId) -> WorldId {
    let query = Query::<WorldQuery>::try_from_uri(uri)
        .map(|Query(q)| q)
        .unwrap_or_default();
    let header = headers.get(WORLD_HEADER).and_then(|v| v.to_str().ok());

    let candidate = [query.world_id.as_deref(), query.world.as_deref(), header]
        .into_iter()
        .flatten()
        .find(|c| !c.is_empty());
    WorldId::coerce(candidate, default)
}

/// The request target as recorded in a world's head (`/path?query`).
pub fn path_and_query(uri: &Uri) -> String {
    uri.path_and_query()
        .map_or_else(|| uri.path(), |pq| pq.as_str())
        .to_owned()
}

/// Headers that describe one connection and are never forwarded.
fn is_hop_by_hop(name: &HeaderName) -> bool {
    matches!(
        name.as_str(),
        "connection"
            | "keep-alive"
            | "proxy-authenticate"
            | "proxy-authorization"
            | "te"
            | "trailer"
            | "transfer-encoding"
            | "upgrade"
    )
}

fn forwarded_request_headers(headers: &HeaderMap) -> HeaderMap {
    headers
        .iter()
        .filter(|(name, _)| {
            !is_hop_by_hop(name) && *name != header::HOST && *name != header::CONTENT_LENGTH
        })
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect()
}

fn returned_response_headers(headers: &HeaderMap) -> HeaderMap {
    headers
        .iter()
        .filter(|(name, _)| !is_hop_by_hop(name) && *name != header::CONTENT_LENGTH)
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect()
}

/// Where dispatched requests go.
#[derive(Debug, Clone)]
pub enum ComputeTarget {
    /// Forward over HTTP to a per-world URL.
    Http(HttpCompute),
    /// Answer in-process.
    Static(StaticCompute),
}

impl ComputeTarget {
    /// Route `request` to the compute unit of `world_id`.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Upstream`] if the unit cannot be reached and
    /// [`GatewayError::PayloadTooLarge`] if the body exceeds `body_limit`.
    pub async fn forward(
        &self,
        world_id: &WorldId,
        request: Request,
        body_limit: usize,
    ) -> Result<Response, GatewayError> {
        match self {
            Self::Http(http) => Box::pin(http.forward(world_id, request, body_limit)).await,
            Self::Static(unit) => Ok(unit.respond(world_id, request.method(), request.uri())),
        }
    }
}

/// Forwards requests to `template` with `{world_id}` substituted.
#[derive(Debug, Clone)]
pub struct HttpCompute {
    client: reqwest::Client,
    template: String,
}

impl HttpCompute {
    /// Build a forwarder with a per-request timeout.
    ///
    /// Redirects are returned to the caller, never followed.
    pub fn new(template: impl Into<String>, timeout: Duration) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| GatewayError::Internal(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            template: template.into(),
        })
    }

    /// Full upstream URL for one request.
    pub fn target_url(&self, world_id: &WorldId, path_and_query: &str) -> String {
        let base = self.template.replace(WORLD_ID_PLACEHOLDER, world_id.as_str());
        format!("{}{path_and_query}", base.trim_end_matches('/'))
    }

    async fn forward(
        &self,
        world_id: &WorldId,
        request: Request,
        body_limit: usize,
    ) -> Result<Response, GatewayError> {
        let (parts, body) = request.into_parts();
        let url = self.target_url(world_id, &path_and_query(&parts.uri));
        let body = axum::body::to_bytes(body, body_limit)
            .await
            .map_err(|e| GatewayError::PayloadTooLarge(format!("request body rejected: {e}")))?;

        let upstream = self
            .client
            .request(parts.method, &url)
            .headers(forwarded_request_headers(&parts.headers))
            .body(body)
            .send()
            .await
            .map_err(|e| GatewayError::Upstream(format!("{world_id} unreachable: {e}")))?;

        let status = upstream.status();
        let headers = returned_response_headers(upstream.headers());
        let bytes = upstream
            .bytes()
            .await
            .map_err(|e| GatewayError::Upstream(format!("{world_id} response aborted: {e}")))?;

        let mut response = Response::new(Body::from(bytes));
        *response.status_mut() = status;
        *response.headers_mut() = headers;
        Ok(response)
    }
}

/// In-process compute unit that describes the request it received.
///
/// Responds with `{world_id, method, path}` and a fixed status.
#[derive(Debug, Clone, Copy)]
pub struct StaticCompute {
    status: StatusCode,
}

impl StaticCompute {
    /// A unit that always answers with `status`.
    pub const fn new(status: StatusCode) -> Self {
        Self { status }
    }

    fn respond(self, world_id: &WorldId, method: &Method, uri: &Uri) -> Response {
        let body = serde_json::json!({
            "world_id": world_id,
            "method": method.as_str(),
            "path": path_and_query(uri),
        });
        (self.status, Json(body)).into_response()
    }
}

impl Default for StaticCompute {
    fn default() -> Self {
        Self::new(StatusCode::OK)
    }
}

/// Fallback handler: route to the world's compute unit and record the head.
pub async fn dispatch(State(state): State<Arc<AppState>>, request: Request) -> Response {
    let world_id = resolve_world_id(request.uri(), request.headers(), &state.default_world);
    let path = path_and_query(request.uri());

    let response = match state
        .compute
        .forward(&world_id, request, state.max_body_bytes)
        .await
    {
        Ok(response) => response,
        Err(e) => e.into_response(),
    };

    tracing::debug!(%world_id, path, status = response.status().as_u16(), "Dispatched request");
    spawn_persist_head(
        state.persistence.clone(),
        world_id,
        path,
        response.status().as_u16(),
        Utc::now(),
    );
    response
}
