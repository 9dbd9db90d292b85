//! Error types for the HTTP boundary.
//!
//! [`GatewayError`] unifies all failure modes into a single enum that
//! can be converted into an Axum HTTP response via its
//! [`IntoResponse`](axum::response::IntoResponse) implementation.

use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use worldgate_db::{DbError, MaterializeError};
use worldgate_events::EventError;

/// Errors that can occur in the gateway's own endpoints.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// The ingest token is missing, wrong, or ingestion is disabled.
    #[error("forbidden")]
    Forbidden,

    /// The endpoint only accepts `POST`.
    #[error("method not allowed")]
    MethodNotAllowed,

    /// The request body is structurally invalid.
    #[error("{0}")]
    BadRequest(String),

    /// The request body or batch exceeds a limit.
    #[error("{0}")]
    PayloadTooLarge(String),

    /// A health probe could not reach a store.
    #[error("storage unavailable: {0}")]
    Unavailable(DbError),

    /// A store operation failed.
    #[error("storage error: {0}")]
    Store(#[from] DbError),

    /// An ingestion batch stopped part way through.
    #[error("{0}")]
    Materialize(#[from] MaterializeError),

    /// The compute unit could not be reached.
    #[error("upstream error: {0}")]
    Upstream(String),

    /// An internal error occurred.
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<EventError> for GatewayError {
    fn from(err: EventError) -> Self {
        if err.is_too_large() {
            Self::PayloadTooLarge(err.to_string())
        } else {
            Self::BadRequest(err.to_string())
        }
    }
}

impl GatewayError {
    /// HTTP status for this error.
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            Self::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Store(_) | Self::Materialize(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            Self::Upstream(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), error = %self, "Request failed");
        }

        let mut body = serde_json::json!({
            "ok": false,
            "error": self.to_string(),
            "status": status.as_u16(),
        });
        if let (Self::Materialize(e), Some(obj)) = (&self, body.as_object_mut()) {
            obj.insert(String::from("applied"), e.applied.into());
        }

        let mut response = (status, axum::Json(body)).into_response();
        if matches!(self, Self::MethodNotAllowed) {
            response
                .headers_mut()
                .insert(header::ALLOW, HeaderValue::from_static("POST"));
        }
        response
    }
}
