//! Error types for the ingest publisher.

/// Errors that can occur while publishing events.
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    /// Configuration is invalid or missing.
    #[error("config error: {0}")]
    Config(String),

    /// The HTTP client could not be built or the request failed in transit.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The endpoint answered with a non-2xx status.
    #[error("ingest rejected with status {status}: {body}")]
    Rejected {
        /// Response status code.
        status: u16,
        /// Leading part of the response body.
        body: String,
    },

    /// A batch could not be serialized.
    #[error("serde error: {0}")]
    Serde(#[from] serde_json::Error),
}
