//! Error types for batch decoding.
//!
//! Only envelope-level problems are errors. Individual events that fail
//! validation are skipped and counted, never reported here.

/// Structural problems with an ingestion batch.
#[derive(Debug, thiserror::Error)]
pub enum EventError {
    /// The body is not valid JSON.
    #[error("invalid JSON body: {0}")]
    MalformedJson(#[from] serde_json::Error),

    /// The body has no `events` field, or the body is not an object.
    #[error("missing events array")]
    MissingEvents,

    /// `events` is present but not a list.
    #[error("events must be an array")]
    NotAList,

    /// `events` is an empty list.
    #[error("events array is empty")]
    EmptyBatch,

    /// `events` holds more entries than a single batch may carry.
    #[error("too many events: {count} exceeds the limit of {max}")]
    TooManyEvents {
        /// Number of entries submitted.
        count: usize,
        /// The batch cap.
        max: usize,
    },
}

impl EventError {
    /// Whether the batch was rejected for size rather than shape.
    pub const fn is_too_large(&self) -> bool {
        matches!(self, Self::TooManyEvents { .. })
    }
}
