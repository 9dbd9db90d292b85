//! Publisher configuration.

use std::time::Duration;

use worldgate_types::WorldId;

use crate::error::PublishError;

/// Events buffered between producers and the flush worker.
pub const DEFAULT_QUEUE_CAPACITY: usize = 32_768;

/// Events per request when nothing else is configured.
pub const DEFAULT_BATCH_SIZE: usize = 128;

/// Longest an event waits before being flushed.
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_millis(500);

/// Upper bound on one ingest request.
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Settings for one [`Publisher`](crate::Publisher).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublisherConfig {
    /// Full URL of the ingest endpoint, e.g. `http://gateway/indexdb/ingest`.
    pub endpoint: String,
    /// Shared secret sent as `x-index-token`. Empty sends no header.
    pub token: String,
    /// World every published event belongs to.
    pub world_id: WorldId,
    /// Flush as soon as this many events are buffered.
    pub batch_size: usize,
    /// Flush at least this often while events are buffered.
    pub flush_interval: Duration,
    /// Per-request timeout.
    pub http_timeout: Duration,
    /// Capacity of the producer queue. Events beyond it are dropped.
    pub queue_capacity: usize,
}

impl PublisherConfig {
    /// Configuration with default batching for one world.
    pub fn new(endpoint: impl Into<String>, world_id: WorldId) -> Self {
        Self {
            endpoint: endpoint.into(),
            token: String::new(),
            world_id,
            batch_size: DEFAULT_BATCH_SIZE,
            flush_interval: DEFAULT_FLUSH_INTERVAL,
            http_timeout: DEFAULT_HTTP_TIMEOUT,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }

    /// Set the shared secret.
    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = token.into();
        self
    }

    /// Set the batch size. Zero keeps the default.
    #[must_use]
    pub const fn with_batch_size(mut self, batch_size: usize) -> Self {
        if batch_size > 0 {
            self.batch_size = batch_size;
        }
        self
    }

    /// Set the flush interval. Zero keeps the default.
    #[must_use]
    pub const fn with_flush_interval(mut self, interval: Duration) -> Self {
        if !interval.is_zero() {
            self.flush_interval = interval;
        }
        self
    }

    /// Set the per-request timeout. Zero keeps the default.
    #[must_use]
    pub const fn with_http_timeout(mut self, timeout: Duration) -> Self {
        if !timeout.is_zero() {
            self.http_timeout = timeout;
        }
        self
    }

    /// Set the queue capacity. Zero keeps the default.
    #[must_use]
    pub const fn with_queue_capacity(mut self, capacity: usize) -> Self {
        if capacity > 0 {
            self.queue_capacity = capacity;
        }
        self
    }

    /// Build from environment variables.
    ///
    /// Reads `INDEX_INGEST_URL` (required), `INDEX_INGEST_TOKEN`,
    /// `INDEX_INGEST_FLUSH_MS` and `INDEX_INGEST_BATCH_SIZE`. Numbers that
    /// are missing, unparsable, or zero keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`PublishError::Config`] if `INDEX_INGEST_URL` is unset or
    /// blank.
    pub fn from_env(
        world_id: WorldId,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, PublishError> {
        let endpoint = lookup("INDEX_INGEST_URL")
            .map(|v| v.trim().to_owned())
            .filter(|v| !v.is_empty())
            .ok_or_else(|| PublishError::Config(String::from("INDEX_INGEST_URL is empty")))?;
        let number = |key: &str| lookup(key).and_then(|v| v.trim().parse::<u64>().ok());

        let mut config = Self::new(endpoint, world_id)
            .with_token(lookup("INDEX_INGEST_TOKEN").unwrap_or_default().trim());
        if let Some(ms) = number("INDEX_INGEST_FLUSH_MS") {
            config = config.with_flush_interval(Duration::from_millis(ms));
        }
        if let Some(size) = number("INDEX_INGEST_BATCH_SIZE").and_then(|n| usize::try_from(n).ok()) {
            config = config.with_batch_size(size);
        }
        Ok(config)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn lookup<'a>(pairs: &'a [(&'a str, &'a str)]) -> impl Fn(&str) -> Option<String> + 'a {
        move |key| {
            pairs
                .iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| (*v).to_owned())
        }
    }

    #[test]
    fn defaults_match_the_ingest_contract() {
        let config = PublisherConfig::new("http://x/indexdb/ingest", WorldId::default());
        assert_eq!(config.batch_size, 128);
        assert_eq!(config.flush_interval, Duration::from_millis(500));
        assert_eq!(config.queue_capacity, 32_768);
    }

    #[test]
    fn zero_values_keep_defaults() {
        let config = PublisherConfig::new("http://x", WorldId::default())
            .with_batch_size(0)
            .with_flush_interval(Duration::ZERO)
            .with_queue_capacity(0);
        assert_eq!(config.batch_size, DEFAULT_BATCH_SIZE);
        assert_eq!(config.flush_interval, DEFAULT_FLUSH_INTERVAL);
        assert_eq!(config.queue_capacity, DEFAULT_QUEUE_CAPACITY);
    }

    #[test]
    fn env_config_reads_all_keys() {
        let pairs = [
            ("INDEX_INGEST_URL", " http://gw/indexdb/ingest "),
            ("INDEX_INGEST_TOKEN", "tok"),
            ("INDEX_INGEST_FLUSH_MS", "250"),
            ("INDEX_INGEST_BATCH_SIZE", "64"),
        ];
        let config = PublisherConfig::from_env(WorldId::default(), lookup(&pairs)).unwrap();
        assert_eq!(config.endpoint, "http://gw/indexdb/ingest");
        assert_eq!(config.token, "tok");
        assert_eq!(config.flush_interval, Duration::from_millis(250));
        assert_eq!(config.batch_size, 64);
    }

    #[test]
    fn env_config_ignores_bad_numbers() {
        let pairs = [
            ("INDEX_INGEST_URL", "http://gw"),
            ("INDEX_INGEST_FLUSH_MS", "soon"),
            ("INDEX_INGEST_BATCH_SIZE", "0"),
        ];
        let config = PublisherConfig::from_env(WorldId::default(), lookup(&pairs)).unwrap();
        assert_eq!(config.flush_interval, DEFAULT_FLUSH_INTERVAL);
        assert_eq!(config.batch_size, DEFAULT_BATCH_SIZE);
    }

    #[test]
    fn env_config_requires_endpoint() {
        let pairs = [("INDEX_INGEST_URL", "  ")];
        let err = PublisherConfig::from_env(WorldId::default(), lookup(&pairs)).unwrap_err();
        assert!(matches!(err, PublishError::Config(_)));
    }
}
