//! Producer-side client for the Worldgate ingest endpoint.
//!
//! A compute unit creates one [`Publisher`] per world and reports what
//! happens in it: tick summaries, audited block changes, snapshot files,
//! snapshot state, finished seasons, and catalog documents. Events are
//! queued without blocking the caller and delivered in batches to
//! `POST /indexdb/ingest`.
//!
//! ```rust,ignore
//! use worldgate_publisher::{Publisher, PublisherConfig};
//!
//! let config = PublisherConfig::new("http://gateway:8080/indexdb/ingest", world_id)
//!     .with_token(token);
//! let publisher = Publisher::start(config)?;
//! publisher.publish_tick(&tick);
//! publisher.close().await;
//! ```
//!
//! # Modules
//!
//! - [`config`] -- Batching, timeout and queue settings
//! - [`publisher`] -- The queue, the flush worker and the per-kind helpers
//! - [`stats`] -- Delivery counters
//! - [`error`] -- [`PublishError`]

pub mod config;
pub mod error;
pub mod publisher;
pub mod stats;

pub use config::PublisherConfig;
pub use error::PublishError;
pub use publisher::{MAX_ATTEMPTS, OutboundEvent, Publisher, TOKEN_HEADER};
pub use stats::{DroppedByKind, PublisherStats};
