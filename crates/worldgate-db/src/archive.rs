//! Object archive backend selection.
//!
//! The archive is a flat key/value space of small JSON documents. A missing
//! key is never an error: reads return `None` and probes return `false`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::dragonfly::DragonflyArchive;
use crate::error::DbError;

/// Content type used for every archive document.
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// The object archive.
#[derive(Clone, Debug)]
pub enum ArchiveBackend {
    /// `Dragonfly` through a shared client.
    Dragonfly(DragonflyArchive),
    /// In-process objects.
    Memory(MemoryArchive),
}

impl ArchiveBackend {
    /// Short backend name for logs and health output.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Dragonfly(_) => "dragonfly",
            Self::Memory(_) => "memory",
        }
    }

    /// Store an object.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the write fails.
    pub async fn put(&self, key: &str, body: &str, content_type: &str) -> Result<(), DbError> {
        match self {
            Self::Dragonfly(df) => df.put(key, body, content_type).await,
            Self::Memory(mem) => mem.put(key, body, content_type),
        }
    }

    /// Read an object body.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the read fails.
    pub async fn get(&self, key: &str) -> Result<Option<String>, DbError> {
        match self {
            Self::Dragonfly(df) => df.get(key).await,
            Self::Memory(mem) => mem.get(key),
        }
    }

    /// Probe for an object without reading it.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the archive is unreachable.
    pub async fn head(&self, key: &str) -> Result<bool, DbError> {
        match self {
            Self::Dragonfly(df) => df.head(key).await,
            Self::Memory(mem) => mem.head(key),
        }
    }
}

/// A stored archive object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveObject {
    /// Object body.
    pub body: String,
    /// Content type recorded with the body.
    pub content_type: String,
}

#[derive(Default)]
struct Objects {
    unavailable: bool,
    entries: HashMap<String, ArchiveObject>,
}

/// Shared in-memory archive. Clones share the same objects.
#[derive(Clone, Default)]
pub struct MemoryArchive {
    objects: Arc<Mutex<Objects>>,
}

impl MemoryArchive {
    /// An empty archive.
    pub fn new() -> Self {
        Self::default()
    }

    fn open(&self) -> Result<MutexGuard<'_, Objects>, DbError> {
        let objects = self.objects.lock().unwrap_or_else(PoisonError::into_inner);
        if objects.unavailable {
            return Err(DbError::Config("memory archive is unavailable".to_owned()));
        }
        Ok(objects)
    }

    /// Make every subsequent operation fail (or succeed again).
    pub fn set_unavailable(&self, unavailable: bool) {
        self.objects
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .unavailable = unavailable;
    }

    /// The stored object at `key`, including its content type.
    pub fn object(&self, key: &str) -> Option<ArchiveObject> {
        self.objects
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .get(key)
            .cloned()
    }

    fn put(&self, key: &str, body: &str, content_type: &str) -> Result<(), DbError> {
        self.open()?.entries.insert(
            key.to_owned(),
            ArchiveObject {
                body: body.to_owned(),
                content_type: content_type.to_owned(),
            },
        );
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<String>, DbError> {
        Ok(self.open()?.entries.get(key).map(|o| o.body.clone()))
    }

    fn head(&self, key: &str) -> Result<bool, DbError> {
        Ok(self.open()?.entries.contains_key(key))
    }
}

impl core::fmt::Debug for MemoryArchive {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("MemoryArchive").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_key_is_not_an_error() {
        let archive = ArchiveBackend::Memory(MemoryArchive::new());
        assert!(matches!(archive.get("nope").await, Ok(None)));
        assert!(matches!(archive.head("nope").await, Ok(false)));
    }

    #[tokio::test]
    async fn put_overwrites_and_keeps_content_type() {
        let mem = MemoryArchive::new();
        let archive = ArchiveBackend::Memory(mem.clone());
        assert!(archive.put("k", "1", JSON_CONTENT_TYPE).await.is_ok());
        assert!(archive.put("k", "2", JSON_CONTENT_TYPE).await.is_ok());
        assert!(matches!(archive.head("k").await, Ok(true)));
        assert_eq!(archive.get("k").await.ok().flatten().as_deref(), Some("2"));
        assert_eq!(
            mem.object("k").map(|o| o.content_type),
            Some(JSON_CONTENT_TYPE.to_owned())
        );
    }

    #[tokio::test]
    async fn unavailable_archive_fails() {
        let mem = MemoryArchive::new();
        mem.set_unavailable(true);
        let archive = ArchiveBackend::Memory(mem);
        assert!(archive.head("k").await.is_err());
    }
}
