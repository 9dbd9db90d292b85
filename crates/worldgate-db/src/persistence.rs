//! The bundle of stores every request works against.

use std::sync::Arc;

use crate::archive::{ArchiveBackend, MemoryArchive};
use crate::error::DbError;
use crate::index::IndexBackend;
use crate::memory::MemoryIndex;
use crate::schema::SchemaGate;

/// Relational index, object archive and the schema readiness gate.
///
/// Cheap to clone: clones share the same pool, client and gate.
#[derive(Clone, Debug)]
pub struct Persistence {
    index: IndexBackend,
    archive: ArchiveBackend,
    schema: Arc<SchemaGate>,
}

impl Persistence {
    /// Bundle two backends with a fresh schema gate.
    pub fn new(index: IndexBackend, archive: ArchiveBackend) -> Self {
        Self {
            index,
            archive,
            schema: Arc::new(SchemaGate::new()),
        }
    }

    /// In-process index and archive.
    pub fn in_memory() -> Self {
        Self::new(
            IndexBackend::Memory(MemoryIndex::new()),
            ArchiveBackend::Memory(MemoryArchive::new()),
        )
    }

    /// Make sure the index tables exist.
    ///
    /// Runs the DDL at most once per process unless an attempt fails.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Schema`] if the attempt this call joined failed.
    pub async fn ensure_schema(&self) -> Result<(), DbError> {
        let index = self.index.clone();
        self.schema
            .ensure(move || async move { index.apply_schema().await })
            .await
    }

    /// Whether the schema has been applied.
    pub fn schema_ready(&self) -> bool {
        self.schema.is_ready()
    }

    /// The relational index.
    pub const fn index(&self) -> &IndexBackend {
        &self.index
    }

    /// The object archive.
    pub const fn archive(&self) -> &ArchiveBackend {
        &self.archive
    }

    /// The in-memory index, when that backend is in use.
    pub const fn memory_index(&self) -> Option<&MemoryIndex> {
        match &self.index {
            IndexBackend::Memory(mem) => Some(mem),
            IndexBackend::Postgres(_) => None,
        }
    }

    /// The in-memory archive, when that backend is in use.
    pub const fn memory_archive(&self) -> Option<&MemoryArchive> {
        match &self.archive {
            ArchiveBackend::Memory(mem) => Some(mem),
            ArchiveBackend::Dragonfly(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn schema_runs_once_across_clones() {
        let persistence = Persistence::in_memory();
        let other = persistence.clone();
        assert!(persistence.ensure_schema().await.is_ok());
        assert!(other.ensure_schema().await.is_ok());
        assert!(other.schema_ready());
        assert_eq!(persistence.memory_index().map(MemoryIndex::schema_runs), Some(1));
    }

    #[tokio::test]
    async fn failed_schema_is_retried() {
        let persistence = Persistence::in_memory();
        let mem = persistence.memory_index().cloned().unwrap_or_default();

        mem.set_unavailable(true);
        assert!(matches!(persistence.ensure_schema().await, Err(DbError::Schema(_))));
        assert!(!persistence.schema_ready());

        mem.set_unavailable(false);
        assert!(persistence.ensure_schema().await.is_ok());
        assert_eq!(mem.schema_runs(), 1);
    }
}
