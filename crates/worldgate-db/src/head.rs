//! World head tracking.
//!
//! Every dispatched request updates its world's head: first the relational
//! row, then the JSON mirror in the archive. The two writes are not
//! transactional; a failed archive write leaves the row ahead of the mirror
//! until the next successful update.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::task::JoinHandle;
use worldgate_types::{ArchiveDocument, WorldId, head_archive_key};

use crate::archive::JSON_CONTENT_TYPE;
use crate::error::DbError;
use crate::head_store::HeadRow;
use crate::persistence::Persistence;

/// Both copies of a world's head, as read back.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HeadView {
    /// The relational row, if the world has ever been dispatched to.
    pub row: Option<HeadRow>,
    /// The archive mirror, if present.
    pub archive_doc: Option<ArchiveDocument>,
}

/// Record one dispatched request and mirror the result to the archive.
///
/// # Errors
///
/// Returns [`DbError`] from the schema check, the upsert, or the archive
/// write, whichever fails first.
pub async fn persist_head(
    persistence: &Persistence,
    world_id: &WorldId,
    path: &str,
    status: u16,
    at: DateTime<Utc>,
) -> Result<HeadRow, DbError> {
    persistence.ensure_schema().await?;

    let row = persistence
        .index()
        .upsert_head(world_id, path, status, at)
        .await?;

    let body = serde_json::to_string(&row.to_document())?;
    persistence
        .archive()
        .put(&head_archive_key(world_id), &body, JSON_CONTENT_TYPE)
        .await?;

    Ok(row)
}

/// Run [`persist_head`] in the background.
///
/// Failures are logged and dropped. The returned handle may be ignored.
pub fn spawn_persist_head(
    persistence: Persistence,
    world_id: WorldId,
    path: String,
    status: u16,
    at: DateTime<Utc>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        if let Err(e) = persist_head(&persistence, &world_id, &path, status, at).await {
            tracing::warn!(%world_id, path, status, error = %e, "Failed to persist world head");
        }
    })
}

/// Read both copies of a world's head.
///
/// An archive body that is not valid JSON is reported as the parse-error
/// marker rather than failing the read.
///
/// # Errors
///
/// Returns [`DbError`] if either store cannot be read.
pub async fn read_head(persistence: &Persistence, world_id: &WorldId) -> Result<HeadView, DbError> {
    persistence.ensure_schema().await?;

    let row = persistence.index().get_head(world_id).await?;
    let archive_doc = persistence
        .archive()
        .get(&head_archive_key(world_id))
        .await?
        .map(|body| ArchiveDocument::from_body(&body));

    Ok(HeadView { row, archive_doc })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn world(id: &str) -> WorldId {
        WorldId::parse(id).unwrap_or_default()
    }

    #[tokio::test]
    async fn first_request_creates_head_and_mirror() {
        let p = Persistence::in_memory();
        let w = world("w1");
        let row = persist_head(&p, &w, "/move?x=1", 200, Utc::now()).await;
        assert_eq!(row.as_ref().map(|r| r.request_count).ok(), Some(1));

        let view = read_head(&p, &w).await;
        let view = view.as_ref().ok();
        assert_eq!(
            view.and_then(|v| v.row.as_ref()).map(|r| (r.last_path.as_str(), r.last_status)),
            Some(("/move?x=1", 200))
        );
        let doc = view.and_then(|v| match &v.archive_doc {
            Some(ArchiveDocument::Parsed(doc)) => Some(doc.clone()),
            _ => None,
        });
        assert_eq!(doc.as_ref().and_then(|d| d.get("world_id")), Some(&json!("w1")));
        assert_eq!(doc.as_ref().and_then(|d| d.get("last_status")), Some(&json!(200)));
        assert_eq!(doc.as_ref().and_then(|d| d.get("request_count")), Some(&json!(1)));
    }

    #[tokio::test]
    async fn count_increments_by_one_per_request() {
        let p = Persistence::in_memory();
        let w = world("w1");
        for _ in 0..3 {
            let _ = persist_head(&p, &w, "/a", 200, Utc::now()).await;
        }
        let row = persist_head(&p, &w, "/b", 404, Utc::now()).await;
        assert_eq!(
            row.map(|r| (r.request_count, r.last_path, r.last_status)).ok(),
            Some((4, "/b".to_owned(), 404))
        );
    }

    #[tokio::test]
    async fn unreadable_mirror_is_marked() {
        let p = Persistence::in_memory();
        let w = world("w1");
        let _ = p
            .archive()
            .put(&head_archive_key(&w), "{not json", JSON_CONTENT_TYPE)
            .await;
        let view = read_head(&p, &w).await;
        assert!(
            view.as_ref()
                .ok()
                .and_then(|v| v.archive_doc.as_ref())
                .is_some_and(ArchiveDocument::is_parse_error)
        );
        assert!(view.is_ok_and(|v| v.row.is_none()));
    }

    #[tokio::test]
    async fn unknown_world_reads_empty() {
        let p = Persistence::in_memory();
        let view = read_head(&p, &world("nobody")).await;
        assert!(view.is_ok_and(|v| v.row.is_none() && v.archive_doc.is_none()));
    }

    #[tokio::test]
    async fn archive_failure_keeps_row() {
        let p = Persistence::in_memory();
        let w = world("w1");
        if let Some(archive) = p.memory_archive() {
            archive.set_unavailable(true);
        }
        assert!(persist_head(&p, &w, "/a", 200, Utc::now()).await.is_err());
        if let Some(archive) = p.memory_archive() {
            archive.set_unavailable(false);
        }
        let view = read_head(&p, &w).await;
        assert!(view.is_ok_and(|v| v.row.is_some() && v.archive_doc.is_none()));
    }
}
