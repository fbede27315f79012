//! Import of CMS content exports from the content folder.
//!
//! Each `*.json` file holds one [`ContentItem`]. Importing a file upserts the
//! item and queues it for reindexing, together with any item that previously
//! came from the same file under a different id.

pub mod walker;
pub mod metadata;
pub mod incremental;

pub use walker::{ExportFile, discover_exports, is_export_file, relative_source_path};
pub use incremental::{
    FileClassification, classify_files, delete_sources, find_deleted_sources, get_existing_hashes,
};
pub use metadata::{compute_file_hash, hash_bytes, normalize_source_path};

use crate::content::{save_item, ContentItem, ItemSource, NodeId};
use crate::db::Db;
use crate::error::Result;
use crate::queue::enqueue;

/// What importing one export did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportOutcome {
    pub item_id: NodeId,
    pub content_type: String,
    /// Items that were previously imported from the same file and are now gone.
    pub displaced: Vec<NodeId>,
}

/// Parse an export file and store it, queueing every affected item.
///
/// Parsing happens before any write, so a malformed file leaves the database untouched.
pub async fn import_file(db: &Db, file: &ExportFile) -> Result<ImportOutcome> {
    let content = std::fs::read(&file.absolute_path)?;
    let file_hash = hash_bytes(&content);
    let item: ContentItem = serde_json::from_slice(&content)?;

    let source = ItemSource {
        source_path: file.relative_path.clone(),
        file_hash,
    };

    db.with_connection(move |conn| {
        let tx = conn.transaction()?;
        let displaced = save_item(&tx, &item, Some(&source))?;
        enqueue(&tx, item.id)?;
        for id in &displaced {
            enqueue(&tx, *id)?;
        }
        tx.commit()?;

        log::debug!(
            "Imported {} as item {} ({})",
            source.source_path,
            item.id,
            item.content_type
        );
        Ok(ImportOutcome {
            item_id: item.id,
            content_type: item.content_type,
            displaced,
        })
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::load_item;
    use crate::db::open_test_db;
    use crate::error::DescendantError;
    use crate::queue::dequeue_batch;
    use std::fs;
    use tempfile::TempDir;

    fn write_export(dir: &TempDir, name: &str, json: &str) -> ExportFile {
        let path = dir.path().join(name);
        fs::write(&path, json).unwrap();
        ExportFile {
            relative_path: name.to_string(),
            absolute_path: path,
            file_size: json.len() as u64,
            modified: std::time::SystemTime::now(),
        }
    }

    #[tokio::test]
    async fn test_import_file_saves_and_enqueues() {
        let (db, _temp) = open_test_db().await;
        let content_dir = TempDir::new().unwrap();
        let file = write_export(
            &content_dir,
            "10.json",
            r#"{"id": 10, "type": "advisory", "title": "Flood",
                "fields": {"field_advisory_ref_organization": [{"target_id": 5}]}}"#,
        );

        let outcome = import_file(&db, &file).await.unwrap();
        assert_eq!(outcome.item_id, 10);
        assert_eq!(outcome.content_type, "advisory");
        assert!(outcome.displaced.is_empty());

        let (item, queued) = db
            .with_connection(|conn| Ok((load_item(conn, 10)?, dequeue_batch(conn, 10, 0)?)))
            .await
            .unwrap();
        assert_eq!(item.unwrap().title, "Flood");
        assert_eq!(queued.len(), 1);
        assert_eq!(queued[0].item_id, 10);

        let hashes = get_existing_hashes(&db).await.unwrap();
        assert_eq!(hashes.get("10.json"), Some(&compute_file_hash(&file.absolute_path).unwrap()));
    }

    #[tokio::test]
    async fn test_import_file_id_change_displaces_old_item() {
        let (db, _temp) = open_test_db().await;
        let content_dir = TempDir::new().unwrap();
        let file = write_export(&content_dir, "page.json", r#"{"id": 1, "type": "org_page"}"#);
        import_file(&db, &file).await.unwrap();

        let file = write_export(&content_dir, "page.json", r#"{"id": 2, "type": "org_page"}"#);
        let outcome = import_file(&db, &file).await.unwrap();
        assert_eq!(outcome.displaced, vec![1]);

        let queued = db.with_connection(|conn| dequeue_batch(conn, 10, 0)).await.unwrap();
        let ids: Vec<_> = queued.iter().map(|e| e.item_id).collect();
        assert_eq!(ids, vec![1, 2, 1]);
    }

    #[tokio::test]
    async fn test_import_malformed_file() {
        let (db, _temp) = open_test_db().await;
        let content_dir = TempDir::new().unwrap();
        let file = write_export(&content_dir, "bad.json", r#"{"id": "ten"}"#);

        let result = import_file(&db, &file).await;
        assert!(matches!(result, Err(DescendantError::Serialization(_))));
        let queued = db.with_connection(|conn| dequeue_batch(conn, 10, 0)).await.unwrap();
        assert!(queued.is_empty());
    }
}
