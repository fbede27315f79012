//! Incremental import: skip exports whose file hash matches what was last
//! imported, and find items whose export file has disappeared.

use std::collections::{HashMap, HashSet};

use rusqlite::params;

use crate::content::NodeId;
use crate::db::Db;
use crate::error::{DescendantError, Result};
use crate::ingest::{compute_file_hash, ExportFile};
use crate::queue::enqueue;

/// Result of classifying discovered exports against the database.
#[derive(Debug, Default)]
pub struct FileClassification {
    /// Exports never imported before.
    pub new_files: Vec<ExportFile>,
    /// Exports whose contents changed since the last import.
    pub modified_files: Vec<ExportFile>,
    /// Exports identical to the last import.
    pub unchanged_files: Vec<ExportFile>,
}

impl FileClassification {
    /// New then modified exports.
    pub fn changed(self) -> Vec<ExportFile> {
        self.new_files.into_iter().chain(self.modified_files).collect()
    }
}

/// Stored `source_path -> file_hash` for every imported item.
pub async fn get_existing_hashes(db: &Db) -> Result<HashMap<String, String>> {
    db.with_connection(|conn| {
        let mut stmt = conn.prepare(
            "SELECT source_path, file_hash FROM content_items \
             WHERE source_path IS NOT NULL AND file_hash IS NOT NULL",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;
        let mut map = HashMap::new();
        for row in rows {
            let (path, hash) = row?;
            map.insert(path, hash);
        }
        Ok::<HashMap<String, String>, DescendantError>(map)
    })
    .await
}

/// Sort exports into new, modified and unchanged by comparing file hashes.
pub fn classify_files(
    files: &[ExportFile],
    existing_hashes: &HashMap<String, String>,
) -> Result<FileClassification> {
    let mut classification = FileClassification::default();

    for file in files {
        let current_hash = compute_file_hash(&file.absolute_path)?;
        match existing_hashes.get(&file.relative_path) {
            None => classification.new_files.push(file.clone()),
            Some(stored) if stored != &current_hash => classification.modified_files.push(file.clone()),
            Some(_) => classification.unchanged_files.push(file.clone()),
        }
    }

    Ok(classification)
}

/// Source paths recorded in the database that are not in `existing_files`.
pub async fn find_deleted_sources(db: &Db, existing_files: &HashSet<String>) -> Result<Vec<String>> {
    let db_paths: Vec<String> = db
        .with_connection(|conn| {
            let mut stmt = conn.prepare(
                "SELECT source_path FROM content_items WHERE source_path IS NOT NULL ORDER BY source_path",
            )?;
            let paths = stmt
                .query_map([], |row| row.get::<_, String>(0))?
                .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;
            Ok::<Vec<String>, DescendantError>(paths)
        })
        .await?;

    Ok(db_paths
        .into_iter()
        .filter(|p| !existing_files.contains(p))
        .collect())
}

/// Delete the items imported from `source_paths` and queue them for
/// reindexing so their edges are tombstoned.
///
/// Returns the ids of the deleted items.
pub async fn delete_sources(db: &Db, source_paths: &[String]) -> Result<Vec<NodeId>> {
    if source_paths.is_empty() {
        return Ok(Vec::new());
    }

    let paths = source_paths.to_vec();
    db.with_connection(move |conn| {
        let tx = conn.transaction()?;
        let mut deleted = Vec::new();
        for source_path in &paths {
            let ids = {
                let mut stmt = tx.prepare_cached("SELECT id FROM content_items WHERE source_path = ?1")?;
                let ids = stmt
                    .query_map(params![source_path], |row| row.get::<_, NodeId>(0))?
                    .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;
                ids
            };
            for id in ids {
                tx.execute("DELETE FROM content_items WHERE id = ?1", params![id])?;
                enqueue(&tx, id)?;
                deleted.push(id);
            }
        }
        tx.commit()?;
        Ok(deleted)
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::{load_item, save_item, ContentItem, ItemSource};
    use crate::db::open_test_db;
    use crate::ingest::hash_bytes;
    use crate::queue::dequeue_batch;
    use std::io::Write;
    use std::path::PathBuf;

    fn export(relative_path: &str, absolute_path: PathBuf) -> ExportFile {
        ExportFile {
            relative_path: relative_path.to_string(),
            absolute_path,
            file_size: 0,
            modified: std::time::SystemTime::UNIX_EPOCH,
        }
    }

    fn temp_export(content: &[u8]) -> tempfile::NamedTempFile {
        let temp = tempfile::NamedTempFile::new().unwrap();
        temp.as_file().write_all(content).unwrap();
        temp.as_file().sync_all().unwrap();
        temp
    }

    async fn save_with_source(db: &Db, id: NodeId, path: &str, hash: &str) {
        let source = ItemSource {
            source_path: path.to_string(),
            file_hash: hash.to_string(),
        };
        db.with_connection(move |conn| {
            save_item(conn, &ContentItem::new(id, "advisory"), Some(&source)).map(|_| ())
        })
        .await
        .unwrap();
    }

    #[test]
    fn test_classify_files() {
        let same = temp_export(b"same content");
        let changed = temp_export(b"new content");
        let fresh = temp_export(b"fresh");

        let files = vec![
            export("same.json", same.path().to_path_buf()),
            export("changed.json", changed.path().to_path_buf()),
            export("fresh.json", fresh.path().to_path_buf()),
        ];
        let mut existing = HashMap::new();
        existing.insert("same.json".to_string(), hash_bytes(b"same content"));
        existing.insert("changed.json".to_string(), "old_hash".to_string());

        let classification = classify_files(&files, &existing).unwrap();
        assert_eq!(classification.new_files.len(), 1);
        assert_eq!(classification.new_files[0].relative_path, "fresh.json");
        assert_eq!(classification.modified_files.len(), 1);
        assert_eq!(classification.modified_files[0].relative_path, "changed.json");
        assert_eq!(classification.unchanged_files.len(), 1);

        let changed: Vec<_> = classification.changed().into_iter().map(|f| f.relative_path).collect();
        assert_eq!(changed, vec!["fresh.json", "changed.json"]);
    }

    #[tokio::test]
    async fn test_get_existing_hashes_skips_unsourced_items() {
        let (db, _temp) = open_test_db().await;
        save_with_source(&db, 1, "a.json", "h1").await;
        db.with_connection(|conn| save_item(conn, &ContentItem::new(2, "advisory"), None).map(|_| ()))
            .await
            .unwrap();

        let hashes = get_existing_hashes(&db).await.unwrap();
        assert_eq!(hashes.len(), 1);
        assert_eq!(hashes.get("a.json"), Some(&"h1".to_string()));
    }

    #[tokio::test]
    async fn test_find_deleted_sources() {
        let (db, _temp) = open_test_db().await;
        save_with_source(&db, 1, "gone.json", "h1").await;
        save_with_source(&db, 2, "kept.json", "h2").await;

        let on_disk: HashSet<String> = ["kept.json".to_string()].into_iter().collect();
        let deleted = find_deleted_sources(&db, &on_disk).await.unwrap();
        assert_eq!(deleted, vec!["gone.json".to_string()]);
    }

    #[tokio::test]
    async fn test_delete_sources_enqueues_tombstones() {
        let (db, _temp) = open_test_db().await;
        save_with_source(&db, 1, "gone.json", "h1").await;
        save_with_source(&db, 2, "kept.json", "h2").await;

        let deleted = delete_sources(&db, &["gone.json".to_string(), "never.json".to_string()])
            .await
            .unwrap();
        assert_eq!(deleted, vec![1]);

        let (item, queued) = db
            .with_connection(|conn| Ok((load_item(conn, 1)?, dequeue_batch(conn, 10, 0)?)))
            .await
            .unwrap();
        assert!(item.is_none());
        let queued: Vec<_> = queued.iter().map(|e| e.item_id).collect();
        assert_eq!(queued, vec![1]);
    }

    #[tokio::test]
    async fn test_delete_sources_empty() {
        let (db, _temp) = open_test_db().await;
        assert!(delete_sources(&db, &[]).await.unwrap().is_empty());
    }
}
