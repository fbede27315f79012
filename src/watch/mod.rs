//! Content folder watcher: keep imported items in step with their export files.
//!
//! A changed export is re-imported (and its item queued) when its hash differs
//! from the stored one; a removed export deletes its item and queues the id so
//! the item's edges are tombstoned.

mod watcher;

use std::path::{Path, PathBuf};

use rusqlite::{params, OptionalExtension};

use crate::content::NodeId;
use crate::db::Db;
use crate::error::{DescendantError, Result};
use crate::ingest::{
    compute_file_hash, delete_sources, import_file, is_export_file, normalize_source_path, ExportFile,
    ImportOutcome,
};

pub use watcher::run_watcher_thread;

/// What handling one debounced path did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchAction {
    Imported(ImportOutcome),
    /// Same hash as the last import.
    Unchanged,
    /// The export is gone; these items were deleted and queued.
    Deleted(Vec<NodeId>),
    /// Not an export under the content folder.
    Ignored,
}

/// Source path of `path` relative to `root`, whether or not `path` still exists.
///
/// Returns `None` for paths outside the content folder or that are not exports.
pub fn source_path_for(path: &Path, root: &Path) -> Option<String> {
    if !is_export_file(path) {
        return None;
    }
    let relative = path.strip_prefix(root).ok().map(Path::to_path_buf).or_else(|| {
        let canonical_root = root.canonicalize().ok()?;
        // Removed files cannot be canonicalized; their parent usually can
        let canonical_path = match path.canonicalize() {
            Ok(p) => p,
            Err(_) => path.parent()?.canonicalize().ok()?.join(path.file_name()?),
        };
        canonical_path
            .strip_prefix(&canonical_root)
            .ok()
            .map(Path::to_path_buf)
    });

    relative.map(|r| normalize_source_path(&r.to_string_lossy()))
}

async fn stored_hash(db: &Db, source_path: &str) -> Result<Option<String>> {
    let source_path = source_path.to_string();
    db.with_connection(move |conn| {
        let hash = conn
            .query_row(
                "SELECT file_hash FROM content_items WHERE source_path = ?1",
                params![source_path],
                |row| row.get::<_, Option<String>>(0),
            )
            .optional()?;
        Ok(hash.flatten())
    })
    .await
}

/// Bring the database in line with the current state of one export path.
pub async fn handle_path_change(db: &Db, root: &Path, path: &Path) -> Result<WatchAction> {
    let Some(source_path) = source_path_for(path, root) else {
        return Ok(WatchAction::Ignored);
    };

    if !path.is_file() {
        let deleted = delete_sources(db, &[source_path.clone()]).await?;
        if !deleted.is_empty() {
            log::info!("watch: {} removed, deleted items {:?}", source_path, deleted);
        }
        return Ok(WatchAction::Deleted(deleted));
    }

    let current_hash = compute_file_hash(path)?;
    if stored_hash(db, &source_path).await?.as_deref() == Some(current_hash.as_str()) {
        return Ok(WatchAction::Unchanged);
    }

    let metadata = std::fs::metadata(path)?;
    let file = ExportFile {
        relative_path: source_path,
        absolute_path: path.to_path_buf(),
        file_size: metadata.len(),
        modified: metadata.modified()?,
    };
    let outcome = import_file(db, &file).await?;
    log::info!(
        "watch: {} imported as item {} ({})",
        file.relative_path,
        outcome.item_id,
        outcome.content_type
    );
    Ok(WatchAction::Imported(outcome))
}

/// Watch `root` until the watcher thread stops, handling each debounced path.
///
/// Per-file failures (unreadable or malformed exports) are logged and skipped.
pub async fn run_watcher(db: Db, root: PathBuf, debounce_ms: u64) -> Result<()> {
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();

    let thread_root = root.clone();
    let handle = std::thread::spawn(move || {
        if let Err(e) = run_watcher_thread(&thread_root, debounce_ms, tx) {
            log::error!("watcher thread error: {}", e);
        }
    });

    while let Some(path) = rx.recv().await {
        if let Err(e) = handle_path_change(&db, &root, &path).await {
            log::error!("watch: {}: {}", path.display(), e);
        }
    }

    handle
        .join()
        .map_err(|_| DescendantError::Task("watcher thread panicked".to_string()))?;
    Ok(())
}
