//! Reindex queue backed by `descendant_queue`.
//!
//! Entries are plain item ids. Processing is at-least-once: an entry is only
//! removed after its reindex committed, and reindexing is idempotent, so
//! duplicate or replayed entries are harmless.

mod processor;

pub use processor::{backfill, process_cycle, CycleReport};

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;

use crate::content::NodeId;
use crate::error::{DescendantError, Result};

/// One queued reindex request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueEntry {
    pub queue_id: i64,
    pub item_id: NodeId,
    pub enqueued_at: String,
    pub retry_count: u32,
    pub error_message: Option<String>,
}

/// Queue depth summary.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub pending: i64,
    /// Entries that failed at least once and are waiting for another attempt.
    pub retrying: i64,
    pub oldest_enqueued_at: Option<String>,
}

/// Queue one item for reindexing.
pub fn enqueue(conn: &Connection, item_id: NodeId) -> Result<i64> {
    conn.execute(
        "INSERT INTO descendant_queue (item_id, enqueued_at) VALUES (?1, ?2)",
        params![item_id, Utc::now().to_rfc3339()],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Queue several items in one transaction. Returns how many were queued.
pub fn enqueue_many(conn: &mut Connection, item_ids: &[NodeId]) -> Result<usize> {
    if item_ids.is_empty() {
        return Ok(0);
    }
    let tx = conn.transaction()?;
    let now = Utc::now().to_rfc3339();
    {
        let mut stmt =
            tx.prepare_cached("INSERT INTO descendant_queue (item_id, enqueued_at) VALUES (?1, ?2)")?;
        for id in item_ids {
            stmt.execute(params![id, now])?;
        }
    }
    tx.commit()?;
    Ok(item_ids.len())
}

/// Up to `batch_size` entries with `queue_id > after`, oldest first.
///
/// Nothing is claimed; the entry stays in the table until
/// [`mark_complete`] or a final [`mark_error`].
pub fn dequeue_batch(conn: &Connection, batch_size: usize, after: i64) -> Result<Vec<QueueEntry>> {
    let limit = i64::try_from(batch_size)
        .map_err(|_| DescendantError::InvalidInput(format!("batch size too large: {}", batch_size)))?;
    let mut stmt = conn.prepare(
        "SELECT queue_id, item_id, enqueued_at, retry_count, error_message \
         FROM descendant_queue WHERE queue_id > ?1 ORDER BY queue_id LIMIT ?2",
    )?;
    let entries = stmt
        .query_map(params![after, limit], |row| {
            Ok(QueueEntry {
                queue_id: row.get(0)?,
                item_id: row.get(1)?,
                enqueued_at: row.get(2)?,
                retry_count: row.get(3)?,
                error_message: row.get(4)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;
    Ok(entries)
}

/// Remove a processed entry. Returns whether it was still queued.
pub fn mark_complete(conn: &Connection, queue_id: i64) -> Result<bool> {
    let n = conn.execute("DELETE FROM descendant_queue WHERE queue_id = ?1", params![queue_id])?;
    Ok(n > 0)
}

/// Record a failed attempt.
///
/// Returns `true` when the entry ran out of retries and was dropped.
pub fn mark_error(conn: &Connection, queue_id: i64, error: &str, max_retries: u32) -> Result<bool> {
    let row: Option<(NodeId, u32)> = conn
        .query_row(
            "SELECT item_id, retry_count FROM descendant_queue WHERE queue_id = ?1",
            params![queue_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;

    let Some((item_id, retry_count)) = row else {
        return Err(DescendantError::Queue(format!("queue entry {} not found", queue_id)));
    };

    let attempts = retry_count + 1;
    if attempts >= max_retries {
        conn.execute("DELETE FROM descendant_queue WHERE queue_id = ?1", params![queue_id])?;
        log::warn!(
            "Dropping reindex of item {} after {} failed attempts: {}",
            item_id,
            attempts,
            error
        );
        return Ok(true);
    }

    conn.execute(
        "UPDATE descendant_queue SET retry_count = ?1, error_message = ?2, last_error_at = ?3 \
         WHERE queue_id = ?4",
        params![attempts, error, Utc::now().to_rfc3339(), queue_id],
    )?;
    log::debug!(
        "Reindex of item {} failed (attempt {}/{}): {}",
        item_id,
        attempts,
        max_retries,
        error
    );
    Ok(false)
}

pub fn queue_stats(conn: &Connection) -> Result<QueueStats> {
    let stats = conn.query_row(
        "SELECT COUNT(*), \
                COALESCE(SUM(CASE WHEN retry_count > 0 THEN 1 ELSE 0 END), 0), \
                MIN(enqueued_at) \
         FROM descendant_queue",
        [],
        |row| {
            Ok(QueueStats {
                pending: row.get(0)?,
                retrying: row.get(1)?,
                oldest_enqueued_at: row.get(2)?,
            })
        },
    )?;
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_test_db;

    #[tokio::test]
    async fn test_enqueue_and_dequeue_in_order() {
        let (db, _temp) = open_test_db().await;
        db.with_connection(|conn| {
            enqueue(conn, 30)?;
            enqueue_many(conn, &[10, 20, 10])?;

            let batch = dequeue_batch(conn, 10, 0)?;
            let ids: Vec<_> = batch.iter().map(|e| e.item_id).collect();
            assert_eq!(ids, vec![30, 10, 20, 10]);
            assert!(batch.iter().all(|e| e.retry_count == 0));

            let page = dequeue_batch(conn, 2, batch[1].queue_id)?;
            let ids: Vec<_> = page.iter().map(|e| e.item_id).collect();
            assert_eq!(ids, vec![20, 10]);
            Ok::<(), DescendantError>(())
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_enqueue_many_empty() {
        let (db, _temp) = open_test_db().await;
        let n = db.with_connection(|conn| enqueue_many(conn, &[])).await.unwrap();
        assert_eq!(n, 0);
    }

    #[tokio::test]
    async fn test_mark_complete() {
        let (db, _temp) = open_test_db().await;
        db.with_connection(|conn| {
            let queue_id = enqueue(conn, 1)?;
            assert!(mark_complete(conn, queue_id)?);
            assert!(!mark_complete(conn, queue_id)?);
            assert!(dequeue_batch(conn, 10, 0)?.is_empty());
            Ok::<(), DescendantError>(())
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_mark_error_retries_then_drops() {
        let (db, _temp) = open_test_db().await;
        db.with_connection(|conn| {
            let queue_id = enqueue(conn, 7)?;

            assert!(!mark_error(conn, queue_id, "disk I/O error", 3)?);
            assert!(!mark_error(conn, queue_id, "disk I/O error", 3)?);
            let entry = &dequeue_batch(conn, 1, 0)?[0];
            assert_eq!(entry.retry_count, 2);
            assert_eq!(entry.error_message.as_deref(), Some("disk I/O error"));
            assert_eq!(queue_stats(conn)?.retrying, 1);

            assert!(mark_error(conn, queue_id, "disk I/O error", 3)?);
            assert_eq!(queue_stats(conn)?.pending, 0);
            Ok::<(), DescendantError>(())
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_mark_error_unknown_entry() {
        let (db, _temp) = open_test_db().await;
        let result = db
            .with_connection(|conn| mark_error(conn, 999, "boom", 3))
            .await;
        assert!(matches!(result, Err(DescendantError::Queue(_))));
    }

    #[tokio::test]
    async fn test_queue_stats_empty() {
        let (db, _temp) = open_test_db().await;
        let stats = db.with_connection(|conn| queue_stats(conn)).await.unwrap();
        assert_eq!(stats, QueueStats::default());
    }
}
