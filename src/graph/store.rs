//! Adjacency storage in `descendant_relations`.

use std::sync::Arc;

use rusqlite::{params, Connection, TransactionBehavior};
use serde::Serialize;

use super::{compute_relationships, Edge};
use crate::content::{load_item, NodeId};
use crate::db::Db;
use crate::error::Result;
use crate::rules::RuleTable;

/// What one reindex did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReindexOutcome {
    pub item_id: NodeId,
    /// Edges previously reported by the item.
    pub removed: usize,
    /// Edges written for the item's current fields.
    pub inserted: usize,
    /// Whether the item still exists. `false` means its edges were tombstoned.
    pub found: bool,
}

/// Replace every edge reported by `item_id` with edges computed from its
/// current fields.
///
/// Runs in one `BEGIN IMMEDIATE` transaction so that two reindexes of the
/// same reporter cannot interleave their delete and insert steps.
pub fn reindex_item(conn: &mut Connection, rules: &RuleTable, item_id: NodeId) -> Result<ReindexOutcome> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let removed = tx.execute(
        "DELETE FROM descendant_relations WHERE reporter = ?1",
        params![item_id],
    )?;

    let Some(item) = load_item(&tx, item_id)? else {
        tx.commit()?;
        log::debug!("Item {} is gone; removed {} edges", item_id, removed);
        return Ok(ReindexOutcome {
            item_id,
            removed,
            inserted: 0,
            found: false,
        });
    };

    let relationships = compute_relationships(&item, rules);
    let mut inserted = 0;
    {
        let mut stmt = tx.prepare_cached(
            "INSERT INTO descendant_relations (reporter, parent, child) VALUES (?1, ?2, ?3)",
        )?;
        for edge in relationships.edges() {
            stmt.execute(params![edge.reporter_id, edge.parent_id, edge.child_id])?;
            inserted += 1;
        }
    }
    tx.commit()?;

    log::debug!(
        "Reindexed {} ({}): -{} +{} edges",
        item_id,
        item.content_type,
        removed,
        inserted
    );

    Ok(ReindexOutcome {
        item_id,
        removed,
        inserted,
        found: true,
    })
}

/// [`reindex_item`] on a blocking task.
pub async fn reindex(db: &Db, rules: Arc<RuleTable>, item_id: NodeId) -> Result<ReindexOutcome> {
    db.with_connection(move |conn| reindex_item(conn, &rules, item_id))
        .await
}

/// Current edges asserted by `reporter_id`, in insertion order.
pub fn edges_for_reporter(conn: &Connection, reporter_id: NodeId) -> Result<Vec<Edge>> {
    let mut stmt = conn.prepare(
        "SELECT reporter, parent, child FROM descendant_relations \
         WHERE reporter = ?1 ORDER BY relation_id",
    )?;
    let edges = stmt
        .query_map(params![reporter_id], |row| {
            Ok(Edge {
                reporter_id: row.get(0)?,
                parent_id: row.get(1)?,
                child_id: row.get(2)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;
    Ok(edges)
}

/// Direct children of `parent_id`, in insertion order. Duplicates are kept.
pub fn child_ids(conn: &Connection, parent_id: NodeId) -> Result<Vec<NodeId>> {
    let mut stmt = conn.prepare_cached(
        "SELECT child FROM descendant_relations WHERE parent = ?1 ORDER BY relation_id",
    )?;
    let children = stmt
        .query_map(params![parent_id], |row| row.get::<_, NodeId>(0))?
        .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;
    Ok(children)
}

/// Total number of stored edges.
pub fn edge_count(conn: &Connection) -> Result<i64> {
    let count = conn.query_row("SELECT COUNT(*) FROM descendant_relations", [], |row| row.get(0))?;
    Ok(count)
}
