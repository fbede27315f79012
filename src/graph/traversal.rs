//! Depth-first descendant traversal over `descendant_relations`.
//!
//! One query shares a single expansion budget across its whole call tree:
//! every visit spends one unit, and a visit only looks up children while
//! units remain. Cycles and very wide graphs therefore terminate, at the cost
//! of truncating later branches once the budget is gone.

use std::collections::HashSet;

use rusqlite::Connection;

use super::store::child_ids;
use super::{DescendantFormat, DescendantNode, Descendants};
use crate::content::NodeId;
use crate::db::Db;
use crate::error::Result;

/// Expansion budget used when the caller does not give one.
pub const DEFAULT_DEPTH_LIMIT: usize = 20;

/// Per-query traversal state.
struct Walker<'c> {
    conn: &'c Connection,
    limit: usize,
    visits: usize,
    expansions: usize,
}

impl<'c> Walker<'c> {
    fn new(conn: &'c Connection, limit: usize) -> Self {
        Self {
            conn,
            limit,
            visits: 0,
            expansions: 0,
        }
    }

    /// Spend one visit; `true` if this visit may query children.
    fn enter(&mut self) -> bool {
        self.visits += 1;
        if self.visits < self.limit {
            self.expansions += 1;
            true
        } else {
            false
        }
    }

    fn flat(&mut self, node: NodeId, out: &mut Vec<NodeId>) -> Result<()> {
        if !self.enter() {
            return Ok(());
        }
        for child in child_ids(self.conn, node)? {
            out.push(child);
            self.flat(child, out)?;
        }
        Ok(())
    }

    fn nested(&mut self, node: NodeId) -> Result<Vec<DescendantNode>> {
        if !self.enter() {
            return Ok(Vec::new());
        }
        let mut nodes = Vec::new();
        for child in child_ids(self.conn, node)? {
            let children = self.nested(child)?;
            nodes.push(DescendantNode { id: child, children });
        }
        Ok(nodes)
    }
}

fn dedup_keep_first(ids: Vec<NodeId>) -> Vec<NodeId> {
    let mut seen = HashSet::with_capacity(ids.len());
    ids.into_iter().filter(|id| seen.insert(*id)).collect()
}

/// Descendants of `node_id` in the requested shape.
///
/// A node with no stored children (including one that never existed) yields
/// an empty result. `limit` bounds the number of child lookups for the whole
/// query, so a chain is cut off `limit - 1` levels down.
pub fn get_descendants(
    conn: &Connection,
    node_id: NodeId,
    format: DescendantFormat,
    limit: usize,
) -> Result<Descendants> {
    let mut walker = Walker::new(conn, limit);
    let result = match format {
        DescendantFormat::Flat => {
            let mut ids = Vec::new();
            walker.flat(node_id, &mut ids)?;
            Descendants::Flat(ids)
        }
        DescendantFormat::Unique => {
            let mut ids = Vec::new();
            walker.flat(node_id, &mut ids)?;
            Descendants::Flat(dedup_keep_first(ids))
        }
        DescendantFormat::Depth => Descendants::Nested(walker.nested(node_id)?),
    };

    if walker.visits > walker.expansions {
        log::debug!(
            "Descendants of {} truncated after {} expansions",
            node_id,
            walker.expansions
        );
    }
    Ok(result)
}

/// [`get_descendants`] on a blocking task.
pub async fn descendants(
    db: &Db,
    node_id: NodeId,
    format: DescendantFormat,
    limit: usize,
) -> Result<Descendants> {
    db.with_connection(move |conn| get_descendants(conn, node_id, format, limit))
        .await
}
