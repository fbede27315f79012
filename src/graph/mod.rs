//! Descendant graph: relationship extraction, the adjacency store and
//! bounded descendant traversal.
//!
//! Edges are extracted from content fields using the rule table, stored in
//! `descendant_relations` grouped by the reporting item, and walked with a
//! per-query expansion budget.

mod extraction;
mod store;
mod traversal;

pub use extraction::{compute_relationships, extract_children, parse_node_link};
pub use store::{child_ids, edge_count, edges_for_reporter, reindex, reindex_item, ReindexOutcome};
pub use traversal::{descendants, get_descendants, DEFAULT_DEPTH_LIMIT};

use serde::{Deserialize, Serialize};

use crate::content::NodeId;
use crate::error::{DescendantError, Result};

/// Directed parent -> child relationship asserted by `reporter_id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Edge {
    pub reporter_id: NodeId,
    pub parent_id: NodeId,
    pub child_id: NodeId,
}

impl Edge {
    pub fn new(reporter_id: NodeId, parent_id: NodeId, child_id: NodeId) -> Self {
        Self {
            reporter_id,
            parent_id,
            child_id,
        }
    }
}

/// Edges discovered for one content item.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Relationships {
    /// `(item, parent, item)` edges from the parent rule.
    pub parent_edges: Vec<Edge>,
    /// `(item, item, child)` edges from the child rules.
    pub child_edges: Vec<Edge>,
}

impl Relationships {
    pub fn is_empty(&self) -> bool {
        self.parent_edges.is_empty() && self.child_edges.is_empty()
    }

    pub fn len(&self) -> usize {
        self.parent_edges.len() + self.child_edges.len()
    }

    /// Parent edges first, then child edges, in extraction order.
    pub fn edges(&self) -> impl Iterator<Item = &Edge> {
        self.parent_edges.iter().chain(self.child_edges.iter())
    }
}

/// Shape of a descendant query result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DescendantFormat {
    /// Visit-order id list; a node reachable along several paths appears once per path.
    #[default]
    Flat,
    /// Flat list with repeated ids removed, first occurrence kept.
    Unique,
    /// Tree of `{id, children}` records.
    Depth,
}

impl DescendantFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            DescendantFormat::Flat => "flat",
            DescendantFormat::Unique => "unique",
            DescendantFormat::Depth => "depth",
        }
    }

    /// Parse a query-string value. Anything other than `depth` or `unique`
    /// falls back to flat, as the admin page and REST resource always did.
    pub fn from_param(value: Option<&str>) -> Self {
        match value {
            Some("depth") => DescendantFormat::Depth,
            Some("unique") => DescendantFormat::Unique,
            _ => DescendantFormat::Flat,
        }
    }
}

impl std::str::FromStr for DescendantFormat {
    type Err = DescendantError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "flat" => Ok(DescendantFormat::Flat),
            "unique" => Ok(DescendantFormat::Unique),
            "depth" => Ok(DescendantFormat::Depth),
            other => Err(DescendantError::InvalidInput(format!(
                "unknown descendant format '{}' (expected flat, unique or depth)",
                other
            ))),
        }
    }
}

/// One node of a nested descendant tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DescendantNode {
    pub id: NodeId,
    pub children: Vec<DescendantNode>,
}

impl DescendantNode {
    /// Pre-order ids of this node and everything below it.
    pub fn flatten_into(&self, out: &mut Vec<NodeId>) {
        out.push(self.id);
        for child in &self.children {
            child.flatten_into(out);
        }
    }
}

/// Result of a descendant query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Descendants {
    Flat(Vec<NodeId>),
    Nested(Vec<DescendantNode>),
}

impl Descendants {
    /// All ids in pre-order, duplicates included.
    pub fn ids(&self) -> Vec<NodeId> {
        match self {
            Descendants::Flat(ids) => ids.clone(),
            Descendants::Nested(nodes) => {
                let mut out = Vec::new();
                for node in nodes {
                    node.flatten_into(&mut out);
                }
                out
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Descendants::Flat(ids) => ids.is_empty(),
            Descendants::Nested(nodes) => nodes.is_empty(),
        }
    }
}
