//! Relationship extraction from content fields (rule-table driven).

use std::sync::OnceLock;

use regex::Regex;

use super::{Edge, Relationships};
use crate::content::{ContentItem, FieldItem, NodeId};
use crate::rules::{ChildRule, RuleTable};

/// Internal node link as stored in link fields, e.g. `entity:node/40`.
fn node_link_regex() -> &'static Regex {
    static NODE_LINK: OnceLock<Regex> = OnceLock::new();
    NODE_LINK.get_or_init(|| Regex::new(r"entity:node/(\d+)").expect("Invalid regex pattern"))
}

/// Node id referenced by an internal link URI; `None` for external or malformed links.
pub fn parse_node_link(uri: &str) -> Option<NodeId> {
    node_link_regex()
        .captures(uri)
        .and_then(|cap| cap.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

fn link_target(value: &FieldItem) -> Option<NodeId> {
    value
        .uri
        .as_deref()
        .filter(|uri| !uri.is_empty())
        .and_then(parse_node_link)
}

/// Children found in `item` by one child rule, in field order.
pub fn extract_children(item: &ContentItem, rule: &ChildRule) -> Vec<NodeId> {
    match rule {
        ChildRule::EntityReference { field } => item
            .field(field)
            .iter()
            .filter_map(|value| value.target_id)
            .collect(),
        ChildRule::FieldOnParagraph {
            field,
            paragraph_field,
        } => item
            .field(field)
            .iter()
            .filter_map(|value| value.entity.as_ref())
            .filter_map(|paragraph| paragraph.field(paragraph_field).first())
            .filter_map(|nested| nested.target_id)
            .collect(),
        ChildRule::Link { field } => item.field(field).iter().filter_map(link_target).collect(),
        ChildRule::LinkFieldOnParagraphFromParagraph {
            field,
            paragraph_field,
        } => item
            .field(field)
            .iter()
            .filter_map(|value| value.entity.as_ref())
            .flat_map(|paragraph| paragraph.field(paragraph_field))
            .filter_map(link_target)
            .collect(),
    }
}

/// Parent and child edges asserted by `item` under `rules`.
///
/// Content types without rules yield no edges.
pub fn compute_relationships(item: &ContentItem, rules: &RuleTable) -> Relationships {
    let mut relationships = Relationships::default();

    let Some(type_rules) = rules.get(&item.content_type) else {
        log::debug!("No relationship rules for {} ({})", item.id, item.content_type);
        return relationships;
    };

    if let Some(parent_field) = &type_rules.parent {
        relationships.parent_edges = item
            .field(parent_field)
            .iter()
            .filter_map(|value| value.target_id)
            .map(|parent| Edge::new(item.id, parent, item.id))
            .collect();
    }

    for rule in &type_rules.children {
        relationships.child_edges.extend(
            extract_children(item, rule)
                .into_iter()
                .map(|child| Edge::new(item.id, item.id, child)),
        );
    }

    relationships
}
