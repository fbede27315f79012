//! Content items as exported from the CMS.
//!
//! An item carries its reference and link fields as lists of [`FieldItem`]s.
//! Paragraphs are embedded directly in the field item that references them,
//! so the extractor can walk item -> paragraph -> field without further lookups.

pub mod store;

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use store::{
    delete_item, find_item_ids, find_items, load_item, load_items, save_item, ContentFilter,
    ItemSource,
};

/// Content node identifier.
pub type NodeId = i64;

/// One value of a multi-valued field.
///
/// Entity references set `target_id`, link fields set `uri`, and references to
/// paragraphs carry the paragraph itself in `entity`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldItem {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_id: Option<NodeId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity: Option<Paragraph>,
}

impl FieldItem {
    pub fn reference(target_id: NodeId) -> Self {
        Self {
            target_id: Some(target_id),
            ..Self::default()
        }
    }

    pub fn link(uri: impl Into<String>) -> Self {
        Self {
            uri: Some(uri.into()),
            ..Self::default()
        }
    }

    pub fn paragraph(paragraph: Paragraph) -> Self {
        Self {
            entity: Some(paragraph),
            ..Self::default()
        }
    }
}

/// Structured sub-item embedded in a field value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Paragraph {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub paragraph_type: Option<String>,
    #[serde(default)]
    pub fields: BTreeMap<String, Vec<FieldItem>>,
}

impl Paragraph {
    /// Values of `name`; empty when the paragraph has no such field.
    pub fn field(&self, name: &str) -> &[FieldItem] {
        self.fields.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn with_field(mut self, name: impl Into<String>, values: Vec<FieldItem>) -> Self {
        self.fields.insert(name.into(), values);
        self
    }
}

/// A content node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentItem {
    pub id: NodeId,
    #[serde(rename = "type")]
    pub content_type: String,
    #[serde(default)]
    pub title: String,
    #[serde(default = "default_published")]
    pub published: bool,
    /// Path alias, e.g. `/orgs/department-of-revenue`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub moderation_state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub changed: Option<DateTime<Utc>>,
    #[serde(default)]
    pub fields: BTreeMap<String, Vec<FieldItem>>,
}

fn default_published() -> bool {
    true
}

impl ContentItem {
    pub fn new(id: NodeId, content_type: impl Into<String>) -> Self {
        Self {
            id,
            content_type: content_type.into(),
            title: String::new(),
            published: true,
            path: None,
            moderation_state: None,
            created: None,
            changed: None,
            fields: BTreeMap::new(),
        }
    }

    /// Values of `name`; empty when the item has no such field.
    pub fn field(&self, name: &str) -> &[FieldItem] {
        self.fields.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn with_field(mut self, name: impl Into<String>, values: Vec<FieldItem>) -> Self {
        self.fields.insert(name.into(), values);
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn unpublished(mut self) -> Self {
        self.published = false;
        self
    }

    /// Path alias, falling back to the canonical `/node/{id}`.
    pub fn node_path(&self) -> String {
        self.path
            .clone()
            .unwrap_or_else(|| format!("/node/{}", self.id))
    }
}
