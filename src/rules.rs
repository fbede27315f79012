//! Relationship rule table: which fields of which content types point at
//! parents and children.
//!
//! The table is plain data loaded from TOML (see `relationships.toml` at the
//! crate root, which is also compiled in as the default). Dispatch on the rule
//! kind lives in [`crate::graph::compute_relationships`].

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{DescendantError, Result};

const BUILTIN_RULES: &str = include_str!("../relationships.toml");

/// How to find children through one field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChildRule {
    /// Every reference in `field` is a child.
    EntityReference { field: String },
    /// `field` references paragraphs; the first reference in each paragraph's
    /// `paragraph_field` is a child.
    FieldOnParagraph {
        field: String,
        paragraph_field: String,
    },
    /// Every internal node link in `field` is a child.
    Link { field: String },
    /// `field` references paragraphs; every internal node link in each
    /// paragraph's `paragraph_field` is a child.
    LinkFieldOnParagraphFromParagraph {
        field: String,
        paragraph_field: String,
    },
}

impl ChildRule {
    /// Field read on the content item itself.
    pub fn field(&self) -> &str {
        match self {
            ChildRule::EntityReference { field }
            | ChildRule::FieldOnParagraph { field, .. }
            | ChildRule::Link { field }
            | ChildRule::LinkFieldOnParagraphFromParagraph { field, .. } => field,
        }
    }
}

/// Rules for one content type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ContentTypeRules {
    pub parent: Option<String>,
    #[serde(rename = "child")]
    pub children: Vec<ChildRule>,
}

/// Content type -> relationship rules.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct RuleTable {
    content_types: BTreeMap<String, ContentTypeRules>,
}

#[derive(Debug, Deserialize)]
struct RawContentTypeRules {
    #[serde(default)]
    parent: Option<String>,
    #[serde(default)]
    child: Vec<RawChildRule>,
}

#[derive(Debug, Deserialize)]
struct RawChildRule {
    #[serde(rename = "type")]
    kind: String,
    field: String,
    #[serde(default)]
    paragraph_field: Option<String>,
}

impl RawChildRule {
    /// `Ok(None)` for rule kinds this build does not know.
    fn into_rule(self, content_type: &str) -> Result<Option<ChildRule>> {
        let RawChildRule {
            kind,
            field,
            paragraph_field,
        } = self;

        let rule = match kind.as_str() {
            "entity_reference" => ChildRule::EntityReference { field },
            "link" => ChildRule::Link { field },
            "field_on_paragraph" => {
                let paragraph_field =
                    required_paragraph_field(content_type, &kind, &field, paragraph_field)?;
                ChildRule::FieldOnParagraph {
                    field,
                    paragraph_field,
                }
            }
            "link_field_on_paragraph_from_paragraph" => {
                let paragraph_field =
                    required_paragraph_field(content_type, &kind, &field, paragraph_field)?;
                ChildRule::LinkFieldOnParagraphFromParagraph {
                    field,
                    paragraph_field,
                }
            }
            other => {
                log::warn!(
                    "{}: skipping child rule on {} with unsupported type '{}'",
                    content_type,
                    field,
                    other
                );
                return Ok(None);
            }
        };
        Ok(Some(rule))
    }
}

fn required_paragraph_field(
    content_type: &str,
    kind: &str,
    field: &str,
    paragraph_field: Option<String>,
) -> Result<String> {
    paragraph_field.ok_or_else(|| {
        DescendantError::Config(format!(
            "{}: child rule '{}' on {} needs paragraph_field",
            content_type, kind, field
        ))
    })
}

impl RuleTable {
    /// The default Mass.gov table compiled into the binary.
    pub fn builtin() -> Result<Self> {
        Self::from_toml_str(BUILTIN_RULES)
    }

    /// Load a table from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Parse a table from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let raw: BTreeMap<String, RawContentTypeRules> = toml::from_str(text)
            .map_err(|e| DescendantError::Config(format!("invalid relationship rules: {}", e)))?;

        let mut content_types = BTreeMap::new();
        for (content_type, raw_rules) in raw {
            let mut children = Vec::with_capacity(raw_rules.child.len());
            for raw_child in raw_rules.child {
                if let Some(rule) = raw_child.into_rule(&content_type)? {
                    children.push(rule);
                }
            }
            content_types.insert(
                content_type,
                ContentTypeRules {
                    parent: raw_rules.parent,
                    children,
                },
            );
        }

        Ok(Self { content_types })
    }

    /// Add or replace the rules for one content type.
    pub fn insert(&mut self, content_type: impl Into<String>, rules: ContentTypeRules) {
        self.content_types.insert(content_type.into(), rules);
    }

    /// Rules for `content_type`, if any.
    pub fn get(&self, content_type: &str) -> Option<&ContentTypeRules> {
        self.content_types.get(content_type)
    }

    /// Content types that have rules, sorted.
    pub fn content_types(&self) -> impl Iterator<Item = &str> {
        self.content_types.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.content_types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.content_types.is_empty()
    }
}
