//! Read resources behind the HTTP API.
//!
//! Query parameters arrive as a raw string map and are validated here, so
//! handlers can turn every bad value into the same JSON 400 response.

use std::collections::HashMap;

use rusqlite::Connection;
use serde::Serialize;

use crate::config::{ApiConfig, TraversalConfig};
use crate::content::{find_items, ContentFilter, ContentItem, NodeId};
use crate::error::{DescendantError, Result};
use crate::graph::{get_descendants, DescendantFormat, Descendants};

/// Page size for `GET /api/v1/descendants?content_type=..` when `limit` is absent.
pub const DEFAULT_TYPE_PAGE_SIZE: usize = 20;

fn parse_number<T: std::str::FromStr>(params: &HashMap<String, String>, key: &str) -> Result<Option<T>> {
    match params.get(key).map(|v| v.trim()).filter(|v| !v.is_empty()) {
        None => Ok(None),
        Some(raw) => raw.parse().map(Some).map_err(|_| {
            DescendantError::InvalidInput(format!("{} must be a non-negative integer, got '{}'", key, raw))
        }),
    }
}

/// Node id from a path segment.
pub fn parse_node_id(raw: &str) -> Result<NodeId> {
    raw.trim()
        .parse::<NodeId>()
        .ok()
        .filter(|id| *id > 0)
        .ok_or_else(|| DescendantError::InvalidInput(format!("invalid node id '{}'", raw)))
}

/// Effective traversal budget for a request.
pub fn resolve_depth_limit(requested: Option<usize>, traversal: &TraversalConfig) -> Result<usize> {
    match requested {
        None => Ok(traversal.default_limit),
        Some(0) => Err(DescendantError::InvalidInput(
            "depth_limit must be at least 1".to_string(),
        )),
        Some(limit) if limit > traversal.max_limit => Err(DescendantError::InvalidInput(format!(
            "depth_limit {} exceeds the maximum of {}",
            limit, traversal.max_limit
        ))),
        Some(limit) => Ok(limit),
    }
}

/// `?format=..&depth_limit=..`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DescendantQuery {
    pub format: DescendantFormat,
    pub depth_limit: usize,
}

impl DescendantQuery {
    pub fn from_params(params: &HashMap<String, String>, traversal: &TraversalConfig) -> Result<Self> {
        Ok(Self {
            format: DescendantFormat::from_param(params.get("format").map(String::as_str)),
            depth_limit: resolve_depth_limit(parse_number(params, "depth_limit")?, traversal)?,
        })
    }
}

/// `?content_type=T&limit=..&offset=..` plus [`DescendantQuery`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeQuery {
    pub content_type: String,
    pub descendants: DescendantQuery,
    pub limit: usize,
    pub offset: usize,
}

impl TypeQuery {
    pub fn from_params(
        params: &HashMap<String, String>,
        traversal: &TraversalConfig,
        api: &ApiConfig,
    ) -> Result<Self> {
        let content_type = params
            .get("content_type")
            .map(|t| t.trim())
            .filter(|t| !t.is_empty())
            .ok_or_else(|| DescendantError::InvalidInput("content_type is required".to_string()))?
            .to_string();
        let limit = parse_number(params, "limit")?
            .unwrap_or(DEFAULT_TYPE_PAGE_SIZE)
            .min(api.max_page_size);
        Ok(Self {
            content_type,
            descendants: DescendantQuery::from_params(params, traversal)?,
            limit,
            offset: parse_number(params, "offset")?.unwrap_or(0),
        })
    }
}

/// `?limit&offset&content_types=a,b&published&descendant_format=..`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataQuery {
    pub content_types: Vec<String>,
    pub published: Option<bool>,
    pub descendant_format: DescendantFormat,
    pub limit: usize,
    pub offset: usize,
}

impl MetadataQuery {
    pub fn from_params(params: &HashMap<String, String>, api: &ApiConfig) -> Result<Self> {
        let content_types = params
            .get("content_types")
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|t| !t.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        // The flag's presence selects published items; its value is ignored
        let published = params.contains_key("published").then_some(true);

        let limit = parse_number(params, "limit")?
            .unwrap_or(api.max_page_size)
            .min(api.max_page_size);

        Ok(Self {
            content_types,
            published,
            descendant_format: DescendantFormat::from_param(
                params.get("descendant_format").map(String::as_str),
            ),
            limit,
            offset: parse_number(params, "offset")?.unwrap_or(0),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResultSet {
    pub count: usize,
    pub limit: usize,
    pub offset: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageMetadata {
    pub resultset: ResultSet,
}

/// `{ data, metadata: { resultset } }` envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Page<T> {
    pub data: Vec<T>,
    pub metadata: PageMetadata,
}

impl<T> Page<T> {
    fn new(data: Vec<T>, limit: usize, offset: usize) -> Self {
        let count = data.len();
        Self {
            data,
            metadata: PageMetadata {
                resultset: ResultSet { count, limit, offset },
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeDescendants {
    pub id: NodeId,
    pub format: DescendantFormat,
    pub depth_limit: usize,
    pub descendants: Descendants,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemDescendants {
    pub id: NodeId,
    pub title: String,
    pub content_type: String,
    pub descendants: Descendants,
}

/// One row of the content metadata listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContentMetadata {
    pub id: NodeId,
    pub node_path: String,
    pub title: String,
    /// Unix seconds.
    pub date_created: Option<i64>,
    pub date_changed: Option<i64>,
    pub content_type: String,
    pub published: bool,
    pub moderation_state: Vec<String>,
    pub descendants: Descendants,
}

impl ContentMetadata {
    fn from_item(item: ContentItem, descendants: Descendants) -> Self {
        Self {
            id: item.id,
            node_path: item.node_path(),
            title: item.title,
            date_created: item.created.map(|d| d.timestamp()),
            date_changed: item.changed.map(|d| d.timestamp()),
            content_type: item.content_type,
            published: item.published,
            moderation_state: item.moderation_state.into_iter().collect(),
            descendants,
        }
    }
}

/// Descendants of one node. Unknown nodes produce an empty list.
pub fn node_descendants(conn: &Connection, id: NodeId, query: &DescendantQuery) -> Result<NodeDescendants> {
    let descendants = get_descendants(conn, id, query.format, query.depth_limit)?;
    Ok(NodeDescendants {
        id,
        format: query.format,
        depth_limit: query.depth_limit,
        descendants,
    })
}

/// Published items of one content type, each with its descendants.
pub fn type_descendants(conn: &Connection, query: &TypeQuery) -> Result<Page<ItemDescendants>> {
    let filter = ContentFilter::published_of_types([query.content_type.as_str()])
        .page(query.offset, query.limit);

    let mut data = Vec::new();
    for item in find_items(conn, &filter)? {
        let descendants = get_descendants(
            conn,
            item.id,
            query.descendants.format,
            query.descendants.depth_limit,
        )?;
        data.push(ItemDescendants {
            id: item.id,
            title: item.title,
            content_type: item.content_type,
            descendants,
        });
    }
    Ok(Page::new(data, query.limit, query.offset))
}

/// Content listing with per-item metadata and descendants.
pub fn content_metadata(
    conn: &Connection,
    query: &MetadataQuery,
    traversal: &TraversalConfig,
) -> Result<Page<ContentMetadata>> {
    let filter = ContentFilter {
        content_types: query.content_types.clone(),
        published: query.published,
        offset: query.offset,
        limit: Some(query.limit),
    };

    let mut data = Vec::new();
    for item in find_items(conn, &filter)? {
        let descendants = get_descendants(
            conn,
            item.id,
            query.descendant_format,
            traversal.default_limit,
        )?;
        data.push(ContentMetadata::from_item(item, descendants));
    }
    Ok(Page::new(data, query.limit, query.offset))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_parse_node_id() {
        assert_eq!(parse_node_id("42").unwrap(), 42);
        assert!(parse_node_id("abc").is_err());
        assert!(parse_node_id("0").is_err());
        assert!(parse_node_id("-3").is_err());
    }

    #[test]
    fn test_resolve_depth_limit() {
        let traversal = TraversalConfig::default();
        assert_eq!(resolve_depth_limit(None, &traversal).unwrap(), 20);
        assert_eq!(resolve_depth_limit(Some(5), &traversal).unwrap(), 5);
        assert!(resolve_depth_limit(Some(0), &traversal).is_err());
        assert!(resolve_depth_limit(Some(traversal.max_limit + 1), &traversal).is_err());
    }

    #[test]
    fn test_descendant_query_params() {
        let traversal = TraversalConfig::default();
        let query = DescendantQuery::from_params(
            &params(&[("format", "depth"), ("depth_limit", "7")]),
            &traversal,
        )
        .unwrap();
        assert_eq!(query.format, DescendantFormat::Depth);
        assert_eq!(query.depth_limit, 7);

        let err = DescendantQuery::from_params(&params(&[("depth_limit", "lots")]), &traversal)
            .unwrap_err();
        assert!(matches!(err, DescendantError::InvalidInput(_)));
    }

    #[test]
    fn test_type_query_params() {
        let traversal = TraversalConfig::default();
        let api = ApiConfig::default();

        let query = TypeQuery::from_params(&params(&[("content_type", "service_page")]), &traversal, &api)
            .unwrap();
        assert_eq!(query.limit, DEFAULT_TYPE_PAGE_SIZE);
        assert_eq!(query.offset, 0);
        assert_eq!(query.descendants.format, DescendantFormat::Flat);

        let query = TypeQuery::from_params(
            &params(&[("content_type", "org_page"), ("limit", "5000"), ("offset", "40")]),
            &traversal,
            &api,
        )
        .unwrap();
        assert_eq!(query.limit, api.max_page_size);
        assert_eq!(query.offset, 40);

        assert!(TypeQuery::from_params(&params(&[]), &traversal, &api).is_err());
    }

    #[test]
    fn test_metadata_query_params() {
        let api = ApiConfig::default();

        let query = MetadataQuery::from_params(&params(&[]), &api).unwrap();
        assert_eq!(query.limit, 1000);
        assert!(query.content_types.is_empty());
        assert_eq!(query.published, None);
        assert_eq!(query.descendant_format, DescendantFormat::Flat);

        let query = MetadataQuery::from_params(
            &params(&[
                ("content_types", "advisory, org_page,,"),
                ("published", ""),
                ("descendant_format", "depth"),
                ("limit", "10"),
            ]),
            &api,
        )
        .unwrap();
        assert_eq!(query.content_types, vec!["advisory", "org_page"]);
        assert_eq!(query.published, Some(true));
        assert_eq!(query.descendant_format, DescendantFormat::Depth);
        assert_eq!(query.limit, 10);

        let query = MetadataQuery::from_params(&params(&[("published", "0")]), &api).unwrap();
        assert_eq!(query.published, Some(true));
        let query = MetadataQuery::from_params(&params(&[("published", "false")]), &api).unwrap();
        assert_eq!(query.published, Some(true));

        assert!(MetadataQuery::from_params(&params(&[("offset", "-1")]), &api).is_err());
    }

    #[test]
    fn test_page_envelope_shape() {
        let page = Page::new(vec![1, 2], 20, 40);
        let json = serde_json::to_value(&page).unwrap();
        assert_eq!(json["data"], serde_json::json!([1, 2]));
        assert_eq!(json["metadata"]["resultset"]["count"], 2);
        assert_eq!(json["metadata"]["resultset"]["limit"], 20);
        assert_eq!(json["metadata"]["resultset"]["offset"], 40);
    }
}
