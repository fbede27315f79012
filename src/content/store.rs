//! SQLite-backed content storage.
//!
//! Functions take a borrowed connection so they can run inside the caller's
//! transaction (reindex loads the item under the same write lock it uses to
//! replace the item's edges).

use chrono::Utc;
use rusqlite::types::Value;
use rusqlite::{params, Connection, OptionalExtension};

use super::{ContentItem, NodeId};
use crate::error::Result;

/// Export file an item was imported from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemSource {
    pub source_path: String,
    pub file_hash: String,
}

/// Item selection for listings and backfill.
#[derive(Debug, Clone, Default)]
pub struct ContentFilter {
    /// Restrict to these content types; empty means all types.
    pub content_types: Vec<String>,
    pub published: Option<bool>,
    pub offset: usize,
    pub limit: Option<usize>,
}

impl ContentFilter {
    pub fn published_of_types<I, S>(types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            content_types: types.into_iter().map(Into::into).collect(),
            published: Some(true),
            ..Self::default()
        }
    }

    pub fn page(mut self, offset: usize, limit: usize) -> Self {
        self.offset = offset;
        self.limit = Some(limit);
        self
    }

    fn to_sql(&self, columns: &str) -> (String, Vec<Value>) {
        let mut sql = format!("SELECT {} FROM content_items", columns);
        let mut conditions = Vec::new();
        let mut values = Vec::new();

        if !self.content_types.is_empty() {
            let placeholders = self
                .content_types
                .iter()
                .map(|_| "?")
                .collect::<Vec<_>>()
                .join(",");
            conditions.push(format!("content_type IN ({})", placeholders));
            values.extend(self.content_types.iter().cloned().map(Value::Text));
        }

        if let Some(published) = self.published {
            conditions.push("published = ?".to_string());
            values.push(Value::Integer(i64::from(published)));
        }

        if !conditions.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&conditions.join(" AND "));
        }

        // LIMIT -1 is "no limit" in SQLite
        sql.push_str(" ORDER BY id LIMIT ? OFFSET ?");
        let limit = self
            .limit
            .map(|l| i64::try_from(l).unwrap_or(i64::MAX))
            .unwrap_or(-1);
        values.push(Value::Integer(limit));
        values.push(Value::Integer(i64::try_from(self.offset).unwrap_or(i64::MAX)));

        (sql, values)
    }
}

/// Load one item. `None` when it does not exist.
pub fn load_item(conn: &Connection, id: NodeId) -> Result<Option<ContentItem>> {
    let json: Option<String> = conn
        .query_row(
            "SELECT item_json FROM content_items WHERE id = ?1",
            params![id],
            |row| row.get(0),
        )
        .optional()?;

    match json {
        Some(json) => Ok(Some(serde_json::from_str(&json)?)),
        None => Ok(None),
    }
}

/// Load several items in the order given, skipping ids that do not exist.
pub fn load_items(conn: &Connection, ids: &[NodeId]) -> Result<Vec<ContentItem>> {
    let mut items = Vec::with_capacity(ids.len());
    for &id in ids {
        if let Some(item) = load_item(conn, id)? {
            items.push(item);
        }
    }
    Ok(items)
}

/// Ids of items matching `filter`, ascending.
pub fn find_item_ids(conn: &Connection, filter: &ContentFilter) -> Result<Vec<NodeId>> {
    let (sql, values) = filter.to_sql("id");
    let mut stmt = conn.prepare(&sql)?;
    let ids = stmt
        .query_map(rusqlite::params_from_iter(values), |row| row.get::<_, NodeId>(0))?
        .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;
    Ok(ids)
}

/// Items matching `filter`, ascending by id.
pub fn find_items(conn: &Connection, filter: &ContentFilter) -> Result<Vec<ContentItem>> {
    let (sql, values) = filter.to_sql("item_json");
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(rusqlite::params_from_iter(values), |row| row.get::<_, String>(0))?;

    let mut items = Vec::new();
    for row in rows {
        items.push(serde_json::from_str(&row?)?);
    }
    Ok(items)
}

/// Insert or replace an item.
///
/// When `source` is given and another item was previously imported from the
/// same file, that item is removed. Returns the ids removed that way; callers
/// should reindex them.
pub fn save_item(
    conn: &Connection,
    item: &ContentItem,
    source: Option<&ItemSource>,
) -> Result<Vec<NodeId>> {
    let item_json = serde_json::to_string(item)?;
    let now = Utc::now().to_rfc3339();

    let mut displaced = Vec::new();
    if let Some(source) = source {
        let mut stmt =
            conn.prepare("SELECT id FROM content_items WHERE source_path = ?1 AND id != ?2")?;
        displaced = stmt
            .query_map(params![source.source_path, item.id], |row| row.get::<_, NodeId>(0))?
            .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;
        for id in &displaced {
            conn.execute("DELETE FROM content_items WHERE id = ?1", params![id])?;
        }
    }

    conn.execute(
        r#"
        INSERT INTO content_items (
            id, content_type, title, published, item_json, source_path, file_hash, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
        ON CONFLICT(id) DO UPDATE SET
            content_type = excluded.content_type,
            title = excluded.title,
            published = excluded.published,
            item_json = excluded.item_json,
            source_path = COALESCE(excluded.source_path, content_items.source_path),
            file_hash = COALESCE(excluded.file_hash, content_items.file_hash),
            updated_at = excluded.updated_at
        "#,
        params![
            item.id,
            item.content_type,
            item.title,
            item.published,
            item_json,
            source.map(|s| s.source_path.as_str()),
            source.map(|s| s.file_hash.as_str()),
            now,
        ],
    )?;

    Ok(displaced)
}

/// Delete an item. Returns whether it existed.
pub fn delete_item(conn: &Connection, id: NodeId) -> Result<bool> {
    let n = conn.execute("DELETE FROM content_items WHERE id = ?1", params![id])?;
    Ok(n > 0)
}
