//! In-process store for tests and dry runs.

use std::collections::HashMap;

use async_trait::async_trait;
use bencao_common::EntityKind;
use chrono::Utc;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::error::{DbError, Result};
use crate::store::{Filter, Store};
use crate::Row;

/// Tables of JSON rows behind a lock.
///
/// Inserted rows get a UUID `id` and a `created_at` timestamp unless the
/// caller supplies them. Unique constraints are opt-in per table.
#[derive(Debug)]
pub struct MemoryStore {
    tables: RwLock<HashMap<String, Vec<Row>>>,
    unique: HashMap<String, Vec<Vec<String>>>,
    upsert_enabled: bool,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(HashMap::new()),
            unique: HashMap::new(),
            upsert_enabled: true,
        }
    }

    /// A store with the reference-data tables and their unique keys.
    pub fn with_default_schema() -> Self {
        EntityKind::ORDER
            .iter()
            .fold(Self::new(), |store, kind| store.with_unique(kind.table(), kind.conflict_keys()))
    }

    /// Declare a unique constraint over `keys` on `table`.
    pub fn with_unique(mut self, table: &str, keys: &[&str]) -> Self {
        self.unique
            .entry(table.to_string())
            .or_default()
            .push(keys.iter().map(|k| k.to_string()).collect());
        self
    }

    /// Report no upsert support, forcing callers onto select-then-write.
    pub fn without_upsert(mut self) -> Self {
        self.upsert_enabled = false;
        self
    }

    /// Snapshot of a table's rows in insertion order.
    pub async fn rows(&self, table: &str) -> Vec<Row> {
        self.tables.read().await.get(table).cloned().unwrap_or_default()
    }

    /// Seed rows directly, bypassing constraints.
    pub async fn seed(&self, table: &str, rows: impl IntoIterator<Item = Row>) {
        let mut tables = self.tables.write().await;
        let entries = tables.entry(table.to_string()).or_default();
        for row in rows {
            entries.push(stamp(row));
        }
    }

    fn clash(&self, table: &str, rows: &[Row], candidate: &Row, skip: Option<usize>) -> Option<String> {
        let constraints = self.unique.get(table)?;
        for keys in constraints {
            let hit = rows.iter().enumerate().any(|(i, existing)| {
                Some(i) != skip && keys.iter().all(|k| existing.get(k) == candidate.get(k))
            });
            if hit {
                return Some(format!(
                    "duplicate key value violates unique constraint on {table} ({})",
                    keys.join(", ")
                ));
            }
        }
        None
    }
}

fn stamp(mut row: Row) -> Row {
    row.entry("id").or_insert_with(|| Value::String(Uuid::new_v4().to_string()));
    row.entry("created_at")
        .or_insert_with(|| Value::String(Utc::now().to_rfc3339()));
    row
}

fn merge(target: &mut Row, patch: Row) {
    for (k, v) in patch {
        if k == "id" || k == "created_at" {
            continue;
        }
        target.insert(k, v);
    }
}

#[async_trait]
impl Store for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    fn supports_upsert(&self) -> bool {
        self.upsert_enabled
    }

    async fn upsert(&self, table: &str, row: Row, conflict_keys: &[&str]) -> Result<Row> {
        if !self.upsert_enabled {
            return Err(DbError::Api {
                status: 501,
                code: None,
                message: "upsert not supported by this store".to_string(),
            });
        }

        let mut tables = self.tables.write().await;
        let rows = tables.entry(table.to_string()).or_default();

        let existing = rows
            .iter()
            .position(|r| conflict_keys.iter().all(|k| r.get(*k) == row.get(*k)));

        match existing {
            Some(i) => {
                let mut merged = rows[i].clone();
                merge(&mut merged, row);
                if let Some(msg) = self.clash(table, rows, &merged, Some(i)) {
                    return Err(DbError::Duplicate(msg));
                }
                rows[i] = merged.clone();
                debug!(table, "memory upsert merged existing row");
                Ok(merged)
            }
            None => {
                if let Some(msg) = self.clash(table, rows, &row, None) {
                    return Err(DbError::Duplicate(msg));
                }
                let row = stamp(row);
                rows.push(row.clone());
                Ok(row)
            }
        }
    }

    async fn select(&self, table: &str, filters: &[Filter], limit: Option<usize>) -> Result<Vec<Row>> {
        let tables = self.tables.read().await;
        let Some(rows) = tables.get(table) else {
            return Ok(Vec::new());
        };
        Ok(rows
            .iter()
            .filter(|r| filters.iter().all(|f| f.matches(r)))
            .take(limit.unwrap_or(usize::MAX))
            .cloned()
            .collect())
    }

    async fn insert(&self, table: &str, row: Row) -> Result<Row> {
        let mut tables = self.tables.write().await;
        let rows = tables.entry(table.to_string()).or_default();
        if let Some(msg) = self.clash(table, rows, &row, None) {
            return Err(DbError::Duplicate(msg));
        }
        let row = stamp(row);
        rows.push(row.clone());
        Ok(row)
    }

    async fn update(&self, table: &str, filters: &[Filter], patch: Row) -> Result<Vec<Row>> {
        let mut tables = self.tables.write().await;
        let Some(rows) = tables.get_mut(table) else {
            return Ok(Vec::new());
        };

        let targets: Vec<usize> = rows
            .iter()
            .enumerate()
            .filter(|(_, r)| filters.iter().all(|f| f.matches(r)))
            .map(|(i, _)| i)
            .collect();

        let mut updated = Vec::with_capacity(targets.len());
        for i in targets {
            let mut merged = rows[i].clone();
            merge(&mut merged, patch.clone());
            if let Some(msg) = self.clash(table, rows, &merged, Some(i)) {
                return Err(DbError::Duplicate(msg));
            }
            rows[i] = merged.clone();
            updated.push(merged);
        }
        Ok(updated)
    }

    async fn delete(&self, table: &str, filters: &[Filter]) -> Result<Vec<Row>> {
        if filters.is_empty() {
            return Err(DbError::Config(format!("refusing unfiltered delete on {table}")));
        }
        let mut tables = self.tables.write().await;
        let Some(rows) = tables.get_mut(table) else {
            return Ok(Vec::new());
        };
        let (removed, kept): (Vec<Row>, Vec<Row>) = std::mem::take(rows)
            .into_iter()
            .partition(|r| filters.iter().all(|f| f.matches(r)));
        *rows = kept;
        Ok(removed)
    }

    async fn count(&self, table: &str) -> Result<usize> {
        Ok(self.tables.read().await.get(table).map(Vec::len).unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn row(value: Value) -> Row {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[tokio::test]
    async fn test_insert_stamps_id_and_created_at() {
        let store = MemoryStore::new();
        let stored = store.insert("herbs", row(json!({"name": "人参"}))).await.unwrap();
        assert!(stored.get("id").and_then(Value::as_str).is_some());
        assert!(stored.contains_key("created_at"));
        assert_eq!(store.count("herbs").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_insert_rejects_unique_clash() {
        let store = MemoryStore::with_default_schema();
        store.insert("herbs", row(json!({"name": "人参"}))).await.unwrap();
        let err = store.insert("herbs", row(json!({"name": "人参"}))).await.unwrap_err();
        assert!(matches!(err, DbError::Duplicate(_)));
    }

    #[tokio::test]
    async fn test_upsert_merges_on_conflict_keys() {
        let store = MemoryStore::with_default_schema();
        let first = store
            .upsert("herbs", row(json!({"name": "人参", "nature": "温"})), &["name"])
            .await
            .unwrap();
        let second = store
            .upsert("herbs", row(json!({"name": "人参", "nature": "微温"})), &["name"])
            .await
            .unwrap();

        assert_eq!(first.get("id"), second.get("id"));
        let rows = store.rows("herbs").await;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("nature"), Some(&json!("微温")));
    }

    #[tokio::test]
    async fn test_composite_key_allows_same_name_on_other_meridian() {
        let store = MemoryStore::with_default_schema();
        let keys = EntityKind::Acupoints.conflict_keys();
        store
            .upsert("acupoints", row(json!({"name": "中府", "meridian_id": "a"})), keys)
            .await
            .unwrap();
        store
            .upsert("acupoints", row(json!({"name": "中府", "meridian_id": "b"})), keys)
            .await
            .unwrap();
        assert_eq!(store.count("acupoints").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_select_filters_and_limits() {
        let store = MemoryStore::new();
        store
            .seed(
                "meridians",
                vec![
                    row(json!({"name": "手太阴肺经", "type": "regular"})),
                    row(json!({"name": "督脉", "type": "extraordinary"})),
                    row(json!({"name": "任脉", "type": "extraordinary"})),
                ],
            )
            .await;

        let hits = store
            .select("meridians", &[Filter::eq("type", "extraordinary")], Some(1))
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].get("name"), Some(&json!("督脉")));
        assert!(store.select("missing", &[], None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_update_keeps_id() {
        let store = MemoryStore::new();
        let stored = store.insert("herbs", row(json!({"name": "甘草"}))).await.unwrap();
        let updated = store
            .update(
                "herbs",
                &[Filter::eq("name", "甘草")],
                row(json!({"id": "other", "taste": "甘"})),
            )
            .await
            .unwrap();
        assert_eq!(updated.len(), 1);
        assert_eq!(updated[0].get("id"), stored.get("id"));
        assert_eq!(updated[0].get("taste"), Some(&json!("甘")));
    }

    #[tokio::test]
    async fn test_delete_needs_filter() {
        let store = MemoryStore::new();
        store.insert("herbs", row(json!({"name": "人参"}))).await.unwrap();
        store.insert("herbs", row(json!({"name": "甘草"}))).await.unwrap();

        assert!(store.delete("herbs", &[]).await.is_err());
        let removed = store.delete("herbs", &[Filter::eq("name", "人参")]).await.unwrap();
        assert_eq!(removed.len(), 1);
        assert_eq!(store.count("herbs").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_without_upsert_refuses_upsert() {
        let store = MemoryStore::with_default_schema().without_upsert();
        assert!(!store.supports_upsert());
        assert!(store.upsert("herbs", row(json!({"name": "x"})), &["name"]).await.is_err());
    }
}
