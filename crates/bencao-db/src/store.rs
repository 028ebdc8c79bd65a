//! The storage collaborator seam.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;
use crate::Row;

/// Equality filter on one column.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub column: String,
    pub value: Value,
}

impl Filter {
    pub fn eq(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self { column: column.into(), value: value.into() }
    }

    /// Whether `row` satisfies the filter.
    pub fn matches(&self, row: &Row) -> bool {
        row.get(&self.column) == Some(&self.value)
    }
}

/// Common interface for all storage backends.
///
/// Every call is a single round trip; no transaction spans calls.
#[async_trait]
pub trait Store: Send + Sync {
    /// Backend name for logs.
    fn name(&self) -> &str;

    /// Whether `upsert` is atomic and available. When false, callers fall
    /// back to select-then-insert/update.
    fn supports_upsert(&self) -> bool {
        true
    }

    /// Insert `row`, or merge it into the existing row sharing the values
    /// of `conflict_keys`. Returns the stored row.
    async fn upsert(&self, table: &str, row: Row, conflict_keys: &[&str]) -> Result<Row>;

    /// Rows matching every filter, at most `limit` of them.
    async fn select(&self, table: &str, filters: &[Filter], limit: Option<usize>) -> Result<Vec<Row>>;

    /// Insert a new row. Fails with `DbError::Duplicate` on a unique key clash.
    async fn insert(&self, table: &str, row: Row) -> Result<Row>;

    /// Merge `patch` into every row matching the filters. Returns the updated rows.
    async fn update(&self, table: &str, filters: &[Filter], patch: Row) -> Result<Vec<Row>>;

    /// Remove every row matching the filters. Returns the removed rows.
    /// An empty filter list is refused rather than clearing the table.
    async fn delete(&self, table: &str, filters: &[Filter]) -> Result<Vec<Row>>;

    /// Exact number of rows in `table`.
    async fn count(&self, table: &str) -> Result<usize>;
}
