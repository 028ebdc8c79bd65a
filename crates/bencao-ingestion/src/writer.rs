//! Per-record persistence.
//!
//! Every kind is written idempotently on its natural key. Stores with a
//! native upsert get a single call; others go through select → update or
//! insert, where a unique-key clash on insert means another writer got
//! there first and the record is re-read and updated instead.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use bencao_common::{EntityKind, NormalizedRecord, Row};
use bencao_db::{DbError, Filter, Store};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{ImportError, Result};
use crate::resolver::MeridianResolver;

/// Bound on select/insert rounds in the fallback path.
const MAX_FALLBACK_ROUNDS: usize = 3;

// ── Retry policy ──────────────────────────────────────────────────────────────

/// Exponential backoff for transient storage failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one. `1` disables retries.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    pub fn no_retry() -> Self {
        Self { max_attempts: 1, ..Self::default() }
    }

    /// Backoff before retry number `retry` (1-based), capped at `max_delay`.
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.saturating_sub(1));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// Run `operation`, retrying while it fails with a transient error.
    pub async fn run<F, Fut, T>(&self, operation_name: &str, mut operation: F) -> std::result::Result<T, DbError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<T, DbError>>,
    {
        let mut attempt = 1;
        loop {
            match operation().await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(operation = operation_name, attempt, "storage call succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(err) if err.is_transient() && attempt < self.max_attempts.max(1) => {
                    let delay = self.backoff(attempt);
                    warn!(
                        operation = operation_name,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "transient storage error, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

// ── Writer ────────────────────────────────────────────────────────────────────

/// How a record ended up in storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteOutcome {
    Upserted,
    Inserted,
    Updated,
}

#[derive(Clone)]
pub struct BatchWriter {
    store: Arc<dyn Store>,
    retry: RetryPolicy,
}

impl BatchWriter {
    pub fn new(store: Arc<dyn Store>, retry: RetryPolicy) -> Self {
        Self { store, retry }
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    /// Persist one normalised record.
    ///
    /// Acupoints need `resolver` to turn `meridian_name` into
    /// `meridian_id`; without one every acupoint is unresolvable.
    pub async fn write(
        &self,
        record: &NormalizedRecord,
        resolver: Option<&MeridianResolver>,
    ) -> Result<WriteOutcome> {
        let kind = record.kind();
        let row = match record {
            NormalizedRecord::Acupoint(ap) => {
                let meridian_id = match resolver {
                    Some(r) => r.resolve(&ap.meridian_name)?,
                    None => {
                        return Err(ImportError::ReferenceNotFound {
                            meridian: ap.meridian_name.clone(),
                        })
                    }
                };
                ap.to_storage_row(meridian_id).map_err(DbError::from)?
            }
            other => other.to_row().map_err(DbError::from)?,
        };

        if self.store.supports_upsert() {
            self.upsert(kind, row).await
        } else {
            self.write_without_upsert(kind, row).await
        }
    }

    async fn upsert(&self, kind: EntityKind, row: Row) -> Result<WriteOutcome> {
        let store: &dyn Store = self.store.as_ref();
        let row = &row;
        let table = kind.table();
        let keys = kind.conflict_keys();
        self.retry
            .run("upsert", move || store.upsert(table, row.clone(), keys))
            .await?;
        Ok(WriteOutcome::Upserted)
    }

    async fn write_without_upsert(&self, kind: EntityKind, row: Row) -> Result<WriteOutcome> {
        let store: &dyn Store = self.store.as_ref();
        let table = kind.table();
        let key_filters = key_filters(kind, &row);
        let key_filters = &key_filters;
        let row = &row;

        let mut last_clash = String::new();
        for round in 1..=MAX_FALLBACK_ROUNDS {
            let existing = self
                .retry
                .run("select", move || store.select(table, key_filters, Some(1)))
                .await?;

            if let Some(current) = existing.first() {
                let target = match current.get("id") {
                    Some(id) => vec![Filter::eq("id", id.clone())],
                    None => key_filters.clone(),
                };
                let target = &target;
                let updated = self
                    .retry
                    .run("update", move || store.update(table, target, row.clone()))
                    .await?;
                if !updated.is_empty() {
                    return Ok(WriteOutcome::Updated);
                }
                debug!(table, round, "row vanished before update, retrying");
                last_clash = format!("row in {table} changed concurrently, gave up after {MAX_FALLBACK_ROUNDS} rounds");
                continue;
            }

            match self.retry.run("insert", move || store.insert(table, row.clone())).await {
                Ok(_) => return Ok(WriteOutcome::Inserted),
                Err(DbError::Duplicate(msg)) => {
                    debug!(table, round, "concurrent insert detected, re-reading");
                    last_clash = msg;
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(ImportError::Storage(DbError::Duplicate(last_clash)))
    }
}

fn key_filters(kind: EntityKind, row: &Row) -> Vec<Filter> {
    kind.conflict_keys()
        .iter()
        .map(|k| Filter::eq(*k, row.get(*k).cloned().unwrap_or(Value::Null)))
        .collect()
}
