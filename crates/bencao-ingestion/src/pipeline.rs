//! Import orchestration.
//!
//! Drives records through validate → resolve → write, batch by batch:
//!   1. Split the input into fixed-size batches
//!   2. Emit a progress event at the start of each batch
//!   3. Validate and write each record, capturing failures per record
//!   4. Pause between batches (racing the cancellation token)
//!   5. Emit the per-kind result
//!
//! A combined run imports the five kinds in `EntityKind::ORDER`. Acupoints
//! take their meridian snapshot only after the meridian phase has returned,
//! so everything written there is visible to the resolver.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bencao_common::EntityKind;
use bencao_db::{DbError, Store};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::aggregator::{ImportResult, ImportTally, RunSummary};
use crate::error::ImportError;
use crate::resolver::MeridianResolver;
use crate::validate::{normalize, raw_identity};
use crate::writer::{BatchWriter, RetryPolicy};

// ── Options ───────────────────────────────────────────────────────────────────

/// Batch size and inter-batch pause for one kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchOptions {
    pub batch_size: usize,
    pub delay: Duration,
}

impl BatchOptions {
    pub fn for_kind(kind: EntityKind) -> Self {
        Self {
            batch_size: kind.default_batch_size(),
            delay: kind.default_batch_delay(),
        }
    }
}

// ── Input bundle ──────────────────────────────────────────────────────────────

/// Raw records for a combined run, keyed by kind.
#[derive(Debug, Clone, Default)]
pub struct ImportBundle {
    records: BTreeMap<EntityKind, Vec<Value>>,
}

impl ImportBundle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append records of `kind`.
    pub fn add(&mut self, kind: EntityKind, records: impl IntoIterator<Item = Value>) {
        self.records.entry(kind).or_default().extend(records);
    }

    pub fn with(mut self, kind: EntityKind, records: Vec<Value>) -> Self {
        self.add(kind, records);
        self
    }

    pub fn get(&self, kind: EntityKind) -> &[Value] {
        self.records.get(&kind).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Total records across kinds.
    pub fn len(&self) -> usize {
        self.records.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ── Progress events ───────────────────────────────────────────────────────────

/// Event emitted during an import (cloneable for broadcast).
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ImportEvent {
    Progress {
        kind: EntityKind,
        processed: usize,
        total: usize,
        phase_percent: u8,
        overall_percent: u8,
        current_item: Option<String>,
    },
    ItemFailed {
        kind: EntityKind,
        item: String,
        error: String,
    },
    PhaseFinished(ImportResult),
}

/// Record counts per reference table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TableCounts {
    pub herbs: usize,
    pub formulas: usize,
    pub contraindications: usize,
    pub meridians: usize,
    pub acupoints: usize,
}

impl TableCounts {
    pub fn get(&self, kind: EntityKind) -> usize {
        match kind {
            EntityKind::Herbs => self.herbs,
            EntityKind::Formulas => self.formulas,
            EntityKind::Contraindications => self.contraindications,
            EntityKind::Meridians => self.meridians,
            EntityKind::Acupoints => self.acupoints,
        }
    }
}

/// Slice of the overall 0–100 range a phase reports into.
#[derive(Debug, Clone, Copy)]
struct Window {
    start: f64,
    span: f64,
}

impl Window {
    const FULL: Window = Window { start: 0.0, span: 100.0 };

    fn at(&self, fraction: f64) -> u8 {
        (self.start + self.span * fraction).round().clamp(0.0, 100.0) as u8
    }
}

/// Split 0–100 across phases in proportion to their record counts.
fn phase_windows(counts: &[usize]) -> Vec<Window> {
    let total: usize = counts.iter().sum();
    let mut start = 0.0;
    counts
        .iter()
        .map(|&n| {
            let span = if total == 0 {
                100.0 / counts.len() as f64
            } else {
                100.0 * n as f64 / total as f64
            };
            let w = Window { start, span };
            start += span;
            w
        })
        .collect()
}

fn percent(processed: usize, total: usize) -> u8 {
    if total == 0 {
        100
    } else {
        ((processed as f64 / total as f64) * 100.0).round() as u8
    }
}

// ── Importer ──────────────────────────────────────────────────────────────────

/// Imports raw records into an injected store.
///
/// Never fails as a whole: every problem is attributed to a record and
/// reported in the returned [`ImportResult`].
pub struct Importer {
    writer: BatchWriter,
    events: Option<broadcast::Sender<ImportEvent>>,
    cancel: CancellationToken,
    batches: HashMap<EntityKind, BatchOptions>,
}

impl Importer {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            writer: BatchWriter::new(store, RetryPolicy::default()),
            events: None,
            cancel: CancellationToken::new(),
            batches: HashMap::new(),
        }
    }

    pub fn with_events(mut self, tx: broadcast::Sender<ImportEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.writer = BatchWriter::new(self.writer.store().clone(), retry);
        self
    }

    pub fn with_batch_options(mut self, kind: EntityKind, options: BatchOptions) -> Self {
        self.batches.insert(kind, options);
        self
    }

    pub fn batch_options(&self, kind: EntityKind) -> BatchOptions {
        self.batches.get(&kind).copied().unwrap_or_else(|| BatchOptions::for_kind(kind))
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        self.writer.store()
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Import records of a single kind.
    pub async fn import(&self, kind: EntityKind, records: &[Value]) -> ImportResult {
        self.run_phase(kind, records, Window::FULL).await
    }

    /// Import every kind of the bundle in dependency order. A failing phase
    /// never stops the next one.
    #[instrument(skip(self, bundle), fields(records = bundle.len()))]
    pub async fn import_all(&self, bundle: &ImportBundle) -> RunSummary {
        let t0 = Instant::now();
        let counts: Vec<usize> = EntityKind::ORDER.iter().map(|k| bundle.get(*k).len()).collect();
        let windows = phase_windows(&counts);

        let mut results = Vec::with_capacity(EntityKind::ORDER.len());
        for (kind, window) in EntityKind::ORDER.into_iter().zip(windows) {
            let result = self.run_phase(kind, bundle.get(kind), window).await;
            results.push(result);
        }

        let summary = RunSummary { results, duration_ms: t0.elapsed().as_millis() as u64 };
        info!(
            total = summary.total(),
            imported = summary.imported(),
            failed = summary.failed(),
            duration_ms = summary.duration_ms,
            "Import run complete"
        );
        summary
    }

    /// Whether the backend answers a trivial read.
    pub async fn check_connection(&self) -> bool {
        match self.store().select(EntityKind::Herbs.table(), &[], Some(1)).await {
            Ok(_) => true,
            Err(e) => {
                warn!(backend = self.store().name(), error = %e, "Connection check failed");
                false
            }
        }
    }

    /// Current number of rows in each reference table.
    pub async fn table_counts(&self) -> Result<TableCounts, DbError> {
        let store = self.store();
        let (herbs, formulas, contraindications, meridians, acupoints) = tokio::try_join!(
            store.count(EntityKind::Herbs.table()),
            store.count(EntityKind::Formulas.table()),
            store.count(EntityKind::Contraindications.table()),
            store.count(EntityKind::Meridians.table()),
            store.count(EntityKind::Acupoints.table()),
        )?;
        Ok(TableCounts { herbs, formulas, contraindications, meridians, acupoints })
    }

    fn emit(&self, event: ImportEvent) {
        if let Some(ref tx) = self.events {
            // No subscribers is fine.
            let _ = tx.send(event);
        }
    }

    fn emit_progress(&self, tally: &ImportTally, window: Window, current_item: Option<String>) {
        self.emit(ImportEvent::Progress {
            kind: tally.kind(),
            processed: tally.processed(),
            total: tally.total(),
            phase_percent: percent(tally.processed(), tally.total()),
            overall_percent: window.at(tally.fraction()),
            current_item,
        });
    }

    async fn run_phase(&self, kind: EntityKind, records: &[Value], window: Window) -> ImportResult {
        let total = records.len();
        let opts = self.batch_options(kind);
        let size = opts.batch_size.max(1);
        let mut tally = ImportTally::new(kind, total);

        info!(
            kind = %kind,
            total,
            batch_size = size,
            delay_ms = opts.delay.as_millis() as u64,
            "Starting import phase"
        );

        // Acupoints need the meridian snapshot; a failed load is reported
        // against each acupoint rather than aborting the phase.
        let resolver = if kind == EntityKind::Acupoints && total > 0 && !self.cancel.is_cancelled() {
            match MeridianResolver::load(self.store().as_ref()).await {
                Ok(r) => Some(Ok(r)),
                Err(e) => {
                    warn!(error = %e, "Failed to load meridian snapshot");
                    Some(Err(e.to_string()))
                }
            }
        } else {
            None
        };

        let mut unprocessed = Vec::new();
        let mut cancelled = false;

        for (b, batch) in records.chunks(size).enumerate() {
            if b > 0 && !opts.delay.is_zero() {
                tokio::select! {
                    _ = self.cancel.cancelled() => {}
                    _ = tokio::time::sleep(opts.delay) => {}
                }
            }
            if self.cancel.is_cancelled() {
                cancelled = true;
                unprocessed = records[b * size..].iter().map(|r| raw_identity(kind, r)).collect();
                warn!(kind = %kind, remaining = unprocessed.len(), "Import cancelled");
                break;
            }

            let current = batch.first().map(|r| raw_identity(kind, r));
            self.emit_progress(&tally, window, current);
            debug!(kind = %kind, batch = b + 1, records = batch.len(), "Processing batch");

            for raw in batch {
                let item = raw_identity(kind, raw);
                let outcome = match normalize(kind, raw) {
                    Err(e) => Err(ImportError::from(e).to_string()),
                    Ok(record) => match &resolver {
                        Some(Err(load_err)) => Err(load_err.clone()),
                        Some(Ok(r)) => self.writer.write(&record, Some(r)).await.map_err(|e| e.to_string()),
                        None => self.writer.write(&record, None).await.map_err(|e| e.to_string()),
                    },
                };

                match outcome {
                    Ok(how) => {
                        debug!(kind = %kind, item = %item, outcome = ?how, "Record written");
                        tally.record_success();
                    }
                    Err(error) => {
                        warn!(kind = %kind, item = %item, error = %error, "Record failed");
                        self.emit(ImportEvent::ItemFailed { kind, item: item.clone(), error: error.clone() });
                        tally.record_failure(item, error);
                    }
                }
            }
        }

        if !cancelled {
            self.emit_progress(&tally, window, None);
        }

        let result = tally.finish(&unprocessed, cancelled);
        info!(
            kind = %kind,
            imported = result.imported,
            failed = result.failed,
            duration_ms = result.duration_ms,
            "Import phase complete"
        );
        self.emit(ImportEvent::PhaseFinished(result.clone()));
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_windows_are_proportional() {
        let w = phase_windows(&[50, 0, 25, 25, 0]);
        assert_eq!(w[0].at(1.0), 50);
        assert_eq!(w[2].at(0.0), 50);
        assert_eq!(w[3].at(1.0), 100);
    }

    #[test]
    fn test_windows_split_evenly_when_empty() {
        let w = phase_windows(&[0, 0, 0, 0, 0]);
        assert_eq!(w[0].at(1.0), 20);
        assert_eq!(w[4].at(1.0), 100);
    }

    #[test]
    fn test_percent_rounds() {
        assert_eq!(percent(0, 3), 0);
        assert_eq!(percent(1, 3), 33);
        assert_eq!(percent(2, 3), 67);
        assert_eq!(percent(0, 0), 100);
    }

    #[test]
    fn test_bundle_appends_per_kind() {
        let mut bundle = ImportBundle::new();
        bundle.add(EntityKind::Herbs, vec![serde_json::json!({"name": "人参"})]);
        bundle.add(EntityKind::Herbs, vec![serde_json::json!({"name": "甘草"})]);
        assert_eq!(bundle.get(EntityKind::Herbs).len(), 2);
        assert!(bundle.get(EntityKind::Acupoints).is_empty());
        assert_eq!(bundle.len(), 2);
    }
}
