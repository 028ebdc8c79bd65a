//! Per-kind tallies and the run summary.

use std::time::Instant;

use bencao_common::EntityKind;
use serde::Serialize;

use crate::error::ImportError;

/// A failed record and why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemError {
    pub item: String,
    pub error: String,
}

/// Outcome of importing one kind.
#[derive(Debug, Clone, Serialize)]
pub struct ImportResult {
    pub kind: EntityKind,
    pub total: usize,
    pub imported: usize,
    pub failed: usize,
    pub errors: Vec<ItemError>,
    pub duration_ms: u64,
    pub cancelled: bool,
}

impl ImportResult {
    pub fn is_clean(&self) -> bool {
        self.failed == 0 && !self.cancelled
    }
}

/// Running count for one kind. `imported + failed` never exceeds `total`,
/// and [`finish`](Self::finish) makes it equal.
#[derive(Debug)]
pub struct ImportTally {
    kind: EntityKind,
    total: usize,
    imported: usize,
    errors: Vec<ItemError>,
    started: Instant,
}

impl ImportTally {
    pub fn new(kind: EntityKind, total: usize) -> Self {
        Self {
            kind,
            total,
            imported: 0,
            errors: Vec::new(),
            started: Instant::now(),
        }
    }

    pub fn record_success(&mut self) {
        self.imported += 1;
    }

    pub fn record_failure(&mut self, item: impl Into<String>, error: impl ToString) {
        self.errors.push(ItemError { item: item.into(), error: error.to_string() });
    }

    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn processed(&self) -> usize {
        self.imported + self.errors.len()
    }

    /// Share of records processed, in `[0, 1]`. An empty input counts as done.
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            1.0
        } else {
            self.processed() as f64 / self.total as f64
        }
    }

    /// Close the tally. Records never reached are counted as failed
    /// under `unprocessed` so the totals always reconcile.
    pub fn finish(mut self, unprocessed: &[String], cancelled: bool) -> ImportResult {
        for item in unprocessed {
            self.errors.push(ItemError { item: item.clone(), error: ImportError::Cancelled.to_string() });
        }
        let failed = self.errors.len();
        ImportResult {
            kind: self.kind,
            total: self.total,
            imported: self.imported,
            failed,
            errors: self.errors,
            duration_ms: self.started.elapsed().as_millis() as u64,
            cancelled,
        }
    }
}

/// Results of a combined run, in import order.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    pub results: Vec<ImportResult>,
    pub duration_ms: u64,
}

impl RunSummary {
    pub fn get(&self, kind: EntityKind) -> Option<&ImportResult> {
        self.results.iter().find(|r| r.kind == kind)
    }

    pub fn total(&self) -> usize {
        self.results.iter().map(|r| r.total).sum()
    }

    pub fn imported(&self) -> usize {
        self.results.iter().map(|r| r.imported).sum()
    }

    pub fn failed(&self) -> usize {
        self.results.iter().map(|r| r.failed).sum()
    }

    pub fn cancelled(&self) -> bool {
        self.results.iter().any(|r| r.cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_empty_tally_reconciles() {
        let tally = ImportTally::new(EntityKind::Herbs, 0);
        assert_eq!(tally.fraction(), 1.0);
        let r = tally.finish(&[], false);
        assert_eq!((r.total, r.imported, r.failed), (0, 0, 0));
        assert!(r.is_clean());
    }

    #[test]
    fn test_cancelled_remainder_counts_as_failed() {
        let mut tally = ImportTally::new(EntityKind::Formulas, 4);
        tally.record_success();
        tally.record_failure("六味地黄丸", "missing required field: composition");
        assert_eq!(tally.fraction(), 0.5);

        let r = tally.finish(&["八珍汤".to_string()], true);
        assert_eq!(r.imported, 1);
        assert_eq!(r.failed, 2);
        assert!(r.cancelled);
        assert_eq!(r.errors[1], ItemError { item: "八珍汤".into(), error: "import cancelled".into() });
    }

    #[test]
    fn test_summary_totals() {
        let mut a = ImportTally::new(EntityKind::Herbs, 2);
        a.record_success();
        a.record_failure("x", "bad");
        let mut b = ImportTally::new(EntityKind::Meridians, 1);
        b.record_success();

        let summary = RunSummary { results: vec![a.finish(&[], false), b.finish(&[], false)], duration_ms: 5 };
        assert_eq!(summary.total(), 3);
        assert_eq!(summary.imported(), 2);
        assert_eq!(summary.failed(), 1);
        assert_eq!(summary.get(EntityKind::Meridians).map(|r| r.imported), Some(1));
        assert!(summary.get(EntityKind::Acupoints).is_none());
    }
}
