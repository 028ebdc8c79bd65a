//! bencao-ingestion: Reference-data import pipeline.
//! Covers the full path from import file to storage:
//! - Loading envelope, bare-array and grouped contraindication files
//! - Validation and normalisation per entity kind
//! - Meridian reference resolution for acupoints
//! - Idempotent batch writes with retry
//! - Per-kind result aggregation and the text report

pub mod aggregator;
pub mod error;
pub mod loader;
pub mod pipeline;
pub mod report;
pub mod resolver;
pub mod template;
pub mod validate;
pub mod writer;

pub use aggregator::{ImportResult, ImportTally, ItemError, RunSummary};
pub use error::{ImportError, Result};
pub use loader::{load_data_dir, load_file, parse_records, LoadedRecords};
pub use pipeline::{BatchOptions, ImportBundle, ImportEvent, Importer, TableCounts};
pub use report::{render_report, write_report, DEFAULT_REPORT_FILE};
pub use resolver::MeridianResolver;
pub use template::template;
pub use validate::normalize;
pub use writer::{BatchWriter, RetryPolicy, WriteOutcome};
