//! Plain-text import report.

use std::fmt::Write as _;
use std::path::Path;

use chrono::{SecondsFormat, Utc};

use crate::aggregator::RunSummary;
use crate::error::{ImportError, Result};

/// File name used when no report path is configured.
pub const DEFAULT_REPORT_FILE: &str = "import_report.txt";

pub fn render_report(summary: &RunSummary) -> String {
    let mut out = String::new();
    // Writing to a String cannot fail.
    let _ = write_report_text(&mut out, summary);
    out
}

fn write_report_text(out: &mut String, summary: &RunSummary) -> std::fmt::Result {
    writeln!(out, "========== 中医药数据导入报告 ==========")?;
    writeln!(out, "Generated: {}", Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true))?;
    writeln!(out)?;

    for result in &summary.results {
        writeln!(out, "{}:", result.kind.label())?;
        writeln!(out, "- Total: {}", result.total)?;
        writeln!(out, "- Imported: {}", result.imported)?;
        writeln!(out, "- Failed: {}", result.failed)?;
        if result.cancelled {
            writeln!(out, "- Cancelled before completion")?;
        }
        if !result.errors.is_empty() {
            writeln!(out, "- Errors:")?;
            for e in &result.errors {
                writeln!(out, "  * {}: {}", e.item, e.error)?;
            }
        }
        writeln!(out)?;
    }

    writeln!(out, "Totals:")?;
    writeln!(out, "- Records: {}", summary.total())?;
    writeln!(out, "- Imported: {}", summary.imported())?;
    writeln!(out, "- Failed: {}", summary.failed())?;
    writeln!(out, "- Duration: {} ms", summary.duration_ms)?;
    writeln!(out, "========================================")
}

/// Render and write the report to `path`, creating parent directories.
pub fn write_report(summary: &RunSummary, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .map_err(|source| ImportError::Output { path: parent.to_path_buf(), source })?;
    }
    std::fs::write(path, render_report(summary))
        .map_err(|source| ImportError::Output { path: path.to_path_buf(), source })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::ImportTally;
    use bencao_common::EntityKind;

    fn summary() -> RunSummary {
        let mut herbs = ImportTally::new(EntityKind::Herbs, 2);
        herbs.record_success();
        herbs.record_failure("<unnamed herb>", "validation failed: missing required field: name");
        let formulas = ImportTally::new(EntityKind::Formulas, 0);
        RunSummary {
            results: vec![herbs.finish(&[], false), formulas.finish(&[], false)],
            duration_ms: 12,
        }
    }

    #[test]
    fn test_report_lists_counts_and_errors() {
        let text = render_report(&summary());
        assert!(text.contains("Herbs (中药):\n- Total: 2\n- Imported: 1\n- Failed: 1"));
        assert!(text.contains("  * <unnamed herb>: validation failed: missing required field: name"));
        assert!(text.contains("Formulas (方剂):\n- Total: 0"));
        assert!(text.contains("Totals:\n- Records: 2\n- Imported: 1\n- Failed: 1"));
    }

    #[test]
    fn test_write_report_creates_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join(DEFAULT_REPORT_FILE);
        write_report(&summary(), &path).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("========== 中医药数据导入报告"));
    }

    #[test]
    fn test_unwritable_report_is_output_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("taken");
        std::fs::write(&blocker, "not a directory").unwrap();

        let err = write_report(&summary(), &blocker.join(DEFAULT_REPORT_FILE)).unwrap_err();
        match err {
            ImportError::Output { path, .. } => assert_eq!(path, blocker),
            other => panic!("expected output error, got {other:?}"),
        }
    }
}
