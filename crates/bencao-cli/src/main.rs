//! Command-line entry point for the bencao reference-data importer.

mod config;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use bencao_common::compat::{check_combination, check_herb};
use bencao_common::EntityKind;
use bencao_db::{MemoryStore, RestStore, Store};
use bencao_ingestion::template::template_file_name;
use bencao_ingestion::{
    load_data_dir, load_file, template, write_report, ImportEvent, ImportResult, Importer,
};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::Config;

#[derive(Parser)]
#[command(name = "bencao")]
#[command(about = "Import TCM reference data (herbs, formulas, contraindications, meridians, acupoints) into a Supabase/PostgREST backend")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Write to an in-memory store instead of the configured backend
    #[arg(long, global = true)]
    dry_run: bool,

    /// Hide the progress bar
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Import one file
    Import {
        file: PathBuf,
        /// Kind of the records; required for bare JSON arrays
        #[arg(short, long)]
        kind: Option<EntityKind>,
        #[arg(long)]
        batch_size: Option<usize>,
        #[arg(long)]
        delay_ms: Option<u64>,
    },
    /// Import every fixture file of a data directory in dependency order
    ImportAll {
        #[arg(short, long)]
        data_dir: Option<PathBuf>,
        /// Report path (default: <data-dir>/import_report.txt)
        #[arg(long)]
        report: Option<PathBuf>,
        #[arg(long)]
        no_report: bool,
    },
    /// Print the number of rows in each reference table
    Counts,
    /// Check that the backend is reachable
    Check,
    /// Print a sample import file
    Template {
        kind: EntityKind,
        /// File or directory to write the template to
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Show 十八反 / 十九畏 warnings for herbs and their combinations
    Compat {
        #[arg(required = true)]
        herbs: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("bencao=info,warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match &cli.command {
        // Offline commands need neither config nor credentials.
        Command::Template { kind, output } => return print_template(*kind, output.as_deref()),
        Command::Compat { herbs } => {
            print_compat(herbs);
            return Ok(());
        }
        _ => {}
    }

    let mut config = Config::load()?;
    let store = build_store(&config, cli.dry_run)?;
    info!(backend = store.name(), "Storage ready");

    match cli.command {
        Command::Import { file, kind, batch_size, delay_ms } => {
            let loaded = load_file(&file, kind)?;
            let mut opts = config.batch_options(loaded.kind);
            if let Some(n) = batch_size {
                opts.batch_size = n.max(1);
            }
            if let Some(ms) = delay_ms {
                opts.delay = std::time::Duration::from_millis(ms);
            }

            let (importer, progress) = build_importer(&config, store, cli.quiet);
            let importer = importer.with_batch_options(loaded.kind, opts);
            let result = importer.import(loaded.kind, &loaded.records).await;
            drop(importer);
            finish_progress(progress).await;

            print_result(&result);
        }
        Command::ImportAll { data_dir, report, no_report } => {
            if let Some(dir) = data_dir {
                config.import.data_dir = dir;
            }
            let bundle = load_data_dir(&config.import.data_dir)?;

            let (importer, progress) = build_importer(&config, store, cli.quiet);
            let summary = importer.import_all(&bundle).await;
            drop(importer);
            finish_progress(progress).await;

            for result in &summary.results {
                print_result(result);
            }
            println!(
                "Total: {} records, {} imported, {} failed ({} ms)",
                summary.total(),
                summary.imported(),
                summary.failed(),
                summary.duration_ms
            );

            if !no_report {
                let path = report.unwrap_or_else(|| config.report_path());
                write_report(&summary, &path)?;
                info!(path = %path.display(), "Import report written");
            }
        }
        Command::Counts => {
            let importer = Importer::new(store);
            let counts = importer.table_counts().await?;
            println!("{}", serde_json::to_string_pretty(&counts)?);
        }
        Command::Check => {
            let importer = Importer::new(store);
            if importer.check_connection().await {
                println!("Connection OK");
            } else {
                anyhow::bail!("backend is not reachable");
            }
        }
        Command::Template { .. } | Command::Compat { .. } => {}
    }

    Ok(())
}

fn build_store(config: &Config, dry_run: bool) -> anyhow::Result<Arc<dyn Store>> {
    if dry_run {
        info!("Dry run: writing to an in-memory store");
        return Ok(Arc::new(MemoryStore::with_default_schema()));
    }
    let rest = RestStore::new(config.rest_config()?).context("building storage client")?;
    Ok(Arc::new(rest))
}

/// Importer wired to config, Ctrl-C and (unless quiet) a progress bar.
fn build_importer(config: &Config, store: Arc<dyn Store>, quiet: bool) -> (Importer, Option<JoinHandle<()>>) {
    let token = CancellationToken::new();
    let on_interrupt = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, stopping after the current batch");
            on_interrupt.cancel();
        }
    });

    let mut importer = Importer::new(store)
        .with_cancellation(token)
        .with_retry(config.retry_policy());
    for kind in EntityKind::ORDER {
        importer = importer.with_batch_options(kind, config.batch_options(kind));
    }

    if quiet {
        return (importer, None);
    }
    let (tx, rx) = broadcast::channel(1024);
    let progress = tokio::spawn(render_progress(rx));
    (importer.with_events(tx), Some(progress))
}

async fn render_progress(mut rx: broadcast::Receiver<ImportEvent>) {
    let pb = ProgressBar::new(100);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {pos:>3}% {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> "),
    );

    loop {
        match rx.recv().await {
            Ok(ImportEvent::Progress { kind, processed, total, overall_percent, current_item, .. }) => {
                pb.set_position(u64::from(overall_percent));
                let item = current_item.unwrap_or_default();
                pb.set_message(format!("{} {processed}/{total} {item}", kind.label()));
            }
            Ok(ImportEvent::ItemFailed { item, error, .. }) => {
                pb.println(format!("  ✗ {item}: {error}"));
            }
            Ok(ImportEvent::PhaseFinished(result)) => {
                pb.println(format!(
                    "{}: {} imported, {} failed",
                    result.kind.label(),
                    result.imported,
                    result.failed
                ));
            }
            Err(broadcast::error::RecvError::Lagged(n)) => {
                warn!(skipped = n, "Progress display fell behind");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
    pb.finish_and_clear();
}

async fn finish_progress(progress: Option<JoinHandle<()>>) {
    if let Some(handle) = progress {
        if let Err(e) = handle.await {
            warn!(error = %e, "Progress display task failed");
        }
    }
}

fn print_result(result: &ImportResult) {
    println!(
        "{} {}: {} total, {} imported, {} failed{}",
        if result.is_clean() { "✓" } else { "✗" },
        result.kind.label(),
        result.total,
        result.imported,
        result.failed,
        if result.cancelled { " (cancelled)" } else { "" }
    );
    for e in &result.errors {
        println!("  * {}: {}", e.item, e.error);
    }
}

fn print_template(kind: EntityKind, output: Option<&Path>) -> anyhow::Result<()> {
    let text = serde_json::to_string_pretty(&template(kind))?;
    match output {
        Some(path) => {
            let path = if path.is_dir() { path.join(template_file_name(kind)) } else { path.to_path_buf() };
            std::fs::write(&path, text).with_context(|| format!("writing {}", path.display()))?;
            info!(path = %path.display(), kind = %kind, "Template written");
        }
        None => println!("{text}"),
    }
    Ok(())
}

fn print_compat(herbs: &[String]) {
    for herb in herbs {
        let warnings = check_herb(herb);
        if warnings.is_empty() {
            println!("{herb}: no known incompatibilities");
        }
        for w in warnings {
            println!("{herb}: [{:?}] {}", w.level, w.message);
        }
    }
    if herbs.len() > 1 {
        let names: Vec<&str> = herbs.iter().map(String::as_str).collect();
        let conflicts = check_combination(&names);
        if conflicts.is_empty() {
            println!("Combination: no conflicting pairs");
        }
        for c in conflicts {
            println!("{} + {}: [{:?}] {}", c.first, c.second, c.level, c.message);
        }
    }
}
