//! disclosure-cli: thin `clap` CLI standing in for the out-of-scope HTTP
//! upload surface (§6). Demonstrates `structure_document`/`run_comparison`
//! as idempotent entry points over the file-backed stores.

mod runner;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use disclosure_core::model::IterativeSearchMode;
use disclosure_core::{Config, JobRunnerAdapter, OpenAiClient, TemplateRegistry};
use disclosure_daemon::{Config as DaemonConfig, RetentionSweeper};
use runner::DiskJobRunner;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "disclosure", about = "Disclosure document structuring and comparison")]
struct Cli {
    /// Base storage directory; defaults to the platform data directory.
    #[arg(long, global = true)]
    storage_dir: Option<PathBuf>,

    /// Directory of document-type templates loaded at startup.
    #[arg(long, global = true)]
    templates_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Ingest a PDF and run it through the structuring pipeline.
    Structure {
        /// Path to the source PDF.
        path: PathBuf,
        /// Retention window in hours before the sweeper deletes it.
        #[arg(long, default_value_t = 720)]
        retention_hours: i64,
    },
    /// Compare two or more already-structured documents.
    Compare {
        /// Document ids to compare (at least two).
        #[arg(required = true, num_args = 2..)]
        document_ids: Vec<String>,
        /// Iterative re-exploration mode.
        #[arg(long, default_value = "off")]
        iterative: String,
    },
    /// Print a document's or comparison's progress record.
    Status {
        /// `document:<id>` or `comparison:<id>`.
        key: String,
    },
    /// Run one retention sweep pass immediately.
    Sweep,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = Config::load(None)?;
    let daemon_config = DaemonConfig::load(None)?;
    let base_dir = cli
        .storage_dir
        .map(Ok)
        .unwrap_or_else(|| daemon_config.base_dir())?;
    std::fs::create_dir_all(&base_dir)?;

    let templates = match cli.templates_dir {
        Some(dir) => TemplateRegistry::load_from_dir(&dir)?,
        None => TemplateRegistry::default(),
    };
    let llm = Arc::new(OpenAiClient::from_config(&config)?);
    let runner = DiskJobRunner::new(base_dir.clone(), templates, llm)?;

    match cli.command {
        Command::Structure { path, retention_hours } => {
            let document_id = runner::ingest_pdf(&runner, &path, retention_hours).await?;
            runner.structure_document(document_id.clone()).await?;
            println!("{document_id}");
        }
        Command::Compare { document_ids, iterative } => {
            let mode = parse_iterative_mode(&iterative)?;
            let comparison_id = uuid::Uuid::new_v4().to_string();
            runner
                .run_comparison(comparison_id.clone(), document_ids, mode, Default::default())
                .await?;
            println!("{comparison_id}");
        }
        Command::Status { key } => {
            let progress = runner.progress.get(&key).await?;
            match progress {
                Some(p) => println!("{}", serde_json::to_string_pretty(&p)?),
                None => println!("no progress record for {key}"),
            }
        }
        Command::Sweep => {
            let sweeper = RetentionSweeper::new(runner.metadata, runner.comparisons, base_dir.join("pdfs"));
            let report = sweeper.sweep().await?;
            println!(
                "documents_deleted={} comparisons_deleted={} comparisons_trimmed={}",
                report.documents_deleted, report.comparisons_deleted, report.comparisons_trimmed
            );
        }
    }

    Ok(())
}

fn parse_iterative_mode(s: &str) -> Result<IterativeSearchMode> {
    match s {
        "off" => Ok(IterativeSearchMode::Off),
        "high_only" => Ok(IterativeSearchMode::HighOnly),
        "all" => Ok(IterativeSearchMode::All),
        other => Err(anyhow::anyhow!("unknown iterative mode: {other}")).context("expected off|high_only|all"),
    }
}
