//! docqa CLI: ingest PDFs into a domain corpus and inspect retrieval.
//!
//! ```bash
//! docqa process handbook.pdf --domain hr
//! docqa process-dir ./finance-docs --domain finance
//! docqa search "how many vacation days" --domain hr -k 5 --threshold 0.85
//! docqa verify --domain hr
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use doc_rag::{AppConfig, DocRag, SearchQuery, telemetry};
use tracing::Level;
use tracing_subscriber::{Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "docqa")]
#[command(about = "Domain document QA: PDF ingestion and retrieval")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Process one PDF into the domain's vector store
    Process {
        /// PDF file to ingest
        file: PathBuf,

        /// Target domain (case-insensitive)
        #[arg(long)]
        domain: String,
    },

    /// Process every PDF under a directory into the domain's vector store
    ProcessDir {
        /// Directory scanned recursively for *.pdf
        dir: PathBuf,

        #[arg(long)]
        domain: String,
    },

    /// Search a domain's vector store and print the ranked chunks
    Search {
        query: String,

        #[arg(long)]
        domain: String,

        /// Number of results (defaults to RAG_TOP_K)
        #[arg(short, long)]
        k: Option<usize>,

        /// Maximum squared L2 distance (defaults to RAG_SCORE_THRESHOLD)
        #[arg(long)]
        threshold: Option<f32>,
    },

    /// Load a domain's active index with integrity checks and print its counts
    Verify {
        #[arg(long)]
        domain: String,
    },
}

fn main() -> ExitCode {
    // A missing .env is fine; the process environment still applies.
    dotenvy::dotenv().ok();

    let (writer, writer_err) = match telemetry::LogWriter::from_env() {
        Ok(w) => (w, None),
        Err(e) => (telemetry::LogWriter::default(), Some(e)),
    };
    tracing_subscriber::registry()
        .with(telemetry::env_filter_with_level("warn", Level::INFO))
        .with(telemetry::layer_to(writer))
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_filter(tracing_subscriber::filter::filter_fn(|meta| {
                    !meta.target().starts_with(telemetry::TARGET_PREFIX)
                })),
        )
        .init();
    if let Some(e) = writer_err {
        tracing::warn!("{e}; logging to stderr");
    }

    match run(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {:#}", "❌ Error:".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let cfg = AppConfig::from_env().context("loading configuration")?;
    let rag = DocRag::new(cfg)?;

    match cli.command {
        Commands::Process { file, domain } => {
            let report = rag.process_pdf(&file, &domain)?;
            let name = file
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| file.display().to_string());
            println!(
                "{} {} → {} ({} chunks, dim {})",
                "✅ Processed".green(),
                name,
                report.location.display(),
                report.chunks,
                report.dimension
            );
        }

        Commands::ProcessDir { dir, domain } => {
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
                .context("starting tokio runtime")?;
            let report = runtime.block_on(rag.process_directory(&dir, &domain))?;

            println!(
                "{} {} file(s) → {} ({} chunks)",
                "✅ Processed".green(),
                report.succeeded.len(),
                report.location().display(),
                report.build.chunks
            );
            if !report.failed.is_empty() {
                println!("{} {} file(s) skipped:", "⚠".yellow(), report.failed.len());
                for (path, err) in &report.failed {
                    println!("  - {}: {}", path.display(), err);
                }
            }
        }

        Commands::Search {
            query,
            domain,
            k,
            threshold,
        } => {
            let retriever = rag.load_retriever(&domain)?;
            let defaults = rag.config().search;
            let q = SearchQuery::new(&query)
                .with_top_k(k.unwrap_or(defaults.top_k))
                .with_threshold(threshold.or(defaults.score_threshold));
            q.validate().context("invalid --threshold or -k")?;

            let hits = retriever.search(q)?;
            if hits.is_empty() {
                println!("{}", "No sources found.".yellow());
            }
            for (rank, hit) in hits.iter().enumerate() {
                println!(
                    "{}. [{:.4}] {} (chunk {})",
                    rank + 1,
                    hit.score,
                    hit.chunk.citation().bold(),
                    hit.chunk.meta.chunk_id
                );
                println!("   {}", hit.chunk.text.replace('\n', " "));
            }
        }

        Commands::Verify { domain } => {
            let summary = rag
                .verify(&domain)
                .with_context(|| format!("vector store for '{domain}' failed verification"))?;
            println!(
                "Vector store contains {} vectors ({} chunks from {} documents, dim {}, {})",
                summary.vectors,
                summary.chunks,
                summary.documents,
                summary.dimension,
                summary.embedder_name
            );
            println!("  location: {}", summary.location.display());
            println!("  built at: {}", summary.built_at);
            println!("{}", "✅ Vector store is valid".green());
        }
    }
    Ok(())
}
