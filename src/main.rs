//! Binary entry point for memconsult.
//!
//! A thin CLI over [`memconsult::Coordinator`]: every command prints JSON on
//! stdout and logs on stderr (or the configured log file).

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(missing_docs)]
// Allow print_stdout in main binary for CLI output
#![allow(clippy::print_stdout)]
#![allow(clippy::print_stderr)]
// Allow multiple crate versions from transitive dependencies
#![allow(clippy::multiple_crate_versions)]

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use memconsult::models::Document;
use memconsult::observability::{self, InitOptions};
use memconsult::{Context, Coordinator, EngineConfig, Query, StrategyKind};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

/// memconsult - memory consultation coordination engine.
#[derive(Parser)]
#[command(name = "memconsult")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to configuration file.
    #[arg(short, long, global = true, env = "MEMCONSULT_CONFIG_PATH")]
    config: Option<PathBuf>,

    /// Persist stores under this directory instead of memory.
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Expose Prometheus metrics over HTTP while the command runs.
    #[arg(long, global = true)]
    metrics: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands.
#[derive(Subcommand)]
enum Commands {
    /// Answer a query.
    Consult {
        /// The query text.
        query: String,

        /// Code file attached to the context.
        #[arg(long)]
        code: Option<PathBuf>,

        /// Surrounding document attached to the context.
        #[arg(long)]
        document: Option<PathBuf>,

        /// Extra strategies to run (repeatable).
        #[arg(long = "hint")]
        hints: Vec<StrategyKind>,

        /// Files ingested before consulting.
        #[arg(long = "ingest")]
        ingest: Vec<PathBuf>,

        /// Print engine metrics after the result.
        #[arg(long)]
        stats: bool,
    },

    /// Show the routing decision for a query without running strategies.
    Route {
        /// The query text.
        query: String,

        /// Extra strategies to consider (repeatable).
        #[arg(long = "hint")]
        hints: Vec<StrategyKind>,
    },

    /// Run Extract-Cognify-Load over a file.
    Extract {
        /// File to process.
        file: PathBuf,

        /// Maximum entities and relationships listed.
        #[arg(short, long, default_value = "50")]
        limit: usize,
    },

    /// Enrich, embed and store files as documents.
    Ingest {
        /// Files to ingest.
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Validate and show the effective configuration.
    Config,
}

/// Main entry point.
#[tokio::main]
async fn main() -> ExitCode {
    // A missing .env file is the common case.
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let config = match load_config(cli.config.as_deref(), cli.data_dir.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {e:#}");
            return ExitCode::FAILURE;
        },
    };

    let _observability = match observability::init_from_config(
        &config.observability,
        InitOptions {
            verbose: cli.verbose,
            metrics_expose: cli.metrics,
        },
    ) {
        Ok(handle) => handle,
        Err(e) => {
            eprintln!("Failed to initialize observability: {e}");
            return ExitCode::FAILURE;
        },
    };

    match run_command(cli.command, config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        },
    }
}

/// Runs the selected command.
async fn run_command(command: Commands, config: EngineConfig) -> Result<()> {
    match command {
        Commands::Consult {
            query,
            code,
            document,
            hints,
            ingest,
            stats,
        } => cmd_consult(config, query, code, document, hints, ingest, stats).await,
        Commands::Route { query, hints } => cmd_route(config, &query, hints),
        Commands::Extract { file, limit } => cmd_extract(config, &file, limit).await,
        Commands::Ingest { files } => cmd_ingest(config, &files).await,
        Commands::Config => cmd_config(&config),
    }
}

/// Loads configuration: explicit file, else the default location, then
/// environment overrides.
fn load_config(path: Option<&Path>, data_dir: Option<&Path>) -> Result<EngineConfig> {
    let config = match path {
        Some(path) => EngineConfig::load_from_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => EngineConfig::load_default(),
    };
    let config = config.with_env_overrides();
    Ok(match data_dir {
        Some(dir) => config.with_data_dir(dir),
        None => config,
    })
}

fn read_file(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))
}

fn print_json(value: &impl Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn document_from_file(path: &Path) -> Result<Document> {
    let content = read_file(path)?;
    let mut document = Document::new(content).with_source(path.display().to_string());
    if let Some(extension) = path.extension().and_then(|e| e.to_str()) {
        document.language = Some(extension.to_string());
    }
    Ok(document)
}

#[allow(clippy::too_many_arguments)]
async fn cmd_consult(
    config: EngineConfig,
    query: String,
    code: Option<PathBuf>,
    document: Option<PathBuf>,
    hints: Vec<StrategyKind>,
    ingest: Vec<PathBuf>,
    stats: bool,
) -> Result<()> {
    let coordinator = Coordinator::new(config)?;
    for path in &ingest {
        coordinator.ingest(document_from_file(path)?).await?;
    }

    let mut context = Context::new().with_source("cli");
    if let Some(path) = &code {
        context = context.with_field(Context::CODE_FIELD, read_file(path)?);
    }
    if let Some(path) = &document {
        context = context.with_field(Context::DOCUMENT_FIELD, read_file(path)?);
    }
    for hint in hints {
        context = context.with_hint(hint);
    }

    let result = coordinator.consult(query, &context).await;
    print_json(&result)?;
    if stats {
        print_json(&coordinator.metrics())?;
    }
    coordinator.shutdown();
    Ok(())
}

fn cmd_route(config: EngineConfig, query: &str, hints: Vec<StrategyKind>) -> Result<()> {
    let coordinator = Coordinator::new(config)?;
    let context = hints
        .into_iter()
        .fold(Context::new().with_source("cli"), Context::with_hint);
    print_json(&coordinator.route(&Query::from(query), &context))
}

async fn cmd_extract(config: EngineConfig, file: &Path, limit: usize) -> Result<()> {
    #[derive(Serialize)]
    struct ExtractView<'a> {
        report: &'a memconsult::pipeline::PipelineReport,
        graph: memconsult::storage::GraphStats,
        entities: Vec<memconsult::Entity>,
        relationships: Vec<memconsult::Relationship>,
    }

    let content = read_file(file)?;
    let coordinator = Coordinator::new(config)?;
    let report = coordinator
        .run_pipeline(&content, &file.display().to_string())
        .await;
    print_json(&ExtractView {
        report: &report,
        graph: coordinator.graph_stats()?,
        entities: coordinator.entities(limit)?,
        relationships: coordinator.relationships(limit)?,
    })?;

    if let Some(error) = report.first_error() {
        anyhow::bail!("pipeline did not complete: {error}");
    }
    Ok(())
}

async fn cmd_ingest(config: EngineConfig, files: &[PathBuf]) -> Result<()> {
    if config.in_memory {
        tracing::warn!("ingesting into an in-memory store; pass --data-dir to keep documents");
    }
    let coordinator = Coordinator::new(config)?;
    let mut reports = Vec::with_capacity(files.len());
    for path in files {
        let report = coordinator
            .ingest(document_from_file(path)?)
            .await
            .with_context(|| format!("ingesting {}", path.display()))?;
        reports.push(report);
    }
    print_json(&reports)?;
    coordinator.shutdown();
    Ok(())
}

fn cmd_config(config: &EngineConfig) -> Result<()> {
    config.validate()?;
    println!("{config:#?}");
    println!("fingerprint: {}", config.fingerprint());
    Ok(())
}
