//! jobscan CLI
//!
//! Runs one artifact query against a local record database and a directory
//! laid out like the artifact bucket, and prints the JSON response.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use jobscan::{
    EngineConfig, FsArtifactStore, Manager, MemoryCache, QueryParams, QuerySources,
    SqliteRecordStore,
};

#[derive(Parser, Debug)]
#[command(name = "jobscan", version, about = "Search CI job-run artifacts for matching lines")]
struct Cli {
    /// Engine configuration (TOML); defaults apply when omitted
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Query artifacts of one or more job runs
    Query(QueryArgs),
}

#[derive(Args, Debug)]
struct QueryArgs {
    /// SQLite database holding job-run records
    #[arg(long)]
    records: PathBuf,

    /// Directory standing in for the artifact bucket
    #[arg(long)]
    bucket_dir: PathBuf,

    /// Comma-separated job-run ids
    #[arg(long)]
    runs: String,

    /// Glob relative to each job run's artifact prefix
    #[arg(long)]
    glob: String,

    /// Match lines containing this text
    #[arg(long, conflicts_with = "regex")]
    contains: Option<String>,

    /// Match lines against this regex
    #[arg(long)]
    regex: Option<String>,

    /// Context lines before each match
    #[arg(long)]
    before: Option<usize>,

    /// Context lines after each match
    #[arg(long)]
    after: Option<usize>,

    /// Matches reported per file
    #[arg(long)]
    max_matches: Option<usize>,
}

impl QueryArgs {
    fn to_params(&self) -> QueryParams {
        QueryParams {
            prow_job_runs: Some(self.runs.clone()),
            path_glob: Some(self.glob.clone()),
            text_contains: self.contains.clone(),
            text_regex: self.regex.clone(),
            before_context: self.before.map(|n| n.to_string()),
            after_context: self.after.map(|n| n.to_string()),
            max_file_matches: self.max_matches.map(|n| n.to_string()),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => EngineConfig::default(),
    };

    match cli.command {
        Command::Query(args) => run_query(config, args).await,
    }
}

async fn run_query(config: EngineConfig, args: QueryArgs) -> Result<()> {
    let query = args.to_params().to_query().map_err(|e| {
        anyhow::anyhow!("invalid parameter {}: {}", e.param(), e)
    })?;

    let records = SqliteRecordStore::open_readonly(&args.records)
        .with_context(|| format!("failed to open records {}", args.records.display()))?;
    let artifacts = FsArtifactStore::new(&args.bucket_dir);
    let sources = QuerySources::new(Arc::new(records), Arc::new(artifacts))
        .with_cache(Arc::new(MemoryCache::new()));

    let manager = Manager::new(config, sources)?;
    let response = manager.query(query).await;
    info!(
        job_runs = response.job_runs.len(),
        errors = response.errors.len(),
        "query complete"
    );

    println!("{}", serde_json::to_string_pretty(&response)?);
    manager.close().await;
    Ok(())
}
