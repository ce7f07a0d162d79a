//! jobscan API server binary

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use jobscan::{EngineConfig, FsArtifactStore, Manager, MemoryCache, QuerySources, SqliteRecordStore};
use jobscan_api::{ApiConfig, ApiServer};

#[derive(Parser, Debug)]
#[command(name = "jobscan-api", version, about = "HTTP API for CI job-run artifact search")]
struct Cli {
    /// Engine configuration (TOML)
    #[arg(long)]
    config: Option<PathBuf>,

    /// SQLite database holding job-run records
    #[arg(long)]
    records: Option<PathBuf>,

    /// Directory standing in for the artifact bucket
    #[arg(long)]
    bucket_dir: Option<PathBuf>,

    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    #[arg(long, default_value_t = 8080)]
    port: u16,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => EngineConfig::default(),
    };

    let manager = match (&cli.records, &cli.bucket_dir) {
        (Some(records), Some(bucket_dir)) => {
            let records = SqliteRecordStore::open_readonly(records)
                .with_context(|| format!("failed to open records {}", records.display()))?;
            let sources = QuerySources::new(
                Arc::new(records),
                Arc::new(FsArtifactStore::new(bucket_dir.clone())),
            )
            .with_cache(Arc::new(MemoryCache::new()));
            Some(Arc::new(Manager::new(config, sources)?))
        }
        _ => {
            warn!("no --records/--bucket-dir given; artifact queries will be unavailable");
            None
        }
    };

    let server = ApiServer::new(
        ApiConfig {
            host: cli.host,
            port: cli.port,
        },
        manager.clone(),
    );
    server.start().await?;
    drop(server);

    if let Some(manager) = manager {
        match Arc::try_unwrap(manager) {
            Ok(manager) => manager.close().await,
            Err(_) => warn!("query manager still shared at shutdown; skipping drain"),
        }
    }
    info!("jobscan API server stopped");
    Ok(())
}
