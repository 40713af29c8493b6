//! FDNS Ingest - forward-DNS feed loader

use anyhow::{Context, Result};
use clap::Parser;
use fdns_common::logging::{init_logging, LogConfig, LogLevel};
use fdns_ingest::config::PipelineConfig;
use fdns_ingest::pipeline::{IngestPipeline, RunState};
use fdns_ingest::source::SourceLocator;
use fdns_ingest::store::{PgRecordStore, RecordStore};
use fdns_ingest::transform::decompose;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "fdns-ingest")]
#[command(author, version, about = "FDNS feed loader and query tool")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Parser, Debug)]
enum Command {
    /// Stream a gzip NDJSON feed into a fresh collection
    Load {
        /// Feed URL (http/https) or local file path
        source: String,

        /// Target collection, dropped and recreated before the load
        #[arg(short, long, default_value = "fdns_records")]
        collection: String,

        /// Records per bulk write
        #[arg(long, default_value_t = fdns_ingest::config::DEFAULT_BATCH_SIZE)]
        batch_size: usize,

        /// Concurrent in-flight bulk writes
        #[arg(long, default_value_t = fdns_ingest::config::DEFAULT_MAX_IN_FLIGHT_WRITES)]
        max_in_flight: usize,

        /// Postgres connection string
        #[arg(long, env = "DATABASE_URL")]
        database_url: String,
    },

    /// Look up records for a domain in a loaded collection
    Query {
        /// Domain or URL to look up
        domain: String,

        /// Collection to query
        #[arg(short, long, default_value = "fdns_records")]
        collection: String,

        /// Maximum records to print
        #[arg(short, long, default_value_t = 1000)]
        limit: usize,

        /// Postgres connection string
        #[arg(long, env = "DATABASE_URL")]
        database_url: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };

    let log_config = LogConfig::from_env()
        .unwrap_or_default()
        .with_level(log_level)
        .with_file_prefix("fdns-ingest");
    init_logging(&log_config)?;

    match cli.command {
        Command::Load {
            source,
            collection,
            batch_size,
            max_in_flight,
            database_url,
        } => {
            let locator: SourceLocator = source
                .parse()
                .context("Failed to parse source locator")?;
            let store = PgRecordStore::connect(&database_url).await?;
            let config = PipelineConfig::new(locator, collection)
                .with_batch_size(batch_size)
                .with_max_in_flight_writes(max_in_flight);

            let cancel = CancellationToken::new();
            let ctrl_c_token = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("interrupt received, shutting down");
                    ctrl_c_token.cancel();
                }
            });

            let summary = IngestPipeline::new(store, config)?.run(cancel).await;
            if summary.state == RunState::Failed {
                std::process::exit(1);
            }
        }
        Command::Query {
            domain,
            collection,
            limit,
            database_url,
        } => {
            let hostname = hostname_of(&domain)?;
            let decomposed = decompose(&hostname)
                .with_context(|| format!("no registrable domain in {domain:?}"))?;

            info!(
                domain_without_suffix = %decomposed.domain_without_suffix,
                public_suffix = %decomposed.public_suffix,
                collection = %collection,
                "querying records"
            );

            let store = PgRecordStore::connect(&database_url).await?;
            let records = store
                .find_records(
                    &collection,
                    &decomposed.domain_without_suffix,
                    Some(&decomposed.public_suffix),
                    limit,
                )
                .await?;

            for record in &records {
                println!("{}", serde_json::to_string(record)?);
            }
            info!(count = records.len(), "query complete");
        }
    }

    Ok(())
}

/// Accept either a bare hostname or a full URL and return the hostname.
fn hostname_of(input: &str) -> Result<String> {
    if input.contains("://") {
        let url: reqwest::Url = input.parse().context("Failed to parse URL")?;
        url.host_str()
            .map(str::to_string)
            .with_context(|| format!("URL {input:?} has no host"))
    } else {
        Ok(input.to_string())
    }
}
