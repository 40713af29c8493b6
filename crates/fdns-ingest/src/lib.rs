//! FDNS Ingest Library
//!
//! Single-pass streaming ingestion of gzip-compressed NDJSON forward-DNS
//! feeds into a Postgres-backed record store.
//!
//! The pipeline wires together:
//!
//! - [`source`]: redirect-following fetch or local file, streaming gzip
//!   decompression, line splitting
//! - [`transform`]: per-line JSON parsing and hostname decomposition
//! - [`batch`]: fixed-size batching with ownership handoff on flush
//! - [`store`]: unordered bulk persistence behind the [`store::RecordStore`]
//!   seam
//! - [`pipeline`]: the orchestrator state machine and run summary
//!
//! # Example
//!
//! ```no_run
//! use fdns_ingest::config::PipelineConfig;
//! use fdns_ingest::pipeline::IngestPipeline;
//! use fdns_ingest::store::PgRecordStore;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let store = PgRecordStore::connect("postgres://localhost/fdns").await?;
//!     let config = PipelineConfig::new(
//!         "https://example.com/fdns_a.json.gz".parse()?,
//!         "fdns_records",
//!     );
//!     let summary = IngestPipeline::new(store, config)?
//!         .run(CancellationToken::new())
//!         .await;
//!     println!("{} records persisted", summary.counters.records_persisted);
//!     Ok(())
//! }
//! ```

pub mod batch;
pub mod config;
pub mod counters;
pub mod error;
pub mod pipeline;
pub mod source;
pub mod store;
pub mod transform;

pub use error::{IngestError, RejectReason};
pub use pipeline::{IngestPipeline, RunState, RunSummary};
