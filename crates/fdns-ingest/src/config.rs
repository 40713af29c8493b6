//! Pipeline configuration
//!
//! Tunables for a single ingestion run. Defaults match the production
//! load job; override per run via the CLI.

use fdns_common::FdnsError;

use crate::source::SourceLocator;

/// Records per bulk write.
pub const DEFAULT_BATCH_SIZE: usize = 100_000;

/// Concurrent in-flight bulk writes.
pub const DEFAULT_MAX_IN_FLIGHT_WRITES: usize = 2;

/// In-flight writes above this stop helping and just hold memory.
pub const MAX_IN_FLIGHT_WRITES_CEILING: usize = 4;

/// Configuration for one ingestion run.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Where the gzip NDJSON feed comes from.
    pub source: SourceLocator,
    /// Target collection; dropped and recreated during preparation.
    pub collection: String,
    /// Records per bulk write.
    pub batch_size: usize,
    /// Cap on concurrently dispatched bulk writes.
    pub max_in_flight_writes: usize,
}

impl PipelineConfig {
    pub fn new(source: SourceLocator, collection: impl Into<String>) -> Self {
        Self {
            source,
            collection: collection.into(),
            batch_size: DEFAULT_BATCH_SIZE,
            max_in_flight_writes: DEFAULT_MAX_IN_FLIGHT_WRITES,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_max_in_flight_writes(mut self, max_in_flight_writes: usize) -> Self {
        self.max_in_flight_writes = max_in_flight_writes;
        self
    }

    /// Validate the configuration before the run starts.
    pub fn validate(&self) -> fdns_common::Result<()> {
        if self.collection.is_empty() {
            return Err(FdnsError::Config(
                "collection name cannot be empty".to_string(),
            ));
        }
        if self.batch_size == 0 {
            return Err(FdnsError::Config(
                "batch_size must be greater than 0".to_string(),
            ));
        }
        if self.max_in_flight_writes == 0 {
            return Err(FdnsError::Config(
                "max_in_flight_writes must be greater than 0".to_string(),
            ));
        }
        if self.max_in_flight_writes > MAX_IN_FLIGHT_WRITES_CEILING {
            return Err(FdnsError::Config(format!(
                "max_in_flight_writes must be at most {MAX_IN_FLIGHT_WRITES_CEILING}, got {}",
                self.max_in_flight_writes
            )));
        }
        Ok(())
    }
}
