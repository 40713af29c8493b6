//! Pipeline orchestrator
//!
//! Drives a run through `Idle -> Preparing -> Streaming -> Draining ->
//! Completed | Failed` and always returns a [`RunSummary`]; the caller
//! decides what a failed run means. A mid-stream decode error truncates
//! the run instead of failing it, already-persisted data is kept.

use std::sync::Arc;
use std::time::{Duration, Instant};

use fdns_common::NormalizedRecord;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::batch::BatchAccumulator;
use crate::config::PipelineConfig;
use crate::counters::{Counters, CountersSnapshot};
use crate::error::IngestError;
use crate::source::LineSource;
use crate::store::{RecordStore, WriteOutcome};
use crate::transform::transform_line;

/// One warning per this many rejections, so a garbage-heavy feed cannot
/// flood the log.
const REJECTION_LOG_INTERVAL: u64 = 100_000;

/// Lifecycle of one ingestion run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Preparing,
    Streaming,
    Draining,
    Completed,
    Failed,
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RunState::Idle => "idle",
            RunState::Preparing => "preparing",
            RunState::Streaming => "streaming",
            RunState::Draining => "draining",
            RunState::Completed => "completed",
            RunState::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// What a run did, whether it failed or not.
#[derive(Debug)]
pub struct RunSummary {
    /// Terminal state, `Completed` or `Failed`.
    pub state: RunState,
    pub counters: CountersSnapshot,
    /// The stream ended early on a decode error; persisted data is partial.
    pub truncated: bool,
    /// The run was stopped via the cancellation token.
    pub cancelled: bool,
    pub duration: Duration,
    /// The error that decided a `Failed` state, or that truncated the run.
    pub error: Option<IngestError>,
}

/// Single-run ingestion pipeline over any [`RecordStore`].
pub struct IngestPipeline<S> {
    store: S,
    config: PipelineConfig,
    counters: Arc<Counters>,
}

impl<S> IngestPipeline<S>
where
    S: RecordStore + Clone + Send + Sync + 'static,
{
    pub fn new(store: S, config: PipelineConfig) -> fdns_common::Result<Self> {
        config.validate()?;
        Ok(Self {
            store,
            config,
            counters: Arc::new(Counters::new()),
        })
    }

    /// Live counters, readable while the run is in progress.
    pub fn counters(&self) -> Arc<Counters> {
        Arc::clone(&self.counters)
    }

    /// Execute the run to its terminal state. Consumes the pipeline; a
    /// new run needs a new pipeline.
    pub async fn run(self, cancel: CancellationToken) -> RunSummary {
        let started = Instant::now();
        let mut writes: JoinSet<Result<WriteOutcome, IngestError>> = JoinSet::new();
        let mut acc = BatchAccumulator::new(self.config.batch_size);
        let mut truncated = false;
        let mut cancelled = false;
        let mut fatal: Option<IngestError> = None;
        let mut truncation: Option<IngestError> = None;

        info!(
            source = %self.config.source,
            collection = %self.config.collection,
            batch_size = self.config.batch_size,
            max_in_flight_writes = self.config.max_in_flight_writes,
            state = %RunState::Preparing,
            "starting ingestion run"
        );

        if let Err(e) = self.prepare().await {
            fatal = Some(e);
        }

        if fatal.is_none() {
            match LineSource::open(&self.config.source).await {
                Ok(mut source) => {
                    info!(state = %RunState::Streaming, "source open, streaming");
                    loop {
                        let next = tokio::select! {
                            _ = cancel.cancelled() => {
                                warn!("cancellation requested, stopping line consumption");
                                cancelled = true;
                                break;
                            }
                            line = source.next_line() => line,
                        };

                        match next {
                            Ok(Some(line)) => {
                                self.counters.record_line();
                                match transform_line(&line) {
                                    Ok(record) => {
                                        if let Some(batch) = acc.push(record) {
                                            if let Err(e) =
                                                self.dispatch(&mut writes, batch).await
                                            {
                                                fatal = Some(e);
                                                break;
                                            }
                                        }
                                    }
                                    Err(reason) => {
                                        let total = self.counters.record_rejection(reason);
                                        if total % REJECTION_LOG_INTERVAL == 1 {
                                            warn!(
                                                reason = %reason,
                                                total_rejections = total,
                                                "rejecting feed lines"
                                            );
                                        }
                                    }
                                }
                            }
                            Ok(None) => break,
                            Err(IngestError::Decode(msg)) => {
                                warn!(
                                    lines_seen = self.counters.snapshot().lines_seen,
                                    "compressed stream corrupt, keeping partial load: {msg}"
                                );
                                truncated = true;
                                truncation = Some(IngestError::Decode(msg));
                                break;
                            }
                            Err(e) => {
                                fatal = Some(e);
                                break;
                            }
                        }
                    }
                }
                Err(e) => fatal = Some(e),
            }
        }

        info!(state = %RunState::Draining, in_flight = writes.len(), "draining writes");

        // A cancelled run stops where it stood; only clean or truncated
        // streams flush the final partial batch.
        if fatal.is_none() && !cancelled {
            if let Some(batch) = acc.finish() {
                if let Err(e) = self.dispatch(&mut writes, batch).await {
                    fatal = Some(e);
                }
            }
        }

        // In-flight writes are always reaped, even on a fatal error, so no
        // task outlives the run.
        while let Some(joined) = writes.join_next().await {
            match flatten_write(joined) {
                Ok(outcome) => self.counters.add_persist_rejected(outcome.rejected),
                Err(e) => {
                    if fatal.is_none() {
                        fatal = Some(e);
                    }
                }
            }
        }

        let state = if fatal.is_some() {
            RunState::Failed
        } else {
            RunState::Completed
        };
        let summary = RunSummary {
            state,
            counters: self.counters.snapshot(),
            truncated,
            cancelled,
            duration: started.elapsed(),
            error: fatal.or(truncation),
        };
        emit_summary(&summary);
        summary
    }

    /// Fresh-load preparation: the target collection starts empty with its
    /// index in place.
    async fn prepare(&self) -> Result<(), IngestError> {
        self.store.drop_collection(&self.config.collection).await?;
        self.store.create_collection(&self.config.collection).await
    }

    /// Hand a full batch to a write task, first reaping completed writes
    /// until a slot is free. Blocks streaming when the store falls behind.
    async fn dispatch(
        &self,
        writes: &mut JoinSet<Result<WriteOutcome, IngestError>>,
        batch: Vec<NormalizedRecord>,
    ) -> Result<(), IngestError> {
        while writes.len() >= self.config.max_in_flight_writes {
            if let Some(joined) = writes.join_next().await {
                let outcome = flatten_write(joined)?;
                self.counters.add_persist_rejected(outcome.rejected);
            }
        }

        self.counters.add_persisted(batch.len() as u64);
        let store = self.store.clone();
        let collection = self.config.collection.clone();
        writes.spawn(async move { store.bulk_insert_unordered(&collection, batch).await });
        Ok(())
    }
}

fn flatten_write(
    joined: Result<Result<WriteOutcome, IngestError>, tokio::task::JoinError>,
) -> Result<WriteOutcome, IngestError> {
    joined.map_err(|e| IngestError::Persist(format!("write task panicked: {e}")))?
}

fn emit_summary(summary: &RunSummary) {
    let c = &summary.counters;
    match summary.state {
        RunState::Completed => info!(
            state = %summary.state,
            lines_seen = c.lines_seen,
            records_persisted = c.records_persisted,
            malformed_json = c.malformed_json,
            missing_hostname = c.missing_hostname,
            decomposition_failures = c.decomposition_failures,
            persist_rejected = c.persist_rejected,
            truncated = summary.truncated,
            cancelled = summary.cancelled,
            duration_secs = summary.duration.as_secs(),
            "ingestion run complete"
        ),
        _ => error!(
            state = %summary.state,
            lines_seen = c.lines_seen,
            records_persisted = c.records_persisted,
            total_rejections = c.total_rejections(),
            duration_secs = summary.duration.as_secs(),
            error = ?summary.error,
            "ingestion run failed"
        ),
    }
}
