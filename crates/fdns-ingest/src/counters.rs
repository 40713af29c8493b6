//! Run-scoped ingestion counters
//!
//! Mutated from the parsing path and from write-completion tasks, so every
//! field is an atomic. Reset per run (a fresh `Counters` is created), read
//! only for the final summary, never persisted.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::RejectReason;

/// Running totals for a single ingestion run.
#[derive(Debug, Default)]
pub struct Counters {
    lines_seen: AtomicU64,
    records_persisted: AtomicU64,
    malformed_json: AtomicU64,
    missing_hostname: AtomicU64,
    decomposition_failures: AtomicU64,
    persist_rejected: AtomicU64,
}

impl Counters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_line(&self) {
        self.lines_seen.fetch_add(1, Ordering::Relaxed);
    }

    /// Count one per-line rejection. Returns the new total across all
    /// rejection reasons so callers can sample log output.
    pub fn record_rejection(&self, reason: RejectReason) -> u64 {
        match reason {
            RejectReason::MalformedJson => &self.malformed_json,
            RejectReason::MissingHostname => &self.missing_hostname,
            RejectReason::UnresolvableDomain => &self.decomposition_failures,
        }
        .fetch_add(1, Ordering::Relaxed);
        self.total_rejections()
    }

    /// Count records whose batch write has been issued.
    pub fn add_persisted(&self, n: u64) {
        self.records_persisted.fetch_add(n, Ordering::Relaxed);
    }

    /// Count documents the store rejected inside an unordered bulk insert.
    /// Kept separate from parse-time rejections.
    pub fn add_persist_rejected(&self, n: u64) {
        self.persist_rejected.fetch_add(n, Ordering::Relaxed);
    }

    pub fn total_rejections(&self) -> u64 {
        self.malformed_json.load(Ordering::Relaxed)
            + self.missing_hostname.load(Ordering::Relaxed)
            + self.decomposition_failures.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> CountersSnapshot {
        CountersSnapshot {
            lines_seen: self.lines_seen.load(Ordering::Relaxed),
            records_persisted: self.records_persisted.load(Ordering::Relaxed),
            malformed_json: self.malformed_json.load(Ordering::Relaxed),
            missing_hostname: self.missing_hostname.load(Ordering::Relaxed),
            decomposition_failures: self.decomposition_failures.load(Ordering::Relaxed),
            persist_rejected: self.persist_rejected.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`Counters`], used for the final run summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CountersSnapshot {
    pub lines_seen: u64,
    pub records_persisted: u64,
    pub malformed_json: u64,
    pub missing_hostname: u64,
    pub decomposition_failures: u64,
    pub persist_rejected: u64,
}

impl CountersSnapshot {
    pub fn total_rejections(&self) -> u64 {
        self.malformed_json + self.missing_hostname + self.decomposition_failures
    }

    /// Every line seen is either persisted or rejected; holds at the end
    /// of any run that drained cleanly.
    pub fn is_balanced(&self) -> bool {
        self.records_persisted + self.total_rejections() == self.lines_seen
    }
}
