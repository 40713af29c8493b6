//! Error taxonomy for the ingestion pipeline
//!
//! Stream-level and persistence-level failures are [`IngestError`] and
//! decide the run's terminal state. Per-line failures are [`RejectReason`]
//! and are only ever counted, never fatal.

use thiserror::Error;

/// Fatal or stream-ending errors surfaced to the pipeline orchestrator.
#[derive(Error, Debug)]
pub enum IngestError {
    /// The input could not be obtained at all: unreadable path, DNS or
    /// transport failure. Fatal, the run moves to `Failed`.
    #[error("source unavailable: {0}")]
    SourceUnavailable(String),

    /// The HTTP source answered with a status other than 200/301/302.
    /// Fatal, no automatic retry.
    #[error("fetch failed with status {status}: {message}")]
    Fetch { status: u16, message: String },

    /// The redirect chain exceeded the hop cap. Fatal, and distinct from
    /// [`IngestError::Fetch`] so a loop is diagnosable from the summary.
    #[error("redirect chain exceeded {limit} hops")]
    TooManyRedirects { limit: usize },

    /// The compressed stream is corrupt mid-run. Ends streaming early but
    /// keeps already-ingested data; the run drains and completes partially.
    #[error("compressed stream corrupt: {0}")]
    Decode(String),

    /// A store operation could not be issued or acknowledged. Fatal: a
    /// silently lost batch would break the load's completeness guarantee.
    #[error("store operation failed: {0}")]
    Persist(String),

    /// The target collection name is not a safe SQL identifier.
    #[error("invalid collection name: {0:?}")]
    InvalidCollection(String),
}

/// Why a single feed line was rejected. Counted, sampled into the log at
/// low frequency, never fatal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// The line is not valid JSON, or its fields have the wrong shape.
    MalformedJson,
    /// The `name` field is absent or empty.
    MissingHostname,
    /// The hostname has no registrable domain (bare public suffix,
    /// unknown structure).
    UnresolvableDomain,
}

impl RejectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectReason::MalformedJson => "malformed_json",
            RejectReason::MissingHostname => "missing_hostname",
            RejectReason::UnresolvableDomain => "unresolvable_domain",
        }
    }
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
