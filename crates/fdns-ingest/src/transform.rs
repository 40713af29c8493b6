//! Per-line record transformation
//!
//! Turns one raw NDJSON feed line into a [`NormalizedRecord`] or a
//! [`RejectReason`]. Pure apart from the public-suffix lookup; the pipeline
//! owns all counting and logging.

use fdns_common::NormalizedRecord;
use serde::Deserialize;

use crate::error::RejectReason;

/// One line of the FDNS feed as it appears on the wire. Transient; never
/// retained past the processing of its line.
#[derive(Debug, Deserialize)]
struct RawFeedLine {
    #[serde(default)]
    name: String,
    #[serde(default, rename = "type")]
    record_type: String,
    #[serde(default)]
    value: String,
}

/// A hostname split at the public-suffix boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decomposition {
    pub subdomain: String,
    pub domain_without_suffix: String,
    pub public_suffix: String,
}

/// Split a hostname into subdomain, registrable label and public suffix.
///
/// Backed by the bundled public-suffix list. Returns `None` when no
/// registrable domain exists: a bare public suffix (`com`, `co.uk`), a
/// single unknown label, or a hostname the list cannot interpret.
pub fn decompose(hostname: &str) -> Option<Decomposition> {
    // DNS names are case-insensitive; the feed occasionally carries a
    // trailing root dot.
    let host = hostname.trim_end_matches('.').to_ascii_lowercase();

    let domain = psl::domain(host.as_bytes())?;
    let registrable = std::str::from_utf8(domain.as_bytes()).ok()?;
    let suffix = std::str::from_utf8(domain.suffix().as_bytes()).ok()?;

    let domain_without_suffix = registrable.strip_suffix(suffix)?.strip_suffix('.')?;
    if domain_without_suffix.is_empty() {
        return None;
    }

    let subdomain = host
        .strip_suffix(registrable)
        .map(|rest| rest.strip_suffix('.').unwrap_or(rest))
        .unwrap_or("");

    Some(Decomposition {
        subdomain: subdomain.to_string(),
        domain_without_suffix: domain_without_suffix.to_string(),
        public_suffix: suffix.to_string(),
    })
}

/// Transform one raw feed line into a normalized record.
///
/// Steps: parse JSON, require a hostname, strip a leading `*.` wildcard,
/// decompose at the public-suffix boundary, copy `type` and `value`
/// verbatim.
pub fn transform_line(line: &str) -> Result<NormalizedRecord, RejectReason> {
    let raw: RawFeedLine =
        serde_json::from_str(line).map_err(|_| RejectReason::MalformedJson)?;

    if raw.name.is_empty() {
        return Err(RejectReason::MissingHostname);
    }

    // Wildcard records resolve for every name under the base hostname;
    // index them by the base.
    let hostname = raw.name.strip_prefix("*.").unwrap_or(&raw.name);

    let decomposed = decompose(hostname).ok_or(RejectReason::UnresolvableDomain)?;

    Ok(NormalizedRecord {
        domain_without_suffix: decomposed.domain_without_suffix,
        public_suffix: decomposed.public_suffix,
        subdomain: decomposed.subdomain,
        record_type: raw.record_type,
        record_value: raw.value,
    })
}
