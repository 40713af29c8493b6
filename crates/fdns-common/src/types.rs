//! Common types used across the FDNS loader

use serde::{Deserialize, Serialize};

/// One normalized FDNS record, the unit persisted by the ingest pipeline.
///
/// The serialized field names match the document shape consumed by the
/// query-aggregation layer (`domainWithoutSuffix`, `publicSuffix`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedRecord {
    /// Registrable label without its public suffix (`example` for `example.com`).
    /// Never empty for a persisted record.
    pub domain_without_suffix: String,
    /// The recognized public suffix (`com`, `co.uk`).
    pub public_suffix: String,
    /// Everything left of the registrable domain; may be empty.
    pub subdomain: String,
    /// DNS record type from the feed, unmodified.
    #[serde(rename = "type")]
    pub record_type: String,
    /// Record payload from the feed, unmodified.
    #[serde(rename = "value")]
    pub record_value: String,
}

impl NormalizedRecord {
    /// The registrable domain this record belongs to, e.g. `example.com`.
    pub fn registrable_domain(&self) -> String {
        format!("{}.{}", self.domain_without_suffix, self.public_suffix)
    }

    /// The full hostname the record was derived from.
    pub fn hostname(&self) -> String {
        if self.subdomain.is_empty() {
            self.registrable_domain()
        } else {
            format!("{}.{}", self.subdomain, self.registrable_domain())
        }
    }
}
