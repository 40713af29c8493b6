//! Record persistence
//!
//! [`RecordStore`] is the seam between the pipeline and the backing
//! database; the pipeline only ever sees collections, unordered bulk
//! inserts and prefix queries. [`PgRecordStore`] is the Postgres
//! implementation.

use async_trait::async_trait;
use fdns_common::{FdnsError, NormalizedRecord};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use tracing::{debug, info};

use crate::error::IngestError;

/// Hard cap on query results regardless of the requested limit.
pub const MAX_QUERY_RESULTS: usize = 1000;

/// Postgres identifiers are truncated past this length.
const MAX_COLLECTION_NAME_LEN: usize = 63;

/// Result of one unordered bulk insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WriteOutcome {
    /// Records the store accepted.
    pub accepted: u64,
    /// Records the store turned away; the rest of the batch still landed.
    pub rejected: u64,
}

/// Storage operations the pipeline needs.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Remove the collection and its data if it exists. Idempotent.
    async fn drop_collection(&self, name: &str) -> Result<(), IngestError>;

    /// Create an empty collection with its query index. Idempotent.
    async fn create_collection(&self, name: &str) -> Result<(), IngestError>;

    /// Insert a batch without ordering guarantees. Individual rejections
    /// are reported in the outcome and do not fail the batch.
    async fn bulk_insert_unordered(
        &self,
        name: &str,
        batch: Vec<NormalizedRecord>,
    ) -> Result<WriteOutcome, IngestError>;

    /// Look up records by registrable-domain parts. `limit` is capped at
    /// [`MAX_QUERY_RESULTS`].
    async fn find_records(
        &self,
        name: &str,
        domain_without_suffix: &str,
        public_suffix: Option<&str>,
        limit: usize,
    ) -> Result<Vec<NormalizedRecord>, IngestError>;
}

/// Collection names are spliced into SQL as identifiers, so only a strict
/// identifier shape is allowed through.
pub fn validate_collection_name(name: &str) -> Result<(), IngestError> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(first) => {
            (first.is_ascii_alphabetic() || first == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
                && name.len() <= MAX_COLLECTION_NAME_LEN
        }
        None => false,
    };
    if valid {
        Ok(())
    } else {
        Err(IngestError::InvalidCollection(name.to_string()))
    }
}

/// Postgres-backed [`RecordStore`] over a connection pool.
#[derive(Debug, Clone)]
pub struct PgRecordStore {
    pool: PgPool,
}

impl PgRecordStore {
    /// Connect a pool to the given database URL.
    pub async fn connect(database_url: &str) -> fdns_common::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(8)
            .connect(database_url)
            .await
            .map_err(|e| FdnsError::Database(format!("connection failed: {e}")))?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RecordStore for PgRecordStore {
    async fn drop_collection(&self, name: &str) -> Result<(), IngestError> {
        validate_collection_name(name)?;
        sqlx::query(&format!("DROP TABLE IF EXISTS {name}"))
            .execute(&self.pool)
            .await
            .map_err(|e| IngestError::Persist(format!("drop {name}: {e}")))?;
        info!(collection = name, "dropped collection");
        Ok(())
    }

    async fn create_collection(&self, name: &str) -> Result<(), IngestError> {
        validate_collection_name(name)?;
        sqlx::query(&format!(
            "CREATE TABLE IF NOT EXISTS {name} (
                id BIGSERIAL PRIMARY KEY,
                domain_without_suffix TEXT NOT NULL,
                public_suffix TEXT NOT NULL,
                subdomain TEXT NOT NULL,
                record_type TEXT NOT NULL,
                record_value TEXT NOT NULL
            )"
        ))
        .execute(&self.pool)
        .await
        .map_err(|e| IngestError::Persist(format!("create {name}: {e}")))?;

        // text_pattern_ops so registrable-domain prefix lookups use the
        // index under non-C collations.
        sqlx::query(&format!(
            "CREATE INDEX IF NOT EXISTS idx_{name}_domain
             ON {name} (domain_without_suffix text_pattern_ops, public_suffix)"
        ))
        .execute(&self.pool)
        .await
        .map_err(|e| IngestError::Persist(format!("index {name}: {e}")))?;

        info!(collection = name, "created collection");
        Ok(())
    }

    async fn bulk_insert_unordered(
        &self,
        name: &str,
        batch: Vec<NormalizedRecord>,
    ) -> Result<WriteOutcome, IngestError> {
        validate_collection_name(name)?;
        if batch.is_empty() {
            return Ok(WriteOutcome::default());
        }
        let submitted = batch.len() as u64;

        let mut domains = Vec::with_capacity(batch.len());
        let mut suffixes = Vec::with_capacity(batch.len());
        let mut subdomains = Vec::with_capacity(batch.len());
        let mut types = Vec::with_capacity(batch.len());
        let mut values = Vec::with_capacity(batch.len());
        for record in batch {
            domains.push(record.domain_without_suffix);
            suffixes.push(record.public_suffix);
            subdomains.push(record.subdomain);
            types.push(record.record_type);
            values.push(record.record_value);
        }

        let result = sqlx::query(&format!(
            "INSERT INTO {name}
                (domain_without_suffix, public_suffix, subdomain, record_type, record_value)
             SELECT * FROM UNNEST($1::text[], $2::text[], $3::text[], $4::text[], $5::text[])"
        ))
        .bind(&domains)
        .bind(&suffixes)
        .bind(&subdomains)
        .bind(&types)
        .bind(&values)
        .execute(&self.pool)
        .await
        .map_err(|e| IngestError::Persist(format!("bulk insert into {name}: {e}")))?;

        let accepted = result.rows_affected();
        // The table carries no unique constraint, so every row lands and
        // `rejected` stays 0 here; stores with constraints report through
        // the same outcome.
        let outcome = WriteOutcome {
            accepted,
            rejected: submitted.saturating_sub(accepted),
        };
        debug!(
            collection = name,
            accepted = outcome.accepted,
            rejected = outcome.rejected,
            "bulk insert complete"
        );
        Ok(outcome)
    }

    async fn find_records(
        &self,
        name: &str,
        domain_without_suffix: &str,
        public_suffix: Option<&str>,
        limit: usize,
    ) -> Result<Vec<NormalizedRecord>, IngestError> {
        validate_collection_name(name)?;
        let limit = limit.min(MAX_QUERY_RESULTS) as i64;

        let query = match public_suffix {
            Some(_) => format!(
                "SELECT domain_without_suffix, public_suffix, subdomain, record_type, record_value
                 FROM {name}
                 WHERE domain_without_suffix = $1 AND public_suffix = $2
                 LIMIT $3"
            ),
            None => format!(
                "SELECT domain_without_suffix, public_suffix, subdomain, record_type, record_value
                 FROM {name}
                 WHERE domain_without_suffix = $1
                 LIMIT $2"
            ),
        };

        let mut q = sqlx::query(&query).bind(domain_without_suffix);
        if let Some(suffix) = public_suffix {
            q = q.bind(suffix);
        }
        let rows = q
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| IngestError::Persist(format!("query {name}: {e}")))?;

        Ok(rows
            .into_iter()
            .map(|row| NormalizedRecord {
                domain_without_suffix: row.get("domain_without_suffix"),
                public_suffix: row.get("public_suffix"),
                subdomain: row.get("subdomain"),
                record_type: row.get("record_type"),
                record_value: row.get("record_value"),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_collection_names() {
        assert!(validate_collection_name("fdns_records").is_ok());
        assert!(validate_collection_name("_staging").is_ok());
        assert!(validate_collection_name("records2024").is_ok());
    }

    #[test]
    fn test_invalid_collection_names() {
        assert!(validate_collection_name("").is_err());
        assert!(validate_collection_name("2024records").is_err());
        assert!(validate_collection_name("fdns-records").is_err());
        assert!(validate_collection_name("records; DROP TABLE users").is_err());
        assert!(validate_collection_name(&"x".repeat(64)).is_err());
        assert!(validate_collection_name(&"x".repeat(63)).is_ok());
    }
}
