//! Postgres store integration tests
//!
//! Exercise the real SQL behind [`PgRecordStore`] against a containerized
//! Postgres: collection lifecycle, the multi-array bulk insert, and both
//! shapes of the lookup query. Requires a Docker daemon.

use anyhow::Result;
use fdns_common::NormalizedRecord;
use fdns_ingest::store::{PgRecordStore, RecordStore};
use testcontainers::runners::AsyncRunner;
use testcontainers::{ContainerAsync, ImageExt};
use testcontainers_modules::postgres::Postgres;

async fn pg_store() -> Result<(ContainerAsync<Postgres>, PgRecordStore)> {
    let container = Postgres::default().with_tag("16-alpine").start().await?;
    let host = container.get_host().await?;
    let port = container.get_host_port_ipv4(5432).await?;
    let url = format!("postgresql://postgres:postgres@{host}:{port}/postgres");
    let store = PgRecordStore::connect(&url).await?;
    Ok((container, store))
}

fn record(subdomain: &str, domain: &str, suffix: &str) -> NormalizedRecord {
    NormalizedRecord {
        domain_without_suffix: domain.to_string(),
        public_suffix: suffix.to_string(),
        subdomain: subdomain.to_string(),
        record_type: "a".to_string(),
        record_value: "93.184.216.34".to_string(),
    }
}

#[tokio::test]
async fn test_pg_round_trip() -> Result<()> {
    let (_container, store) = pg_store().await?;

    // Dropping a collection that does not exist is not an error.
    store.drop_collection("fdns_records").await?;
    store.create_collection("fdns_records").await?;

    let batch = vec![
        record("", "example", "com"),
        record("mail", "example", "com"),
        record("", "example", "net"),
        record("", "other", "com"),
    ];
    let outcome = store.bulk_insert_unordered("fdns_records", batch).await?;
    assert_eq!(outcome.accepted, 4);
    assert_eq!(outcome.rejected, 0);

    let both = store
        .find_records("fdns_records", "example", Some("com"), 100)
        .await?;
    assert_eq!(both.len(), 2);
    assert!(both.iter().any(|r| r.subdomain == "mail"));
    assert!(both.iter().all(|r| r.public_suffix == "com"));

    let any_suffix = store
        .find_records("fdns_records", "example", None, 100)
        .await?;
    assert_eq!(any_suffix.len(), 3);

    let limited = store
        .find_records("fdns_records", "example", None, 2)
        .await?;
    assert_eq!(limited.len(), 2);

    let missing = store
        .find_records("fdns_records", "absent", None, 100)
        .await?;
    assert!(missing.is_empty());

    Ok(())
}

#[tokio::test]
async fn test_pg_duplicate_rows_persist_separately() -> Result<()> {
    let (_container, store) = pg_store().await?;
    store.create_collection("fdns_records").await?;

    let outcome = store
        .bulk_insert_unordered(
            "fdns_records",
            vec![record("", "example", "com"), record("", "example", "com")],
        )
        .await?;
    assert_eq!(outcome.accepted, 2);
    assert_eq!(outcome.rejected, 0);

    let rows = store
        .find_records("fdns_records", "example", Some("com"), 100)
        .await?;
    assert_eq!(rows.len(), 2);

    Ok(())
}

#[tokio::test]
async fn test_pg_drop_and_recreate_starts_empty() -> Result<()> {
    let (_container, store) = pg_store().await?;
    store.create_collection("fdns_records").await?;
    store
        .bulk_insert_unordered("fdns_records", vec![record("", "example", "com")])
        .await?;

    store.drop_collection("fdns_records").await?;
    store.create_collection("fdns_records").await?;

    let rows = store
        .find_records("fdns_records", "example", None, 100)
        .await?;
    assert!(rows.is_empty());

    Ok(())
}

#[tokio::test]
async fn test_pg_empty_batch_is_a_no_op() -> Result<()> {
    let (_container, store) = pg_store().await?;
    store.create_collection("fdns_records").await?;

    let outcome = store.bulk_insert_unordered("fdns_records", vec![]).await?;
    assert_eq!(outcome.accepted, 0);
    assert_eq!(outcome.rejected, 0);

    Ok(())
}

#[tokio::test]
async fn test_pg_create_collection_is_idempotent() -> Result<()> {
    let (_container, store) = pg_store().await?;
    store.create_collection("fdns_records").await?;
    store.create_collection("fdns_records").await?;

    store
        .bulk_insert_unordered("fdns_records", vec![record("", "example", "com")])
        .await?;
    Ok(())
}
