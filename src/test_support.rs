//! Shared fixtures for unit tests.

use crate::{
    adapters::SqliteAdapter,
    models::{
        key::ObjectKey,
        object::{ObjectStatus, Version},
    },
    services::{metabase::Metabase, retry::RetryPolicy},
};
use chrono::Utc;
use sqlx::{SqlitePool, sqlite::SqlitePoolOptions};
use std::sync::Arc;
use uuid::Uuid;

/// A migrated in-memory database. The pool keeps its single connection
/// alive so the database lives as long as the adapter.
pub(crate) async fn memory_adapter() -> SqliteAdapter {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    let adapter = SqliteAdapter::new(pool);
    adapter.migrate().await.unwrap();
    adapter
}

pub(crate) async fn memory_metabase() -> (Metabase, SqliteAdapter) {
    let adapter = memory_adapter().await;
    let metabase = Metabase::new(Arc::new(adapter.clone()), RetryPolicy::immediate(10));
    (metabase, adapter)
}

/// Insert an object row with an explicit version and status.
pub(crate) async fn insert_entry(
    pool: &SqlitePool,
    project_id: Uuid,
    bucket: &str,
    key: impl Into<ObjectKey>,
    version: Version,
    status: ObjectStatus,
) {
    let key = key.into();
    sqlx::query(
        "INSERT INTO objects (project_id, bucket_name, object_key, version, stream_id, status, created_at)
         VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(project_id)
    .bind(bucket)
    .bind(key.as_bytes())
    .bind(version)
    .bind(Uuid::new_v4())
    .bind(status)
    .bind(Utc::now())
    .execute(pool)
    .await
    .unwrap();
}
