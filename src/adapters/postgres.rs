//! PostgreSQL-protocol metadata backend, used for both PostgreSQL and
//! CockroachDB.
//!
//! Two writers can both read the same max version; the primary key turns
//! the loser's insert into a unique violation, which surfaces as a conflict.
//! CockroachDB may instead abort with a serialization failure, handled the
//! same way.

use super::{
    Adapter, AdapterResult, ENTRY_COLUMNS, ScanRange, begin_error, migration_statements,
};
use crate::models::object::{BeginObjectNextVersion, Object, ObjectEntry, ObjectStatus, Version};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{
    PgPool, QueryBuilder,
    postgres::{PgPoolOptions, Postgres},
};
use tracing::debug;

const MIGRATION: &str = include_str!("../../migrations/postgres/0001_init.sql");

#[derive(Clone, Debug)]
pub struct PostgresAdapter {
    pool: PgPool,
}

impl PostgresAdapter {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str, max_connections: u32) -> AdapterResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self::new(pool))
    }

    /// Apply the embedded schema. Safe to run repeatedly.
    pub async fn migrate(&self) -> AdapterResult<()> {
        let statements = migration_statements(MIGRATION);
        tracing::info!(
            "Running {} postgres migration statements...",
            statements.len()
        );

        for stmt in statements {
            debug!("Executing migration SQL: {}", stmt);
            sqlx::query(stmt).execute(&self.pool).await?;
        }
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl Adapter for PostgresAdapter {
    async fn begin_object_next_version(
        &self,
        opts: &BeginObjectNextVersion,
    ) -> AdapterResult<Object> {
        let (version, created_at): (Version, DateTime<Utc>) = sqlx::query_as(
            r#"
            INSERT INTO objects (
                project_id, bucket_name, object_key, version, stream_id,
                status, expires_at, encryption
            )
            SELECT $1, $2, $3, coalesce(max(version), 0) + 1, $4,
                   $5, $6, $7
            FROM objects
            WHERE project_id = $1 AND bucket_name = $2 AND object_key = $3
            RETURNING version, created_at
            "#,
        )
        .bind(opts.project_id)
        .bind(opts.bucket_name.as_str())
        .bind(opts.object_key.as_bytes())
        .bind(opts.stream_id)
        .bind(ObjectStatus::Pending)
        .bind(opts.expires_at)
        .bind(opts.encryption)
        .fetch_one(&self.pool)
        .await
        .map_err(begin_error)?;

        Ok(Object {
            project_id: opts.project_id,
            bucket_name: opts.bucket_name.clone(),
            object_key: opts.object_key.clone(),
            version,
            stream_id: opts.stream_id,
            status: ObjectStatus::Pending,
            created_at,
            expires_at: opts.expires_at,
            encryption: opts.encryption,
        })
    }

    async fn scan_range(&self, scan: &ScanRange) -> AdapterResult<Vec<ObjectEntry>> {
        let mut builder = QueryBuilder::<Postgres>::new(format!(
            "SELECT {ENTRY_COLUMNS} FROM objects WHERE project_id = "
        ));
        builder.push_bind(scan.project_id);
        builder.push(" AND bucket_name = ");
        builder.push_bind(scan.bucket_name.as_str());
        builder.push(" AND status = ");
        builder.push_bind(scan.status);
        builder.push(" AND (object_key, version) > (");
        builder.push_bind(scan.seek.key.as_bytes());
        builder.push(", ");
        builder.push_bind(scan.seek.version);
        builder.push(")");

        if let Some(upper) = &scan.upper_bound {
            builder.push(" AND object_key < ");
            builder.push_bind(upper.as_bytes());
        }

        builder.push(" ORDER BY object_key ASC, version ASC LIMIT ");
        builder.push_bind(scan.limit as i64);

        let rows: Vec<ObjectEntry> = builder.build_query_as().fetch_all(&self.pool).await?;
        Ok(rows)
    }
}
