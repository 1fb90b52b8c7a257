//! Backend adapters for object metadata.
//!
//! Every backend implements [`Adapter`]: one atomic begin-with-next-version
//! write and one keyset range scan. Callers pick a backend once, when the
//! adapter is constructed, and only see the trait afterwards.

pub mod postgres;
pub mod sqlite;

use crate::{
    models::{
        key::ObjectKey,
        object::{BeginObjectNextVersion, IterateCursor, Object, ObjectEntry, ObjectStatus},
    },
    services::metabase::MetabaseError,
};
use async_trait::async_trait;
use uuid::Uuid;

pub use postgres::PostgresAdapter;
pub use sqlite::SqliteAdapter;

pub type AdapterResult<T> = Result<T, MetabaseError>;

/// Columns selected for every listing row, in `ObjectEntry` order.
pub(crate) const ENTRY_COLUMNS: &str = "object_key, stream_id, version, status, \
     created_at, expires_at, \
     segment_count, \
     encrypted_metadata_nonce, encrypted_metadata, encrypted_metadata_encrypted_key, \
     total_plain_size, total_encrypted_size, fixed_segment_size, \
     encryption";

/// One bounded keyset query.
///
/// Selects rows of `status` in the bucket whose `(key, version)` sorts
/// strictly after `seek`, with key below `upper_bound` when set, ordered by
/// `(key, version)` and capped at `limit`.
#[derive(Clone, Debug)]
pub struct ScanRange {
    pub project_id: Uuid,
    pub bucket_name: String,
    pub status: ObjectStatus,
    pub seek: IterateCursor,
    pub upper_bound: Option<ObjectKey>,
    pub limit: usize,
}

/// Storage contract shared by all metadata backends.
#[async_trait]
pub trait Adapter: Send + Sync + 'static {
    /// Insert a pending object whose version is one past the current
    /// highest version of its (project, bucket, key), in one atomic unit.
    ///
    /// Losing a race against a concurrent writer yields
    /// [`MetabaseError::Conflict`]; the caller decides whether to retry.
    async fn begin_object_next_version(
        &self,
        opts: &BeginObjectNextVersion,
    ) -> AdapterResult<Object>;

    /// Run one range query. Returns fewer than `scan.limit` rows only when
    /// the range is exhausted, and an empty batch rather than an error when
    /// nothing matches.
    async fn scan_range(&self, scan: &ScanRange) -> AdapterResult<Vec<ObjectEntry>>;
}

/// Map an error from the begin statement, turning lost races into
/// [`MetabaseError::Conflict`].
pub(crate) fn begin_error(err: sqlx::Error) -> MetabaseError {
    if is_conflict(&err) {
        MetabaseError::Conflict
    } else {
        MetabaseError::Backend(err)
    }
}

/// Return true if the error means a concurrent writer got there first.
///
/// Covers primary key violations (two writers computed the same version),
/// serialization failures (`40001`, CockroachDB's retry error) and the
/// SQLite busy/locked family.
fn is_conflict(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => {
            db_err.is_unique_violation()
                || matches!(
                    db_err.code().as_deref(),
                    Some("40001" | "5" | "6" | "261" | "517" | "773")
                )
        }
        _ => false,
    }
}

/// Split a migration script into executable statements.
pub(crate) fn migration_statements(sql: &str) -> Vec<&str> {
    sql.split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}
