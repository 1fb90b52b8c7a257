//! Represents stored object versions and the projections used for listing.

use super::key::ObjectKey;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Object version number. Positive for stored rows.
pub type Version = i64;

/// Cursor version meaning "before any real version" of a key.
pub const BEFORE_FIRST_VERSION: Version = -1;

/// Lifecycle state of an object row.
///
/// The numbering is persisted, so it must never be reshuffled.
#[derive(Serialize, Deserialize, sqlx::Type, Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
#[repr(i32)]
pub enum ObjectStatus {
    /// Begun but not yet committed.
    #[default]
    Pending = 1,
    CommittedUnversioned = 3,
    CommittedVersioned = 4,
    DeleteMarkerUnversioned = 5,
    DeleteMarkerVersioned = 6,
}

/// A listing row: one object version, or a synthetic prefix standing in
/// for a "directory" when `is_prefix` is set.
///
/// Prefix entries only carry `key` and `status`; every other field keeps its
/// default value.
#[derive(Clone, FromRow, Debug, Default, PartialEq)]
pub struct ObjectEntry {
    /// Object key. Relative to the listing prefix once delivered by an
    /// iterator.
    #[sqlx(rename = "object_key", try_from = "Vec<u8>")]
    pub key: ObjectKey,

    pub stream_id: Uuid,
    pub version: Version,
    pub status: ObjectStatus,

    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,

    pub segment_count: i32,

    pub encrypted_metadata_nonce: Option<Vec<u8>>,
    pub encrypted_metadata: Option<Vec<u8>>,
    pub encrypted_metadata_encrypted_key: Option<Vec<u8>>,

    pub total_plain_size: i64,
    pub total_encrypted_size: i64,
    pub fixed_segment_size: i32,

    /// Packed encryption parameters, opaque to the metabase.
    pub encryption: i64,

    #[sqlx(skip)]
    pub is_prefix: bool,
}

impl ObjectEntry {
    /// Synthetic directory entry for `key`.
    pub fn prefix(key: ObjectKey, status: ObjectStatus) -> Self {
        Self {
            key,
            status,
            is_prefix: true,
            ..Default::default()
        }
    }
}

/// A freshly begun object version.
#[derive(Clone, Debug, PartialEq)]
pub struct Object {
    pub project_id: Uuid,
    pub bucket_name: String,
    pub object_key: ObjectKey,
    pub version: Version,
    pub stream_id: Uuid,
    pub status: ObjectStatus,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub encryption: i64,
}

/// Request to begin a new pending object with the next free version.
#[derive(Clone, Debug, Default)]
pub struct BeginObjectNextVersion {
    pub project_id: Uuid,
    pub bucket_name: String,
    pub object_key: ObjectKey,
    pub stream_id: Uuid,
    pub expires_at: Option<DateTime<Utc>>,
    pub encryption: i64,
}

/// Last position seen by a listing: (key, version).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct IterateCursor {
    pub key: ObjectKey,
    pub version: Version,
}

/// Listing request for one (project, bucket, status) scope.
#[derive(Clone, Debug, Default)]
pub struct IterateObjectsWithStatus {
    pub project_id: Uuid,
    pub bucket_name: String,
    pub status: ObjectStatus,

    /// Only keys starting with this prefix are listed, and the prefix is
    /// stripped from delivered keys.
    pub prefix: ObjectKey,
    /// Listing continues strictly after this position.
    pub cursor: IterateCursor,
    /// Rows fetched per backend query. Out-of-range values use the default.
    pub batch_size: i64,
    /// Return every key instead of collapsing delimiter-bounded prefixes.
    pub recursive: bool,
}
