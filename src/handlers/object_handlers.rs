//! HTTP handlers for beginning and listing objects.
//! Keys travel as path segments or query strings; cursors are base64 so
//! arbitrary key bytes survive the round trip.

use crate::{
    errors::AppError,
    models::{
        key::ObjectKey,
        object::{
            BEFORE_FIRST_VERSION, BeginObjectNextVersion, IterateCursor,
            IterateObjectsWithStatus, Object, ObjectEntry, ObjectStatus, Version,
        },
    },
    state::AppState,
};
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use base64::{Engine as _, engine::general_purpose};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

const MAX_KEYS_LIMIT: usize = 1000;

/// Query params accepted by the object listing.
#[derive(Debug, Default, Deserialize)]
pub struct ListObjectsQuery {
    pub prefix: Option<String>,
    pub status: Option<ObjectStatus>,
    /// Base64 of the full key to continue after.
    pub cursor: Option<String>,
    pub cursor_version: Option<Version>,
    pub batch_size: Option<i64>,
    pub recursive: Option<bool>,
    pub max_keys: Option<usize>,
}

/// Optional request body for beginning an object.
#[derive(Debug, Default, Deserialize)]
pub struct BeginObjectReq {
    pub stream_id: Option<Uuid>,
    pub expires_at: Option<DateTime<Utc>>,
    pub encryption: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct ObjectResponse {
    pub project_id: Uuid,
    pub bucket_name: String,
    pub object_key: String,
    pub version: Version,
    pub stream_id: Uuid,
    pub status: ObjectStatus,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub encryption: i64,
}

/// One listing entry. Prefix entries only carry the key fields, `is_prefix`
/// and `status`.
///
/// `key` is for display and replaces invalid UTF-8; `key_token` is the exact
/// key bytes in base64, the same encoding as `next_cursor`.
#[derive(Debug, Serialize)]
pub struct EntryResponse {
    pub key: String,
    pub key_token: String,
    pub is_prefix: bool,
    pub status: ObjectStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<Version>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub segment_count: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_plain_size: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_encrypted_size: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct ListObjectsResponse {
    pub entries: Vec<EntryResponse>,
    pub key_count: usize,
    pub is_truncated: bool,
    pub next_cursor: Option<String>,
    pub next_cursor_version: Option<Version>,
}

/// POST `/projects/{project_id}/buckets/{bucket}/objects/{*key}` — begin a
/// pending object with the next free version.
pub async fn begin_object(
    State(state): State<AppState>,
    Path((project_id, bucket, key)): Path<(Uuid, String, String)>,
    payload: Option<Json<BeginObjectReq>>,
) -> Result<(StatusCode, Json<ObjectResponse>), AppError> {
    let payload = payload.map(|Json(req)| req).unwrap_or_default();
    let opts = BeginObjectNextVersion {
        project_id,
        bucket_name: bucket,
        object_key: key.into(),
        stream_id: payload.stream_id.unwrap_or_else(Uuid::new_v4),
        expires_at: payload.expires_at,
        encryption: payload.encryption.unwrap_or_default(),
    };

    let object = state
        .metabase
        .begin_object_next_version(&state.request_token(), opts)
        .await?;

    Ok((StatusCode::CREATED, Json(object_response(object))))
}

/// GET `/projects/{project_id}/buckets/{bucket}/objects` — one page of a
/// listing, supports ?prefix=&status=&cursor=&cursor_version=&recursive=&max_keys=
pub async fn list_objects(
    State(state): State<AppState>,
    Path((project_id, bucket)): Path<(Uuid, String)>,
    Query(q): Query<ListObjectsQuery>,
) -> Result<Json<ListObjectsResponse>, AppError> {
    let max_keys = q.max_keys.unwrap_or(MAX_KEYS_LIMIT).clamp(1, MAX_KEYS_LIMIT);
    let batch_size = q.batch_size.unwrap_or(if state.list_batch_size > 0 {
        state.list_batch_size
    } else {
        max_keys as i64 + 1
    });

    let opts = IterateObjectsWithStatus {
        project_id,
        bucket_name: bucket,
        status: q.status.unwrap_or(ObjectStatus::CommittedUnversioned),
        prefix: q.prefix.unwrap_or_default().into(),
        cursor: IterateCursor {
            key: q
                .cursor
                .as_deref()
                .map(decode_cursor)
                .transpose()?
                .unwrap_or_default(),
            version: q.cursor_version.unwrap_or(BEFORE_FIRST_VERSION),
        },
        batch_size,
        recursive: q.recursive.unwrap_or(false),
    };

    let mut it = state
        .metabase
        .iterate_objects(state.request_token(), opts)
        .await?;

    // one entry past the page tells whether the listing is truncated
    let mut entries = Vec::new();
    let mut is_truncated = false;
    while let Some(entry) = it.next().await {
        if entries.len() == max_keys {
            is_truncated = true;
            break;
        }
        entries.push(entry);
    }

    let next = if is_truncated {
        entries.last().map(|last| it.resume_cursor(last))
    } else {
        None
    };
    it.finish()?;

    Ok(Json(ListObjectsResponse {
        key_count: entries.len(),
        entries: entries.into_iter().map(entry_response).collect(),
        is_truncated,
        next_cursor: next.as_ref().map(|c| encode_cursor(&c.key)),
        next_cursor_version: next.map(|c| c.version),
    }))
}

fn object_response(object: Object) -> ObjectResponse {
    ObjectResponse {
        project_id: object.project_id,
        bucket_name: object.bucket_name,
        object_key: object.object_key.to_string(),
        version: object.version,
        stream_id: object.stream_id,
        status: object.status,
        created_at: object.created_at,
        expires_at: object.expires_at,
        encryption: object.encryption,
    }
}

fn entry_response(entry: ObjectEntry) -> EntryResponse {
    if entry.is_prefix {
        return EntryResponse {
            key: entry.key.to_string(),
            key_token: encode_cursor(&entry.key),
            is_prefix: true,
            status: entry.status,
            version: None,
            stream_id: None,
            created_at: None,
            expires_at: None,
            segment_count: None,
            total_plain_size: None,
            total_encrypted_size: None,
        };
    }

    EntryResponse {
        key: entry.key.to_string(),
        key_token: encode_cursor(&entry.key),
        is_prefix: false,
        status: entry.status,
        version: Some(entry.version),
        stream_id: Some(entry.stream_id),
        created_at: Some(entry.created_at),
        expires_at: entry.expires_at,
        segment_count: Some(entry.segment_count),
        total_plain_size: Some(entry.total_plain_size),
        total_encrypted_size: Some(entry.total_encrypted_size),
    }
}

fn encode_cursor(key: &ObjectKey) -> String {
    general_purpose::STANDARD.encode(key.as_bytes())
}

fn decode_cursor(token: &str) -> Result<ObjectKey, AppError> {
    general_purpose::STANDARD
        .decode(token)
        .map(ObjectKey::from)
        .map_err(|_| AppError::bad_request("invalid cursor"))
}
