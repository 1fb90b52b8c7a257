//! Object iteration over one (project, bucket, status) scope.
//!
//! Rows are pulled from the adapter in bounded batches using a keyset cursor
//! on `(object_key, version)`, so a refill always seeks strictly past the
//! last delivered row. In non-recursive mode keys sharing a
//! delimiter-terminated prefix are collapsed into one synthetic prefix entry,
//! emulating a directory listing over the flat key space.

use super::{
    cancellable,
    metabase::{MetabaseError, MetabaseResult},
};
use crate::{
    adapters::{Adapter, ScanRange},
    models::{
        key::{MAX_KEY_LENGTH, ObjectKey, before_key, less_key, next_prefix},
        object::{
            BEFORE_FIRST_VERSION, IterateCursor, IterateObjectsWithStatus, ObjectEntry,
            ObjectStatus,
        },
    },
};
use std::{sync::Arc, vec};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

/// Largest batch fetched by one query, also used when the requested batch
/// size is out of range.
pub const BATCH_SIZE_LIMIT: usize = 2500;

/// Iterates objects of one bucket and status.
///
/// Driven by a single caller through [`ObjectsIterator::next`]. Once `next`
/// returns `None` it keeps doing so; if that happened because of an error
/// (backend failure or cancellation), [`ObjectsIterator::err`] reports it.
pub struct ObjectsIterator {
    adapter: Arc<dyn Adapter>,
    cancel: CancellationToken,

    project_id: Uuid,
    bucket_name: String,
    status: ObjectStatus,
    prefix: ObjectKey,
    limit_key: Option<ObjectKey>,
    batch_size: usize,
    recursive: bool,

    cur_index: usize,
    cur_rows: vec::IntoIter<ObjectEntry>,
    cursor: IterateCursor,

    skip_prefix: Option<ObjectKey>,
    done: bool,
    err: Option<MetabaseError>,
}

impl ObjectsIterator {
    /// Validate the request, position the cursor and fetch the first batch.
    pub(crate) async fn start(
        adapter: Arc<dyn Adapter>,
        cancel: CancellationToken,
        opts: IterateObjectsWithStatus,
    ) -> MetabaseResult<Self> {
        verify_iterate(&opts)?;

        // start from either the cursor or the prefix, whichever is larger
        let mut cursor = opts.cursor;
        if less_key(&cursor.key, &opts.prefix) {
            cursor = IterateCursor {
                key: before_key(&opts.prefix),
                version: BEFORE_FIRST_VERSION,
            };
        }

        let limit_key = Some(next_prefix(&opts.prefix)).filter(|key| !key.is_empty());

        let mut it = Self {
            adapter,
            cancel,
            project_id: opts.project_id,
            bucket_name: opts.bucket_name,
            status: opts.status,
            prefix: opts.prefix,
            limit_key,
            batch_size: normalize_batch_size(opts.batch_size),
            recursive: opts.recursive,
            cur_index: 0,
            cur_rows: Vec::new().into_iter(),
            cursor,
            skip_prefix: None,
            done: false,
            err: None,
        };

        it.cur_rows = it.query_batch().await?.into_iter();
        Ok(it)
    }

    /// Next entry of the listing, or `None` once it is over.
    pub async fn next(&mut self) -> Option<ObjectEntry> {
        if self.done {
            return None;
        }
        let item = self.advance().await;
        if item.is_none() {
            self.done = true;
        }
        item
    }

    /// Error that ended the iteration early, if any.
    pub fn err(&self) -> Option<&MetabaseError> {
        self.err.as_ref()
    }

    /// Consume the iterator, reporting the error that ended it, if any.
    pub fn finish(self) -> MetabaseResult<()> {
        match self.err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Full-key position of the last row read from the backend.
    pub fn cursor(&self) -> &IterateCursor {
        &self.cursor
    }

    /// Cursor that restarts a listing right after `entry`, an entry this
    /// iterator delivered.
    ///
    /// After a prefix entry the restart skips every key under that prefix.
    pub fn resume_cursor(&self, entry: &ObjectEntry) -> IterateCursor {
        let full_key = self.prefix.join(&entry.key);
        if entry.is_prefix {
            let after = next_prefix(&full_key);
            IterateCursor {
                key: if after.is_empty() { full_key } else { after },
                version: BEFORE_FIRST_VERSION,
            }
        } else {
            IterateCursor {
                key: full_key,
                version: entry.version,
            }
        }
    }

    /// Pull the next row and, unless recursive, collapse it into its
    /// top-level prefix.
    async fn advance(&mut self) -> Option<ObjectEntry> {
        let mut item = self.next_row().await?;
        if self.recursive {
            return Some(item);
        }

        // skip until we are past the prefix we returned before
        if let Some(skip) = self.skip_prefix.take() {
            while item.key.starts_with(&skip) {
                item = self.next_row().await?;
            }
        }

        if let Some(pos) = item.key.find_delimiter() {
            let prefix = item.key.truncated(pos + 1);
            self.skip_prefix = Some(prefix.clone());
            return Some(ObjectEntry::prefix(prefix, self.status));
        }

        Some(item)
    }

    /// Next raw row with the listing prefix stripped, refilling the batch
    /// when the previous one came back full.
    async fn next_row(&mut self) -> Option<ObjectEntry> {
        loop {
            if self.cancel.is_cancelled() {
                self.fail(MetabaseError::Canceled);
                return None;
            }

            let mut item = match self.cur_rows.next() {
                Some(item) => item,
                None => {
                    // a short batch means the range is exhausted
                    if self.cur_index < self.batch_size {
                        return None;
                    }

                    match self.query_batch().await {
                        Ok(rows) => {
                            self.cur_rows = rows.into_iter();
                            self.cur_index = 0;
                        }
                        Err(err) => {
                            self.fail(err);
                            return None;
                        }
                    }
                    self.cur_rows.next()?
                }
            };

            self.cur_index += 1;
            self.cursor = IterateCursor {
                key: item.key.clone(),
                version: item.version,
            };

            if self.prefix.is_empty() {
                return Some(item);
            }
            // rows between before_key(prefix) and prefix are outside the listing
            if let Some(relative) = item.key.strip_prefix(&self.prefix) {
                item.key = relative;
                return Some(item);
            }
        }
    }

    async fn query_batch(&self) -> MetabaseResult<Vec<ObjectEntry>> {
        let scan = ScanRange {
            project_id: self.project_id,
            bucket_name: self.bucket_name.clone(),
            status: self.status,
            seek: self.cursor.clone(),
            upper_bound: self.limit_key.clone(),
            limit: self.batch_size,
        };
        debug!(
            cursor_key = %scan.seek.key,
            cursor_version = scan.seek.version,
            limit = scan.limit,
            "fetching object batch"
        );

        cancellable(&self.cancel, self.adapter.scan_range(&scan)).await
    }

    fn fail(&mut self, err: MetabaseError) {
        warn!(bucket = %self.bucket_name, "object iteration stopped: {}", err);
        self.err = Some(err);
    }
}

/// Clamp a requested batch size into `1..=BATCH_SIZE_LIMIT`, falling back to
/// the limit for anything out of range.
pub fn normalize_batch_size(requested: i64) -> usize {
    if requested <= 0 || requested > BATCH_SIZE_LIMIT as i64 {
        BATCH_SIZE_LIMIT
    } else {
        requested as usize
    }
}

fn verify_iterate(opts: &IterateObjectsWithStatus) -> MetabaseResult<()> {
    if opts.project_id.is_nil() {
        return Err(MetabaseError::InvalidRequest("project id missing".into()));
    }
    if opts.bucket_name.is_empty() {
        return Err(MetabaseError::InvalidRequest("bucket name missing".into()));
    }
    if opts.prefix.len() > MAX_KEY_LENGTH {
        return Err(MetabaseError::InvalidRequest(format!(
            "prefix longer than {MAX_KEY_LENGTH} bytes"
        )));
    }
    if opts.cursor.key.len() > MAX_KEY_LENGTH {
        return Err(MetabaseError::InvalidRequest(format!(
            "cursor key longer than {MAX_KEY_LENGTH} bytes"
        )));
    }
    if opts.cursor.version < BEFORE_FIRST_VERSION {
        return Err(MetabaseError::InvalidRequest(format!(
            "cursor version {} is invalid",
            opts.cursor.version
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        adapters::{AdapterResult, SqliteAdapter},
        models::object::{BeginObjectNextVersion, Object, Version},
        services::metabase::Metabase,
        test_support::{insert_entry, memory_metabase},
    };
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    const COMMITTED: ObjectStatus = ObjectStatus::CommittedUnversioned;

    async fn seed(adapter: &SqliteAdapter, project: Uuid, rows: &[(&str, Version)]) {
        for (key, version) in rows {
            insert_entry(adapter.pool(), project, "bucket", *key, *version, COMMITTED).await;
        }
    }

    fn opts(project: Uuid, prefix: &str, batch_size: i64, recursive: bool) -> IterateObjectsWithStatus {
        IterateObjectsWithStatus {
            project_id: project,
            bucket_name: "bucket".into(),
            status: COMMITTED,
            prefix: prefix.into(),
            cursor: IterateCursor::default(),
            batch_size,
            recursive,
        }
    }

    fn describe(entry: &ObjectEntry) -> String {
        if entry.is_prefix {
            format!("{}*", entry.key)
        } else {
            format!("{}@{}", entry.key, entry.version)
        }
    }

    async fn drain(it: &mut ObjectsIterator) -> Vec<String> {
        let mut out = Vec::new();
        while let Some(entry) = it.next().await {
            out.push(describe(&entry));
        }
        out
    }

    async fn list(metabase: &Metabase, opts: IterateObjectsWithStatus) -> Vec<String> {
        let mut it = metabase
            .iterate_objects(CancellationToken::new(), opts)
            .await
            .unwrap();
        let out = drain(&mut it).await;
        it.finish().unwrap();
        out
    }

    /// Counts scans and fails every scan from `fail_from` onwards.
    struct ScriptedAdapter {
        inner: SqliteAdapter,
        scans: AtomicU32,
        fail_from: u32,
    }

    #[async_trait]
    impl Adapter for ScriptedAdapter {
        async fn begin_object_next_version(
            &self,
            opts: &BeginObjectNextVersion,
        ) -> AdapterResult<Object> {
            self.inner.begin_object_next_version(opts).await
        }

        async fn scan_range(&self, scan: &ScanRange) -> AdapterResult<Vec<ObjectEntry>> {
            let n = self.scans.fetch_add(1, Ordering::Relaxed);
            if n >= self.fail_from {
                return Err(MetabaseError::Backend(sqlx::Error::PoolTimedOut));
            }
            self.inner.scan_range(scan).await
        }
    }

    async fn scripted(fail_from: u32) -> (Metabase, Arc<ScriptedAdapter>, Uuid) {
        let (_, inner) = memory_metabase().await;
        let project = Uuid::new_v4();
        seed(&inner, project, &[("a", 1), ("b", 1), ("c", 1), ("d", 1), ("e", 1)]).await;
        let adapter = Arc::new(ScriptedAdapter {
            inner,
            scans: AtomicU32::new(0),
            fail_from,
        });
        let metabase = Metabase::new(adapter.clone(), Default::default());
        (metabase, adapter, project)
    }

    #[tokio::test]
    async fn test_every_batch_size_yields_all_rows_once_in_order() {
        let (metabase, adapter) = memory_metabase().await;
        let project = Uuid::new_v4();
        let mut rows = Vec::new();
        for key in ["k0", "k1", "k1/x", "k2", "k3", "k4"] {
            for version in 1..=2 {
                rows.push((key, version));
            }
        }
        seed(&adapter, project, &rows).await;
        let expected: Vec<String> = rows.iter().map(|(k, v)| format!("{k}@{v}")).collect();

        for batch_size in 1..=(rows.len() as i64 + 5) {
            let got = list(&metabase, opts(project, "", batch_size, true)).await;
            assert_eq!(got, expected, "batch size {batch_size}");
        }
    }

    #[tokio::test]
    async fn test_resume_from_cursor_yields_remaining_rows() {
        let (metabase, adapter) = memory_metabase().await;
        let project = Uuid::new_v4();
        let rows: Vec<(String, Version)> = (0..10)
            .flat_map(|i| [(format!("key-{i:02}"), 1), (format!("key-{i:02}"), 3)])
            .collect();
        let refs: Vec<(&str, Version)> = rows.iter().map(|(k, v)| (k.as_str(), *v)).collect();
        seed(&adapter, project, &refs).await;

        let full = list(&metabase, opts(project, "", 3, true)).await;
        assert_eq!(full.len(), 20);

        let k = 7;
        let mut it = metabase
            .iterate_objects(CancellationToken::new(), opts(project, "", 3, true))
            .await
            .unwrap();
        let mut first = Vec::new();
        let mut last = None;
        for _ in 0..k {
            let entry = it.next().await.unwrap();
            first.push(describe(&entry));
            last = Some(entry);
        }
        let cursor = it.resume_cursor(&last.unwrap());
        assert_eq!(&cursor, it.cursor());
        drop(it);

        let mut resumed = opts(project, "", 3, true);
        resumed.cursor = cursor;
        let rest = list(&metabase, resumed).await;

        assert_eq!(first, full[..k]);
        assert_eq!(rest, full[k..]);
    }

    #[tokio::test]
    async fn test_prefixes_are_collapsed() {
        let (metabase, adapter) = memory_metabase().await;
        let project = Uuid::new_v4();
        seed(&adapter, project, &[("a/1", 1), ("a/2", 1), ("b", 1), ("c/1", 1)]).await;

        for batch_size in [1, 2, 0] {
            let flat = list(&metabase, opts(project, "", batch_size, false)).await;
            assert_eq!(flat, vec!["a/*", "b@1", "c/*"]);

            let all = list(&metabase, opts(project, "", batch_size, true)).await;
            assert_eq!(all, vec!["a/1@1", "a/2@1", "b@1", "c/1@1"]);
        }
    }

    #[tokio::test]
    async fn test_prefix_entries_carry_only_key_and_status() {
        let (metabase, adapter) = memory_metabase().await;
        let project = Uuid::new_v4();
        seed(&adapter, project, &[("dir/file", 4)]).await;

        let mut it = metabase
            .iterate_objects(CancellationToken::new(), opts(project, "", 0, false))
            .await
            .unwrap();
        let entry = it.next().await.unwrap();
        assert_eq!(entry, ObjectEntry::prefix("dir/".into(), COMMITTED));
        assert_eq!(entry.version, 0);
        assert!(it.next().await.is_none());
    }

    #[tokio::test]
    async fn test_listing_within_prefix_strips_it() {
        let (metabase, adapter) = memory_metabase().await;
        let project = Uuid::new_v4();
        seed(
            &adapter,
            project,
            &[("p", 1), ("p/a/1", 1), ("p/a/2", 1), ("p/b", 1), ("p0", 1), ("q", 1)],
        )
        .await;

        let flat = list(&metabase, opts(project, "p/", 2, false)).await;
        assert_eq!(flat, vec!["a/*", "b@1"]);

        let all = list(&metabase, opts(project, "p/", 2, true)).await;
        assert_eq!(all, vec!["a/1@1", "a/2@1", "b@1"]);
    }

    #[tokio::test]
    async fn test_empty_scope_yields_nothing() {
        let (metabase, _) = memory_metabase().await;
        let mut it = metabase
            .iterate_objects(CancellationToken::new(), opts(Uuid::new_v4(), "", 10, false))
            .await
            .unwrap();
        assert!(it.next().await.is_none());
        assert!(it.next().await.is_none());
        assert!(it.err().is_none());
    }

    #[tokio::test]
    async fn test_cursor_before_prefix_starts_at_prefix() {
        let (metabase, adapter) = memory_metabase().await;
        let project = Uuid::new_v4();
        seed(&adapter, project, &[("a/1", 1), ("b/1", 1), ("b/2", 1), ("c", 1)]).await;

        let mut request = opts(project, "b/", 10, true);
        request.cursor = IterateCursor {
            key: "a/1".into(),
            version: 5,
        };
        assert_eq!(list(&metabase, request).await, vec!["1@1", "2@1"]);

        let mut inside = opts(project, "b/", 10, true);
        inside.cursor = IterateCursor {
            key: "b/1".into(),
            version: 1,
        };
        assert_eq!(list(&metabase, inside).await, vec!["2@1"]);
    }

    #[tokio::test]
    async fn test_keys_sorting_just_below_prefix_are_skipped() {
        let (metabase, adapter) = memory_metabase().await;
        let project = Uuid::new_v4();
        let just_below = ObjectKey::new(vec![b'a', b'a', 0xFF]);
        let further_below = ObjectKey::new(vec![b'a', b'a', 0xFF, 0x01]);
        insert_entry(adapter.pool(), project, "bucket", just_below, 1, COMMITTED).await;
        insert_entry(adapter.pool(), project, "bucket", further_below, 1, COMMITTED).await;
        seed(&adapter, project, &[("ab/1", 1), ("ab/2", 2), ("ac", 1)]).await;

        for batch_size in [1, 2, 10] {
            let got = list(&metabase, opts(project, "ab", batch_size, true)).await;
            assert_eq!(got, vec!["/1@1", "/2@2"], "batch size {batch_size}");
        }
    }

    #[tokio::test]
    async fn test_resume_after_prefix_entry_skips_the_group() {
        let (metabase, adapter) = memory_metabase().await;
        let project = Uuid::new_v4();
        seed(&adapter, project, &[("a/1", 1), ("a/2", 1), ("a/3", 1), ("b", 1)]).await;

        let mut it = metabase
            .iterate_objects(CancellationToken::new(), opts(project, "", 1, false))
            .await
            .unwrap();
        let first = it.next().await.unwrap();
        assert!(first.is_prefix);
        let cursor = it.resume_cursor(&first);
        assert_eq!(cursor.key, ObjectKey::from("a0"));
        assert_eq!(cursor.version, BEFORE_FIRST_VERSION);

        let mut resumed = opts(project, "", 1, false);
        resumed.cursor = cursor;
        assert_eq!(list(&metabase, resumed).await, vec!["b@1"]);
    }

    #[tokio::test]
    async fn test_status_filter() {
        let (metabase, adapter) = memory_metabase().await;
        let project = Uuid::new_v4();
        seed(&adapter, project, &[("a", 1)]).await;
        insert_entry(adapter.pool(), project, "bucket", "b", 1, ObjectStatus::Pending).await;

        assert_eq!(list(&metabase, opts(project, "", 0, true)).await, vec!["a@1"]);

        let mut pending = opts(project, "", 0, true);
        pending.status = ObjectStatus::Pending;
        assert_eq!(list(&metabase, pending).await, vec!["b@1"]);
    }

    #[tokio::test]
    async fn test_short_batch_stops_querying() {
        let (metabase, adapter, project) = scripted(u32::MAX).await;

        let got = list(&metabase, opts(project, "", 2, true)).await;
        assert_eq!(got.len(), 5);
        // 2 + 2 + 1 rows, the last batch is short
        assert_eq!(adapter.scans.load(Ordering::Relaxed), 3);
    }

    #[tokio::test]
    async fn test_backend_failure_ends_iteration() {
        let (metabase, adapter, project) = scripted(1).await;

        let mut it = metabase
            .iterate_objects(CancellationToken::new(), opts(project, "", 2, true))
            .await
            .unwrap();
        assert_eq!(drain(&mut it).await, vec!["a@1", "b@1"]);
        assert!(it.next().await.is_none());
        assert!(matches!(it.err(), Some(MetabaseError::Backend(_))));
        assert_eq!(adapter.scans.load(Ordering::Relaxed), 2);
        assert!(it.finish().is_err());
    }

    #[tokio::test]
    async fn test_first_query_failure_is_returned() {
        let (metabase, _, project) = scripted(0).await;
        let result = metabase
            .iterate_objects(CancellationToken::new(), opts(project, "", 2, true))
            .await;
        assert!(matches!(result, Err(MetabaseError::Backend(_))));
    }

    #[tokio::test]
    async fn test_cancellation_stops_iteration() {
        let (metabase, adapter, project) = scripted(u32::MAX).await;
        let cancel = CancellationToken::new();

        let mut it = metabase
            .iterate_objects(cancel.clone(), opts(project, "", 2, true))
            .await
            .unwrap();
        assert!(it.next().await.is_some());

        cancel.cancel();
        assert!(it.next().await.is_none());
        assert!(matches!(it.err(), Some(MetabaseError::Canceled)));
        assert_eq!(adapter.scans.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_invalid_requests_are_rejected() {
        let (metabase, _) = memory_metabase().await;
        let project = Uuid::new_v4();

        let mut cases = vec![opts(Uuid::nil(), "", 0, true)];
        let mut no_bucket = opts(project, "", 0, true);
        no_bucket.bucket_name.clear();
        cases.push(no_bucket);
        cases.push(opts(project, &"p".repeat(MAX_KEY_LENGTH + 1), 0, true));
        let mut long_cursor = opts(project, "", 0, true);
        long_cursor.cursor.key = "c".repeat(MAX_KEY_LENGTH + 1).into();
        cases.push(long_cursor);
        let mut bad_version = opts(project, "", 0, true);
        bad_version.cursor.version = -2;
        cases.push(bad_version);

        for request in cases {
            let result = metabase
                .iterate_objects(CancellationToken::new(), request)
                .await;
            assert!(matches!(result, Err(MetabaseError::InvalidRequest(_))));
        }
    }

    #[test]
    fn test_batch_size_normalization() {
        assert_eq!(normalize_batch_size(0), BATCH_SIZE_LIMIT);
        assert_eq!(normalize_batch_size(-5), BATCH_SIZE_LIMIT);
        assert_eq!(normalize_batch_size(BATCH_SIZE_LIMIT as i64 + 1), BATCH_SIZE_LIMIT);
        assert_eq!(normalize_batch_size(7), 7);
        assert_eq!(normalize_batch_size(BATCH_SIZE_LIMIT as i64), BATCH_SIZE_LIMIT);
    }
}
