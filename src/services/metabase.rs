//! Metabase — versioned object metadata on top of a storage [`Adapter`].
//!
//! Two entry points: beginning a new object version (with conflict retries)
//! and iterating objects of one bucket and status. Neither keeps shared
//! in-memory state; version uniqueness is the backend's job.

use super::{cancellable, iterator::ObjectsIterator, retry::RetryPolicy};
use crate::{
    adapters::Adapter,
    models::{
        key::MAX_KEY_LENGTH,
        object::{BeginObjectNextVersion, IterateObjectsWithStatus, Object},
    },
};
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

#[derive(Debug, Error)]
pub enum MetabaseError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    /// A concurrent writer won the race. Retried internally.
    #[error("conflicting concurrent update")]
    Conflict,
    #[error("gave up after {attempts} attempts because of concurrent updates")]
    RetriesExhausted { attempts: u32 },
    #[error("operation canceled")]
    Canceled,
    #[error(transparent)]
    Backend(#[from] sqlx::Error),
}

pub type MetabaseResult<T> = Result<T, MetabaseError>;

#[derive(Clone)]
pub struct Metabase {
    adapter: Arc<dyn Adapter>,
    retry: RetryPolicy,
}

impl Metabase {
    pub fn new(adapter: Arc<dyn Adapter>, retry: RetryPolicy) -> Self {
        Self { adapter, retry }
    }

    pub fn adapter(&self) -> &Arc<dyn Adapter> {
        &self.adapter
    }

    /// Begin a pending object with the next version of its
    /// (project, bucket, key).
    ///
    /// Conflicts with concurrent writers are retried according to the
    /// configured [`RetryPolicy`]; running out of attempts yields
    /// [`MetabaseError::RetriesExhausted`].
    #[instrument(
        skip(self, cancel, opts),
        fields(project_id = %opts.project_id, bucket = %opts.bucket_name, key = %opts.object_key)
    )]
    pub async fn begin_object_next_version(
        &self,
        cancel: &CancellationToken,
        opts: BeginObjectNextVersion,
    ) -> MetabaseResult<Object> {
        verify_begin(&opts)?;

        let object = self
            .retry
            .run(cancel, || {
                cancellable(cancel, self.adapter.begin_object_next_version(&opts))
            })
            .await?;

        debug!(version = object.version, "began object");
        Ok(object)
    }

    /// Start iterating objects with the given status.
    ///
    /// The first batch is fetched before returning, so request and backend
    /// errors on the initial query are reported here. Later failures end the
    /// iteration and are available from [`ObjectsIterator::err`].
    #[instrument(
        skip(self, cancel, opts),
        fields(project_id = %opts.project_id, bucket = %opts.bucket_name, recursive = opts.recursive)
    )]
    pub async fn iterate_objects(
        &self,
        cancel: CancellationToken,
        opts: IterateObjectsWithStatus,
    ) -> MetabaseResult<ObjectsIterator> {
        ObjectsIterator::start(self.adapter.clone(), cancel, opts).await
    }
}

fn verify_begin(opts: &BeginObjectNextVersion) -> MetabaseResult<()> {
    if opts.project_id.is_nil() {
        return Err(MetabaseError::InvalidRequest("project id missing".into()));
    }
    if opts.bucket_name.is_empty() {
        return Err(MetabaseError::InvalidRequest("bucket name missing".into()));
    }
    if opts.object_key.is_empty() {
        return Err(MetabaseError::InvalidRequest("object key missing".into()));
    }
    if opts.object_key.len() > MAX_KEY_LENGTH {
        return Err(MetabaseError::InvalidRequest(format!(
            "object key longer than {MAX_KEY_LENGTH} bytes"
        )));
    }
    if opts.stream_id.is_nil() {
        return Err(MetabaseError::InvalidRequest("stream id missing".into()));
    }
    Ok(())
}
