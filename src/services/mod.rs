//! Metabase services: version assignment, object iteration and the retry
//! policy shared by write paths.

pub mod iterator;
pub mod metabase;
pub mod retry;

use metabase::{MetabaseError, MetabaseResult};
use std::future::Future;
use tokio_util::sync::CancellationToken;

/// Run a backend call, abandoning it as soon as `cancel` fires.
pub(crate) async fn cancellable<T>(
    cancel: &CancellationToken,
    fut: impl Future<Output = MetabaseResult<T>>,
) -> MetabaseResult<T> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(MetabaseError::Canceled),
        result = fut => result,
    }
}
