//! Shared state handed to every HTTP handler.

use crate::services::metabase::Metabase;
use std::{future::Future, io};
use tokio_util::sync::CancellationToken;

#[derive(Clone)]
pub struct AppState {
    pub metabase: Metabase,
    /// Cancelled on shutdown; requests run under child tokens.
    pub shutdown: CancellationToken,
    /// Listing batch size used when a request does not pick one.
    pub list_batch_size: i64,
}

impl AppState {
    pub fn new(metabase: Metabase, shutdown: CancellationToken, list_batch_size: i64) -> Self {
        Self {
            metabase,
            shutdown,
            list_batch_size,
        }
    }

    /// Token for one request, cancelled together with the server.
    pub fn request_token(&self) -> CancellationToken {
        self.shutdown.child_token()
    }
}

/// Cancel `shutdown` once `signal` fires.
///
/// If the signal listener cannot be installed this never completes, so the
/// server keeps running instead of stopping right after startup.
pub async fn cancel_on_signal(
    signal: impl Future<Output = io::Result<()>>,
    shutdown: CancellationToken,
) {
    if let Err(err) = signal.await {
        tracing::error!("Failed to listen for shutdown signal: {}", err);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down, cancelling in-flight requests");
    shutdown.cancel();
}
