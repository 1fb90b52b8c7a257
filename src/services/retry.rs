//! Bounded retry for operations that can lose a race to a concurrent writer.

use super::metabase::{MetabaseError, MetabaseResult};
use std::{future::Future, time::Duration};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// How often, and how patiently, a conflicting operation is retried.
///
/// Only [`MetabaseError::Conflict`] is retried. Every other error is
/// returned from the attempt that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one. Zero behaves like one.
    pub max_attempts: u32,
    /// Delay after the first conflict, doubled after each further one.
    pub base_delay: Duration,
    /// Upper bound for a single delay.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            base_delay: Duration::from_millis(5),
            max_delay: Duration::from_millis(250),
        }
    }
}

impl RetryPolicy {
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Policy that retries immediately, for tests.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    /// Delay to wait after the `attempt`-th conflict (0-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Run `op` until it succeeds, fails with a non-conflict error, the
    /// attempt budget runs out, or `cancel` fires.
    pub async fn run<T, F, Fut>(&self, cancel: &CancellationToken, mut op: F) -> MetabaseResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = MetabaseResult<T>>,
    {
        let attempts = self.max_attempts.max(1);
        for attempt in 0..attempts {
            match op().await {
                Err(MetabaseError::Conflict) => {
                    debug!(attempt, "conflict, retrying");
                }
                other => return other,
            }

            if attempt + 1 < attempts {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(MetabaseError::Canceled),
                    _ = tokio::time::sleep(self.delay_for(attempt)) => {}
                }
            }
        }

        Err(MetabaseError::RetriesExhausted { attempts })
    }
}
