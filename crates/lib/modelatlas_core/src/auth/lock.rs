//! Storage lock serializing access to the persisted token.

use std::time::Duration;

use tokio::sync::{Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::AuthError;

/// Async mutex acquired with a bounded wait.
#[derive(Debug)]
pub struct StorageLock {
    inner: Mutex<()>,
    wait: Duration,
}

impl StorageLock {
    pub fn new(wait: Duration) -> Self {
        Self {
            inner: Mutex::new(()),
            wait,
        }
    }

    /// Acquire the lock, failing with [`AuthError::LockTimeout`] after the
    /// configured wait or [`AuthError::Aborted`] if `cancel` fires first.
    pub async fn acquire(&self, cancel: &CancellationToken) -> Result<MutexGuard<'_, ()>, AuthError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(AuthError::Aborted),
            guard = tokio::time::timeout(self.wait, self.inner.lock()) => {
                guard.map_err(|_| {
                    debug!(wait_ms = self.wait.as_millis() as u64, "storage lock acquisition timed out");
                    AuthError::LockTimeout(self.wait)
                })
            }
        }
    }
}
