//! Concurrency cap for in-flight calls.

use crate::BulkheadConfig;
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};
use trellis_error::{ResilienceError, ResilienceErrorKind};

/// Semaphore-backed limit on concurrent calls.
#[derive(Debug, Clone)]
pub struct Bulkhead {
    config: BulkheadConfig,
    semaphore: Arc<Semaphore>,
}

/// Slot held for the duration of one call.
///
/// The slot is released when the permit is dropped.
#[derive(Debug)]
pub struct BulkheadPermit {
    _permit: OwnedSemaphorePermit,
}

impl Bulkhead {
    /// Create a bulkhead. A zero cap falls back to the default.
    pub fn new(mut config: BulkheadConfig) -> Self {
        if config.max_concurrent == 0 {
            config.max_concurrent = BulkheadConfig::default().max_concurrent;
        }
        debug!(max_concurrent = config.max_concurrent, "Creating bulkhead");
        let semaphore = Arc::new(Semaphore::new(config.max_concurrent));
        Self { config, semaphore }
    }

    /// Acquire a slot, waiting up to the configured maximum.
    ///
    /// A zero wait fails immediately when every slot is taken.
    ///
    /// # Errors
    ///
    /// Returns a bulkhead-full error when no slot frees up in time, or a
    /// cancellation error if `cancel` fires first.
    #[instrument(skip(self, cancel))]
    pub async fn acquire(&self, cancel: &CancellationToken) -> Result<BulkheadPermit, ResilienceError> {
        if cancel.is_cancelled() {
            return Err(ResilienceError::cancelled());
        }
        if self.config.max_wait_ms == 0 {
            return self
                .try_acquire()
                .ok_or_else(|| ResilienceError::new(ResilienceErrorKind::BulkheadFull));
        }

        let semaphore = Arc::clone(&self.semaphore);
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ResilienceError::cancelled()),
            acquired = tokio::time::timeout(self.config.max_wait(), semaphore.acquire_owned()) => {
                match acquired {
                    Ok(Ok(permit)) => Ok(BulkheadPermit { _permit: permit }),
                    // Timed out, or the semaphore was closed
                    _ => Err(ResilienceError::new(ResilienceErrorKind::BulkheadFull)),
                }
            }
        }
    }

    /// Take a slot only if one is free right now.
    pub fn try_acquire(&self) -> Option<BulkheadPermit> {
        Arc::clone(&self.semaphore)
            .try_acquire_owned()
            .ok()
            .map(|permit| BulkheadPermit { _permit: permit })
    }

    /// Free slots.
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Slots currently held.
    pub fn in_use(&self) -> usize {
        self.config.max_concurrent - self.semaphore.available_permits()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_fail_fast_when_full() {
        let bulkhead = Bulkhead::new(BulkheadConfig {
            max_concurrent: 1,
            max_wait_ms: 0,
        });
        let cancel = CancellationToken::new();
        let held = bulkhead.acquire(&cancel).await.unwrap();
        assert_eq!(bulkhead.in_use(), 1);

        let err = bulkhead.acquire(&cancel).await.unwrap_err();
        assert_eq!(err.kind, ResilienceErrorKind::BulkheadFull);

        drop(held);
        assert_eq!(bulkhead.available(), 1);
        assert!(bulkhead.try_acquire().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_times_out() {
        let bulkhead = Bulkhead::new(BulkheadConfig {
            max_concurrent: 1,
            max_wait_ms: 50,
        });
        let cancel = CancellationToken::new();
        let _held = bulkhead.acquire(&cancel).await.unwrap();
        let err = bulkhead.acquire(&cancel).await.unwrap_err();
        assert_eq!(err.kind, ResilienceErrorKind::BulkheadFull);
    }

    #[tokio::test(start_paused = true)]
    async fn test_waiter_gets_released_slot() {
        let bulkhead = Bulkhead::new(BulkheadConfig {
            max_concurrent: 1,
            max_wait_ms: 1_000,
        });
        let cancel = CancellationToken::new();
        let held = bulkhead.acquire(&cancel).await.unwrap();

        let other = bulkhead.clone();
        let token = cancel.clone();
        let waiter = tokio::spawn(async move { other.acquire(&token).await.map(|_| ()) });

        tokio::time::sleep(Duration::from_millis(10)).await;
        drop(held);
        assert!(waiter.await.unwrap().is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_while_waiting() {
        let bulkhead = Bulkhead::new(BulkheadConfig {
            max_concurrent: 1,
            max_wait_ms: 60_000,
        });
        let cancel = CancellationToken::new();
        let _held = bulkhead.acquire(&cancel).await.unwrap();

        let other = bulkhead.clone();
        let token = cancel.clone();
        let waiter = tokio::spawn(async move { other.acquire(&token).await.map(|_| ()) });

        tokio::time::sleep(Duration::from_millis(10)).await;
        cancel.cancel();
        let err = waiter.await.unwrap().unwrap_err();
        assert!(err.is_cancelled());
    }
}
