//! Cooperative cancellation for engine runs.

use std::future::Future;
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use std::time::Duration;
use tokio::sync::Notify;

/// Cancellation token shared between an engine run and its handle.
///
/// Cancellation is one-way; a cancelled token never resets.
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    inner: Arc<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    cancelled: AtomicBool,
    notify: Notify,
}

impl CancelToken {
    /// Create a new token in the non-cancelled state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::Acquire)
    }

    /// Request cancellation and wake any waiters.
    ///
    /// Returns `true` only for the call that actually cancelled the token.
    pub fn cancel(&self) -> bool {
        let first = !self.inner.cancelled.swap(true, Ordering::AcqRel);
        self.inner.notify.notify_waiters();
        first
    }

    /// Await until cancellation is requested.
    pub async fn cancelled(&self) {
        let notified = self.inner.notify.notified();
        tokio::pin!(notified);
        // Register before checking the flag so a concurrent `cancel()` is not missed
        notified.as_mut().enable();
        if self.is_cancelled() {
            return;
        }
        notified.await;
    }

    /// Sleep for `duration` unless cancelled first.
    ///
    /// Returns `true` if the sleep completed, `false` if cancelled.
    pub async fn sleep(&self, duration: Duration) -> bool {
        tokio::select! {
            _ = tokio::time::sleep(duration) => !self.is_cancelled(),
            _ = self.cancelled() => false,
        }
    }

    /// Drive `fut` to completion, then report whether it still matters.
    ///
    /// The future is never dropped half-way; its result is discarded
    /// (`None`) if cancellation was requested while it ran.
    pub async fn complete<F: Future>(&self, fut: F) -> Option<F::Output> {
        let output = fut.await;
        if self.is_cancelled() {
            None
        } else {
            Some(output)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_cancelled_returns_immediately_when_already_cancelled() {
        let token = CancelToken::new();
        token.cancel();
        token.cancelled().await;
        assert!(token.is_cancelled());
    }

    #[test]
    fn test_only_first_cancel_reports_true() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(token.cancel());
        assert!(!clone.cancel());
        assert!(!token.cancel());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sleep_interrupted_by_cancel() {
        let token = CancelToken::new();
        let waiter = token.clone();
        let handle = tokio::spawn(async move { waiter.sleep(Duration::from_secs(60)).await });

        tokio::time::sleep(Duration::from_secs(1)).await;
        token.cancel();

        assert!(!handle.await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sleep_completes() {
        let token = CancelToken::new();
        assert!(token.sleep(Duration::from_secs(2)).await);
    }

    #[tokio::test]
    async fn test_complete_discards_result_after_cancel() {
        let token = CancelToken::new();
        let inner = token.clone();
        let result = token
            .complete(async move {
                inner.cancel();
                42
            })
            .await;
        assert_eq!(result, None);

        let fresh = CancelToken::new();
        assert_eq!(fresh.complete(async { 7 }).await, Some(7));
    }
}
