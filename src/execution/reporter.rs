//! Outcome Reporter
//!
//! Single-fire delivery boundary between an engine run and one caller.
//!
//! Delivery is committed under a mutex that `cancel()` also takes, so once
//! `cancel()` returns no delivery that had not already been committed can
//! happen. The callback itself runs outside the lock and may call back into
//! the handle (including `cancel()`).

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::watch;
use tracing::debug;

use super::cancel::CancelToken;
use super::types::Outcome;

/// Caller-supplied completion callback
pub type OutcomeCallback = Box<dyn FnOnce(Outcome) + Send + 'static>;

/// Delivers the terminal outcome to one handle at most once
pub struct OutcomeReporter {
    cancel: CancelToken,
    delivered: AtomicBool,
    callback: Mutex<Option<OutcomeCallback>>,
    outcome_tx: watch::Sender<Option<Outcome>>,
}

impl OutcomeReporter {
    pub fn new(cancel: CancelToken, callback: Option<OutcomeCallback>) -> Self {
        let (outcome_tx, _) = watch::channel(None);
        Self {
            cancel,
            delivered: AtomicBool::new(false),
            callback: Mutex::new(callback),
            outcome_tx,
        }
    }

    /// Receiver that sees the outcome once it is delivered
    pub fn subscribe(&self) -> watch::Receiver<Option<Outcome>> {
        self.outcome_tx.subscribe()
    }

    /// Request cancellation and wait out any delivery being committed.
    ///
    /// Returns `true` only for the call that actually cancelled.
    pub fn cancel(&self) -> bool {
        let first = self.cancel.cancel();
        // Barrier: a concurrent `report` either committed before this
        // point or will observe the cancellation.
        drop(self.callback.lock().unwrap_or_else(|e| e.into_inner()));
        first
    }

    pub async fn cancelled(&self) {
        self.cancel.cancelled().await
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn is_delivered(&self) -> bool {
        self.delivered.load(Ordering::Acquire)
    }

    /// Commit and perform delivery. Returns `false` if cancelled or already
    /// delivered.
    pub fn report(&self, outcome: Outcome) -> bool {
        let callback = {
            let mut slot = self.callback.lock().unwrap_or_else(|e| e.into_inner());
            if self.cancel.is_cancelled() || self.delivered.swap(true, Ordering::AcqRel) {
                debug!(state = %outcome.state(), "Outcome suppressed");
                return false;
            }
            slot.take()
        };

        self.outcome_tx.send_replace(Some(outcome.clone()));
        if let Some(callback) = callback {
            callback(outcome);
        }
        true
    }
}

impl std::fmt::Debug for OutcomeReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutcomeReporter")
            .field("cancelled", &self.is_cancelled())
            .field("delivered", &self.is_delivered())
            .finish()
    }
}
