//! Idempotency Registry
//!
//! Issues one key per logical user action and tracks whether a submission
//! under that key is still in flight. Shared by every engine run; this is
//! the only shared mutable state in the execution pipeline.
//!
//! Key phases:
//!
//! ```text
//! RESERVED → SUBMITTING → TRACKING ─┬→ DONE        (confirmed / failed remotely)
//!    │            │                 └→ UNRESOLVED  (timeout / cancelled)
//!    │            └──→ (released)                  (rejected, nothing executed)
//!    └──→ (released)                               (cancelled before submission)
//! ```
//!
//! DONE and UNRESOLVED keys stay bound to their fingerprint: starting the
//! same action again reuses the key. A DONE key is never submitted again;
//! an UNRESOLVED one may be, and the backend dedupes it. Idle keys are
//! evicted once they have not changed for the retention period.

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

use super::error::EngineError;
use super::types::{IdempotencyKey, IntentFingerprint, Outcome};

/// Default time an idle key stays bound to its action
pub const DEFAULT_KEY_RETENTION: Duration = Duration::from_secs(24 * 60 * 60);

/// Phase of an issued key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyPhase {
    /// Issued, no submission attempted yet
    Reserved,
    /// Submission network call outstanding
    Submitting,
    /// Submitted (or possibly submitted); tracker owns it
    Tracking,
    /// Tracking ended without a terminal remote status
    Unresolved,
    /// The backend reported a terminal status; never submitted again
    Done,
}

impl KeyPhase {
    #[inline]
    pub fn is_in_flight(&self) -> bool {
        matches!(self, KeyPhase::Submitting | KeyPhase::Tracking)
    }
}

/// Answer to a submission claim
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Claim {
    /// The caller now owns the key for one submission call
    Granted,
    /// Another run owns the key (or it was released under the caller)
    InFlight,
    /// The action already finished. Carries the delivered outcome when the
    /// engine saw it; `None` if it was learned through a re-check.
    Done(Option<Outcome>),
}

#[derive(Debug)]
struct KeyEntry {
    fingerprint: IntentFingerprint,
    phase: KeyPhase,
    outcome: Option<Outcome>,
    touched: Instant,
}

impl KeyEntry {
    fn enter(&mut self, phase: KeyPhase) {
        self.phase = phase;
        self.touched = Instant::now();
    }
}

/// Thread-safe registry of idempotency keys.
///
/// `key_for` is an atomic lookup-or-insert per fingerprint: concurrent
/// callers presenting the same fingerprint always receive the same key.
pub struct IdempotencyRegistry {
    /// Fingerprint → key currently bound to it
    keys: DashMap<IntentFingerprint, IdempotencyKey>,
    /// Key → fingerprint + phase
    entries: DashMap<IdempotencyKey, KeyEntry>,
    retention: Duration,
}

impl IdempotencyRegistry {
    /// Create a new empty registry with the default retention.
    pub fn new() -> Self {
        Self::with_retention(DEFAULT_KEY_RETENTION)
    }

    /// Create a new empty registry whose idle keys expire after `retention`.
    pub fn with_retention(retention: Duration) -> Self {
        Self {
            keys: DashMap::new(),
            entries: DashMap::new(),
            retention,
        }
    }

    /// Get the key bound to `fingerprint`, issuing a new one if none is.
    pub fn key_for(&self, fingerprint: &IntentFingerprint) -> IdempotencyKey {
        // Lock order: keys shard, then entries shard. Nothing else nests.
        match self.keys.entry(fingerprint.clone()) {
            Entry::Occupied(existing) => *existing.get(),
            Entry::Vacant(slot) => {
                let key = IdempotencyKey::new();
                self.entries.insert(
                    key,
                    KeyEntry {
                        fingerprint: fingerprint.clone(),
                        phase: KeyPhase::Reserved,
                        outcome: None,
                        touched: Instant::now(),
                    },
                );
                slot.insert(key);
                debug!(key = %key, fingerprint = %fingerprint, "Issued idempotency key");
                key
            }
        }
    }

    /// Returns `true` while a submission or tracking run owns `key`.
    pub fn is_in_flight(&self, key: &IdempotencyKey) -> bool {
        self.entries
            .get(key)
            .map(|entry| entry.phase.is_in_flight())
            .unwrap_or(false)
    }

    /// Current phase of `key`, if it is registered.
    pub fn phase(&self, key: &IdempotencyKey) -> Option<KeyPhase> {
        self.entries.get(key).map(|entry| entry.phase)
    }

    /// Claim `key` for a submission network call.
    ///
    /// Only a RESERVED or UNRESOLVED key can be claimed, and only by one
    /// caller at a time.
    pub fn begin_submission(&self, key: &IdempotencyKey) -> Claim {
        let Some(mut entry) = self.entries.get_mut(key) else {
            return Claim::InFlight;
        };
        match entry.phase {
            KeyPhase::Reserved | KeyPhase::Unresolved => {
                entry.enter(KeyPhase::Submitting);
                Claim::Granted
            }
            KeyPhase::Submitting | KeyPhase::Tracking => Claim::InFlight,
            KeyPhase::Done => Claim::Done(entry.outcome.clone()),
        }
    }

    /// Hand `key` from the submission call to the tracker.
    pub fn mark_tracking(&self, key: &IdempotencyKey) {
        if let Some(mut entry) = self.entries.get_mut(key) {
            entry.enter(KeyPhase::Tracking);
        }
    }

    /// Keep `key` bound to its fingerprint without an owner.
    pub fn park(&self, key: &IdempotencyKey) {
        if let Some(mut entry) = self.entries.get_mut(key) {
            entry.enter(KeyPhase::Unresolved);
            debug!(key = %key, "Idempotency key parked (outcome unresolved)");
        }
    }

    /// Mark `key` finished, remembering the outcome to replay.
    pub fn complete(&self, key: &IdempotencyKey, outcome: Outcome) {
        if let Some(mut entry) = self.entries.get_mut(key) {
            entry.outcome = Some(outcome);
            entry.enter(KeyPhase::Done);
            debug!(key = %key, "Idempotency key done");
        }
    }

    /// Mark an UNRESOLVED `key` finished after a terminal re-check answer.
    ///
    /// A key some run has claimed again is left to that run.
    pub fn resolve(&self, key: &IdempotencyKey) {
        if let Some(mut entry) = self.entries.get_mut(key) {
            if entry.phase == KeyPhase::Unresolved {
                entry.enter(KeyPhase::Done);
                debug!(key = %key, "Idempotency key resolved by re-check");
            }
        }
    }

    /// Apply the key lifecycle for an outcome the owning run delivers.
    ///
    /// A rejection executed nothing and frees the key. A terminal remote
    /// status finishes it. Anything else leaves the outcome unknown.
    pub fn settle(&self, outcome: &Outcome) {
        let Some(record) = outcome.record() else {
            return;
        };
        match outcome {
            Outcome::Confirmed(_)
            | Outcome::Failed {
                reason: EngineError::OperationFailed(_),
                ..
            } => self.complete(&record.key, outcome.clone()),
            Outcome::Failed {
                reason: EngineError::RemoteRejection(_),
                ..
            } => self.release(&record.key),
            Outcome::Failed { .. } | Outcome::Timeout(_) => self.park(&record.key),
        }
    }

    /// Forget `key`. The next `key_for` on its fingerprint issues a new key.
    pub fn release(&self, key: &IdempotencyKey) {
        if self.remove_where(key, |_| true) {
            debug!(key = %key, "Idempotency key released");
        }
    }

    /// Forget `key` only if no submission was ever attempted under it.
    pub fn release_if_reserved(&self, key: &IdempotencyKey) {
        if self.remove_where(key, |entry| entry.phase == KeyPhase::Reserved) {
            debug!(key = %key, "Unused idempotency key released");
        }
    }

    /// Drop every key that is not in flight and has been idle for the
    /// retention period. Returns the number evicted.
    pub fn evict_expired(&self) -> usize {
        let now = Instant::now();
        let expired = |entry: &KeyEntry| {
            !entry.phase.is_in_flight() && now.duration_since(entry.touched) >= self.retention
        };

        let candidates: Vec<IdempotencyKey> = self
            .entries
            .iter()
            .filter(|entry| expired(entry.value()))
            .map(|entry| *entry.key())
            .collect();

        let evicted = candidates
            .iter()
            .filter(|key| self.remove_where(key, &expired))
            .count();
        if evicted > 0 {
            debug!(evicted, remaining = self.entries.len(), "Evicted idle idempotency keys");
        }
        evicted
    }

    /// Remove `key` if `pred` holds, unbinding its fingerprint.
    ///
    /// The fingerprint's slot stays locked across the removal so a
    /// concurrent `key_for` never hands out a key whose entry is gone.
    fn remove_where(&self, key: &IdempotencyKey, pred: impl Fn(&KeyEntry) -> bool) -> bool {
        let Some(fingerprint) = self.entries.get(key).map(|entry| entry.fingerprint.clone()) else {
            return false;
        };

        match self.keys.entry(fingerprint) {
            Entry::Occupied(bound) if bound.get() == key => {
                if self.entries.remove_if(key, |_, entry| pred(entry)).is_none() {
                    return false;
                }
                bound.remove();
                true
            }
            _ => self.entries.remove_if(key, |_, entry| pred(entry)).is_some(),
        }
    }

    /// Get the number of registered keys.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for IdempotencyRegistry {
    fn default() -> Self {
        Self::new()
    }
}
