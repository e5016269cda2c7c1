//! Confirmation Tracker
//!
//! Drives one intent from CREATED to a terminal state:
//!
//! ```text
//! CREATED → SUBMITTING ─┬─(accepted + reference)──────────────→ POLLING ─┬→ CONFIRMED
//!                       ├─(accepted, no ref / network unknown)→ AWAITING_REFERENCE
//!                       │                                        └─(discovery)→ POLLING
//!                       └─(rejected)→ FAILED                                 ├→ FAILED
//!                                                                            └→ TIMEOUT
//! ```
//!
//! Polling is a cancellable fixed-interval loop with a bounded attempt
//! budget. An exhausted budget is TIMEOUT (outcome unknown), never FAILED.
//!
//! When another run owns the key, nothing is submitted: the run observes
//! the operation through the AWAITING_REFERENCE path instead, and leaves
//! the key to its owner.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::adapters::{ExecutionBackend, StatusTarget};
use super::cancel::CancelToken;
use super::error::EngineError;
use super::state::TxState;
use super::status::StatusSignal;
use super::idempotency::DEFAULT_KEY_RETENTION;
use super::submission::{Submission, SubmissionClient};
use super::types::{
    EngineContext, IdempotencyKey, NormalizedIntent, Outcome, RecheckOutcome, SubmissionResult,
    SubmitOutcome, TransactionRecord,
};

/// Default interval between status polls
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 2_000;
/// Default poll budget (30 × 2s ≈ 1 minute ceiling)
pub const DEFAULT_MAX_POLL_ATTEMPTS: u32 = 30;
pub const DEFAULT_DISCOVERY_ATTEMPTS: u32 = 3;
pub const DEFAULT_DISCOVERY_INTERVAL_MS: u64 = 1_000;
pub const DEFAULT_DISCOVERY_PAGE_SIZE: usize = 20;

/// Message used when the backend reports failure without a reason
const DEFAULT_FAILURE: &str = "Transaction failed";

fn default_poll_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}

fn default_max_poll_attempts() -> u32 {
    DEFAULT_MAX_POLL_ATTEMPTS
}

fn default_discovery_attempts() -> u32 {
    DEFAULT_DISCOVERY_ATTEMPTS
}

fn default_discovery_interval_ms() -> u64 {
    DEFAULT_DISCOVERY_INTERVAL_MS
}

fn default_discovery_page_size() -> usize {
    DEFAULT_DISCOVERY_PAGE_SIZE
}

fn default_key_retention_secs() -> u64 {
    DEFAULT_KEY_RETENTION.as_secs()
}

/// Polling cadence and ceilings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackerConfig {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_max_poll_attempts")]
    pub max_poll_attempts: u32,
    /// Recent-operations lookups before falling back to account status
    #[serde(default = "default_discovery_attempts")]
    pub discovery_attempts: u32,
    #[serde(default = "default_discovery_interval_ms")]
    pub discovery_interval_ms: u64,
    #[serde(default = "default_discovery_page_size")]
    pub discovery_page_size: usize,
    /// How long a finished or unresolved key stays bound to its action
    #[serde(default = "default_key_retention_secs")]
    pub key_retention_secs: u64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            max_poll_attempts: DEFAULT_MAX_POLL_ATTEMPTS,
            discovery_attempts: DEFAULT_DISCOVERY_ATTEMPTS,
            discovery_interval_ms: DEFAULT_DISCOVERY_INTERVAL_MS,
            discovery_page_size: DEFAULT_DISCOVERY_PAGE_SIZE,
            key_retention_secs: DEFAULT_KEY_RETENTION.as_secs(),
        }
    }
}

impl TrackerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn discovery_interval(&self) -> Duration {
        Duration::from_millis(self.discovery_interval_ms)
    }

    /// Upper bound on time spent polling once POLLING is reached
    pub fn polling_ceiling(&self) -> Duration {
        self.poll_interval() * self.max_poll_attempts
    }

    pub fn key_retention(&self) -> Duration {
        Duration::from_secs(self.key_retention_secs)
    }
}

/// How a tracking run ended
#[derive(Debug)]
pub enum Tracked {
    /// Terminal outcome reached. `owned` is false when another run held
    /// the key and this one only observed or replayed it.
    Finished { outcome: Outcome, owned: bool },
    /// Cancelled before a terminal state. `claimed` is true once this run
    /// took ownership of the idempotency key.
    Cancelled { claimed: bool },
}

/// Internal end state of `drive`; the record carries the details
enum Finish {
    Confirmed,
    Failed(EngineError),
    Timeout,
    Cancelled,
}

pub struct ConfirmationTracker {
    backend: Arc<dyn ExecutionBackend>,
    submission: SubmissionClient,
    config: TrackerConfig,
}

impl ConfirmationTracker {
    pub fn new(
        backend: Arc<dyn ExecutionBackend>,
        submission: SubmissionClient,
        config: TrackerConfig,
    ) -> Self {
        Self {
            backend,
            submission,
            config,
        }
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// Run one intent to a terminal outcome or cancellation.
    pub async fn track(
        &self,
        ctx: &EngineContext,
        intent: &NormalizedIntent,
        cancel: &CancelToken,
    ) -> Tracked {
        if cancel.is_cancelled() {
            return Tracked::Cancelled { claimed: false };
        }

        let mut record = TransactionRecord::new(intent.key);

        // The submission call always runs to completion once started
        let submitted = match self.submission.submit(ctx, intent).await {
            Submission::Sent(result) => Some(result),
            Submission::InFlight | Submission::Completed(None) => None,
            Submission::Completed(Some(outcome)) => {
                info!(key = %intent.key, state = %outcome.state(), "Replaying outcome of finished action");
                return Tracked::Finished {
                    outcome,
                    owned: false,
                };
            }
        };
        let owned = submitted.is_some();

        let outcome = match self.drive(ctx, submitted, cancel, &mut record).await {
            Ok(Finish::Confirmed) => {
                info!(record = %record, "Transaction confirmed");
                Outcome::Confirmed(record)
            }
            Ok(Finish::Failed(reason)) => {
                info!(record = %record, reason = %reason, "Transaction failed");
                Outcome::failed(reason, Some(record))
            }
            Ok(Finish::Timeout) => {
                warn!(record = %record, "Transaction unresolved: poll budget exhausted");
                Outcome::Timeout(record)
            }
            Ok(Finish::Cancelled) => {
                info!(record = %record, "Tracking cancelled");
                return Tracked::Cancelled { claimed: owned };
            }
            Err(e) => {
                error!(record = %record, error = %e, "Tracker state machine error");
                Outcome::failed(e, Some(record))
            }
        };
        Tracked::Finished { outcome, owned }
    }

    /// `submitted` is `None` when this run did not send anything and only
    /// observes the key.
    async fn drive(
        &self,
        ctx: &EngineContext,
        submitted: Option<SubmissionResult>,
        cancel: &CancelToken,
        record: &mut TransactionRecord,
    ) -> Result<Finish, EngineError> {
        record.advance(TxState::Submitting)?;
        if cancel.is_cancelled() {
            return Ok(Finish::Cancelled);
        }

        match submitted {
            Some(SubmissionResult {
                outcome: SubmitOutcome::Rejected,
                message,
                ..
            }) => {
                let message = message.unwrap_or_default();
                record.last_error = Some(message.clone());
                record.advance(TxState::Failed)?;
                return Ok(Finish::Failed(EngineError::RemoteRejection(message)));
            }
            Some(SubmissionResult {
                outcome: SubmitOutcome::Accepted,
                reference: Some(reference),
                ..
            }) => {
                record.reference = Some(reference);
                record.advance(TxState::Polling)?;
            }
            unresolved => {
                match unresolved {
                    Some(SubmissionResult {
                        outcome: SubmitOutcome::NetworkUnknown,
                        message,
                        ..
                    }) => record.last_error = message,
                    None => debug!(key = %record.key, "Observing key owned by another run"),
                    Some(_) => {}
                }
                record.advance(TxState::AwaitingReference)?;
                debug!(key = %record.key, "Awaiting reference");

                let Some(found) = self.discover(ctx, record.key, cancel).await else {
                    return Ok(Finish::Cancelled);
                };
                record.reference = found;
                record.advance(TxState::Polling)?;
            }
        }

        self.poll(ctx, cancel, record).await
    }

    /// Look the operation up in the account's recent operations.
    ///
    /// Returns `None` if cancelled, `Some(None)` if not found within the
    /// discovery budget (tracking falls back to account-level status).
    async fn discover(
        &self,
        ctx: &EngineContext,
        key: IdempotencyKey,
        cancel: &CancelToken,
    ) -> Option<Option<String>> {
        let wanted = key.to_string();

        for attempt in 0..self.config.discovery_attempts {
            if attempt > 0 && !cancel.sleep(self.config.discovery_interval()).await {
                return None;
            }
            if cancel.is_cancelled() {
                return None;
            }

            let listing = cancel
                .complete(
                    self.backend
                        .recent_operations(ctx, self.config.discovery_page_size),
                )
                .await?;

            match listing {
                Ok(operations) => {
                    if let Some(op) = operations
                        .into_iter()
                        .find(|op| op.idempotency_key.as_deref() == Some(wanted.as_str()))
                    {
                        info!(key = %key, reference = %op.reference, "Reference discovered");
                        return Some(Some(op.reference));
                    }
                }
                Err(e) => debug!(key = %key, attempt = attempt + 1, error = %e, "Discovery lookup failed"),
            }
        }

        debug!(key = %key, "Reference not discovered; using account-level status");
        Some(None)
    }

    async fn poll(
        &self,
        ctx: &EngineContext,
        cancel: &CancelToken,
        record: &mut TransactionRecord,
    ) -> Result<Finish, EngineError> {
        let max_attempts = self.config.max_poll_attempts;

        loop {
            if record.attempt_count >= max_attempts {
                record.last_error = Some(EngineError::PollingTimeout(max_attempts).to_string());
                record.advance(TxState::Timeout)?;
                return Ok(Finish::Timeout);
            }
            if cancel.is_cancelled() {
                return Ok(Finish::Cancelled);
            }

            let target = match &record.reference {
                Some(reference) => StatusTarget::Reference(reference.clone()),
                None => StatusTarget::Account(record.key),
            };

            // An in-flight poll finishes; its result is dropped if cancelled meanwhile
            let Some(response) = cancel.complete(self.backend.status(ctx, &target)).await else {
                return Ok(Finish::Cancelled);
            };
            record.attempt_count += 1;

            match response {
                Ok(response) => {
                    if record.reference.is_none() {
                        record.reference = response.reference.clone();
                    }
                    let signal = StatusSignal::from_remote(response.status.as_deref());
                    debug!(
                        key = %record.key,
                        attempt = record.attempt_count,
                        status = response.status.as_deref().unwrap_or("-"),
                        signal = ?signal,
                        "Poll"
                    );

                    match signal {
                        StatusSignal::TerminalSuccess => {
                            record.advance(TxState::Confirmed)?;
                            return Ok(Finish::Confirmed);
                        }
                        StatusSignal::TerminalFailure => {
                            let message = response
                                .message
                                .filter(|m| !m.trim().is_empty())
                                .unwrap_or_else(|| DEFAULT_FAILURE.to_string());
                            record.last_error = Some(message.clone());
                            record.advance(TxState::Failed)?;
                            return Ok(Finish::Failed(EngineError::OperationFailed(message)));
                        }
                        StatusSignal::NonTerminal => record.advance(TxState::Polling)?,
                    }
                }
                Err(e) => {
                    warn!(key = %record.key, attempt = record.attempt_count, error = %e, "Poll failed");
                    record.last_error = Some(EngineError::from(e).to_string());
                }
            }

            if record.attempt_count >= max_attempts {
                continue;
            }
            if !cancel.sleep(self.config.poll_interval()).await {
                return Ok(Finish::Cancelled);
            }
        }
    }

    /// One status query for a record left unresolved. Never mutates the
    /// record; transport errors and non-terminal statuses are `Unresolved`.
    pub async fn recheck(&self, ctx: &EngineContext, record: &TransactionRecord) -> RecheckOutcome {
        let target = match &record.reference {
            Some(reference) => StatusTarget::Reference(reference.clone()),
            None => StatusTarget::Account(record.key),
        };

        match self.backend.status(ctx, &target).await {
            Ok(response) => match StatusSignal::from_remote(response.status.as_deref()) {
                StatusSignal::TerminalSuccess => RecheckOutcome::Confirmed {
                    reference: response.reference.or_else(|| record.reference.clone()),
                },
                StatusSignal::TerminalFailure => RecheckOutcome::Failed(
                    response
                        .message
                        .filter(|m| !m.trim().is_empty())
                        .unwrap_or_else(|| DEFAULT_FAILURE.to_string()),
                ),
                StatusSignal::NonTerminal => RecheckOutcome::Unresolved,
            },
            Err(e) => {
                warn!(key = %record.key, error = %e, "Re-check failed");
                RecheckOutcome::Unresolved
            }
        }
    }
}
