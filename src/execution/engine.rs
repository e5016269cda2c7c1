//! Transaction Engine
//!
//! Public entry point. `start` validates the intent, binds its idempotency
//! key and spawns the run; it never waits on the network. Progress is
//! observed through the callback or `EngineHandle::outcome`.

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::adapters::ExecutionBackend;
use super::cancel::CancelToken;
use super::idempotency::IdempotencyRegistry;
use super::reporter::{OutcomeCallback, OutcomeReporter};
use super::submission::SubmissionClient;
use super::tracker::{ConfirmationTracker, Tracked, TrackerConfig};
use super::types::{
    EngineContext, IdempotencyKey, NormalizedIntent, Outcome, RecheckOutcome, TransactionRecord,
    TransferIntent,
};

type OutcomeWatch = watch::Receiver<Option<Outcome>>;

/// One tracking run and the handles attached to it.
///
/// The run is cancelled only when its last handle leaves.
struct SharedRun {
    cancel: CancelToken,
    outcome_rx: OutcomeWatch,
    subscribers: Mutex<usize>,
}

impl SharedRun {
    fn new(outcome_rx: OutcomeWatch) -> Self {
        Self {
            cancel: CancelToken::new(),
            outcome_rx,
            subscribers: Mutex::new(1),
        }
    }

    /// Attach another handle. Fails once every handle has left.
    fn join(&self) -> bool {
        let mut subscribers = self.subscribers.lock().unwrap_or_else(|e| e.into_inner());
        if *subscribers == 0 {
            return false;
        }
        *subscribers += 1;
        true
    }

    fn leave(&self) {
        let mut subscribers = self.subscribers.lock().unwrap_or_else(|e| e.into_inner());
        *subscribers = subscribers.saturating_sub(1);
        if *subscribers == 0 {
            self.cancel.cancel();
        }
    }
}

/// Caller's view of one started intent
#[derive(Clone)]
pub struct EngineHandle {
    key: Option<IdempotencyKey>,
    reporter: Arc<OutcomeReporter>,
    outcome_rx: OutcomeWatch,
    run: Option<Arc<SharedRun>>,
}

impl EngineHandle {
    /// Idempotency key bound to this intent (`None` if validation failed)
    pub fn key(&self) -> Option<IdempotencyKey> {
        self.key
    }

    /// Stop tracking and suppress delivery.
    ///
    /// After this returns the callback is never invoked. An in-flight
    /// network call completes and its result is discarded; the remote
    /// operation itself is not aborted. Other handles on the same run keep
    /// receiving their outcome.
    pub fn cancel(&self) {
        if self.reporter.cancel() {
            if let Some(run) = &self.run {
                run.leave();
            }
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.reporter.is_cancelled()
    }

    /// Wait for the terminal outcome. `None` if the handle was cancelled
    /// before the outcome was delivered.
    pub async fn outcome(&self) -> Option<Outcome> {
        let mut rx = self.outcome_rx.clone();
        // A delivered outcome wins over a later cancel
        tokio::select! {
            biased;
            result = rx.wait_for(Option::is_some) => result.ok().and_then(|value| (*value).clone()),
            _ = self.reporter.cancelled() => None,
        }
    }
}

impl std::fmt::Debug for EngineHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineHandle")
            .field("key", &self.key)
            .field("cancelled", &self.reporter.is_cancelled())
            .field("delivered", &self.reporter.is_delivered())
            .finish()
    }
}

/// Transaction submission and confirmation engine for one wallet session
pub struct TransactionEngine {
    ctx: Arc<EngineContext>,
    registry: Arc<IdempotencyRegistry>,
    tracker: Arc<ConfirmationTracker>,
    /// Runs in progress, by key. Duplicate starts join the existing run.
    runs: Arc<DashMap<IdempotencyKey, Arc<SharedRun>>>,
}

impl TransactionEngine {
    pub fn new(
        ctx: Arc<EngineContext>,
        backend: Arc<dyn ExecutionBackend>,
        registry: Arc<IdempotencyRegistry>,
        config: TrackerConfig,
    ) -> Self {
        info!(
            ctx = ?ctx,
            backend = backend.name(),
            poll_interval_ms = config.poll_interval_ms,
            max_poll_attempts = config.max_poll_attempts,
            "Transaction engine ready"
        );
        let submission = SubmissionClient::new(backend.clone(), registry.clone());
        let tracker = ConfirmationTracker::new(backend, submission, config);
        Self {
            ctx,
            registry,
            tracker: Arc::new(tracker),
            runs: Arc::new(DashMap::new()),
        }
    }

    pub fn context(&self) -> &EngineContext {
        &self.ctx
    }

    pub fn registry(&self) -> &Arc<IdempotencyRegistry> {
        &self.registry
    }

    /// Start an intent without a callback; observe it via the handle.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(&self, intent: TransferIntent) -> EngineHandle {
        self.start_inner(intent, None)
    }

    /// Start an intent; `callback` fires exactly once with the outcome
    /// unless the handle is cancelled first.
    pub fn start_with<F>(&self, intent: TransferIntent, callback: F) -> EngineHandle
    where
        F: FnOnce(Outcome) + Send + 'static,
    {
        self.start_inner(intent, Some(Box::new(callback)))
    }

    /// Start an intent and wait for its outcome
    pub async fn run(&self, intent: TransferIntent) -> Option<Outcome> {
        self.start(intent).outcome().await
    }

    /// Query the status of a TIMEOUT record once more.
    ///
    /// A terminal answer finishes the record's key, so the same action is
    /// not submitted again.
    pub async fn recheck(&self, record: &TransactionRecord) -> RecheckOutcome {
        let outcome = self.tracker.recheck(&self.ctx, record).await;
        info!(key = %record.key, outcome = ?outcome, "Re-check");
        if !matches!(outcome, RecheckOutcome::Unresolved) {
            self.registry.resolve(&record.key);
        }
        outcome
    }

    fn start_inner(&self, intent: TransferIntent, callback: Option<OutcomeCallback>) -> EngineHandle {
        let reporter = Arc::new(OutcomeReporter::new(CancelToken::new(), callback));
        let outcome_rx = reporter.subscribe();

        let base_amount = match intent.normalize_amount() {
            Ok(base_amount) => base_amount,
            Err(reason) => {
                warn!(code = reason.code(), reason = %reason, "Intent rejected by validation");
                let delivery = reporter.clone();
                tokio::spawn(async move {
                    delivery.report(Outcome::failed(reason, None));
                });
                return EngineHandle {
                    key: None,
                    reporter,
                    outcome_rx,
                    run: None,
                };
            }
        };

        let evicted = self.registry.evict_expired();
        if evicted > 0 {
            debug!(evicted, "Expired idempotency keys evicted");
        }

        let fingerprint = intent.fingerprint(&self.ctx, &base_amount);
        let key = self.registry.key_for(&fingerprint);
        let run = self.attach(NormalizedIntent {
            intent,
            base_amount,
            key,
        });

        let mut upstream = run.outcome_rx.clone();
        let delivery = reporter.clone();
        tokio::spawn(async move {
            let outcome = tokio::select! {
                biased;
                _ = delivery.cancelled() => None,
                result = upstream.wait_for(Option::is_some) => {
                    result.ok().and_then(|value| (*value).clone())
                }
            };
            if let Some(outcome) = outcome {
                delivery.report(outcome);
            }
        });

        EngineHandle {
            key: Some(key),
            reporter,
            outcome_rx,
            run: Some(run),
        }
    }

    /// Join the live run for the intent's key, or launch one.
    fn attach(&self, normalized: NormalizedIntent) -> Arc<SharedRun> {
        let key = normalized.key;
        match self.runs.entry(key) {
            Entry::Occupied(mut existing) => {
                if existing.get().join() {
                    info!(key = %key, "Duplicate start joined in-flight run");
                    return existing.get().clone();
                }
                // Every handle left; the old run is winding down
                let run = self.launch(normalized);
                existing.insert(run.clone());
                run
            }
            Entry::Vacant(slot) => {
                let run = self.launch(normalized);
                slot.insert(run.clone());
                run
            }
        }
    }

    fn launch(&self, normalized: NormalizedIntent) -> Arc<SharedRun> {
        let (outcome_tx, outcome_rx) = watch::channel(None);
        let run = Arc::new(SharedRun::new(outcome_rx));

        let ctx = self.ctx.clone();
        let tracker = self.tracker.clone();
        let registry = self.registry.clone();
        let runs = self.runs.clone();
        let this_run = run.clone();

        tokio::spawn(async move {
            let key = normalized.key;
            match tracker.track(&ctx, &normalized, &this_run.cancel).await {
                Tracked::Finished { outcome, owned } => {
                    if owned {
                        registry.settle(&outcome);
                    }
                    outcome_tx.send_replace(Some(outcome));
                }
                Tracked::Cancelled { claimed: true } => registry.park(&key),
                Tracked::Cancelled { claimed: false } => registry.release_if_reserved(&key),
            }
            runs.remove_if(&key, |_, current| Arc::ptr_eq(current, &this_run));
        });

        run
    }
}

impl std::fmt::Debug for TransactionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionEngine")
            .field("ctx", &self.ctx)
            .field("runs", &self.runs.len())
            .field("config", self.tracker.config())
            .finish()
    }
}
