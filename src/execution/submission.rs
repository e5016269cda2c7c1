//! Submission Client
//!
//! Sends a normalized intent to the execution backend once per key and
//! classifies the immediate result. The classification follows one rule:
//! only an explicit remote refusal counts as REJECTED. Anything short of a
//! parsed response (timeouts, resets, 5xx, garbage bodies) is
//! NETWORK_UNKNOWN, because the operation may have executed.

use std::sync::Arc;
use tracing::{info, warn};

use super::adapters::{ExecutionBackend, SubmitKind, SubmitRequest};
use super::error::EngineError;
use super::idempotency::{Claim, IdempotencyRegistry};
use super::types::{
    EngineContext, IntentTarget, NormalizedIntent, Outcome, SubmissionResult, SubmitOutcome,
    TokenRef,
};

/// Fallback reason when the backend refuses without a message
const DEFAULT_REJECTION: &str = "Submission rejected";

/// What `submit` did with an intent
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Submission {
    /// One backend call was made and classified
    Sent(SubmissionResult),
    /// Another run owns the key; nothing was sent
    InFlight,
    /// The action already finished under this key; nothing was sent
    Completed(Option<Outcome>),
}

pub struct SubmissionClient {
    backend: Arc<dyn ExecutionBackend>,
    registry: Arc<IdempotencyRegistry>,
}

impl SubmissionClient {
    pub fn new(backend: Arc<dyn ExecutionBackend>, registry: Arc<IdempotencyRegistry>) -> Self {
        Self { backend, registry }
    }

    /// Submit `intent` under its idempotency key.
    ///
    /// Nothing is sent when another run owns the key or the action already
    /// finished. Otherwise exactly one backend call is made and its result
    /// classified.
    ///
    /// Registry side effects: ACCEPTED and NETWORK_UNKNOWN hand the key to
    /// the tracker; REJECTED releases it.
    pub async fn submit(&self, ctx: &EngineContext, intent: &NormalizedIntent) -> Submission {
        let key = intent.key;
        match self.registry.begin_submission(&key) {
            Claim::Granted => {}
            Claim::InFlight => {
                info!(key = %key, "Key owned by another run; not submitting");
                return Submission::InFlight;
            }
            Claim::Done(outcome) => {
                info!(key = %key, "Action already finished; not submitting");
                return Submission::Completed(outcome);
            }
        }

        let request = build_request(ctx, intent);
        info!(
            key = %key,
            backend = self.backend.name(),
            kind = ?request.kind,
            amount = %request.amount,
            "Submitting"
        );

        let result = match self.backend.submit(ctx, &request).await {
            Err(e) => {
                warn!(key = %key, error = %e, "Submission outcome unknown");
                SubmissionResult::network_unknown(EngineError::from(e).to_string())
            }
            Ok(envelope) if envelope.is_error() => {
                let message = envelope
                    .message
                    .filter(|m| !m.trim().is_empty())
                    .unwrap_or_else(|| DEFAULT_REJECTION.to_string());
                info!(key = %key, reason = %message, "Submission rejected");
                SubmissionResult::rejected(message)
            }
            Ok(envelope) if envelope.is_success() => {
                let reference = envelope.reference();
                info!(
                    key = %key,
                    reference = reference.as_deref().unwrap_or("-"),
                    "Submission accepted"
                );
                SubmissionResult::accepted(reference)
            }
            Ok(envelope) => {
                // Neither success nor an explicit refusal
                warn!(key = %key, status = %envelope.status, "Unrecognized submission status");
                SubmissionResult::network_unknown(format!(
                    "Unrecognized submission status: {}",
                    envelope.status
                ))
            }
        };

        match result.outcome {
            SubmitOutcome::Rejected => self.registry.release(&key),
            _ => self.registry.mark_tracking(&key),
        }
        Submission::Sent(result)
    }
}

/// Token as the backend names it: the address, or null for the native asset
fn token_field(token: &TokenRef) -> Option<String> {
    token.address().map(str::to_string)
}

/// Map an intent onto the backend's request body
fn build_request(ctx: &EngineContext, intent: &NormalizedIntent) -> SubmitRequest {
    let source = &intent.intent;
    let (kind, to_address, quote_id, slippage_bps) = match &source.target {
        IntentTarget::Recipient(recipient) => (
            SubmitKind::Transfer,
            Some(recipient.trim().to_string()),
            None,
            None,
        ),
        IntentTarget::Quote {
            reference,
            slippage_bps,
        } => (SubmitKind::Swap, None, Some(reference.clone()), *slippage_bps),
    };

    SubmitRequest {
        kind,
        device_id: ctx.device_id.clone(),
        from_token: token_field(&source.source_token),
        to_token: source.destination_token.as_ref().and_then(token_field),
        to_address,
        amount: intent.base_amount.clone(),
        quote_id,
        slippage_bps,
        idempotency_key: intent.key.to_string(),
        payment_password: ctx.auth_secret.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::adapters::{MockBackend, RemoteEnvelope};
    use crate::execution::error::TransportError;
    use crate::execution::idempotency::KeyPhase;
    use crate::execution::types::{Chain, TransactionRecord, TransferIntent};
    use serde_json::Value;

    fn ctx() -> EngineContext {
        EngineContext::new("android_abc", "9", Chain::Solana, "hunter2")
    }

    fn setup() -> (Arc<MockBackend>, Arc<IdempotencyRegistry>, SubmissionClient) {
        let backend = Arc::new(MockBackend::new());
        let registry = Arc::new(IdempotencyRegistry::new());
        let client = SubmissionClient::new(backend.clone(), registry.clone());
        (backend, registry, client)
    }

    fn normalized(registry: &IdempotencyRegistry, intent: TransferIntent) -> NormalizedIntent {
        let base_amount = intent.normalize_amount().unwrap();
        let key = registry.key_for(&intent.fingerprint(&ctx(), &base_amount));
        NormalizedIntent {
            intent,
            base_amount,
            key,
        }
    }

    fn transfer() -> TransferIntent {
        TransferIntent::transfer(TokenRef::Native, "0.25", 9, "Recip1", "tap-1")
    }

    fn sent(submission: Submission) -> SubmissionResult {
        match submission {
            Submission::Sent(result) => result,
            other => panic!("expected a backend call, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_accepted_with_reference() {
        let (backend, registry, client) = setup();
        backend.accept_with("5Kd");
        let intent = normalized(&registry, transfer());

        let result = sent(client.submit(&ctx(), &intent).await);
        assert_eq!(result.outcome, SubmitOutcome::Accepted);
        assert_eq!(result.reference.as_deref(), Some("5Kd"));
        assert_eq!(registry.phase(&intent.key), Some(KeyPhase::Tracking));

        let sent = &backend.submitted()[0];
        assert_eq!(sent.kind, SubmitKind::Transfer);
        assert_eq!(sent.amount, "250000000");
        assert_eq!(sent.to_address.as_deref(), Some("Recip1"));
        assert_eq!(sent.from_token, None);
        assert_eq!(sent.idempotency_key, intent.key.to_string());
    }

    #[tokio::test]
    async fn test_accepted_without_reference() {
        let (backend, registry, client) = setup();
        backend.push_submit(Ok(RemoteEnvelope::success(None)));
        let intent = normalized(&registry, transfer());

        let result = sent(client.submit(&ctx(), &intent).await);
        assert_eq!(result.outcome, SubmitOutcome::Accepted);
        assert_eq!(result.reference, None);
    }

    #[tokio::test]
    async fn test_rejection_message_verbatim_and_key_released() {
        let (backend, registry, client) = setup();
        backend.push_submit(Ok(RemoteEnvelope::error("insufficient balance")));
        let intent = normalized(&registry, transfer());

        let result = sent(client.submit(&ctx(), &intent).await);
        assert_eq!(result.outcome, SubmitOutcome::Rejected);
        assert_eq!(result.message.as_deref(), Some("insufficient balance"));
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_transport_error_is_network_unknown() {
        let (backend, registry, client) = setup();
        backend.push_submit(Err(TransportError::Timeout("10s elapsed".into())));
        let intent = normalized(&registry, transfer());

        let result = sent(client.submit(&ctx(), &intent).await);
        assert_eq!(result.outcome, SubmitOutcome::NetworkUnknown);
        assert_eq!(
            result.message.as_deref(),
            Some("Network uncertainty: Request timed out: 10s elapsed")
        );
        assert!(registry.is_in_flight(&intent.key));
    }

    #[tokio::test]
    async fn test_unrecognized_status_is_not_rejection() {
        let (backend, registry, client) = setup();
        backend.push_submit(Ok(RemoteEnvelope {
            status: "queued".into(),
            data: None,
            message: None,
        }));
        let intent = normalized(&registry, transfer());

        let result = sent(client.submit(&ctx(), &intent).await);
        assert_eq!(result.outcome, SubmitOutcome::NetworkUnknown);
    }

    #[tokio::test]
    async fn test_in_flight_key_not_submitted() {
        let (backend, registry, client) = setup();
        let intent = normalized(&registry, transfer());
        registry.begin_submission(&intent.key);

        assert_eq!(client.submit(&ctx(), &intent).await, Submission::InFlight);
        assert_eq!(backend.submit_count(), 0);
    }

    #[tokio::test]
    async fn test_finished_action_not_submitted_again() {
        let (backend, registry, client) = setup();
        let intent = normalized(&registry, transfer());
        registry.begin_submission(&intent.key);
        let confirmed = Outcome::Confirmed(TransactionRecord::new(intent.key));
        registry.complete(&intent.key, confirmed.clone());

        assert_eq!(
            client.submit(&ctx(), &intent).await,
            Submission::Completed(Some(confirmed))
        );
        assert_eq!(backend.submit_count(), 0);
    }

    #[tokio::test]
    async fn test_swap_request_shape() {
        let (backend, registry, client) = setup();
        let swap = TransferIntent::swap(
            TokenRef::Native,
            TokenRef::Address("EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v".into()),
            "1",
            9,
            "quote-77",
            Some(50),
            "tap-9",
        );
        let intent = normalized(&registry, swap);

        client.submit(&ctx(), &intent).await;
        let sent = &backend.submitted()[0];
        assert_eq!(sent.kind, SubmitKind::Swap);
        assert_eq!(sent.quote_id.as_deref(), Some("quote-77"));
        assert_eq!(sent.slippage_bps, Some(50));
        assert_eq!(
            sent.to_token.as_deref(),
            Some("EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v")
        );
        assert_eq!(sent.to_address, None);
    }

    #[tokio::test]
    async fn test_native_token_encoded_alike_on_both_sides() {
        let (backend, registry, client) = setup();
        let mint = "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v";
        let swap = TransferIntent::swap(
            TokenRef::Address(mint.into()),
            TokenRef::Native,
            "5",
            6,
            "quote-78",
            None,
            "tap-10",
        );
        let intent = normalized(&registry, swap);

        client.submit(&ctx(), &intent).await;
        let body = serde_json::to_value(&backend.submitted()[0]).unwrap();
        assert_eq!(body["from_token"], Value::String(mint.into()));
        assert!(body.as_object().unwrap().contains_key("to_token"));
        assert_eq!(body["to_token"], Value::Null);
    }
}
