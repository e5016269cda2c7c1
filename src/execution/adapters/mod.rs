//! Execution Backend Adapters
//!
//! The engine talks to the remote execution service only through
//! [`ExecutionBackend`]. Implementations report transport failures as
//! `Err(TransportError)` and hand every parsed response back as-is; the
//! engine, not the adapter, decides what a response means.

pub mod http;

pub use http::HttpBackend;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use super::error::TransportError;
use super::types::{EngineContext, IdempotencyKey};

/// Which submission endpoint a request targets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitKind {
    Transfer,
    Swap,
}

/// Submission request body
#[derive(Clone, Serialize)]
pub struct SubmitRequest {
    #[serde(skip)]
    pub kind: SubmitKind,
    pub device_id: String,
    /// `None` for the chain's native asset
    pub from_token: Option<String>,
    /// Swap destination, encoded like `from_token`; `None` for transfers
    pub to_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to_address: Option<String>,
    /// Base units, exact integer string
    pub amount: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quote_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slippage_bps: Option<u32>,
    pub idempotency_key: String,
    pub payment_password: String,
}

impl fmt::Debug for SubmitRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubmitRequest")
            .field("kind", &self.kind)
            .field("device_id", &self.device_id)
            .field("from_token", &self.from_token)
            .field("to_token", &self.to_token)
            .field("to_address", &self.to_address)
            .field("amount", &self.amount)
            .field("quote_id", &self.quote_id)
            .field("slippage_bps", &self.slippage_bps)
            .field("idempotency_key", &self.idempotency_key)
            .field("payment_password", &"<redacted>")
            .finish()
    }
}

/// Standard backend response envelope `{status, data?, message?}`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RemoteEnvelope {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub data: Option<Value>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Field names under `data` that carry the remote operation identifier
const REFERENCE_FIELDS: [&str; 5] = [
    "transaction_hash",
    "signature",
    "transaction_id",
    "tx_hash",
    "reference",
];

impl RemoteEnvelope {
    pub fn success(data: Option<Value>) -> Self {
        Self {
            status: "success".to_string(),
            data,
            message: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: "error".to_string(),
            data: None,
            message: Some(message.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status.trim().eq_ignore_ascii_case("success")
    }

    pub fn is_error(&self) -> bool {
        self.status.trim().eq_ignore_ascii_case("error")
    }

    /// First non-empty reference found in `data` (or at top level of `data`)
    pub fn reference(&self) -> Option<String> {
        self.data.as_ref().and_then(extract_reference)
    }
}

/// Pull a reference out of a JSON object, if present
pub(crate) fn extract_reference(value: &Value) -> Option<String> {
    REFERENCE_FIELDS.iter().find_map(|field| {
        value
            .get(field)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    })
}

/// What a status poll asks about
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusTarget {
    /// A specific remote operation
    Reference(String),
    /// Account-level status of whatever was submitted under this key
    Account(IdempotencyKey),
}

/// Parsed status poll response
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusResponse {
    /// Raw remote status (mapped later through `StatusSignal`)
    pub status: Option<String>,
    pub message: Option<String>,
    /// Reference, when an account-level query reveals it
    pub reference: Option<String>,
}

impl StatusResponse {
    pub fn with_status(status: impl Into<String>) -> Self {
        Self {
            status: Some(status.into()),
            ..Default::default()
        }
    }
}

/// One entry of the account's recent-operations listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecentOperation {
    pub reference: String,
    pub idempotency_key: Option<String>,
}

/// Remote execution service.
///
/// `submit` is the only non-idempotent call; the engine guarantees at most
/// one concurrent `submit` per idempotency key.
#[async_trait]
pub trait ExecutionBackend: Send + Sync {
    /// Get adapter name for logging
    fn name(&self) -> &'static str;

    /// Submit a transfer or swap
    async fn submit(
        &self,
        ctx: &EngineContext,
        request: &SubmitRequest,
    ) -> Result<RemoteEnvelope, TransportError>;

    /// Query operation status
    async fn status(
        &self,
        ctx: &EngineContext,
        target: &StatusTarget,
    ) -> Result<StatusResponse, TransportError>;

    /// List the account's most recent operations (newest first)
    async fn recent_operations(
        &self,
        ctx: &EngineContext,
        limit: usize,
    ) -> Result<Vec<RecentOperation>, TransportError>;
}

/// Scripted backend for testing
#[cfg(test)]
pub mod mock {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    type StatusHook = Box<dyn Fn(usize) + Send + Sync>;

    pub struct MockBackend {
        submit_script: Mutex<VecDeque<Result<RemoteEnvelope, TransportError>>>,
        status_script: Mutex<VecDeque<Result<StatusResponse, TransportError>>>,
        recent_script: Mutex<VecDeque<Result<Vec<RecentOperation>, TransportError>>>,
        /// Track requests for verification
        submitted: Mutex<Vec<SubmitRequest>>,
        status_targets: Mutex<Vec<StatusTarget>>,
        submit_count: AtomicUsize,
        status_count: AtomicUsize,
        recent_count: AtomicUsize,
        submit_delay: Mutex<Option<Duration>>,
        /// Called after each status call with the running count
        on_status: Mutex<Option<StatusHook>>,
    }

    impl MockBackend {
        pub fn new() -> Self {
            Self {
                submit_script: Mutex::new(VecDeque::new()),
                status_script: Mutex::new(VecDeque::new()),
                recent_script: Mutex::new(VecDeque::new()),
                submitted: Mutex::new(Vec::new()),
                status_targets: Mutex::new(Vec::new()),
                submit_count: AtomicUsize::new(0),
                status_count: AtomicUsize::new(0),
                recent_count: AtomicUsize::new(0),
                submit_delay: Mutex::new(None),
                on_status: Mutex::new(None),
            }
        }

        pub fn push_submit(&self, response: Result<RemoteEnvelope, TransportError>) {
            self.submit_script.lock().unwrap().push_back(response);
        }

        /// Accepted submission carrying `reference`
        pub fn accept_with(&self, reference: &str) {
            self.push_submit(Ok(RemoteEnvelope::success(Some(
                serde_json::json!({ "transaction_hash": reference }),
            ))));
        }

        pub fn push_statuses(&self, statuses: &[&str]) {
            let mut script = self.status_script.lock().unwrap();
            for status in statuses {
                script.push_back(Ok(StatusResponse::with_status(*status)));
            }
        }

        pub fn push_status(&self, response: Result<StatusResponse, TransportError>) {
            self.status_script.lock().unwrap().push_back(response);
        }

        pub fn push_recent(&self, response: Result<Vec<RecentOperation>, TransportError>) {
            self.recent_script.lock().unwrap().push_back(response);
        }

        pub fn set_submit_delay(&self, delay: Duration) {
            *self.submit_delay.lock().unwrap() = Some(delay);
        }

        pub fn on_status(&self, hook: impl Fn(usize) + Send + Sync + 'static) {
            *self.on_status.lock().unwrap() = Some(Box::new(hook));
        }

        pub fn submit_count(&self) -> usize {
            self.submit_count.load(Ordering::SeqCst)
        }

        pub fn status_count(&self) -> usize {
            self.status_count.load(Ordering::SeqCst)
        }

        pub fn recent_count(&self) -> usize {
            self.recent_count.load(Ordering::SeqCst)
        }

        pub fn submitted(&self) -> Vec<SubmitRequest> {
            self.submitted.lock().unwrap().clone()
        }

        pub fn status_targets(&self) -> Vec<StatusTarget> {
            self.status_targets.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ExecutionBackend for MockBackend {
        fn name(&self) -> &'static str {
            "mock"
        }

        async fn submit(
            &self,
            _ctx: &EngineContext,
            request: &SubmitRequest,
        ) -> Result<RemoteEnvelope, TransportError> {
            self.submit_count.fetch_add(1, Ordering::SeqCst);
            self.submitted.lock().unwrap().push(request.clone());

            let delay = *self.submit_delay.lock().unwrap();
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }

            self.submit_script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| {
                    Ok(RemoteEnvelope::success(Some(
                        serde_json::json!({ "transaction_hash": "sig-default" }),
                    )))
                })
        }

        async fn status(
            &self,
            _ctx: &EngineContext,
            target: &StatusTarget,
        ) -> Result<StatusResponse, TransportError> {
            let count = self.status_count.fetch_add(1, Ordering::SeqCst) + 1;
            self.status_targets.lock().unwrap().push(target.clone());

            let response = self
                .status_script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(StatusResponse::with_status("pending")));

            if let Some(hook) = self.on_status.lock().unwrap().as_ref() {
                hook(count);
            }
            response
        }

        async fn recent_operations(
            &self,
            _ctx: &EngineContext,
            _limit: usize,
        ) -> Result<Vec<RecentOperation>, TransportError> {
            self.recent_count.fetch_add(1, Ordering::SeqCst);
            self.recent_script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(Vec::new()))
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use crate::execution::types::Chain;

        fn ctx() -> EngineContext {
            EngineContext::new("dev", "1", Chain::Solana, "pw")
        }

        #[tokio::test]
        async fn test_mock_status_defaults_to_pending() {
            let backend = MockBackend::new();
            backend.push_statuses(&["processing"]);

            let target = StatusTarget::Reference("sig".into());
            let first = backend.status(&ctx(), &target).await.unwrap();
            let second = backend.status(&ctx(), &target).await.unwrap();

            assert_eq!(first.status.as_deref(), Some("processing"));
            assert_eq!(second.status.as_deref(), Some("pending"));
            assert_eq!(backend.status_count(), 2);
        }
    }
}

#[cfg(test)]
pub use mock::MockBackend;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_envelope_reference_fields() {
        let hash = RemoteEnvelope::success(Some(json!({ "transaction_hash": "0xabc" })));
        assert_eq!(hash.reference().as_deref(), Some("0xabc"));

        let sig = RemoteEnvelope::success(Some(json!({ "signature": "5Kd..." })));
        assert_eq!(sig.reference().as_deref(), Some("5Kd..."));

        let id = RemoteEnvelope::success(Some(json!({ "transaction_id": "tx-9" })));
        assert_eq!(id.reference().as_deref(), Some("tx-9"));

        let empty = RemoteEnvelope::success(Some(json!({ "transaction_hash": "" })));
        assert_eq!(empty.reference(), None);

        assert_eq!(RemoteEnvelope::success(None).reference(), None);
    }

    #[test]
    fn test_envelope_status() {
        let parsed: RemoteEnvelope =
            serde_json::from_str(r#"{"status":"error","message":"insufficient balance"}"#)
                .unwrap();
        assert!(parsed.is_error());
        assert!(!parsed.is_success());
        assert_eq!(parsed.message.as_deref(), Some("insufficient balance"));
    }

    #[test]
    fn test_submit_request_redacts_password() {
        let request = SubmitRequest {
            kind: SubmitKind::Transfer,
            device_id: "dev".into(),
            from_token: None,
            to_token: None,
            to_address: Some("Recip".into()),
            amount: "100".into(),
            quote_id: None,
            slippage_bps: None,
            idempotency_key: "01H".into(),
            payment_password: "hunter2".into(),
        };
        assert!(!format!("{request:?}").contains("hunter2"));

        let body = serde_json::to_value(&request).unwrap();
        assert_eq!(body["from_token"], Value::Null);
        assert!(body.get("quote_id").is_none());
        assert!(body.get("kind").is_none());
    }
}
