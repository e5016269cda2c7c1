//! Execution Core Types
//!
//! Type definitions shared by the submission pipeline and the tracker.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::error::EngineError;
use super::state::TxState;
use crate::money;

/// Idempotency key - ULID-based, one per logical user action
///
/// Reused across every network attempt of the same action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IdempotencyKey(ulid::Ulid);

impl IdempotencyKey {
    /// Generate a new unique key
    pub fn new() -> Self {
        Self(ulid::Ulid::new())
    }

    /// Get the inner ULID value
    pub fn inner(&self) -> ulid::Ulid {
        self.0
    }
}

impl Default for IdempotencyKey {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for IdempotencyKey {
    type Err = ulid::DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(ulid::Ulid::from_string(s)?))
    }
}

/// Deterministic digest of everything that identifies one logical action
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IntentFingerprint(String);

impl IntentFingerprint {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IntentFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Chain family; selects the backend route prefix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Chain {
    Solana,
    Evm,
}

impl Chain {
    /// URL path segment used by the execution backend
    pub fn path_segment(&self) -> &'static str {
        match self {
            Chain::Solana => "solana",
            Chain::Evm => "evm",
        }
    }
}

impl FromStr for Chain {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sol" | "solana" => Ok(Chain::Solana),
            "eth" | "evm" | "base" => Ok(Chain::Evm),
            _ => Err(EngineError::UnsupportedChain(s.to_string())),
        }
    }
}

impl fmt::Display for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path_segment())
    }
}

/// Immutable session context handed to the engine at construction.
///
/// Replaces ambient selected-wallet / device-identity state.
#[derive(Clone)]
pub struct EngineContext {
    pub device_id: String,
    pub wallet_id: String,
    pub chain: Chain,
    /// Payment password (or equivalent) forwarded to the backend. Never logged.
    pub auth_secret: String,
}

impl EngineContext {
    pub fn new(
        device_id: impl Into<String>,
        wallet_id: impl Into<String>,
        chain: Chain,
        auth_secret: impl Into<String>,
    ) -> Self {
        Self {
            device_id: device_id.into(),
            wallet_id: wallet_id.into(),
            chain,
            auth_secret: auth_secret.into(),
        }
    }
}

impl fmt::Debug for EngineContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineContext")
            .field("device_id", &self.device_id)
            .field("wallet_id", &self.wallet_id)
            .field("chain", &self.chain)
            .field("auth_secret", &"<redacted>")
            .finish()
    }
}

/// Token being moved: the chain's native asset or a token contract / mint
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TokenRef {
    Native,
    Address(String),
}

impl TokenRef {
    pub fn address(&self) -> Option<&str> {
        match self {
            TokenRef::Native => None,
            TokenRef::Address(addr) => Some(addr),
        }
    }
}

impl fmt::Display for TokenRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenRef::Native => f.write_str("native"),
            TokenRef::Address(addr) => f.write_str(addr),
        }
    }
}

/// Where the funds go: a plain recipient, or a swap quote
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum IntentTarget {
    Recipient(String),
    Quote {
        reference: String,
        slippage_bps: Option<u32>,
    },
}

/// User-approved transfer or swap, as the UI hands it over
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferIntent {
    pub source_token: TokenRef,
    /// Absent for plain transfers
    pub destination_token: Option<TokenRef>,
    /// Exactly what the user typed
    pub human_amount: String,
    pub token_decimals: u32,
    pub target: IntentTarget,
    /// Identifies the user action (one confirm tap). Retries of the same
    /// action reuse it; a new action gets a new one.
    pub action_id: String,
}

impl TransferIntent {
    /// Plain transfer of `amount` to `recipient`
    pub fn transfer(
        token: TokenRef,
        amount: impl Into<String>,
        decimals: u32,
        recipient: impl Into<String>,
        action_id: impl Into<String>,
    ) -> Self {
        Self {
            source_token: token,
            destination_token: None,
            human_amount: amount.into(),
            token_decimals: decimals,
            target: IntentTarget::Recipient(recipient.into()),
            action_id: action_id.into(),
        }
    }

    /// Swap `amount` of `from` into `to` against a previously fetched quote
    pub fn swap(
        from: TokenRef,
        to: TokenRef,
        amount: impl Into<String>,
        decimals: u32,
        quote_reference: impl Into<String>,
        slippage_bps: Option<u32>,
        action_id: impl Into<String>,
    ) -> Self {
        Self {
            source_token: from,
            destination_token: Some(to),
            human_amount: amount.into(),
            token_decimals: decimals,
            target: IntentTarget::Quote {
                reference: quote_reference.into(),
                slippage_bps,
            },
            action_id: action_id.into(),
        }
    }

    /// Validate and convert the amount to base units (the only conversion)
    pub fn normalize_amount(&self) -> Result<String, EngineError> {
        if self.action_id.trim().is_empty() {
            return Err(EngineError::MissingField("action_id"));
        }

        match &self.target {
            IntentTarget::Recipient(recipient) => {
                if recipient.trim().is_empty() {
                    return Err(EngineError::MissingField("recipient"));
                }
            }
            IntentTarget::Quote { reference, .. } => {
                if reference.trim().is_empty() {
                    return Err(EngineError::MissingField("quote_reference"));
                }
                let Some(destination) = &self.destination_token else {
                    return Err(EngineError::MissingField("destination_token"));
                };
                if *destination == self.source_token {
                    return Err(EngineError::SameToken);
                }
            }
        }

        let base = money::to_base_units(&self.human_amount, self.token_decimals)
            .ok_or(EngineError::InvalidAmount)?;
        if money::is_zero_base_units(&base) {
            return Err(EngineError::InvalidAmount);
        }
        Ok(base)
    }

    /// Fingerprint of (sender, recipient/quote, tokens, amount, user action)
    pub fn fingerprint(&self, ctx: &EngineContext, base_amount: &str) -> IntentFingerprint {
        let target = match &self.target {
            IntentTarget::Recipient(r) => format!("to:{}", r.trim()),
            IntentTarget::Quote {
                reference,
                slippage_bps,
            } => format!("quote:{}:{}", reference, slippage_bps.unwrap_or_default()),
        };
        let destination = self
            .destination_token
            .as_ref()
            .map(ToString::to_string)
            .unwrap_or_default();
        let material = format!(
            "{}|{}|{}|{}|{}|{}|{}|{}",
            ctx.device_id,
            ctx.wallet_id,
            ctx.chain,
            self.source_token,
            destination,
            base_amount,
            target,
            self.action_id
        );
        IntentFingerprint(format!("{:x}", md5::compute(material)))
    }
}

/// Intent after validation: base amount fixed, key attached
#[derive(Debug, Clone)]
pub struct NormalizedIntent {
    pub intent: TransferIntent,
    /// Exact base-unit integer string
    pub base_amount: String,
    pub key: IdempotencyKey,
}

/// Immediate classification of a submission call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Remote accepted the operation
    Accepted,
    /// Remote refused the operation (business rule) - terminal, no retry
    Rejected,
    /// No response received - operation state unknown
    NetworkUnknown,
}

/// Result of `SubmissionClient::submit`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionResult {
    pub outcome: SubmitOutcome,
    /// Remote operation identifier (hash / signature / transaction id)
    pub reference: Option<String>,
    pub message: Option<String>,
}

impl SubmissionResult {
    pub fn accepted(reference: Option<String>) -> Self {
        Self {
            outcome: SubmitOutcome::Accepted,
            reference,
            message: None,
        }
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self {
            outcome: SubmitOutcome::Rejected,
            reference: None,
            message: Some(message.into()),
        }
    }

    pub fn network_unknown(message: impl Into<String>) -> Self {
        Self {
            outcome: SubmitOutcome::NetworkUnknown,
            reference: None,
            message: Some(message.into()),
        }
    }
}

/// Lifecycle record owned by the tracker for one intent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub key: IdempotencyKey,
    pub state: TxState,
    /// Null until learned from submission, discovery, or account status
    pub reference: Option<String>,
    /// Status polls issued so far
    pub attempt_count: u32,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TransactionRecord {
    /// Create a new record in CREATED state
    pub fn new(key: IdempotencyKey) -> Self {
        let now = Utc::now();
        Self {
            key,
            state: TxState::Created,
            reference: None,
            attempt_count: 0,
            last_error: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Move to `next`, refusing any edge outside the lifecycle graph
    pub fn advance(&mut self, next: TxState) -> Result<(), EngineError> {
        if !self.state.can_transition_to(next) {
            return Err(EngineError::InvalidStateTransition(format!(
                "{} -> {}",
                self.state, next
            )));
        }
        self.state = next;
        self.updated_at = Utc::now();
        Ok(())
    }
}

impl fmt::Display for TransactionRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Tx[{}] state={} ref={} attempts={}",
            self.key,
            self.state,
            self.reference.as_deref().unwrap_or("-"),
            self.attempt_count
        )
    }
}

/// Terminal value delivered exactly once to the caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Confirmed(TransactionRecord),
    /// `record` is `None` when the intent failed validation before a
    /// record existed
    Failed {
        reason: EngineError,
        record: Option<TransactionRecord>,
    },
    /// Outcome unresolved; the caller should offer a manual re-check
    Timeout(TransactionRecord),
}

impl Outcome {
    pub fn failed(reason: EngineError, record: Option<TransactionRecord>) -> Self {
        Outcome::Failed { reason, record }
    }

    /// Terminal lifecycle state this outcome represents
    pub fn state(&self) -> TxState {
        match self {
            Outcome::Confirmed(_) => TxState::Confirmed,
            Outcome::Failed { .. } => TxState::Failed,
            Outcome::Timeout(_) => TxState::Timeout,
        }
    }

    pub fn record(&self) -> Option<&TransactionRecord> {
        match self {
            Outcome::Confirmed(record) | Outcome::Timeout(record) => Some(record),
            Outcome::Failed { record, .. } => record.as_ref(),
        }
    }

    pub fn reference(&self) -> Option<&str> {
        self.record().and_then(|r| r.reference.as_deref())
    }
}

/// Result of a manual re-check on a TIMEOUT record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecheckOutcome {
    Confirmed { reference: Option<String> },
    Failed(String),
    Unresolved,
}
