//! Execution Error Types
//!
//! Four classes of failure, each with its own propagation policy:
//!
//! | class               | example                       | policy                        |
//! |---------------------|-------------------------------|-------------------------------|
//! | Validation          | bad amount, missing recipient | fail fast, no network call    |
//! | RemoteRejection     | insufficient balance          | terminal FAILED, verbatim msg |
//! | NetworkUncertainty  | socket timeout                | absorbed, keep tracking       |
//! | PollingTimeout      | attempt budget exhausted      | terminal TIMEOUT (not FAILED) |

use thiserror::Error;

/// Taxonomy class of an [`EngineError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Validation,
    RemoteRejection,
    NetworkUncertainty,
    PollingTimeout,
}

/// Engine error types
///
/// These are values carried inside `Outcome::Failed`; they never cross the
/// engine's public boundary as `Err`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    // === Validation Errors ===
    #[error("Amount is missing, non-numeric, or zero")]
    InvalidAmount,

    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("Source and destination token cannot be the same")]
    SameToken,

    #[error("Unsupported chain: {0}")]
    UnsupportedChain(String),

    #[error("Invalid state transition: {0}")]
    InvalidStateTransition(String),

    // === Remote Rejection ===
    #[error("{0}")]
    RemoteRejection(String),

    #[error("{0}")]
    OperationFailed(String),

    // === Network Uncertainty ===
    #[error("Network uncertainty: {0}")]
    NetworkUncertainty(String),

    // === Polling Timeout ===
    #[error("No terminal status after {0} attempts")]
    PollingTimeout(u32),
}

impl EngineError {
    /// Get the error code for callers that switch on a stable string
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::InvalidAmount => "INVALID_AMOUNT",
            EngineError::MissingField(_) => "MISSING_FIELD",
            EngineError::SameToken => "SAME_TOKEN",
            EngineError::UnsupportedChain(_) => "UNSUPPORTED_CHAIN",
            EngineError::InvalidStateTransition(_) => "INVALID_STATE_TRANSITION",
            EngineError::RemoteRejection(_) => "REMOTE_REJECTION",
            EngineError::OperationFailed(_) => "OPERATION_FAILED",
            EngineError::NetworkUncertainty(_) => "NETWORK_UNCERTAINTY",
            EngineError::PollingTimeout(_) => "POLLING_TIMEOUT",
        }
    }

    /// Get the taxonomy class
    pub fn class(&self) -> ErrorClass {
        match self {
            EngineError::InvalidAmount
            | EngineError::MissingField(_)
            | EngineError::SameToken
            | EngineError::UnsupportedChain(_)
            | EngineError::InvalidStateTransition(_) => ErrorClass::Validation,
            EngineError::RemoteRejection(_) | EngineError::OperationFailed(_) => {
                ErrorClass::RemoteRejection
            }
            EngineError::NetworkUncertainty(_) => ErrorClass::NetworkUncertainty,
            EngineError::PollingTimeout(_) => ErrorClass::PollingTimeout,
        }
    }
}

/// Transport-level failure talking to the execution backend.
///
/// Every variant means "no usable answer was received": the remote
/// operation may or may not have happened.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Connection failed: {0}")]
    Connect(String),

    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("Malformed response: {0}")]
    Decode(String),

    #[error("Network error: {0}")]
    Network(String),
}

impl From<TransportError> for EngineError {
    fn from(e: TransportError) -> Self {
        EngineError::NetworkUncertainty(e.to_string())
    }
}
