//! Transaction Execution Module
//!
//! Turns a user-approved transfer or swap intent into exactly one remote
//! submission and tracks it to a terminal outcome.
//!
//! # Pipeline
//!
//! ```text
//! TransferIntent ─→ money::to_base_units ─→ IdempotencyRegistry::key_for
//!                                                   │
//!                    OutcomeReporter ←─ ConfirmationTracker ←─ SubmissionClient
//! ```
//!
//! # Outcome Semantics
//!
//! - CONFIRMED: the backend reported success for the operation
//! - FAILED: validation failed, the backend refused the submission, or it
//!   reported the operation failed
//! - TIMEOUT: no terminal status within the poll budget; the operation may
//!   still land, offer a re-check
//!
//! Transport failures are never FAILED.

pub mod adapters;
pub mod cancel;
pub mod engine;
pub mod error;
pub mod idempotency;
pub mod reporter;
pub mod state;
pub mod status;
pub mod submission;
pub mod tracker;
pub mod types;


// Re-exports
pub use adapters::{ExecutionBackend, HttpBackend};
pub use cancel::CancelToken;
pub use engine::{EngineHandle, TransactionEngine};
pub use error::{EngineError, ErrorClass, TransportError};
pub use idempotency::{Claim, IdempotencyRegistry, KeyPhase};
pub use reporter::OutcomeReporter;
pub use state::TxState;
pub use status::StatusSignal;
pub use submission::{Submission, SubmissionClient};
pub use tracker::{ConfirmationTracker, TrackerConfig};
pub use types::{
    Chain, EngineContext, IdempotencyKey, IntentTarget, Outcome, RecheckOutcome, SubmissionResult,
    SubmitOutcome, TokenRef, TransactionRecord, TransferIntent,
};
