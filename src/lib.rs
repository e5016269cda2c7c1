//! Wallet Transaction Engine
//!
//! Submission and confirmation tracking for wallet transfers and swaps.
//!
//! # Modules
//!
//! - [`money`] - Human amount ⇄ exact base-unit conversion
//! - [`execution`] - Idempotent submission, confirmation polling, outcome delivery
//! - [`config`] - YAML application config
//! - [`logging`] - tracing subscriber setup

pub mod config;
pub mod execution;
pub mod logging;
pub mod money;

// Convenient re-exports at crate root
pub use config::{AppConfig, BackendConfig, ConfigError};
pub use execution::{
    Chain, EngineContext, EngineError, EngineHandle, ExecutionBackend, HttpBackend,
    IdempotencyRegistry, Outcome, RecheckOutcome, TokenRef, TrackerConfig, TransactionEngine,
    TransactionRecord, TransferIntent, TxState,
};
