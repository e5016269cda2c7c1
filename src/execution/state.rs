//! Transaction Lifecycle States
//!
//! ```text
//! CREATED → SUBMITTING → AWAITING_REFERENCE → POLLING → CONFIRMED
//!               │               │               │    → FAILED
//!               │               └───────────────┤    → TIMEOUT
//!               ├──────────────────────────────►┘
//!               └──► FAILED
//! ```
//!
//! Transitions are monotonic: a state is never revisited once left.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of one submitted intent.
///
/// Terminal states: CONFIRMED, FAILED, TIMEOUT
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TxState {
    /// Intent accepted by the engine, nothing sent yet
    Created,

    /// Submission call in flight
    Submitting,

    /// Remote may have accepted the operation but we hold no reference
    AwaitingReference,

    /// Status endpoint being polled
    Polling,

    /// Terminal: remote reported success
    Confirmed,

    /// Terminal: rejected at submission, or remote reported failure
    Failed,

    /// Terminal: attempt budget exhausted, true outcome unknown
    Timeout,
}

impl TxState {
    /// Check if this is a terminal state (no more transitions possible)
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(self, TxState::Confirmed | TxState::Failed | TxState::Timeout)
    }

    /// Whether `self → next` is an edge of the lifecycle graph.
    ///
    /// `POLLING → POLLING` is the only self-edge (another poll round).
    pub fn can_transition_to(&self, next: TxState) -> bool {
        use TxState::*;
        matches!(
            (self, next),
            (Created, Submitting)
                | (Submitting, AwaitingReference)
                | (Submitting, Polling)
                | (Submitting, Failed)
                | (AwaitingReference, Polling)
                | (Polling, Polling)
                | (Polling, Confirmed)
                | (Polling, Failed)
                | (Polling, Timeout)
        )
    }

    /// Get human-readable state name
    pub fn as_str(&self) -> &'static str {
        match self {
            TxState::Created => "CREATED",
            TxState::Submitting => "SUBMITTING",
            TxState::AwaitingReference => "AWAITING_REFERENCE",
            TxState::Polling => "POLLING",
            TxState::Confirmed => "CONFIRMED",
            TxState::Failed => "FAILED",
            TxState::Timeout => "TIMEOUT",
        }
    }
}

impl fmt::Display for TxState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [TxState; 7] = [
        TxState::Created,
        TxState::Submitting,
        TxState::AwaitingReference,
        TxState::Polling,
        TxState::Confirmed,
        TxState::Failed,
        TxState::Timeout,
    ];

    #[test]
    fn test_terminal_states() {
        assert!(TxState::Confirmed.is_terminal());
        assert!(TxState::Failed.is_terminal());
        assert!(TxState::Timeout.is_terminal());

        assert!(!TxState::Created.is_terminal());
        assert!(!TxState::Submitting.is_terminal());
        assert!(!TxState::AwaitingReference.is_terminal());
        assert!(!TxState::Polling.is_terminal());
    }

    #[test]
    fn test_terminal_states_have_no_exits() {
        for from in ALL.iter().filter(|s| s.is_terminal()) {
            for to in ALL {
                assert!(!from.can_transition_to(to), "{from} -> {to} must not exist");
            }
        }
    }

    #[test]
    fn test_no_backward_edges() {
        assert!(!TxState::Polling.can_transition_to(TxState::AwaitingReference));
        assert!(!TxState::Polling.can_transition_to(TxState::Submitting));
        assert!(!TxState::AwaitingReference.can_transition_to(TxState::Submitting));
        assert!(!TxState::Submitting.can_transition_to(TxState::Created));
    }

    #[test]
    fn test_rejection_skips_polling() {
        assert!(TxState::Submitting.can_transition_to(TxState::Failed));
        assert!(!TxState::Submitting.can_transition_to(TxState::Confirmed));
        assert!(!TxState::AwaitingReference.can_transition_to(TxState::Confirmed));
    }

    #[test]
    fn test_display() {
        assert_eq!(TxState::AwaitingReference.to_string(), "AWAITING_REFERENCE");
        assert_eq!(TxState::Timeout.to_string(), "TIMEOUT");
    }

    #[test]
    fn test_serde_names() {
        let json = serde_json::to_string(&TxState::AwaitingReference).unwrap();
        assert_eq!(json, "\"AWAITING_REFERENCE\"");
    }
}
