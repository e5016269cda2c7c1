//! Canonical Status Mapping
//!
//! Every remote status vocabulary collapses into one of three signals.
//! Unknown or missing values are non-terminal: unknown input must never
//! be classified as success.

/// Remote status values recognized by the engine
pub mod status {
    pub const SUCCESS: &str = "success";
    pub const CONFIRMED: &str = "confirmed";
    pub const FAILED: &str = "failed";
    pub const ERROR: &str = "error";
    pub const PENDING: &str = "pending";
    pub const PROCESSING: &str = "processing";
}

/// Canonical 3-way classification of a remote status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusSignal {
    TerminalSuccess,
    TerminalFailure,
    NonTerminal,
}

impl StatusSignal {
    /// Map a raw remote status string (case-insensitive, whitespace-tolerant)
    pub fn from_remote(raw: Option<&str>) -> Self {
        let Some(raw) = raw else {
            return StatusSignal::NonTerminal;
        };
        let normalized = raw.trim().to_ascii_lowercase();
        match normalized.as_str() {
            status::SUCCESS | status::CONFIRMED => StatusSignal::TerminalSuccess,
            status::FAILED | status::ERROR => StatusSignal::TerminalFailure,
            // pending, processing, and anything unrecognized
            _ => StatusSignal::NonTerminal,
        }
    }

    #[inline]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, StatusSignal::NonTerminal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mapping_table() {
        let cases = [
            (Some("success"), StatusSignal::TerminalSuccess),
            (Some("confirmed"), StatusSignal::TerminalSuccess),
            (Some("failed"), StatusSignal::TerminalFailure),
            (Some("error"), StatusSignal::TerminalFailure),
            (Some("pending"), StatusSignal::NonTerminal),
            (Some("processing"), StatusSignal::NonTerminal),
            (Some("finalized_maybe"), StatusSignal::NonTerminal),
            (Some(""), StatusSignal::NonTerminal),
            (None, StatusSignal::NonTerminal),
        ];
        for (raw, expected) in cases {
            assert_eq!(StatusSignal::from_remote(raw), expected, "{raw:?}");
        }
    }

    #[test]
    fn test_case_insensitive() {
        assert_eq!(
            StatusSignal::from_remote(Some(" CONFIRMED ")),
            StatusSignal::TerminalSuccess
        );
        assert_eq!(
            StatusSignal::from_remote(Some("Failed")),
            StatusSignal::TerminalFailure
        );
    }

    #[test]
    fn test_unknown_never_succeeds() {
        for raw in ["succeeded?", "ok", "done", "200", "true"] {
            assert!(!StatusSignal::from_remote(Some(raw)).is_terminal());
        }
    }
}
