//! Money Conversion Module
//!
//! Converts between the amount a user types ("1,234.5") and the exact
//! base-unit integer string the execution backend expects ("1234500000"
//! for a 6-decimal token). All conversions MUST go through this module.
//!
//! ## Rules
//! 1. Input is normalized, never rejected for cosmetic reasons: grouping
//!    separators are stripped, a leading `.` gets an implicit `0`, extra
//!    decimal points are dropped together with everything after them.
//! 2. Excess fractional digits are TRUNCATED, never rounded. Overstating
//!    a spend is forbidden.
//! 3. Empty or non-numeric input yields `None` (the "no amount" sentinel).
//! 4. Base amounts are arbitrary-precision (`BigUint`), so 18-decimal
//!    tokens never overflow and no floating point is ever involved.
//!
//! ## Usage
//! ```rust
//! use wallet_tx_engine::money::{to_base_units, from_base_units};
//!
//! assert_eq!(to_base_units("1,234.5", 6).as_deref(), Some("1234500000"));
//! assert_eq!(from_base_units("1234500000", 6).as_deref(), Some("1234.5"));
//! assert_eq!(to_base_units("abc", 6), None);
//! ```

use num_bigint::BigUint;
use rust_decimal::prelude::*;

/// Largest token precision accepted. Real chains top out at 18 (EVM) or
/// 9 (SPL); anything wider is a corrupted token descriptor.
pub const MAX_DECIMALS: u32 = 36;

/// Characters users (and locale-formatted paste) insert as digit grouping.
const GROUPING_SEPARATORS: [char; 4] = [',', '_', ' ', '\u{a0}'];

// ============================================================================
// Parse: Human → Base Units
// ============================================================================

/// Convert a human-entered decimal amount to an exact base-unit integer string.
///
/// # Arguments
/// * `human_amount` - What the user typed (e.g. "1.5", "1,000", ".25")
/// * `decimals` - Token precision (e.g. 9 for SOL, 18 for ETH)
///
/// # Returns
/// * `Some(base)` - non-negative integer string without leading zeros
/// * `None` - no amount (empty, non-numeric, signed, or `decimals` out of range)
///
/// Pure: identical inputs always produce identical output.
pub fn to_base_units(human_amount: &str, decimals: u32) -> Option<String> {
    if decimals > MAX_DECIMALS {
        return None;
    }

    let (whole, frac) = split_normalized(human_amount)?;

    // Truncate toward zero: drop digits beyond the token precision
    let frac = &frac[..frac.len().min(decimals as usize)];

    let mut digits = String::with_capacity(whole.len() + decimals as usize);
    digits.push_str(&whole);
    digits.push_str(frac);
    for _ in frac.len()..decimals as usize {
        digits.push('0');
    }

    let value = BigUint::parse_bytes(digits.as_bytes(), 10)?;
    Some(value.to_string())
}

/// Basis points in 100%
pub const MAX_BPS: u32 = 10_000;

/// Convert a slippage tolerance the user typed as a percent ("0.5",
/// "1%") to basis points.
///
/// Precision below one basis point is truncated. Negative, non-numeric or
/// above-100% input yields `None`.
pub fn percent_to_bps(percent: &str) -> Option<u32> {
    let trimmed = percent.trim();
    let trimmed = trimmed.strip_suffix('%').unwrap_or(trimmed).trim();
    let value = Decimal::from_str(trimmed).ok()?;
    if value.is_sign_negative() && !value.is_zero() {
        return None;
    }
    let bps = (value * Decimal::ONE_HUNDRED).trunc().to_u32()?;
    (bps <= MAX_BPS).then_some(bps)
}

/// Split normalized input into (whole digits, fractional digits).
///
/// Returns `None` when nothing numeric remains.
fn split_normalized(input: &str) -> Option<(String, String)> {
    let cleaned: String = input
        .trim()
        .chars()
        .filter(|c| !GROUPING_SEPARATORS.contains(c))
        .collect();

    if cleaned.is_empty() {
        return None;
    }
    if !cleaned.chars().all(|c| c.is_ascii_digit() || c == '.') {
        return None;
    }

    // At most one decimal point: "1.2.3" keeps "1.2"
    let mut parts = cleaned.split('.');
    let whole = parts.next().unwrap_or_default();
    let frac = parts.next().unwrap_or_default();

    if whole.is_empty() && frac.is_empty() {
        return None;
    }

    // ".5" is read as "0.5"
    let whole = if whole.is_empty() { "0" } else { whole };
    Some((whole.to_string(), frac.to_string()))
}

// ============================================================================
// Format: Base Units → Human
// ============================================================================

/// Convert a base-unit integer string back to a decimal string for display.
///
/// Trailing fractional zeros are trimmed ("1.50000000" → "1.5").
/// Returns `None` if `base_amount` is not a plain non-negative integer.
pub fn from_base_units(base_amount: &str, decimals: u32) -> Option<String> {
    if decimals > MAX_DECIMALS {
        return None;
    }
    let base_amount = base_amount.trim();
    if base_amount.is_empty() || !base_amount.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    let value = BigUint::parse_bytes(base_amount.as_bytes(), 10)?;
    let scale = BigUint::from(10u32).pow(decimals);
    let whole = &value / &scale;
    let frac = &value % &scale;

    if decimals == 0 || frac == BigUint::from(0u32) {
        return Some(whole.to_string());
    }

    let frac_digits = format!("{:0>width$}", frac.to_string(), width = decimals as usize);
    Some(format!("{}.{}", whole, frac_digits.trim_end_matches('0')))
}

/// `true` if a base-unit string is exactly zero.
pub fn is_zero_base_units(base_amount: &str) -> bool {
    base_amount.bytes().all(|b| b == b'0')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_base_units_basic() {
        assert_eq!(to_base_units("1.23", 2).as_deref(), Some("123"));
        assert_eq!(to_base_units("1.23", 8).as_deref(), Some("123000000"));
        assert_eq!(to_base_units("100", 0).as_deref(), Some("100"));
        assert_eq!(to_base_units("0.0001", 4).as_deref(), Some("1"));
        assert_eq!(to_base_units("001.50", 2).as_deref(), Some("150"));
    }

    #[test]
    fn test_to_base_units_normalization() {
        // Grouping separators
        assert_eq!(to_base_units("1,000.5", 1).as_deref(), Some("10005"));
        assert_eq!(to_base_units(" 1 000 ", 0).as_deref(), Some("1000"));

        // Implicit leading zero
        assert_eq!(to_base_units(".5", 9).as_deref(), Some("500000000"));

        // Trailing dot
        assert_eq!(to_base_units("5.", 2).as_deref(), Some("500"));

        // Extra decimal points collapse
        assert_eq!(to_base_units("1.2.3", 2).as_deref(), Some("120"));
    }

    #[test]
    fn test_to_base_units_truncates() {
        // Never rounds up
        assert_eq!(to_base_units("1.999", 2).as_deref(), Some("199"));
        assert_eq!(to_base_units("0.009", 2).as_deref(), Some("0"));
        assert_eq!(to_base_units("100.9", 0).as_deref(), Some("100"));
    }

    #[test]
    fn test_to_base_units_no_amount() {
        let cases = ["", "   ", ".", "abc", "1e5", "-1", "+1", "0x10", "1..a"];
        for case in cases {
            assert_eq!(to_base_units(case, 8), None, "expected no amount for {case:?}");
        }
        assert_eq!(to_base_units("1", MAX_DECIMALS + 1), None);
    }

    #[test]
    fn test_to_base_units_large_precision() {
        // Beyond u64 at 18 decimals
        assert_eq!(
            to_base_units("123456789.123456789123456789", 18).as_deref(),
            Some("123456789123456789123456789")
        );
    }

    #[test]
    fn test_from_base_units() {
        assert_eq!(from_base_units("150000000", 8).as_deref(), Some("1.5"));
        assert_eq!(from_base_units("1", 8).as_deref(), Some("0.00000001"));
        assert_eq!(from_base_units("0", 8).as_deref(), Some("0"));
        assert_eq!(from_base_units("100", 0).as_deref(), Some("100"));
        assert_eq!(from_base_units("1.5", 8), None);
        assert_eq!(from_base_units("", 8), None);
    }

    #[test]
    fn test_percent_to_bps() {
        assert_eq!(percent_to_bps("0.5"), Some(50));
        assert_eq!(percent_to_bps(" 1% "), Some(100));
        assert_eq!(percent_to_bps("0.123"), Some(12));
        assert_eq!(percent_to_bps("0"), Some(0));
        assert_eq!(percent_to_bps("100"), Some(MAX_BPS));

        assert_eq!(percent_to_bps("100.01"), None);
        assert_eq!(percent_to_bps("-0.5"), None);
        assert_eq!(percent_to_bps("half"), None);
        assert_eq!(percent_to_bps(""), None);
    }

    #[test]
    fn test_roundtrip_never_exceeds_input() {
        let values = ["1", "1.5", "0.00000001", "1234.5678", "999999.999999", ".333333333"];
        for decimals in [0u32, 2, 6, 9, 18] {
            for value in values {
                let base = to_base_units(value, decimals).unwrap();
                let back = from_base_units(&base, decimals).unwrap();
                let original = Decimal::from_str(&format!("0{value}")).unwrap();
                let round_tripped = Decimal::from_str(&back).unwrap();
                assert!(
                    round_tripped <= original,
                    "{value} at {decimals} became {back}"
                );
                let one_unit = Decimal::new(1, decimals);
                assert!(original - round_tripped < one_unit);
            }
        }
    }

    #[test]
    fn test_is_zero_base_units() {
        assert!(is_zero_base_units("0"));
        assert!(!is_zero_base_units("10"));
    }
}
