//! Decimal money helpers.
//!
//! All monetary aggregates are carried as [`Decimal`] and rounded to whole
//! cents. Rounding is half away from zero, which for the non-negative
//! amounts used here matches the usual "round half up" shop arithmetic.

use rust_decimal::{Decimal, RoundingStrategy};

/// Number of fractional digits kept on monetary amounts.
pub const MONEY_SCALE: u32 = 2;

/// Round an amount to two decimal places.
///
/// # Example
///
/// ```rust
/// use rust_decimal::Decimal;
/// use yoraa_core::round_cents;
///
/// assert_eq!(round_cents(Decimal::new(12345, 3)), Decimal::new(1235, 2));
/// ```
#[must_use]
pub fn round_cents(amount: Decimal) -> Decimal {
    let mut rounded =
        amount.round_dp_with_strategy(MONEY_SCALE, RoundingStrategy::MidpointAwayFromZero);
    // Keep a fixed scale so "600" and "600.00" render identically.
    rounded.rescale(MONEY_SCALE);
    rounded
}

/// Format an amount with exactly two decimal places (e.g. `"660.00"`).
#[must_use]
pub fn format_money(amount: Decimal) -> String {
    round_cents(amount).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_cents_midpoint() {
        assert_eq!(round_cents(Decimal::new(1005, 3)), Decimal::new(101, 2));
        assert_eq!(round_cents(Decimal::new(1004, 3)), Decimal::new(100, 2));
    }

    #[test]
    fn test_round_cents_keeps_scale() {
        let rounded = round_cents(Decimal::from(600));
        assert_eq!(rounded.scale(), 2);
        assert_eq!(rounded.to_string(), "600.00");
    }

    #[test]
    fn test_format_money() {
        assert_eq!(format_money(Decimal::new(2705, 1)), "270.50");
        assert_eq!(format_money(Decimal::ZERO), "0.00");
    }
}
