//! Cart aggregates.

use rust_decimal::Decimal;
use serde::Serialize;
use yoraa_core::{LineItem, round_cents};

/// Tax and shipping rules applied to cart totals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PricingPolicy {
    /// Fraction of the subtotal charged as tax (0.10 = 10%).
    pub tax_rate: Decimal,
    /// Subtotals strictly above this ship free.
    pub free_shipping_threshold: Decimal,
    /// Flat shipping fee below the threshold.
    pub shipping_fee: Decimal,
}

impl Default for PricingPolicy {
    fn default() -> Self {
        Self {
            tax_rate: Decimal::new(10, 2),
            free_shipping_threshold: Decimal::from(500),
            shipping_fee: Decimal::from(50),
        }
    }
}

impl PricingPolicy {
    /// Compute rounded cart totals for a set of items.
    ///
    /// An empty cart has all-zero totals, including shipping. Returns `None`
    /// when an intermediate amount does not fit in a `Decimal`.
    #[must_use]
    pub fn totals(&self, items: &[LineItem]) -> Option<Totals> {
        if items.is_empty() {
            return Some(Totals::zero());
        }

        let subtotal = items
            .iter()
            .try_fold(Decimal::ZERO, |acc, item| acc.checked_add(item.line_total()?))?;
        self.totals_for_subtotal(subtotal)
    }

    /// Totals for an unrounded subtotal.
    pub(super) fn totals_for_subtotal(&self, subtotal: Decimal) -> Option<Totals> {
        let subtotal = round_cents(subtotal);
        let tax = round_cents(subtotal.checked_mul(self.tax_rate)?);
        let shipping = if subtotal > self.free_shipping_threshold {
            round_cents(Decimal::ZERO)
        } else {
            round_cents(self.shipping_fee)
        };
        let total = round_cents(subtotal.checked_add(tax)?.checked_add(shipping)?);

        Some(Totals {
            subtotal,
            tax,
            shipping,
            total,
        })
    }
}

/// Monetary aggregates of a cart, each rounded to two decimal places.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Totals {
    pub subtotal: Decimal,
    pub tax: Decimal,
    pub shipping: Decimal,
    pub total: Decimal,
}

impl Totals {
    /// All-zero totals.
    #[must_use]
    pub fn zero() -> Self {
        let zero = round_cents(Decimal::ZERO);
        Self {
            subtotal: zero,
            tax: zero,
            shipping: zero,
            total: zero,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::Utc;
    use yoraa_core::LineItemDraft;

    use super::*;

    fn item(price: i64, quantity: u32) -> LineItem {
        LineItemDraft::new("A", Decimal::from(price))
            .with_quantity(quantity)
            .into_line_item(Utc::now())
    }

    #[test]
    fn test_free_shipping_above_threshold() {
        let totals = PricingPolicy::default().totals(&[item(600, 1)]).unwrap();
        assert_eq!(totals.subtotal.to_string(), "600.00");
        assert_eq!(totals.tax.to_string(), "60.00");
        assert_eq!(totals.shipping.to_string(), "0.00");
        assert_eq!(totals.total.to_string(), "660.00");
    }

    #[test]
    fn test_flat_shipping_below_threshold() {
        let totals = PricingPolicy::default().totals(&[item(100, 2)]).unwrap();
        assert_eq!(totals.subtotal.to_string(), "200.00");
        assert_eq!(totals.tax.to_string(), "20.00");
        assert_eq!(totals.shipping.to_string(), "50.00");
        assert_eq!(totals.total.to_string(), "270.00");
    }

    #[test]
    fn test_threshold_is_exclusive() {
        let totals = PricingPolicy::default().totals(&[item(500, 1)]).unwrap();
        assert_eq!(totals.shipping, Decimal::from(50));
    }

    #[test]
    fn test_empty_cart_is_zero() {
        assert_eq!(PricingPolicy::default().totals(&[]), Some(Totals::zero()));
    }

    #[test]
    fn test_fractional_tax_rounds() {
        let policy = PricingPolicy::default();
        let priced = LineItemDraft::new("B", Decimal::new(1999, 2)).into_line_item(Utc::now());
        let totals = policy.totals(&[priced]).unwrap();
        assert_eq!(totals.tax.to_string(), "2.00");
        assert_eq!(totals.total.to_string(), "71.99");
    }

    #[test]
    fn test_overflowing_amounts_yield_none() {
        let policy = PricingPolicy::default();
        let huge = LineItemDraft::new("A", Decimal::from_i128_with_scale(10_i128.pow(25), 0))
            .with_quantity(100_000)
            .into_line_item(Utc::now());
        assert_eq!(policy.totals(&[huge]), None);

        let max = LineItemDraft::new("B", Decimal::MAX).into_line_item(Utc::now());
        assert_eq!(policy.totals(&[max.clone(), max]), None);
    }
}
