//! # Discount Calculator
//!
//! Computes an order's final total from its lines and an optional coupon.
//!
//! ## Calculation
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  calc_final_total(sub_total, lines, coupon)                            │
//! │                                                                         │
//! │  no coupon        → sub_total                                          │
//! │                                                                         │
//! │  target = all     → off = rule(sub_total)                              │
//! │                                                                         │
//! │  target = single  → off = Σ rule(line_total)                           │
//! │                           for lines whose product ∈ eligible set       │
//! │                                                                         │
//! │  rule(x): percentage → x × bps / 10000 (half-up, whole cents)          │
//! │           fixed      → min(value, x)                                   │
//! │                                                                         │
//! │  off = min(off, maximum_discount)       (when the coupon has a cap)    │
//! │  final = max(sub_total - off, 0)                                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The eligible product set is resolved by the caller (category closure is a
//! database lookup); this module never mutates its inputs.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::money::Money;
use crate::types::{Coupon, CouponTarget, DiscountType, OrderItem};
use crate::FULL_PERCENT_BPS;

// =============================================================================
// Discount Rule
// =============================================================================

/// A coupon's discount rule, decoded from `discount_type` + `discount_value`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Discount {
    Percentage { bps: u32 },
    Fixed { amount: Money },
}

impl Discount {
    /// Decodes the rule stored on a coupon.
    pub fn of(coupon: &Coupon) -> Self {
        match coupon.discount_type {
            DiscountType::Percentage => Discount::Percentage {
                bps: coupon.discount_value.clamp(0, FULL_PERCENT_BPS as i64) as u32,
            },
            DiscountType::Fixed => Discount::Fixed {
                amount: Money::from_cents(coupon.discount_value.max(0)),
            },
        }
    }

    /// Amount taken off `base`; never more than `base`, never negative.
    pub fn amount_off(&self, base: Money) -> Money {
        if base.is_negative() || base.is_zero() {
            return Money::zero();
        }
        match self {
            Discount::Percentage { bps } => base.percentage(*bps).min(base),
            Discount::Fixed { amount } => (*amount).min(base),
        }
    }
}

// =============================================================================
// Inputs
// =============================================================================

/// The part of an order line the calculator needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscountLine {
    pub product_id: String,
    pub line_total: Money,
}

impl DiscountLine {
    pub fn new(product_id: impl Into<String>, line_total: Money) -> Self {
        DiscountLine {
            product_id: product_id.into(),
            line_total,
        }
    }
}

impl From<&OrderItem> for DiscountLine {
    fn from(item: &OrderItem) -> Self {
        DiscountLine::new(item.product_id.clone(), item.line_total())
    }
}

/// Builds calculator lines from order items.
pub fn lines_of(items: &[OrderItem]) -> Vec<DiscountLine> {
    items.iter().map(DiscountLine::from).collect()
}

/// A coupon together with its resolved product scope.
///
/// `eligible_products` is the union of the coupon's directly associated
/// products and every product under its associated categories. It is ignored
/// for `target = all`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScopedCoupon {
    pub coupon: Coupon,
    pub eligible_products: HashSet<String>,
}

impl ScopedCoupon {
    /// Creates a coupon scope.
    pub fn new(coupon: Coupon, eligible_products: HashSet<String>) -> Self {
        ScopedCoupon {
            coupon,
            eligible_products,
        }
    }

    /// Creates an unscoped (`target = all`) view of a coupon.
    pub fn whole_order(coupon: Coupon) -> Self {
        ScopedCoupon::new(coupon, HashSet::new())
    }
}

// =============================================================================
// Calculator
// =============================================================================

/// Total discount `coupon` grants on an order.
pub fn discount_amount(sub_total: Money, lines: &[DiscountLine], coupon: &ScopedCoupon) -> Money {
    let rule = Discount::of(&coupon.coupon);

    let off = match coupon.coupon.target {
        CouponTarget::All => rule.amount_off(sub_total),
        CouponTarget::Single => lines
            .iter()
            .filter(|line| coupon.eligible_products.contains(&line.product_id))
            .map(|line| rule.amount_off(line.line_total))
            .sum(),
    };

    match coupon.coupon.maximum_discount() {
        Some(cap) => off.min(cap.clamp_non_negative()),
        None => off,
    }
}

/// Computes the final total of an order.
///
/// ## Examples
/// ```rust,ignore
/// // subtotal $50.00, whole-order 10% coupon → $45.00
/// let total = calc_final_total(Money::from_cents(5000), &lines, Some(&scoped));
/// assert_eq!(total.cents(), 4500);
/// ```
pub fn calc_final_total(
    sub_total: Money,
    lines: &[DiscountLine],
    coupon: Option<&ScopedCoupon>,
) -> Money {
    match coupon {
        None => sub_total,
        Some(scoped) => (sub_total - discount_amount(sub_total, lines, scoped)).clamp_non_negative(),
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
