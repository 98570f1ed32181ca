//! # Coupon Eligibility Rules
//!
//! Pure checks run against a freshly read [`Coupon`]. The coupon ledger in
//! `shop-db` repeats the same filter inside its version-checked `UPDATE`, so
//! a coupon that passes here but changes underneath us still loses the race
//! at the database.
//!
//! ## Rules
//! ```text
//! is_active                                  else Inactive
//! start_date <= today        (if present)    else NotStarted
//! today <= end_date          (if present)    else Expired
//! sub_total >= minimum_order                 else BelowMinimum
//! max_usage IS NULL OR times_used < max      else UsageCapReached
//! ```

use chrono::NaiveDate;
use std::fmt;

use crate::error::CoreError;
use crate::money::Money;
use crate::types::Coupon;

/// Why a coupon cannot be used right now.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ineligibility {
    Inactive,
    NotStarted { starts: NaiveDate },
    Expired { ended: NaiveDate },
    BelowMinimum { minimum: Money, sub_total: Money },
    UsageCapReached { max_usage: i64 },
}

impl fmt::Display for Ineligibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Ineligibility::Inactive => write!(f, "coupon is disabled"),
            Ineligibility::NotStarted { starts } => write!(f, "coupon is valid from {}", starts),
            Ineligibility::Expired { ended } => write!(f, "coupon expired on {}", ended),
            Ineligibility::BelowMinimum { minimum, sub_total } => write!(
                f,
                "order subtotal {} is below the minimum {}",
                sub_total, minimum
            ),
            Ineligibility::UsageCapReached { max_usage } => {
                write!(f, "usage cap of {} reached", max_usage)
            }
        }
    }
}

impl Ineligibility {
    /// Converts the rejection into the domain conflict for `coupon_id`.
    pub fn into_conflict(self, coupon_id: &str) -> CoreError {
        CoreError::coupon_conflict(coupon_id, self.to_string())
    }
}

/// Checks the active flag and the validity window only.
///
/// Used at checkout time: usage was already counted when the coupon was
/// applied, so capacity is not re-checked.
pub fn check_window(coupon: &Coupon, today: NaiveDate) -> Result<(), Ineligibility> {
    if !coupon.is_active {
        return Err(Ineligibility::Inactive);
    }
    if let Some(starts) = coupon.start_date {
        if today < starts {
            return Err(Ineligibility::NotStarted { starts });
        }
    }
    if let Some(ended) = coupon.end_date {
        if today > ended {
            return Err(Ineligibility::Expired { ended });
        }
    }
    Ok(())
}

/// Checks that `coupon` would still qualify for an order of `sub_total`,
/// ignoring capacity. A coupon already attached to an order owns its slot.
pub fn check_attached(
    coupon: &Coupon,
    sub_total: Money,
    today: NaiveDate,
) -> Result<(), Ineligibility> {
    check_window(coupon, today)?;
    if sub_total < coupon.minimum_order() {
        return Err(Ineligibility::BelowMinimum {
            minimum: coupon.minimum_order(),
            sub_total,
        });
    }
    Ok(())
}

/// Full eligibility check for attaching `coupon` to an order of `sub_total`.
///
/// ## Example
/// ```rust,ignore
/// check_eligibility(&coupon, order.sub_total(), Utc::now().date_naive())
///     .map_err(|why| why.into_conflict(&coupon.id))?;
/// ```
pub fn check_eligibility(
    coupon: &Coupon,
    sub_total: Money,
    today: NaiveDate,
) -> Result<(), Ineligibility> {
    check_attached(coupon, sub_total, today)?;
    if let Some(max_usage) = coupon.max_usage {
        if coupon.times_used >= max_usage {
            return Err(Ineligibility::UsageCapReached { max_usage });
        }
    }
    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================
