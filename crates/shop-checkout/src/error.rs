//! # Checkout Error Type
//!
//! One error type for every operation the storefront calls, with a coarse
//! [`ErrorKind`] the caller can map onto its own transport.
//!
//! ## Error Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  CoreError ─────────────────────────┐                                   │
//! │  DbError::Rejected(CoreError) ──────┼──► CheckoutError::Rejected        │
//! │  DbError::NotFound ─────────────────┤        kind() = Client | Conflict │
//! │  DbError::VersionConflict (coupon) ─┘                     | NotFound    │
//! │  PaymentError::UnsupportedMethod ───────► Rejected(UnsupportedPayment..)│
//! │  PaymentError (provider side) ──────────► PaymentProvider  Unavailable  │
//! │  DbError (anything else) ───────────────► Database          Internal   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use shop_core::CoreError;
use shop_db::DbError;
use shop_payment::PaymentError;
use thiserror::Error;

use crate::config::ConfigError;

/// Coarse classification for callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The request itself is wrong; retrying it unchanged will not help.
    Client,
    /// The request collided with current state (stock, coupon, order status).
    Conflict,
    NotFound,
    /// A payment provider failed or timed out. Nothing was committed.
    Unavailable,
    Internal,
}

/// Errors returned by [`CheckoutService`](crate::CheckoutService).
#[derive(Debug, Error)]
pub enum CheckoutError {
    /// A business rule rejected the request; nothing was written.
    #[error(transparent)]
    Rejected(CoreError),

    /// Payment session could not be created; the checkout was rolled back.
    #[error("Payment provider failure: {0}")]
    PaymentProvider(PaymentError),

    #[error("Database error: {0}")]
    Database(DbError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl CheckoutError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CheckoutError::Rejected(err) => match err {
                CoreError::InvalidSelection { .. }
                | CoreError::UnsupportedPaymentMethod(_)
                | CoreError::Validation(_) => ErrorKind::Client,
                CoreError::InsufficientStock { .. }
                | CoreError::CouponConflict { .. }
                | CoreError::ShippingAddressRequired { .. }
                | CoreError::InvalidOrderStatus { .. } => ErrorKind::Conflict,
                CoreError::OrderNotFound(_) | CoreError::ResourceNotFound { .. } => {
                    ErrorKind::NotFound
                }
            },
            CheckoutError::PaymentProvider(_) => ErrorKind::Unavailable,
            CheckoutError::Database(DbError::Busy(_) | DbError::VersionConflict { .. }) => {
                ErrorKind::Conflict
            }
            CheckoutError::Database(_) | CheckoutError::Config(_) => ErrorKind::Internal,
        }
    }

    /// The business rejection, if this is one.
    pub fn as_rejection(&self) -> Option<&CoreError> {
        match self {
            CheckoutError::Rejected(err) => Some(err),
            _ => None,
        }
    }
}

impl From<CoreError> for CheckoutError {
    fn from(err: CoreError) -> Self {
        CheckoutError::Rejected(err)
    }
}

impl From<DbError> for CheckoutError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::Rejected(core) => CheckoutError::Rejected(core),
            DbError::NotFound { entity, id } => {
                CheckoutError::Rejected(CoreError::ResourceNotFound { entity, id })
            }
            DbError::VersionConflict { entity, id } if entity == "Coupon" => {
                CheckoutError::Rejected(CoreError::coupon_conflict(id, "coupon changed concurrently"))
            }
            other => CheckoutError::Database(other),
        }
    }
}

impl From<PaymentError> for CheckoutError {
    fn from(err: PaymentError) -> Self {
        match err {
            PaymentError::UnsupportedMethod(method) => {
                CheckoutError::Rejected(CoreError::UnsupportedPaymentMethod(method))
            }
            other => CheckoutError::PaymentProvider(other),
        }
    }
}

/// Result type for checkout operations.
pub type CheckoutResult<T> = Result<T, CheckoutError>;

#[cfg(test)]
mod tests {
    use super::*;
    use shop_core::ValidationError;

    #[test]
    fn test_kinds() {
        let stock: CheckoutError = CoreError::InsufficientStock {
            variant_id: "v-1".into(),
            requested: 2,
        }
        .into();
        assert_eq!(stock.kind(), ErrorKind::Conflict);

        let selection: CheckoutError = CoreError::InvalidSelection {
            variant_ids: vec!["v-9".into()],
        }
        .into();
        assert_eq!(selection.kind(), ErrorKind::Client);

        let missing: CheckoutError = CoreError::OrderNotFound("o-1".into()).into();
        assert_eq!(missing.kind(), ErrorKind::NotFound);

        let validation: CheckoutError =
            CoreError::Validation(ValidationError::Required { field: "code".into() }).into();
        assert_eq!(validation.kind(), ErrorKind::Client);
    }

    #[test]
    fn test_db_rejection_unwrapped() {
        let err: CheckoutError =
            DbError::Rejected(CoreError::coupon_conflict("c-1", "exhausted")).into();
        assert!(matches!(
            err.as_rejection(),
            Some(CoreError::CouponConflict { .. })
        ));

        let err: CheckoutError = DbError::not_found("Variant", "v-1").into();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let err: CheckoutError = DbError::version_conflict("Coupon", "c-1").into();
        assert!(matches!(
            err.as_rejection(),
            Some(CoreError::CouponConflict { coupon_id, .. }) if coupon_id == "c-1"
        ));

        let err: CheckoutError = DbError::Busy("database is locked".into()).into();
        assert_eq!(err.kind(), ErrorKind::Conflict);

        let err: CheckoutError = DbError::QueryFailed("syntax".into()).into();
        assert_eq!(err.kind(), ErrorKind::Internal);
    }

    #[test]
    fn test_payment_errors() {
        let err: CheckoutError = PaymentError::UnsupportedMethod("bitcoin".into()).into();
        assert_eq!(err.kind(), ErrorKind::Client);
        assert!(matches!(
            err.as_rejection(),
            Some(CoreError::UnsupportedPaymentMethod(_))
        ));

        let err: CheckoutError = PaymentError::provider("momo", "resultCode 99").into();
        assert_eq!(err.kind(), ErrorKind::Unavailable);
    }
}
