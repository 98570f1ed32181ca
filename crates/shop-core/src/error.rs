//! # Error Types
//!
//! Domain-specific error types for shop-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  shop-core errors (this file)                                          │
//! │  ├── CoreError        - Business rule rejections                       │
//! │  └── ValidationError  - Input validation failures                      │
//! │                                                                         │
//! │  shop-db errors (separate crate)                                       │
//! │  └── DbError          - Database failures, wraps CoreError rejections  │
//! │                                                                         │
//! │  shop-payment errors (separate crate)                                  │
//! │  └── PaymentError     - Gateway / strategy failures                    │
//! │                                                                         │
//! │  shop-checkout errors                                                  │
//! │  └── CheckoutError    - What the request layer sees (with a kind)      │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → DbError → CheckoutError           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Categories
//! - Client errors: `InvalidSelection`, `UnsupportedPaymentMethod`, `Validation`
//! - Conflicts: `InsufficientStock`, `CouponConflict`, `ShippingAddressRequired`,
//!   `InvalidOrderStatus`
//! - Not found: `OrderNotFound`, `ResourceNotFound`

use thiserror::Error;

// =============================================================================
// Core Error
// =============================================================================

/// Core business logic errors.
///
/// None of these are retried by the core itself; they are surfaced so a
/// human or UI can retry with updated state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    /// Requested variants are not (or no longer) in the shopper's cart.
    ///
    /// ## When This Occurs
    /// - Variant was never added to the cart
    /// - Cart line quantity dropped to zero
    /// - Variant was deleted from the catalog after it was added
    #[error("Invalid selection: variants {variant_ids:?} are not in the cart")]
    InvalidSelection { variant_ids: Vec<String> },

    /// Not enough stock to reserve a line.
    ///
    /// ## User Workflow
    /// ```text
    /// checkout() ── reserve(variant, 5)
    ///      │
    ///      ▼
    /// UPDATE ... WHERE stock >= 5  → 0 rows
    ///      │
    ///      ▼
    /// InsufficientStock { variant_id, requested: 5 }
    ///      │
    ///      ▼
    /// Whole checkout rolled back, UI asks shopper to adjust the cart
    /// ```
    #[error("Insufficient stock for variant {variant_id}: requested {requested}")]
    InsufficientStock { variant_id: String, requested: i64 },

    /// Coupon could not be applied: ineligible, exhausted, or a concurrent
    /// writer won the optimistic lock.
    #[error("Coupon {coupon_id} conflict: {reason}")]
    CouponConflict { coupon_id: String, reason: String },

    /// Checkout requires a shipping address that resolves for the shopper.
    #[error("Order {order_id} has no shipping address")]
    ShippingAddressRequired { order_id: String },

    /// No live order matches the request.
    #[error("Order not found: {0}")]
    OrderNotFound(String),

    /// Any other referenced entity is missing.
    #[error("{entity} not found: {id}")]
    ResourceNotFound { entity: String, id: String },

    /// Order is not in a state that allows the requested operation.
    #[error("Order {order_id} is {current_status}, cannot perform operation")]
    InvalidOrderStatus {
        order_id: String,
        current_status: String,
    },

    /// Unknown or administratively disabled payment method.
    #[error("Unsupported payment method: {0}")]
    UnsupportedPaymentMethod(String),

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

impl CoreError {
    /// Creates a ResourceNotFound error.
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        CoreError::ResourceNotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    /// Creates a CouponConflict error.
    pub fn coupon_conflict(coupon_id: impl Into<String>, reason: impl Into<String>) -> Self {
        CoreError::CouponConflict {
            coupon_id: coupon_id.into(),
            reason: reason.into(),
        }
    }
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// Used for early validation before business logic runs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Invalid format (e.g., invalid UUID, invalid date).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================
