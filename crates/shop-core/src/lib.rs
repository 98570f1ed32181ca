//! # shop-core: Pure Business Logic for the Checkout Core
//!
//! This crate is the **heart** of the checkout core. It contains the domain
//! types and every rule that can be expressed without touching a database or
//! a payment gateway.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Checkout Core Architecture                          │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │              shop-checkout (Orchestration)                      │   │
//! │  │    materialize ──► apply_coupon ──► checkout ──► settlement     │   │
//! │  └──────────────┬──────────────────────────────┬───────────────────┘   │
//! │                 │                              │                        │
//! │  ┌──────────────▼──────────────┐  ┌────────────▼──────────────────┐    │
//! │  │   shop-db (SQLite ledgers)  │  │  shop-payment (strategies)    │    │
//! │  └──────────────┬──────────────┘  └────────────┬──────────────────┘    │
//! │                 │                              │                        │
//! │  ┌──────────────▼──────────────────────────────▼───────────────────┐   │
//! │  │               ★ shop-core (THIS CRATE) ★                        │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐  │   │
//! │  │   │   types   │  │   money   │  │ discount  │  │  coupon   │  │   │
//! │  │   │  Order    │  │   Money   │  │ final     │  │ eligibil- │  │   │
//! │  │   │  Variant  │  │  cents    │  │ total     │  │ ity rules │  │   │
//! │  │   └───────────┘  └───────────┘  └───────────┘  └───────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain entities (Variant, Order, OrderItem, Coupon, CartItem)
//! - [`money`] - Money type with integer arithmetic (no floating point!)
//! - [`discount`] - The discount calculator (`calc_final_total`)
//! - [`coupon`] - Coupon eligibility rules
//! - [`error`] - Domain error types
//! - [`validation`] - Input validation
//!
//! ## Example Usage
//!
//! ```rust
//! use shop_core::discount::{calc_final_total, DiscountLine};
//! use shop_core::money::Money;
//!
//! let lines = vec![DiscountLine::new("p-1", Money::from_cents(5000))];
//!
//! // No coupon attached: the final total is the subtotal.
//! let total = calc_final_total(Money::from_cents(5000), &lines, None);
//! assert_eq!(total.cents(), 5000);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod coupon;
pub mod discount;
pub mod error;
pub mod money;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{CoreError, CoreResult, ValidationError};
pub use money::Money;
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Maximum distinct lines a single order may be materialized with.
pub const MAX_ORDER_LINES: usize = 100;

/// Maximum quantity of a single variant on one order line.
pub const MAX_LINE_QUANTITY: i64 = 999;

/// Basis points in 100%.
pub const FULL_PERCENT_BPS: u32 = 10_000;
