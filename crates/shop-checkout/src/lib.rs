//! # shop-checkout: Checkout Orchestration
//!
//! The operations a storefront calls: build the pending order, price it,
//! place it, and settle the payment.
//!
//! ## Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  cart lines ──materialize──► pending ──apply_coupon──► pending (priced)│
//! │                                 │                                       │
//! │                              checkout                                   │
//! │                    ┌────────────┴─────────────┐                         │
//! │                    ▼ COD                      ▼ wallet / card           │
//! │               processing ◄──── settled ── awaiting_payment              │
//! │                    │                          │                         │
//! │                 shipped                  failed ──► cancelled           │
//! │                    │                           (stock released)         │
//! │                delivered                                                │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`checkout`] - [`CheckoutService`], the facade and checkout transaction
//! - [`settlement`] - [`SettlementReconciler`] for provider callbacks
//! - [`retry`] - Bounded retry on optimistic-lock conflicts
//! - [`config`] - Environment / TOML configuration
//! - [`telemetry`] - Tracing subscriber setup
//! - [`error`] - [`CheckoutError`] and its [`ErrorKind`]
//!
//! ## Usage
//! ```rust,ignore
//! shop_checkout::telemetry::init_tracing();
//! let service = CheckoutService::from_config(&CheckoutConfig::load()?).await?;
//!
//! let pending = service.materialize("user-1", &selection).await?;
//! service.apply_coupon_code(&pending.order.id, "WELCOME10").await?;
//! let placed = service.checkout("user-1", "card_redirect").await?;
//! // redirect the shopper to placed.payment_url
//! ```

pub mod checkout;
pub mod config;
pub mod error;
pub mod retry;
pub mod settlement;
pub mod telemetry;

pub use checkout::{CheckoutOutcome, CheckoutService};
pub use config::{CheckoutConfig, ConfigError};
pub use error::{CheckoutError, CheckoutResult, ErrorKind};
pub use retry::retry_on_conflict;
pub use settlement::{SettlementOutcome, SettlementReconciler};
