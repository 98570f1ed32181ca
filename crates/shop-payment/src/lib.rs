//! # shop-payment: Payment Strategies for the Checkout Core
//!
//! Turns a chosen payment method into a payment session, and a provider
//! callback back into "this order was paid / was not paid".
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  shop-checkout                                                          │
//! │     checkout ──► registry.select(method) ──► strategy.create_session   │
//! │     settlement ─► registry.strategy_for(kind) ─► verify / resolve /    │
//! │                                                    outcome              │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                   shop-payment (THIS CRATE)                     │   │
//! │  │                                                                 │   │
//! │  │   PaymentRegistry ──► PaymentStrategy ──► dyn PaymentGateway   │   │
//! │  │                       CashOnDelivery      MomoGateway           │   │
//! │  │                       WalletRedirect      StripeGateway         │   │
//! │  │                       CardRedirect                              │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  Provider HTTPS APIs (reqwest, HMAC-SHA256 signed)                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`strategy`] - The closed set of payment strategies
//! - [`registry`] - Method name to strategy lookup
//! - [`gateway`] - Provider clients behind the [`PaymentGateway`] trait
//! - [`notification`] - Inbound provider callbacks
//! - [`error`] - Payment error types

pub mod error;
pub mod gateway;
pub mod notification;
pub mod registry;
pub mod strategy;

pub use error::{PaymentError, PaymentResult};
pub use gateway::{
    MomoConfig, MomoGateway, PaymentGateway, PaymentSession, SessionRequest, StripeConfig,
    StripeGateway,
};
pub use notification::{NotificationOutcome, NotificationTarget, PaymentNotification};
pub use registry::PaymentRegistry;
pub use strategy::PaymentStrategy;
