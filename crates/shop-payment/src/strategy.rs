//! # Payment Strategy
//!
//! The closed set of ways an order can be paid for. Cash on delivery needs no
//! provider; the redirect methods delegate to a [`PaymentGateway`].
//!
//! ```text
//! ┌──────────────────┬────────────────────┬─────────────────────────────┐
//! │ Strategy         │ After checkout     │ Session                     │
//! ├──────────────────┼────────────────────┼─────────────────────────────┤
//! │ CashOnDelivery   │ processing         │ no URL, no reference        │
//! │ WalletRedirect   │ awaiting_payment   │ payUrl + MoMo requestId     │
//! │ CardRedirect     │ awaiting_payment   │ url + Stripe session id     │
//! └──────────────────┴────────────────────┴─────────────────────────────┘
//! ```

use std::fmt;
use std::sync::Arc;

use shop_core::{Order, OrderStatus, PaymentMethod};

use crate::error::{PaymentError, PaymentResult};
use crate::gateway::{PaymentGateway, PaymentSession, SessionRequest};
use crate::notification::{NotificationOutcome, NotificationTarget, PaymentNotification};

/// A payment method bound to whatever it needs to take the money.
#[derive(Clone)]
pub enum PaymentStrategy {
    CashOnDelivery,
    WalletRedirect(Arc<dyn PaymentGateway>),
    CardRedirect(Arc<dyn PaymentGateway>),
}

impl PaymentStrategy {
    pub fn method(&self) -> PaymentMethod {
        match self {
            PaymentStrategy::CashOnDelivery => PaymentMethod::CashOnDelivery,
            PaymentStrategy::WalletRedirect(_) => PaymentMethod::WalletRedirect,
            PaymentStrategy::CardRedirect(_) => PaymentMethod::CardRedirect,
        }
    }

    fn gateway(&self) -> Option<&Arc<dyn PaymentGateway>> {
        match self {
            PaymentStrategy::CashOnDelivery => None,
            PaymentStrategy::WalletRedirect(g) | PaymentStrategy::CardRedirect(g) => Some(g),
        }
    }

    /// True when the order is considered paid as soon as checkout commits.
    pub fn settles_immediately(&self) -> bool {
        matches!(self, PaymentStrategy::CashOnDelivery)
    }

    /// Status an order moves to when checkout commits with this strategy.
    pub fn status_after_checkout(&self) -> OrderStatus {
        if self.settles_immediately() {
            OrderStatus::Processing
        } else {
            OrderStatus::AwaitingPayment
        }
    }

    /// Opens a session for the order's final total.
    pub async fn create_payment_session(&self, order: &Order) -> PaymentResult<PaymentSession> {
        match self.gateway() {
            None => Ok(PaymentSession::default()),
            Some(gateway) => gateway.create_session(&SessionRequest::for_order(order)).await,
        }
    }

    /// Signature check. Cash on delivery never receives callbacks.
    pub fn verify(&self, notification: &PaymentNotification) -> PaymentResult<()> {
        match self.gateway() {
            None => Err(PaymentError::UnsupportedMethod(format!(
                "{} has no notifications",
                self.method()
            ))),
            Some(gateway) => gateway.verify_notification(notification),
        }
    }

    /// Order and provider session a notification concerns.
    pub async fn resolve_target(
        &self,
        notification: &PaymentNotification,
    ) -> PaymentResult<NotificationTarget> {
        match self.gateway() {
            None => Ok(NotificationTarget::default()),
            Some(gateway) => gateway.lookup_target(notification).await,
        }
    }

    pub fn outcome(&self, notification: &PaymentNotification) -> NotificationOutcome {
        match self.gateway() {
            None => NotificationOutcome::Pending,
            Some(gateway) => gateway.interpret(notification),
        }
    }
}

impl fmt::Debug for PaymentStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.gateway() {
            None => write!(f, "PaymentStrategy({})", self.method()),
            Some(gateway) => write!(f, "PaymentStrategy({} via {})", self.method(), gateway.name()),
        }
    }
}
