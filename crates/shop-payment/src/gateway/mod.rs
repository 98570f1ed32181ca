//! # Payment Gateways
//!
//! The seam between the checkout core and a redirect-style payment provider.
//!
//! ## Redirect Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  checkout                    gateway                    provider        │
//! │     │  create_session(req)      │                          │            │
//! │     │─────────────────────────► │  signed POST ──────────► │            │
//! │     │  PaymentSession{url,ref}  │ ◄────────── payUrl / url │            │
//! │     │ ◄──────────────────────── │                          │            │
//! │                                                                         │
//! │  settlement                                                             │
//! │     │  verify_notification      │ ◄──── IPN / webhook ──── │            │
//! │     │  lookup_target            │  (may call back out)     │            │
//! │     │  interpret ──► Succeeded | Failed | Pending          │            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! - [`momo`] - E-wallet redirect (MoMo-like)
//! - [`stripe`] - Hosted card page (Stripe-like)

pub mod momo;
pub mod stripe;

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use shop_core::{Money, Order};

use crate::error::{PaymentError, PaymentResult};
use crate::notification::{NotificationOutcome, NotificationTarget, PaymentNotification};

pub use momo::{MomoConfig, MomoGateway};
pub use stripe::{StripeConfig, StripeGateway};

// =============================================================================
// Session Types
// =============================================================================

/// What a gateway needs to open a payment session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRequest {
    pub order_id: String,
    pub user_id: String,
    pub amount: Money,
    pub description: String,
}

impl SessionRequest {
    /// Session for an order's current final total.
    pub fn for_order(order: &Order) -> Self {
        Self {
            order_id: order.id.clone(),
            user_id: order.user_id.clone(),
            amount: order.final_total(),
            description: format!("Order {}", order.id),
        }
    }
}

/// An opened payment session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PaymentSession {
    /// Where to send the shopper; absent for methods without a redirect.
    pub payment_url: Option<String>,
    /// Provider-side id used to correlate callbacks.
    pub provider_reference: Option<String>,
}

impl PaymentSession {
    pub fn redirect(url: impl Into<String>, reference: impl Into<String>) -> Self {
        Self {
            payment_url: Some(url.into()),
            provider_reference: Some(reference.into()),
        }
    }
}

// =============================================================================
// Gateway Trait
// =============================================================================

/// A redirect payment provider.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Short provider name used in logs and errors.
    fn name(&self) -> &str;

    /// Opens a session and returns the redirect URL.
    async fn create_session(&self, request: &SessionRequest) -> PaymentResult<PaymentSession>;

    /// Checks the notification's signature against the shared secret.
    fn verify_notification(&self, notification: &PaymentNotification) -> PaymentResult<()>;

    /// Maps a verified notification back to the order it settles and the
    /// session it was raised for.
    ///
    /// An empty target means the notification does not concern an order.
    async fn lookup_target(
        &self,
        notification: &PaymentNotification,
    ) -> PaymentResult<NotificationTarget>;

    /// Reads the payment outcome out of a verified notification.
    fn interpret(&self, notification: &PaymentNotification) -> NotificationOutcome;
}

// =============================================================================
// HMAC-SHA256 Helpers
// =============================================================================

type HmacSha256 = Hmac<Sha256>;

fn keyed(secret: &str) -> PaymentResult<HmacSha256> {
    HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| PaymentError::InvalidSignature("unusable signing key".to_string()))
}

/// Lower-case hex HMAC-SHA256 of `message`.
pub(crate) fn sign_hex(secret: &str, message: &str) -> PaymentResult<String> {
    let mut mac = keyed(secret)?;
    mac.update(message.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Constant-time check of a hex signature over `message`.
pub(crate) fn verify_hex(secret: &str, message: &str, signature: &str) -> PaymentResult<()> {
    let expected = hex::decode(signature)
        .map_err(|_| PaymentError::InvalidSignature("signature is not hex".to_string()))?;
    let mut mac = keyed(secret)?;
    mac.update(message.as_bytes());
    mac.verify_slice(&expected)
        .map_err(|_| PaymentError::InvalidSignature("signature mismatch".to_string()))
}

/// Maps a transport error, turning client timeouts into [`PaymentError::Timeout`].
pub(crate) fn transport_error(provider: &str, err: reqwest::Error, after_secs: u64) -> PaymentError {
    if err.is_timeout() {
        PaymentError::Timeout {
            provider: provider.to_string(),
            after_secs,
        }
    } else {
        PaymentError::Http(err)
    }
}

// =============================================================================
// Loopback Provider (tests)
// =============================================================================


#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use shop_core::OrderStatus;

    #[test]
    fn test_sign_and_verify_round() {
        let sig = sign_hex("secret", "a=1&b=2").unwrap();
        assert_eq!(sig.len(), 64);
        assert!(verify_hex("secret", "a=1&b=2", &sig).is_ok());
        assert!(matches!(
            verify_hex("other", "a=1&b=2", &sig),
            Err(PaymentError::InvalidSignature(_))
        ));
        assert!(matches!(
            verify_hex("secret", "a=1&b=2", "zz"),
            Err(PaymentError::InvalidSignature(_))
        ));
    }

    #[test]
    fn test_known_hmac_vector() {
        // RFC 4231 test case 2
        let sig = sign_hex("Jefe", "what do ya want for nothing?").unwrap();
        assert_eq!(
            sig,
            "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
    }

    #[test]
    fn test_session_request_uses_final_total() {
        let now = Utc::now();
        let order = Order {
            id: "o-1".into(),
            user_id: "u-1".into(),
            status: OrderStatus::Pending,
            sub_total_cents: 5000,
            final_total_cents: 4500,
            payment_method: None,
            coupon_id: Some("c-1".into()),
            shipping_address_id: None,
            message: None,
            payment_reference: None,
            deleted_at: None,
            created_at: now,
            updated_at: now,
        };
        let req = SessionRequest::for_order(&order);
        assert_eq!(req.amount.cents(), 4500);
        assert_eq!(req.order_id, "o-1");
        assert_eq!(req.user_id, "u-1");
    }
}
