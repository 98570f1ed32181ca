//! # Payment Notifications
//!
//! An inbound callback from a provider (MoMo IPN, Stripe webhook) as the
//! HTTP layer hands it over: the raw body, its parsed JSON, and the
//! signature header when the provider sends one outside the body.

use serde_json::Value;

use crate::error::{PaymentError, PaymentResult};

/// A provider callback, not yet trusted.
#[derive(Debug, Clone)]
pub struct PaymentNotification {
    /// Exact bytes received; Stripe signs these, not the parsed form.
    pub body: String,
    /// Parsed body.
    pub payload: Value,
    /// Out-of-band signature (`Stripe-Signature` header).
    pub signature: Option<String>,
}

impl PaymentNotification {
    /// Parses a raw callback body.
    pub fn from_body(body: impl Into<String>, signature: Option<String>) -> PaymentResult<Self> {
        let body = body.into();
        let payload: Value = serde_json::from_str(&body)
            .map_err(|e| PaymentError::MalformedNotification(e.to_string()))?;
        if !payload.is_object() {
            return Err(PaymentError::MalformedNotification(
                "body is not a JSON object".to_string(),
            ));
        }
        Ok(Self {
            body,
            payload,
            signature,
        })
    }

    /// String field at the top level of the payload.
    pub fn str_field(&self, key: &str) -> Option<&str> {
        self.payload.get(key).and_then(Value::as_str)
    }

    /// Field at a `/`-separated JSON pointer, rendered as text.
    ///
    /// Numbers are rendered without quotes so they can be fed into a
    /// canonical signature string.
    pub fn text_at(&self, pointer: &str) -> Option<String> {
        match self.payload.pointer(pointer)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }
}

/// What a verified notification says about the payment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationOutcome {
    Succeeded,
    Failed { reason: String },
    /// Informational event; nothing to settle yet.
    Pending,
}

/// What a verified notification is about.
///
/// `reference` is the provider id of the session the callback was raised
/// for (MoMo `requestId`, Stripe checkout session id). It is compared with
/// the reference stored on the order at checkout, so callbacks from an
/// earlier, abandoned session never touch the order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NotificationTarget {
    pub order_id: Option<String>,
    pub reference: Option<String>,
}

impl NotificationTarget {
    pub fn new(order_id: Option<String>, reference: Option<String>) -> Self {
        Self {
            order_id: order_id.filter(|id| !id.is_empty()),
            reference: reference.filter(|r| !r.is_empty()),
        }
    }

    /// Neither an order nor a session to look it up by.
    pub fn is_unresolved(&self) -> bool {
        self.order_id.is_none() && self.reference.is_none()
    }

    /// True when the callback was raised for a session other than
    /// `expected`. A callback without a reference cannot be told apart and
    /// is not stale.
    pub fn is_stale_for(&self, expected: Option<&str>) -> bool {
        match (self.reference.as_deref(), expected) {
            (Some(got), Some(expected)) => got != expected,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_staleness() {
        let target = NotificationTarget::new(Some("o-1".into()), Some("cs_old".into()));
        assert!(target.is_stale_for(Some("cs_live")));
        assert!(!target.is_stale_for(Some("cs_old")));
        assert!(!target.is_stale_for(None));

        let blank = NotificationTarget::new(Some(String::new()), None);
        assert!(blank.is_unresolved());
        assert!(!blank.is_stale_for(Some("cs_live")));
    }

    #[test]
    fn test_from_body_parses_object() {
        let n = PaymentNotification::from_body(r#"{"orderId":"o-1","resultCode":0}"#, None).unwrap();
        assert_eq!(n.str_field("orderId"), Some("o-1"));
        assert_eq!(n.text_at("/resultCode").as_deref(), Some("0"));
        assert!(n.signature.is_none());
    }

    #[test]
    fn test_from_body_rejects_garbage() {
        assert!(matches!(
            PaymentNotification::from_body("not json", None),
            Err(PaymentError::MalformedNotification(_))
        ));
        assert!(matches!(
            PaymentNotification::from_body("[1,2]", None),
            Err(PaymentError::MalformedNotification(_))
        ));
    }

    #[test]
    fn test_text_at_nested_pointer() {
        let n = PaymentNotification::from_body(
            r#"{"data":{"object":{"metadata":{"order_id":"o-9"}}}}"#,
            Some("t=1,v1=ab".into()),
        )
        .unwrap();
        assert_eq!(
            n.text_at("/data/object/metadata/order_id").as_deref(),
            Some("o-9")
        );
        assert_eq!(n.text_at("/data/missing"), None);
    }
}
