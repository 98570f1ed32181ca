//! # Stripe Checkout Gateway
//!
//! Hosted card page via the REST API (no SDK): a form POST to
//! `/v1/checkout/sessions` with basic auth returns the page `url`; results
//! arrive as webhooks signed in the `Stripe-Signature` header.
//!
//! ## Webhook Events
//! | Event                                  | Outcome   |
//! |----------------------------------------|-----------|
//! | `checkout.session.completed`           | Succeeded |
//! | `checkout.session.expired`             | Failed    |
//! | `checkout.session.async_payment_failed`| Failed    |
//! | `payment_intent.payment_failed`        | Failed    |
//! | anything else                          | Pending   |

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use super::{transport_error, verify_hex, PaymentGateway, PaymentSession, SessionRequest};
use crate::error::{PaymentError, PaymentResult};
use crate::notification::{NotificationOutcome, NotificationTarget, PaymentNotification};

const PROVIDER: &str = "stripe";

// =============================================================================
// Configuration
// =============================================================================

fn default_api_base() -> String {
    "https://api.stripe.com".to_string()
}

fn default_currency() -> String {
    "usd".to_string()
}

fn default_tolerance_secs() -> i64 {
    300
}

fn default_timeout_secs() -> u64 {
    15
}

/// API keys and redirect targets.
#[derive(Clone, Serialize, Deserialize)]
pub struct StripeConfig {
    pub secret_key: String,
    /// `whsec_...` signing secret of the webhook endpoint.
    pub webhook_secret: String,
    #[serde(default = "default_api_base")]
    pub api_base: String,
    pub success_url: String,
    pub cancel_url: String,
    #[serde(default = "default_currency")]
    pub currency: String,
    /// Maximum age of a webhook timestamp.
    #[serde(default = "default_tolerance_secs")]
    pub tolerance_secs: i64,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl StripeConfig {
    pub fn new(
        secret_key: impl Into<String>,
        webhook_secret: impl Into<String>,
        success_url: impl Into<String>,
        cancel_url: impl Into<String>,
    ) -> Self {
        Self {
            secret_key: secret_key.into(),
            webhook_secret: webhook_secret.into(),
            api_base: default_api_base(),
            success_url: success_url.into(),
            cancel_url: cancel_url.into(),
            currency: default_currency(),
            tolerance_secs: default_tolerance_secs(),
            timeout_secs: default_timeout_secs(),
        }
    }

    pub fn api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }
}

impl fmt::Debug for StripeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StripeConfig")
            .field("api_base", &self.api_base)
            .field("success_url", &self.success_url)
            .field("cancel_url", &self.cancel_url)
            .field("currency", &self.currency)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Gateway
// =============================================================================

/// Stripe Checkout client.
#[derive(Debug, Clone)]
pub struct StripeGateway {
    config: StripeConfig,
    client: reqwest::Client,
}

impl StripeGateway {
    pub fn new(config: StripeConfig) -> PaymentResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { config, client })
    }

    /// Signature check against an explicit clock.
    fn verify_at(&self, notification: &PaymentNotification, now: i64) -> PaymentResult<()> {
        let header = notification
            .signature
            .as_deref()
            .ok_or_else(|| PaymentError::InvalidSignature("missing Stripe-Signature".to_string()))?;

        let mut timestamp = "";
        let mut candidates = Vec::new();
        for part in header.split(',') {
            let part = part.trim();
            if let Some(t) = part.strip_prefix("t=") {
                timestamp = t;
            } else if let Some(v) = part.strip_prefix("v1=") {
                candidates.push(v);
            }
        }
        if timestamp.is_empty() || candidates.is_empty() {
            return Err(PaymentError::InvalidSignature(
                "malformed Stripe-Signature header".to_string(),
            ));
        }

        let signed_payload = format!("{}.{}", timestamp, notification.body);
        if !candidates
            .iter()
            .any(|sig| verify_hex(&self.config.webhook_secret, &signed_payload, sig).is_ok())
        {
            return Err(PaymentError::InvalidSignature("signature mismatch".to_string()));
        }

        let ts: i64 = timestamp
            .parse()
            .map_err(|_| PaymentError::InvalidSignature("invalid timestamp".to_string()))?;
        if (now - ts).abs() > self.config.tolerance_secs {
            return Err(PaymentError::InvalidSignature(
                "timestamp outside tolerance".to_string(),
            ));
        }
        Ok(())
    }

    async fn get_json(&self, path: &str, query: &[(&str, &str)]) -> PaymentResult<Value> {
        let resp: Value = self
            .client
            .get(format!("{}{}", self.config.api_base, path))
            .basic_auth(&self.config.secret_key, None::<&str>)
            .query(query)
            .send()
            .await
            .map_err(|e| transport_error(PROVIDER, e, self.config.timeout_secs))?
            .json()
            .await
            .map_err(|e| transport_error(PROVIDER, e, self.config.timeout_secs))?;
        if let Some(message) = resp.pointer("/error/message").and_then(Value::as_str) {
            return Err(PaymentError::provider(PROVIDER, message));
        }
        Ok(resp)
    }
}

fn metadata_order_id(object: &Value) -> Option<String> {
    object
        .pointer("/metadata/order_id")
        .or_else(|| object.get("client_reference_id"))
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    fn name(&self) -> &str {
        PROVIDER
    }

    async fn create_session(&self, request: &SessionRequest) -> PaymentResult<PaymentSession> {
        let amount = request.amount.cents().to_string();
        let form = [
            ("mode", "payment"),
            ("success_url", self.config.success_url.as_str()),
            ("cancel_url", self.config.cancel_url.as_str()),
            ("client_reference_id", request.order_id.as_str()),
            ("metadata[order_id]", request.order_id.as_str()),
            ("metadata[user_id]", request.user_id.as_str()),
            ("payment_intent_data[metadata][order_id]", request.order_id.as_str()),
            ("line_items[0][quantity]", "1"),
            ("line_items[0][price_data][currency]", self.config.currency.as_str()),
            ("line_items[0][price_data][unit_amount]", amount.as_str()),
            (
                "line_items[0][price_data][product_data][name]",
                request.description.as_str(),
            ),
        ];

        debug!(order_id = %request.order_id, "Creating Stripe checkout session");

        let resp: Value = self
            .client
            .post(format!("{}/v1/checkout/sessions", self.config.api_base))
            .basic_auth(&self.config.secret_key, None::<&str>)
            .form(&form)
            .send()
            .await
            .map_err(|e| transport_error(PROVIDER, e, self.config.timeout_secs))?
            .json()
            .await
            .map_err(|e| transport_error(PROVIDER, e, self.config.timeout_secs))?;

        if let Some(message) = resp.pointer("/error/message").and_then(Value::as_str) {
            warn!(order_id = %request.order_id, %message, "Stripe refused session");
            return Err(PaymentError::provider(PROVIDER, message));
        }

        let url = resp["url"]
            .as_str()
            .ok_or_else(|| PaymentError::provider(PROVIDER, "session has no url"))?;
        let session_id = resp["id"].as_str().unwrap_or_default();

        Ok(PaymentSession::redirect(url, session_id))
    }

    fn verify_notification(&self, notification: &PaymentNotification) -> PaymentResult<()> {
        self.verify_at(notification, Utc::now().timestamp())
    }

    /// The reference is always a checkout session id: the event's own
    /// session, or the session that created a failed payment intent.
    async fn lookup_target(
        &self,
        notification: &PaymentNotification,
    ) -> PaymentResult<NotificationTarget> {
        let object = notification
            .payload
            .pointer("/data/object")
            .ok_or_else(|| PaymentError::MalformedNotification("event has no data.object".into()))?;

        let Some(id) = object.get("id").and_then(Value::as_str) else {
            return Ok(NotificationTarget::new(metadata_order_id(object), None));
        };

        match object.get("object").and_then(Value::as_str) {
            Some("checkout.session") => {
                let order_id = match metadata_order_id(object) {
                    Some(order_id) => Some(order_id),
                    None => {
                        let session =
                            self.get_json(&format!("/v1/checkout/sessions/{}", id), &[]).await?;
                        metadata_order_id(&session)
                    }
                };
                Ok(NotificationTarget::new(order_id, Some(id.to_string())))
            }
            Some("payment_intent") => {
                let list = self
                    .get_json("/v1/checkout/sessions", &[("payment_intent", id)])
                    .await?;
                let session = list.pointer("/data/0");
                let order_id = metadata_order_id(object).or_else(|| session.and_then(metadata_order_id));
                let reference = session
                    .and_then(|s| s.get("id"))
                    .and_then(Value::as_str)
                    .map(str::to_string);
                Ok(NotificationTarget::new(order_id, reference))
            }
            _ => Ok(NotificationTarget::new(metadata_order_id(object), None)),
        }
    }

    fn interpret(&self, notification: &PaymentNotification) -> NotificationOutcome {
        match notification.str_field("type") {
            Some("checkout.session.completed") => {
                // Delayed methods complete the session before the money moves.
                match notification
                    .payload
                    .pointer("/data/object/payment_status")
                    .and_then(Value::as_str)
                {
                    Some("unpaid") => NotificationOutcome::Pending,
                    _ => NotificationOutcome::Succeeded,
                }
            }
            Some("checkout.session.async_payment_succeeded") => NotificationOutcome::Succeeded,
            Some(
                kind @ ("checkout.session.expired"
                | "checkout.session.async_payment_failed"
                | "payment_intent.payment_failed"),
            ) => NotificationOutcome::Failed {
                reason: kind.to_string(),
            },
            _ => NotificationOutcome::Pending,
        }
    }
}
