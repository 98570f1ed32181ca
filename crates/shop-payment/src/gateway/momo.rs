//! # MoMo E-Wallet Gateway
//!
//! Wallet redirect: a signed JSON POST opens a session and returns `payUrl`;
//! the provider later calls the IPN URL with a signed result.
//!
//! ## Signatures
//! Both directions sign a canonical `key=value&...` string (keys in
//! alphabetical order) with HMAC-SHA256 under the partner secret key.
//! ```text
//! create: accessKey amount extraData ipnUrl orderId orderInfo partnerCode
//!         redirectUrl requestId requestType
//! ipn:    accessKey amount extraData message orderId orderInfo orderType
//!         partnerCode payType requestId responseTime resultCode transId
//! ```
//!
//! ## Amounts
//! MoMo charges whole Vietnamese dong. Order totals are `Money` minor units,
//! so `amount` is `minor / minor_units_per_dong` (default 100). A total that
//! is not a whole number of dong is refused before anything is sent.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, warn};
use uuid::Uuid;

use shop_core::Money;

use super::{sign_hex, transport_error, verify_hex, PaymentGateway, PaymentSession, SessionRequest};
use crate::error::{PaymentError, PaymentResult};
use crate::notification::{NotificationOutcome, NotificationTarget, PaymentNotification};

const PROVIDER: &str = "momo";

/// Fields of an IPN body covered by its signature, in signing order.
const IPN_SIGNED_FIELDS: [&str; 12] = [
    "amount",
    "extraData",
    "message",
    "orderId",
    "orderInfo",
    "orderType",
    "partnerCode",
    "payType",
    "requestId",
    "responseTime",
    "resultCode",
    "transId",
];

// =============================================================================
// Configuration
// =============================================================================

fn default_endpoint() -> String {
    "https://test-payment.momo.vn/v2/gateway/api/create".to_string()
}

fn default_request_type() -> String {
    "captureWallet".to_string()
}

fn default_lang() -> String {
    "en".to_string()
}

fn default_timeout_secs() -> u64 {
    15
}

fn default_minor_units_per_dong() -> i64 {
    100
}

/// Partner credentials and callback URLs.
#[derive(Clone, Serialize, Deserialize)]
pub struct MomoConfig {
    pub partner_code: String,
    pub access_key: String,
    pub secret_key: String,
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// Where the shopper lands after paying.
    pub redirect_url: String,
    /// Server-to-server result callback.
    pub ipn_url: String,
    #[serde(default = "default_request_type")]
    pub request_type: String,
    #[serde(default = "default_lang")]
    pub lang: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// `Money` minor units in one VND.
    #[serde(default = "default_minor_units_per_dong")]
    pub minor_units_per_dong: i64,
}

impl MomoConfig {
    pub fn new(
        partner_code: impl Into<String>,
        access_key: impl Into<String>,
        secret_key: impl Into<String>,
        redirect_url: impl Into<String>,
        ipn_url: impl Into<String>,
    ) -> Self {
        Self {
            partner_code: partner_code.into(),
            access_key: access_key.into(),
            secret_key: secret_key.into(),
            endpoint: default_endpoint(),
            redirect_url: redirect_url.into(),
            ipn_url: ipn_url.into(),
            request_type: default_request_type(),
            lang: default_lang(),
            timeout_secs: default_timeout_secs(),
            minor_units_per_dong: default_minor_units_per_dong(),
        }
    }

    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn minor_units_per_dong(mut self, units: i64) -> Self {
        self.minor_units_per_dong = units;
        self
    }
}

impl fmt::Debug for MomoConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MomoConfig")
            .field("partner_code", &self.partner_code)
            .field("endpoint", &self.endpoint)
            .field("redirect_url", &self.redirect_url)
            .field("ipn_url", &self.ipn_url)
            .field("request_type", &self.request_type)
            .field("minor_units_per_dong", &self.minor_units_per_dong)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Gateway
// =============================================================================

/// MoMo client.
#[derive(Debug, Clone)]
pub struct MomoGateway {
    config: MomoConfig,
    client: reqwest::Client,
}

impl MomoGateway {
    pub fn new(config: MomoConfig) -> PaymentResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { config, client })
    }

    /// Whole dong for `amount`.
    fn vnd_amount(&self, amount: Money) -> PaymentResult<i64> {
        let per_dong = self.config.minor_units_per_dong.max(1);
        let minor = amount.cents();
        if minor <= 0 || minor % per_dong != 0 {
            return Err(PaymentError::provider(
                PROVIDER,
                format!("amount {} is not a positive whole number of VND", amount),
            ));
        }
        Ok(minor / per_dong)
    }

    /// Canonical string signed on session creation.
    fn create_signature_input(&self, request_id: &str, vnd: i64, request: &SessionRequest) -> String {
        format!(
            "accessKey={}&amount={}&extraData={}&ipnUrl={}&orderId={}&orderInfo={}&partnerCode={}&redirectUrl={}&requestId={}&requestType={}",
            self.config.access_key,
            vnd,
            "",
            self.config.ipn_url,
            request.order_id,
            request.description,
            self.config.partner_code,
            self.config.redirect_url,
            request_id,
            self.config.request_type,
        )
    }

    /// Canonical string an IPN body is signed over.
    fn ipn_signature_input(&self, notification: &PaymentNotification) -> String {
        let mut raw = format!("accessKey={}", self.config.access_key);
        for field in IPN_SIGNED_FIELDS {
            let value = notification.text_at(&format!("/{}", field)).unwrap_or_default();
            raw.push('&');
            raw.push_str(field);
            raw.push('=');
            raw.push_str(&value);
        }
        raw
    }
}

fn result_code(value: &Value) -> Option<i64> {
    match value.get("resultCode")? {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

#[async_trait]
impl PaymentGateway for MomoGateway {
    fn name(&self) -> &str {
        PROVIDER
    }

    async fn create_session(&self, request: &SessionRequest) -> PaymentResult<PaymentSession> {
        let vnd = self.vnd_amount(request.amount)?;
        let request_id = Uuid::new_v4().to_string();
        let signature = sign_hex(
            &self.config.secret_key,
            &self.create_signature_input(&request_id, vnd, request),
        )?;

        let body = json!({
            "partnerCode": self.config.partner_code,
            "requestId": request_id,
            "amount": vnd,
            "orderId": request.order_id,
            "orderInfo": request.description,
            "redirectUrl": self.config.redirect_url,
            "ipnUrl": self.config.ipn_url,
            "lang": self.config.lang,
            "extraData": "",
            "requestType": self.config.request_type,
            "signature": signature,
        });

        debug!(order_id = %request.order_id, request_id = %request_id, "Creating MoMo payment");

        let resp = self
            .client
            .post(&self.config.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error(PROVIDER, e, self.config.timeout_secs))?;
        let status = resp.status();
        let value: Value = resp
            .json()
            .await
            .map_err(|e| transport_error(PROVIDER, e, self.config.timeout_secs))?;

        let message = value
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("no message")
            .to_string();

        match result_code(&value) {
            Some(0) => {}
            Some(code) => {
                warn!(order_id = %request.order_id, code, %message, "MoMo refused payment");
                return Err(PaymentError::provider(
                    PROVIDER,
                    format!("resultCode {}: {}", code, message),
                ));
            }
            None => {
                return Err(PaymentError::provider(
                    PROVIDER,
                    format!("HTTP {} without resultCode", status.as_u16()),
                ));
            }
        }

        let pay_url = value
            .get("payUrl")
            .and_then(Value::as_str)
            .ok_or_else(|| PaymentError::provider(PROVIDER, "response has no payUrl"))?;

        Ok(PaymentSession::redirect(pay_url, request_id))
    }

    fn verify_notification(&self, notification: &PaymentNotification) -> PaymentResult<()> {
        let signature = notification
            .str_field("signature")
            .ok_or_else(|| PaymentError::InvalidSignature("missing signature".to_string()))?;
        if notification.str_field("partnerCode") != Some(self.config.partner_code.as_str()) {
            return Err(PaymentError::InvalidSignature(
                "partner code mismatch".to_string(),
            ));
        }
        verify_hex(
            &self.config.secret_key,
            &self.ipn_signature_input(notification),
            signature,
        )
    }

    async fn lookup_target(
        &self,
        notification: &PaymentNotification,
    ) -> PaymentResult<NotificationTarget> {
        Ok(NotificationTarget::new(
            notification.str_field("orderId").map(str::to_string),
            notification.str_field("requestId").map(str::to_string),
        ))
    }

    fn interpret(&self, notification: &PaymentNotification) -> NotificationOutcome {
        match result_code(&notification.payload) {
            Some(0) => NotificationOutcome::Succeeded,
            Some(code) => NotificationOutcome::Failed {
                reason: format!(
                    "resultCode {}: {}",
                    code,
                    notification.str_field("message").unwrap_or("payment failed")
                ),
            },
            None => NotificationOutcome::Pending,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::loopback::serve_once;

    fn config(endpoint: &str) -> MomoConfig {
        MomoConfig::new(
            "MOMOTEST",
            "access-key",
            "secret-key",
            "https://shop.test/return",
            "https://shop.test/ipn/momo",
        )
        .endpoint(endpoint)
    }

    fn request() -> SessionRequest {
        SessionRequest {
            order_id: "order-1".into(),
            user_id: "user-1".into(),
            amount: Money::from_cents(4_500_000),
            description: "Order order-1".into(),
        }
    }

    fn signed_ipn(gateway: &MomoGateway, result_code: i64) -> PaymentNotification {
        let message = if result_code == 0 {
            "Successful."
        } else {
            "Transaction denied by user."
        };
        let mut body = json!({
            "partnerCode": "MOMOTEST",
            "orderId": "order-1",
            "requestId": "req-1",
            "amount": 45000,
            "orderInfo": "Order order-1",
            "orderType": "momo_wallet",
            "transId": 4088878653u64,
            "resultCode": result_code,
            "message": message,
            "payType": "qr",
            "responseTime": 1721720663942u64,
            "extraData": "",
        });
        let unsigned = PaymentNotification::from_body(body.to_string(), None).unwrap();
        let signature = sign_hex("secret-key", &gateway.ipn_signature_input(&unsigned)).unwrap();
        body["signature"] = Value::String(signature);
        PaymentNotification::from_body(body.to_string(), None).unwrap()
    }

    #[test]
    fn test_create_signature_input_is_alphabetical() {
        let gateway = MomoGateway::new(config("http://unused")).unwrap();
        let raw = gateway.create_signature_input("req-9", 45000, &request());
        assert_eq!(
            raw,
            "accessKey=access-key&amount=45000&extraData=&ipnUrl=https://shop.test/ipn/momo\
             &orderId=order-1&orderInfo=Order order-1&partnerCode=MOMOTEST\
             &redirectUrl=https://shop.test/return&requestId=req-9&requestType=captureWallet"
        );
    }

    #[test]
    fn test_ipn_signature_verifies() {
        let gateway = MomoGateway::new(config("http://unused")).unwrap();
        let ipn = signed_ipn(&gateway, 0);
        assert!(gateway.verify_notification(&ipn).is_ok());
        assert_eq!(gateway.interpret(&ipn), NotificationOutcome::Succeeded);
    }

    #[test]
    fn test_tampered_ipn_rejected() {
        let gateway = MomoGateway::new(config("http://unused")).unwrap();
        let ipn = signed_ipn(&gateway, 1006);
        let mut payload = ipn.payload.clone();
        payload["resultCode"] = json!(0);
        let tampered = PaymentNotification::from_body(payload.to_string(), None).unwrap();
        assert!(matches!(
            gateway.verify_notification(&tampered),
            Err(PaymentError::InvalidSignature(_))
        ));
    }

    #[test]
    fn test_ipn_without_signature_rejected() {
        let gateway = MomoGateway::new(config("http://unused")).unwrap();
        let ipn = PaymentNotification::from_body(
            r#"{"partnerCode":"MOMOTEST","orderId":"order-1","resultCode":0}"#,
            None,
        )
        .unwrap();
        assert!(gateway.verify_notification(&ipn).is_err());
    }

    #[tokio::test]
    async fn test_failed_result_code_is_failure() {
        let gateway = MomoGateway::new(config("http://unused")).unwrap();
        let ipn = signed_ipn(&gateway, 1006);
        assert!(gateway.verify_notification(&ipn).is_ok());
        assert!(matches!(
            gateway.interpret(&ipn),
            NotificationOutcome::Failed { .. }
        ));
        let target = gateway.lookup_target(&ipn).await.unwrap();
        assert_eq!(target.order_id.as_deref(), Some("order-1"));
        assert_eq!(target.reference.as_deref(), Some("req-1"));
    }

    #[tokio::test]
    async fn test_create_session_returns_pay_url() {
        let (base, server) = serve_once(
            200,
            r#"{"partnerCode":"MOMOTEST","orderId":"order-1","resultCode":0,"message":"Successful.","payUrl":"https://test-payment.momo.vn/pay/abc"}"#,
        )
        .await;
        let gateway = MomoGateway::new(config(&format!("{}/v2/gateway/api/create", base))).unwrap();

        let session = gateway.create_session(&request()).await.unwrap();
        assert_eq!(
            session.payment_url.as_deref(),
            Some("https://test-payment.momo.vn/pay/abc")
        );
        assert!(session.provider_reference.is_some());

        let raw = server.await.unwrap();
        assert!(raw.starts_with("POST /v2/gateway/api/create"));
        assert!(raw.contains(r#""orderId":"order-1""#));
        assert!(raw.contains(r#""amount":45000"#));
        assert!(raw.contains(r#""signature":""#));
    }

    #[test]
    fn test_amount_is_whole_dong() {
        let gateway = MomoGateway::new(config("http://unused")).unwrap();
        assert_eq!(gateway.vnd_amount(Money::from_cents(4_500_000)).unwrap(), 45000);
        assert!(matches!(
            gateway.vnd_amount(Money::from_cents(4_500_050)),
            Err(PaymentError::Provider { .. })
        ));
        assert!(gateway.vnd_amount(Money::zero()).is_err());

        let per_dong = MomoGateway::new(config("http://unused").minor_units_per_dong(1)).unwrap();
        assert_eq!(per_dong.vnd_amount(Money::from_cents(45000)).unwrap(), 45000);
    }

    #[tokio::test]
    async fn test_fractional_amount_sends_nothing() {
        let gateway = MomoGateway::new(config("http://127.0.0.1:9")).unwrap();
        let mut fractional = request();
        fractional.amount = Money::from_cents(4_500_001);

        assert!(matches!(
            gateway.create_session(&fractional).await,
            Err(PaymentError::Provider { .. })
        ));
    }

    #[tokio::test]
    async fn test_create_session_nonzero_result_code() {
        let (base, _server) = serve_once(
            400,
            r#"{"orderId":"order-1","resultCode":22,"message":"Amount out of range"}"#,
        )
        .await;
        let gateway = MomoGateway::new(config(&base)).unwrap();

        let err = gateway.create_session(&request()).await.unwrap_err();
        match err {
            PaymentError::Provider { provider, message } => {
                assert_eq!(provider, "momo");
                assert!(message.contains("22"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
