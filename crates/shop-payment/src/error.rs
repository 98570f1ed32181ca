//! # Payment Error Types
//!
//! ## Error Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  reqwest::Error / provider resultCode / bad signature                   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  PaymentError (this module)                                             │
//! │       │                                                                 │
//! │       ├──► checkout: PaymentProvider failure, whole transaction rolled │
//! │       │    back                                                         │
//! │       └──► settlement: notification ignored and logged                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

/// Errors raised while selecting a strategy or talking to a provider.
#[derive(Debug, Error)]
pub enum PaymentError {
    /// Unknown method name, or a strategy switched off by configuration.
    #[error("Unsupported payment method: {0}")]
    UnsupportedMethod(String),

    /// The provider answered, but refused the request.
    ///
    /// ## When This Occurs
    /// - MoMo `resultCode != 0` on session creation
    /// - Stripe error body, or a session without a `url`
    #[error("{provider} rejected the request: {message}")]
    Provider { provider: String, message: String },

    /// The provider did not answer within the configured deadline.
    #[error("{provider} did not respond within {after_secs}s")]
    Timeout { provider: String, after_secs: u64 },

    /// Notification signature missing or not matching the shared secret.
    #[error("Invalid notification signature: {0}")]
    InvalidSignature(String),

    /// Notification body could not be parsed or lacks required fields.
    #[error("Malformed notification: {0}")]
    MalformedNotification(String),

    /// Transport failure talking to the provider.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl PaymentError {
    pub fn provider(provider: impl Into<String>, message: impl Into<String>) -> Self {
        PaymentError::Provider {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Whether the failure happened on the provider side of the wire
    /// (as opposed to a configuration or input problem).
    pub fn is_provider_failure(&self) -> bool {
        matches!(
            self,
            PaymentError::Provider { .. } | PaymentError::Timeout { .. } | PaymentError::Http(_)
        )
    }
}

/// Result type for payment operations.
pub type PaymentResult<T> = Result<T, PaymentError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_failure_classification() {
        assert!(PaymentError::provider("momo", "resultCode 11").is_provider_failure());
        assert!(PaymentError::Timeout {
            provider: "stripe".into(),
            after_secs: 10
        }
        .is_provider_failure());
        assert!(!PaymentError::UnsupportedMethod("bitcoin".into()).is_provider_failure());
        assert!(!PaymentError::InvalidSignature("v1 mismatch".into()).is_provider_failure());
    }

    #[test]
    fn test_error_messages() {
        let err = PaymentError::provider("momo", "Bad request");
        assert_eq!(err.to_string(), "momo rejected the request: Bad request");
    }
}
