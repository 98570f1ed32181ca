//! # Checkout Configuration
//!
//! Loaded in priority order, highest first:
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  1. Environment     SHOP_DB_PATH, SHOP_GATEWAY_TIMEOUT_SECS, MOMO_*, .. │
//! │  2. TOML file       $SHOP_CONFIG_FILE (default ./checkout.toml, if any) │
//! │  3. Defaults        ./shop.db, 10s gateway timeout, no coupon retries   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example `checkout.toml`
//! ```toml
//! gateway_timeout_secs = 8
//! enabled_payment_methods = ["cash_on_delivery", "card_redirect"]
//!
//! [database]
//! path = "/var/lib/shop/shop.db"
//!
//! [stripe]
//! secret_key = "sk_live_..."
//! webhook_secret = "whsec_..."
//! success_url = "https://shop.example/paid"
//! cancel_url = "https://shop.example/cart"
//! ```

use std::env;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use shop_core::PaymentMethod;
use shop_db::DbConfig;
use shop_payment::{MomoConfig, PaymentRegistry, PaymentResult, StripeConfig};

const DEFAULT_CONFIG_FILE: &str = "checkout.toml";

fn default_db_path() -> String {
    "./shop.db".to_string()
}

fn default_max_connections() -> u32 {
    5
}

fn default_gateway_timeout_secs() -> u64 {
    10
}

fn default_coupon_retry_attempts() -> u32 {
    1
}

/// Database section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSettings {
    #[serde(default = "default_db_path")]
    pub path: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            max_connections: default_max_connections(),
        }
    }
}

/// Checkout core configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutConfig {
    #[serde(default)]
    pub database: DatabaseSettings,

    /// Deadline for opening a payment session.
    #[serde(default = "default_gateway_timeout_secs")]
    pub gateway_timeout_secs: u64,

    /// Attempts for applying a coupon when the ledger reports a lost race.
    /// 1 surfaces the first conflict directly.
    #[serde(default = "default_coupon_retry_attempts")]
    pub coupon_retry_attempts: u32,

    /// Methods shoppers may pick. `None` enables everything configured.
    #[serde(default)]
    pub enabled_payment_methods: Option<Vec<PaymentMethod>>,

    #[serde(default)]
    pub momo: Option<MomoConfig>,

    #[serde(default)]
    pub stripe: Option<StripeConfig>,
}

impl Default for CheckoutConfig {
    fn default() -> Self {
        Self {
            database: DatabaseSettings::default(),
            gateway_timeout_secs: default_gateway_timeout_secs(),
            coupon_retry_attempts: default_coupon_retry_attempts(),
            enabled_payment_methods: None,
            momo: None,
            stripe: None,
        }
    }
}

impl CheckoutConfig {
    /// Loads file and environment configuration for this process.
    pub fn load() -> Result<Self, ConfigError> {
        let path = env::var("SHOP_CONFIG_FILE").ok();
        let base = match path.as_deref() {
            Some(path) => Self::from_file(path)?,
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => Self::from_file(DEFAULT_CONFIG_FILE)?,
            None => Self::default(),
        };
        base.with_env(|key| env::var(key).ok())
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: CheckoutConfig =
            toml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Overlays variables from `lookup` (normally the process environment).
    pub fn with_env(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        if let Some(path) = lookup("SHOP_DB_PATH") {
            self.database.path = path;
        }
        if let Some(value) = lookup("SHOP_DB_MAX_CONNECTIONS") {
            self.database.max_connections = parse_var("SHOP_DB_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = lookup("SHOP_GATEWAY_TIMEOUT_SECS") {
            self.gateway_timeout_secs = parse_var("SHOP_GATEWAY_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = lookup("SHOP_COUPON_RETRY_ATTEMPTS") {
            self.coupon_retry_attempts = parse_var("SHOP_COUPON_RETRY_ATTEMPTS", &value)?;
        }
        if let Some(value) = lookup("SHOP_ENABLED_PAYMENT_METHODS") {
            let methods = value
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|name| {
                    name.parse::<PaymentMethod>()
                        .map_err(|_| ConfigError::InvalidValue("SHOP_ENABLED_PAYMENT_METHODS".into()))
                })
                .collect::<Result<Vec<_>, _>>()?;
            self.enabled_payment_methods = Some(methods);
        }

        self.momo = momo_from_env(self.momo.take(), &lookup)?;
        self.stripe = stripe_from_env(self.stripe.take(), &lookup)?;

        self.validate()?;
        Ok(self)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.database.max_connections == 0 {
            return Err(ConfigError::InvalidValue("database.max_connections".into()));
        }
        if self.gateway_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue("gateway_timeout_secs".into()));
        }
        if self.coupon_retry_attempts == 0 {
            return Err(ConfigError::InvalidValue("coupon_retry_attempts".into()));
        }
        Ok(())
    }

    /// Pool settings. A checkout holds the write lock while it waits on the
    /// gateway, so writers queue for longer than the gateway timeout.
    pub fn db_config(&self) -> DbConfig {
        DbConfig::new(&self.database.path)
            .max_connections(self.database.max_connections)
            .busy_timeout(self.gateway_timeout() + Duration::from_secs(5))
    }

    pub fn gateway_timeout(&self) -> Duration {
        Duration::from_secs(self.gateway_timeout_secs)
    }

    /// Builds the payment registry for the configured providers.
    pub fn payment_registry(&self) -> PaymentResult<PaymentRegistry> {
        let mut registry = PaymentRegistry::from_config(self.momo.clone(), self.stripe.clone())?;
        if let Some(methods) = &self.enabled_payment_methods {
            registry.restrict_to(methods);
        }
        Ok(registry)
    }
}

fn parse_var<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidValue(key.to_string()))
}

fn required(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<String, ConfigError> {
    lookup(key).ok_or_else(|| ConfigError::MissingRequired(key.to_string()))
}

fn momo_from_env(
    existing: Option<MomoConfig>,
    lookup: &impl Fn(&str) -> Option<String>,
) -> Result<Option<MomoConfig>, ConfigError> {
    const KEYS: [&str; 7] = [
        "MOMO_PARTNER_CODE",
        "MOMO_ACCESS_KEY",
        "MOMO_SECRET_KEY",
        "MOMO_REDIRECT_URL",
        "MOMO_IPN_URL",
        "MOMO_ENDPOINT",
        "MOMO_REQUEST_TYPE",
    ];
    if existing.is_none() && KEYS.iter().all(|k| lookup(*k).is_none()) {
        return Ok(None);
    }

    let mut config = match existing {
        Some(config) => config,
        None => MomoConfig::new(
            required(lookup, "MOMO_PARTNER_CODE")?,
            required(lookup, "MOMO_ACCESS_KEY")?,
            required(lookup, "MOMO_SECRET_KEY")?,
            required(lookup, "MOMO_REDIRECT_URL")?,
            required(lookup, "MOMO_IPN_URL")?,
        ),
    };

    if let Some(v) = lookup("MOMO_PARTNER_CODE") {
        config.partner_code = v;
    }
    if let Some(v) = lookup("MOMO_ACCESS_KEY") {
        config.access_key = v;
    }
    if let Some(v) = lookup("MOMO_SECRET_KEY") {
        config.secret_key = v;
    }
    if let Some(v) = lookup("MOMO_REDIRECT_URL") {
        config.redirect_url = v;
    }
    if let Some(v) = lookup("MOMO_IPN_URL") {
        config.ipn_url = v;
    }
    if let Some(v) = lookup("MOMO_ENDPOINT") {
        config.endpoint = v;
    }
    if let Some(v) = lookup("MOMO_REQUEST_TYPE") {
        config.request_type = v;
    }
    Ok(Some(config))
}

fn stripe_from_env(
    existing: Option<StripeConfig>,
    lookup: &impl Fn(&str) -> Option<String>,
) -> Result<Option<StripeConfig>, ConfigError> {
    const KEYS: [&str; 6] = [
        "STRIPE_SECRET_KEY",
        "STRIPE_WEBHOOK_SECRET",
        "STRIPE_SUCCESS_URL",
        "STRIPE_CANCEL_URL",
        "STRIPE_API_BASE",
        "STRIPE_CURRENCY",
    ];
    if existing.is_none() && KEYS.iter().all(|k| lookup(*k).is_none()) {
        return Ok(None);
    }

    let mut config = match existing {
        Some(config) => config,
        None => StripeConfig::new(
            required(lookup, "STRIPE_SECRET_KEY")?,
            required(lookup, "STRIPE_WEBHOOK_SECRET")?,
            required(lookup, "STRIPE_SUCCESS_URL")?,
            required(lookup, "STRIPE_CANCEL_URL")?,
        ),
    };

    if let Some(v) = lookup("STRIPE_SECRET_KEY") {
        config.secret_key = v;
    }
    if let Some(v) = lookup("STRIPE_WEBHOOK_SECRET") {
        config.webhook_secret = v;
    }
    if let Some(v) = lookup("STRIPE_SUCCESS_URL") {
        config.success_url = v;
    }
    if let Some(v) = lookup("STRIPE_CANCEL_URL") {
        config.cancel_url = v;
    }
    if let Some(v) = lookup("STRIPE_API_BASE") {
        config.api_base = v;
    }
    if let Some(v) = lookup("STRIPE_CURRENCY") {
        config.currency = v.to_lowercase();
    }
    Ok(Some(config))
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {0}")]
    InvalidValue(String),

    #[error("Missing required configuration: {0}")]
    MissingRequired(String),

    #[error("Cannot read {path}: {message}")]
    Io { path: String, message: String },

    #[error("Invalid config file: {0}")]
    Parse(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = CheckoutConfig::default().with_env(env_of(&[])).unwrap();
        assert_eq!(config.database.path, "./shop.db");
        assert_eq!(config.gateway_timeout(), Duration::from_secs(10));
        assert_eq!(config.coupon_retry_attempts, 1);
        assert!(config.momo.is_none());
        assert!(config.stripe.is_none());
        assert_eq!(
            config.payment_registry().unwrap().enabled_methods(),
            vec![PaymentMethod::CashOnDelivery]
        );
    }

    #[test]
    fn test_toml_file_values() {
        let config = CheckoutConfig::from_toml_str(
            r#"
            gateway_timeout_secs = 8
            enabled_payment_methods = ["card_redirect"]

            [database]
            path = "/tmp/shop.db"

            [stripe]
            secret_key = "sk_test"
            webhook_secret = "whsec_test"
            success_url = "https://shop.test/paid"
            cancel_url = "https://shop.test/cart"
            "#,
        )
        .unwrap();

        assert_eq!(config.gateway_timeout_secs, 8);
        assert_eq!(config.database.path, "/tmp/shop.db");
        assert_eq!(config.database.max_connections, 5);
        let db = config.db_config();
        assert_eq!(db.max_connections, 5);
        assert_eq!(db.busy_timeout, Duration::from_secs(13));
        let stripe = config.stripe.as_ref().unwrap();
        assert_eq!(stripe.api_base, "https://api.stripe.com");
        assert_eq!(stripe.tolerance_secs, 300);
        assert_eq!(
            config.payment_registry().unwrap().enabled_methods(),
            vec![PaymentMethod::CardRedirect]
        );
    }

    #[test]
    fn test_env_overrides_file() {
        let config = CheckoutConfig::from_toml_str("gateway_timeout_secs = 8")
            .unwrap()
            .with_env(env_of(&[
                ("SHOP_GATEWAY_TIMEOUT_SECS", "3"),
                ("SHOP_DB_PATH", "/data/shop.db"),
                ("SHOP_ENABLED_PAYMENT_METHODS", "cod, momo"),
                ("MOMO_PARTNER_CODE", "MOMOTEST"),
                ("MOMO_ACCESS_KEY", "ak"),
                ("MOMO_SECRET_KEY", "sk"),
                ("MOMO_REDIRECT_URL", "https://shop.test/return"),
                ("MOMO_IPN_URL", "https://shop.test/ipn"),
            ]))
            .unwrap();

        assert_eq!(config.gateway_timeout_secs, 3);
        assert_eq!(config.database.path, "/data/shop.db");
        assert_eq!(
            config.enabled_payment_methods,
            Some(vec![PaymentMethod::CashOnDelivery, PaymentMethod::WalletRedirect])
        );
        assert_eq!(config.momo.as_ref().unwrap().request_type, "captureWallet");
        assert_eq!(config.momo.as_ref().unwrap().minor_units_per_dong, 100);
    }

    #[test]
    fn test_partial_gateway_env_is_error() {
        let err = CheckoutConfig::default()
            .with_env(env_of(&[("STRIPE_SECRET_KEY", "sk_test")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::MissingRequired(key) if key == "STRIPE_WEBHOOK_SECRET"));
    }

    #[test]
    fn test_invalid_values() {
        assert!(matches!(
            CheckoutConfig::default().with_env(env_of(&[("SHOP_GATEWAY_TIMEOUT_SECS", "soon")])),
            Err(ConfigError::InvalidValue(_))
        ));
        assert!(matches!(
            CheckoutConfig::default().with_env(env_of(&[("SHOP_COUPON_RETRY_ATTEMPTS", "0")])),
            Err(ConfigError::InvalidValue(_))
        ));
        assert!(matches!(
            CheckoutConfig::default().with_env(env_of(&[("SHOP_ENABLED_PAYMENT_METHODS", "cod,bitcoin")])),
            Err(ConfigError::InvalidValue(_))
        ));
        assert!(matches!(
            CheckoutConfig::from_toml_str("gateway_timeout_secs = \"x\""),
            Err(ConfigError::Parse(_))
        ));
    }
}
