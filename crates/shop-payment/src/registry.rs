//! # Payment Registry
//!
//! Maps a method name to its [`PaymentStrategy`].
//!
//! Two lookups with different rules:
//! - [`PaymentRegistry::select`] is used when a shopper picks a method at
//!   checkout; administratively disabled methods are refused.
//! - [`PaymentRegistry::strategy_for`] is used by settlement; it ignores the
//!   disabled flag so sessions opened before a method was switched off still
//!   settle.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use shop_core::PaymentMethod;
use tracing::info;

use crate::error::{PaymentError, PaymentResult};
use crate::gateway::{MomoConfig, MomoGateway, PaymentGateway, StripeConfig, StripeGateway};
use crate::strategy::PaymentStrategy;

/// Registered strategies plus the set switched off by an operator.
#[derive(Debug, Clone)]
pub struct PaymentRegistry {
    strategies: HashMap<PaymentMethod, PaymentStrategy>,
    disabled: HashSet<PaymentMethod>,
}

impl Default for PaymentRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl PaymentRegistry {
    /// Registry with cash on delivery only.
    pub fn new() -> Self {
        let mut strategies = HashMap::new();
        strategies.insert(PaymentMethod::CashOnDelivery, PaymentStrategy::CashOnDelivery);
        Self {
            strategies,
            disabled: HashSet::new(),
        }
    }

    pub fn with_wallet(mut self, gateway: Arc<dyn PaymentGateway>) -> Self {
        self.strategies
            .insert(PaymentMethod::WalletRedirect, PaymentStrategy::WalletRedirect(gateway));
        self
    }

    pub fn with_card(mut self, gateway: Arc<dyn PaymentGateway>) -> Self {
        self.strategies
            .insert(PaymentMethod::CardRedirect, PaymentStrategy::CardRedirect(gateway));
        self
    }

    /// Builds the HTTP gateways for whichever providers are configured.
    pub fn from_config(
        momo: Option<MomoConfig>,
        stripe: Option<StripeConfig>,
    ) -> PaymentResult<Self> {
        let mut registry = Self::new();
        if let Some(config) = momo {
            registry = registry.with_wallet(Arc::new(MomoGateway::new(config)?));
        }
        if let Some(config) = stripe {
            registry = registry.with_card(Arc::new(StripeGateway::new(config)?));
        }
        info!(methods = ?registry.enabled_methods(), "Payment registry ready");
        Ok(registry)
    }

    pub fn disable(&mut self, method: PaymentMethod) {
        self.disabled.insert(method);
    }

    pub fn enable(&mut self, method: PaymentMethod) {
        self.disabled.remove(&method);
    }

    /// Keeps only `methods` enabled.
    pub fn restrict_to(&mut self, methods: &[PaymentMethod]) {
        for method in PaymentMethod::ALL {
            if methods.contains(&method) {
                self.enable(method);
            } else {
                self.disable(method);
            }
        }
    }

    /// Strategy for a shopper-supplied method name.
    pub fn select(&self, name: &str) -> PaymentResult<PaymentStrategy> {
        let method: PaymentMethod = name
            .parse()
            .map_err(|_| PaymentError::UnsupportedMethod(name.to_string()))?;
        self.select_method(method)
    }

    /// Strategy for a method, refusing unregistered or disabled ones.
    pub fn select_method(&self, method: PaymentMethod) -> PaymentResult<PaymentStrategy> {
        if self.disabled.contains(&method) {
            return Err(PaymentError::UnsupportedMethod(format!("{} (disabled)", method)));
        }
        self.strategies
            .get(&method)
            .cloned()
            .ok_or_else(|| PaymentError::UnsupportedMethod(method.to_string()))
    }

    /// Strategy for settling a callback, regardless of the disabled flag.
    pub fn strategy_for(&self, method: PaymentMethod) -> Option<PaymentStrategy> {
        self.strategies.get(&method).cloned()
    }

    /// Registered and enabled methods, in a stable order.
    pub fn enabled_methods(&self) -> Vec<PaymentMethod> {
        PaymentMethod::ALL
            .into_iter()
            .filter(|m| self.strategies.contains_key(m) && !self.disabled.contains(m))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stripe() -> StripeConfig {
        StripeConfig::new("sk_test", "whsec_test", "https://s/ok", "https://s/no")
    }

    #[test]
    fn test_default_is_cod_only() {
        let registry = PaymentRegistry::new();
        assert_eq!(registry.enabled_methods(), vec![PaymentMethod::CashOnDelivery]);
        assert!(registry.select("cash_on_delivery").is_ok());
        assert!(registry.select("cod").is_ok());
        assert!(matches!(
            registry.select("card_redirect"),
            Err(PaymentError::UnsupportedMethod(_))
        ));
    }

    #[test]
    fn test_unknown_name_is_unsupported() {
        let registry = PaymentRegistry::new();
        match registry.select("bitcoin") {
            Err(PaymentError::UnsupportedMethod(name)) => assert_eq!(name, "bitcoin"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_from_config_registers_gateways() {
        let registry = PaymentRegistry::from_config(None, Some(stripe())).unwrap();
        assert_eq!(
            registry.enabled_methods(),
            vec![PaymentMethod::CashOnDelivery, PaymentMethod::CardRedirect]
        );
        let strategy = registry.select("stripe").unwrap();
        assert_eq!(strategy.method(), PaymentMethod::CardRedirect);
    }

    #[test]
    fn test_disabled_method_refused_at_checkout_but_settles() {
        let mut registry = PaymentRegistry::from_config(None, Some(stripe())).unwrap();
        registry.disable(PaymentMethod::CardRedirect);

        assert!(matches!(
            registry.select_method(PaymentMethod::CardRedirect),
            Err(PaymentError::UnsupportedMethod(_))
        ));
        assert!(registry.strategy_for(PaymentMethod::CardRedirect).is_some());

        registry.enable(PaymentMethod::CardRedirect);
        assert!(registry.select_method(PaymentMethod::CardRedirect).is_ok());
    }

    #[test]
    fn test_restrict_to() {
        let mut registry = PaymentRegistry::from_config(None, Some(stripe())).unwrap();
        registry.restrict_to(&[PaymentMethod::CardRedirect]);
        assert_eq!(registry.enabled_methods(), vec![PaymentMethod::CardRedirect]);
        assert!(registry.select("cod").is_err());
    }
}
