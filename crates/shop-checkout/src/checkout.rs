//! # Checkout Orchestrator
//!
//! Turns the shopper's pending order into a placed order.
//!
//! ## Checkout Transaction
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  BEGIN                                                                  │
//! │   1. pending order + items          ──► OrderNotFound / InvalidSelection│
//! │   2. shipping address resolves      ──► ShippingAddressRequired         │
//! │   3. attached coupon still live     ──► CouponConflict                  │
//! │      final total recomputed                                             │
//! │   4. reserve stock (variant order)  ──► InsufficientStock               │
//! │   5. payment session (deadline)     ──► PaymentProvider                 │
//! │   6. pending → processing | awaiting_payment, method + reference       │
//! │   7. cart lines consumed                                                │
//! │  COMMIT                                                                 │
//! │                                                                         │
//! │  Any error between BEGIN and COMMIT drops the transaction: no stock    │
//! │  moves, the order stays pending, the cart is untouched.                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDate, Utc};
use shop_core::discount::{self, calc_final_total};
use shop_core::{
    sub_total_of, CoreError, Order, OrderItem, OrderStatus, OrderWithItems, PaymentMethod,
};
use shop_db::repository::{address, coupon, inventory, order};
use shop_db::Database;
use shop_payment::{PaymentError, PaymentNotification, PaymentRegistry};
use tracing::{debug, info, warn};

use crate::config::CheckoutConfig;
use crate::error::CheckoutResult;
use crate::retry::retry_on_conflict;
use crate::settlement::{SettlementOutcome, SettlementReconciler};

/// Result of a successful checkout.
#[derive(Debug, Clone)]
pub struct CheckoutOutcome {
    pub order: Order,
    pub items: Vec<OrderItem>,
    /// Where to send the shopper; `None` for cash on delivery.
    pub payment_url: Option<String>,
}

/// Facade over the ledgers, the materializer and the payment strategies.
///
/// Cheap to clone; clones share the pool and the registry.
#[derive(Debug, Clone)]
pub struct CheckoutService {
    db: Database,
    payments: Arc<PaymentRegistry>,
    gateway_timeout: Duration,
    coupon_retry_attempts: u32,
}

impl CheckoutService {
    pub fn new(db: Database, payments: PaymentRegistry) -> Self {
        Self {
            db,
            payments: Arc::new(payments),
            gateway_timeout: Duration::from_secs(10),
            coupon_retry_attempts: 1,
        }
    }

    /// Connects the database and builds the gateways from configuration.
    pub async fn from_config(config: &CheckoutConfig) -> CheckoutResult<Self> {
        let db = Database::new(config.db_config()).await?;
        let payments = config.payment_registry()?;
        Ok(Self::new(db, payments)
            .with_gateway_timeout(config.gateway_timeout())
            .with_coupon_retry_attempts(config.coupon_retry_attempts))
    }

    pub fn with_gateway_timeout(mut self, timeout: Duration) -> Self {
        self.gateway_timeout = timeout;
        self
    }

    pub fn with_coupon_retry_attempts(mut self, attempts: u32) -> Self {
        self.coupon_retry_attempts = attempts.max(1);
        self
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn payments(&self) -> &PaymentRegistry {
        &self.payments
    }

    fn today() -> NaiveDate {
        Utc::now().date_naive()
    }

    // =========================================================================
    // Pending Order
    // =========================================================================

    /// Builds (or rebuilds) the shopper's pending order from cart lines.
    pub async fn materialize(
        &self,
        user_id: &str,
        variant_ids: &[String],
    ) -> CheckoutResult<OrderWithItems> {
        let materialized = self
            .db
            .orders()
            .materialize(user_id, variant_ids, Self::today())
            .await?;
        Ok(materialized)
    }

    pub async fn pending_order(&self, user_id: &str) -> CheckoutResult<Option<OrderWithItems>> {
        Ok(self.db.orders().pending_for_user(user_id).await?)
    }

    pub async fn set_shipping_address(&self, user_id: &str, address_id: &str) -> CheckoutResult<Order> {
        Ok(self.db.orders().set_shipping_address(user_id, address_id).await?)
    }

    /// Attaches a coupon to a pending order, re-running on a lost version
    /// race as many times as configured.
    pub async fn apply_coupon(&self, order_id: &str, coupon_id: &str) -> CheckoutResult<Order> {
        let coupons = self.db.coupons();
        let today = Self::today();
        let order = retry_on_conflict(self.coupon_retry_attempts, || {
            coupons.try_apply(order_id, coupon_id, today)
        })
        .await?;
        Ok(order)
    }

    /// Same as [`apply_coupon`](Self::apply_coupon), by shopper-facing code.
    pub async fn apply_coupon_code(&self, order_id: &str, code: &str) -> CheckoutResult<Order> {
        let coupon = self
            .db
            .coupons()
            .get_by_code(code)
            .await?
            .ok_or_else(|| CoreError::not_found("Coupon", code))?;
        self.apply_coupon(order_id, &coupon.id).await
    }

    pub async fn remove_coupon(&self, order_id: &str) -> CheckoutResult<Order> {
        Ok(self.db.coupons().detach(order_id).await?)
    }

    // =========================================================================
    // Checkout
    // =========================================================================

    /// Places the shopper's pending order with `payment_method`.
    ///
    /// ## Errors
    /// * `UnsupportedPaymentMethod` - unknown or disabled method
    /// * `OrderNotFound` - no pending order
    /// * `InvalidSelection` - the pending order has no lines
    /// * `ShippingAddressRequired` - no address, or it no longer resolves
    /// * `CouponConflict` - the attached coupon expired or was switched off
    /// * `InsufficientStock` - a line could not be reserved
    /// * `PaymentProvider` - the session could not be opened in time
    pub async fn checkout(&self, user_id: &str, payment_method: &str) -> CheckoutResult<CheckoutOutcome> {
        let strategy = self.payments.select(payment_method)?;
        let today = Self::today();

        let mut tx = self.db.begin().await?;

        let pending = order::fetch_pending_for_user(&mut tx, user_id)
            .await?
            .ok_or_else(|| CoreError::OrderNotFound(format!("pending order of {user_id}")))?;
        let items = order::fetch_items(&mut tx, &pending.id).await?;
        if items.is_empty() {
            return Err(CoreError::InvalidSelection {
                variant_ids: Vec::new(),
            }
            .into());
        }

        let address_required = || CoreError::ShippingAddressRequired {
            order_id: pending.id.clone(),
        };
        let address_id = pending
            .shipping_address_id
            .as_deref()
            .ok_or_else(address_required)?;
        address::resolve_for_user(&mut tx, user_id, address_id)
            .await?
            .ok_or_else(address_required)?;

        let sub_total = sub_total_of(&items);
        let final_total = match pending.coupon_id.as_deref() {
            Some(coupon_id) => {
                let scoped = coupon::confirm_active(&mut tx, coupon_id, today).await?;
                calc_final_total(sub_total, &discount::lines_of(&items), Some(&scoped))
            }
            None => sub_total,
        };

        inventory::reserve_all(&mut tx, &inventory::lines_of(&items)).await?;

        let mut priced = pending.clone();
        priced.sub_total_cents = sub_total.cents();
        priced.final_total_cents = final_total.cents();

        let session = match tokio::time::timeout(
            self.gateway_timeout,
            strategy.create_payment_session(&priced),
        )
        .await
        {
            Ok(Ok(session)) => session,
            Ok(Err(err)) => {
                warn!(order_id = %pending.id, method = %strategy.method(), error = %err, "Payment session failed, rolling back checkout");
                return Err(err.into());
            }
            Err(_) => {
                warn!(order_id = %pending.id, method = %strategy.method(), "Payment session timed out, rolling back checkout");
                return Err(PaymentError::Timeout {
                    provider: strategy.method().to_string(),
                    after_secs: self.gateway_timeout.as_secs(),
                }
                .into());
            }
        };

        let status = strategy.status_after_checkout();
        let placed = order::record_checkout(
            &mut tx,
            &pending.id,
            status,
            strategy.method(),
            session.provider_reference.as_deref(),
            final_total,
        )
        .await?;
        if !placed {
            return Err(CoreError::InvalidOrderStatus {
                order_id: pending.id.clone(),
                current_status: "no longer pending".to_string(),
            }
            .into());
        }

        order::consume_cart_lines(&mut tx, user_id, &pending.id).await?;

        let placed_order = order::fetch_live_order(&mut tx, &pending.id)
            .await?
            .ok_or_else(|| CoreError::OrderNotFound(pending.id.clone()))?;
        tx.commit().await.map_err(shop_db::DbError::from)?;

        info!(
            order_id = %placed_order.id,
            user_id = %user_id,
            method = %strategy.method(),
            status = %status,
            final_total = final_total.cents(),
            "Order placed"
        );

        Ok(CheckoutOutcome {
            order: placed_order,
            items,
            payment_url: session.payment_url,
        })
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Cancels an order that has not shipped.
    ///
    /// ```text
    /// pending           → cancelled + archived, coupon use given back
    /// awaiting_payment  → cancelled + archived, stock released
    /// processing        → cancelled + archived, stock released
    /// shipped/delivered → InvalidOrderStatus
    /// ```
    pub async fn cancel_order(&self, order_id: &str, actor: &str) -> CheckoutResult<Order> {
        let mut tx = self.db.begin().await?;

        let current = order::fetch_live_order(&mut tx, order_id)
            .await?
            .ok_or_else(|| CoreError::OrderNotFound(order_id.to_string()))?;

        let invalid = || CoreError::InvalidOrderStatus {
            order_id: order_id.to_string(),
            current_status: current.status.to_string(),
        };

        match current.status {
            OrderStatus::Pending => {
                if !order::cancel_and_archive(&mut tx, order_id, OrderStatus::Pending).await? {
                    return Err(invalid().into());
                }
                if let Some(coupon_id) = current.coupon_id.as_deref() {
                    coupon::release_slot(&mut tx, coupon_id).await?;
                }
            }
            status if status.holds_reservation() => {
                if !order::cancel_and_archive(&mut tx, order_id, status).await? {
                    return Err(invalid().into());
                }
                let items = order::fetch_items(&mut tx, order_id).await?;
                let restocked =
                    inventory::release_all(&mut tx, &inventory::lines_of(&items)).await?;
                debug!(order_id = %order_id, lines = items.len(), restocked, "Reservation released");
            }
            _ => return Err(invalid().into()),
        }

        tx.commit().await.map_err(shop_db::DbError::from)?;
        info!(order_id = %order_id, actor = %actor, from = %current.status, "Order cancelled");

        self.db
            .orders()
            .get_order_any(order_id)
            .await?
            .ok_or_else(|| CoreError::OrderNotFound(order_id.to_string()).into())
    }

    /// processing → shipped.
    pub async fn mark_shipped(&self, order_id: &str) -> CheckoutResult<Order> {
        self.advance(order_id, OrderStatus::Processing, OrderStatus::Shipped)
            .await
    }

    /// shipped → delivered.
    pub async fn mark_delivered(&self, order_id: &str) -> CheckoutResult<Order> {
        self.advance(order_id, OrderStatus::Shipped, OrderStatus::Delivered)
            .await
    }

    async fn advance(&self, order_id: &str, from: OrderStatus, to: OrderStatus) -> CheckoutResult<Order> {
        let mut tx = self.db.begin().await?;
        let current = order::fetch_live_order(&mut tx, order_id)
            .await?
            .ok_or_else(|| CoreError::OrderNotFound(order_id.to_string()))?;

        if !order::transition(&mut tx, order_id, from, to).await? {
            debug!(order_id = %order_id, status = %current.status, wanted = %from, "Order not in expected status");
            return Err(CoreError::InvalidOrderStatus {
                order_id: order_id.to_string(),
                current_status: current.status.to_string(),
            }
            .into());
        }

        let updated = order::fetch_live_order(&mut tx, order_id)
            .await?
            .ok_or_else(|| CoreError::OrderNotFound(order_id.to_string()))?;
        tx.commit().await.map_err(shop_db::DbError::from)?;
        Ok(updated)
    }

    // =========================================================================
    // Settlement
    // =========================================================================

    /// Reconciler sharing this service's pool and registry.
    pub fn settlement(&self) -> SettlementReconciler {
        SettlementReconciler::new(self.db.clone(), Arc::clone(&self.payments))
    }

    /// See [`SettlementReconciler::handle_notification`].
    pub async fn handle_notification(
        &self,
        provider: PaymentMethod,
        notification: &PaymentNotification,
    ) -> SettlementOutcome {
        self.settlement()
            .handle_notification(provider, notification)
            .await
    }
}
