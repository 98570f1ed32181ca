//! # Settlement Reconciler
//!
//! Applies payment provider callbacks to orders.
//!
//! ## Decision Table
//! ```text
//! ┌──────────────────────────────┬──────────────────────┬──────────────────┐
//! │ Notification                 │ Order status         │ Effect           │
//! ├──────────────────────────────┼──────────────────────┼──────────────────┤
//! │ bad signature                │ (not looked up)      │ Ignored          │
//! │ order unresolved / missing   │ -                    │ Ignored          │
//! │ session ≠ order's reference  │ -                    │ Ignored (stale)  │
//! │ succeeded                    │ awaiting_payment     │ → processing     │
//! │ failed                       │ awaiting_payment     │ → cancelled,     │
//! │                              │                      │   stock released │
//! │                              │                      │   (deleted       │
//! │                              │                      │   variants skip) │
//! │ succeeded / failed           │ anything else        │ Ignored (dup.)   │
//! │ pending                      │ any                  │ Ignored          │
//! └──────────────────────────────┴──────────────────────┴──────────────────┘
//! ```
//!
//! Providers retry until they get an acknowledgement, so this never returns
//! an error: internal failures are logged and reported as `Ignored`.

use std::sync::Arc;

use shop_core::{OrderStatus, PaymentMethod};
use shop_db::repository::{inventory, order};
use shop_db::{Database, DbResult};
use shop_payment::{NotificationOutcome, NotificationTarget, PaymentNotification, PaymentRegistry};
use tracing::{error, info, warn};

/// What a notification did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettlementOutcome {
    /// awaiting_payment → processing.
    Settled { order_id: String },
    /// awaiting_payment → cancelled, stock given back.
    Cancelled { order_id: String },
    /// Nothing changed.
    Ignored(String),
}

impl SettlementOutcome {
    fn ignored(reason: impl Into<String>) -> Self {
        SettlementOutcome::Ignored(reason.into())
    }

    pub fn is_ignored(&self) -> bool {
        matches!(self, SettlementOutcome::Ignored(_))
    }
}

/// Applies verified provider notifications to orders.
#[derive(Debug, Clone)]
pub struct SettlementReconciler {
    db: Database,
    payments: Arc<PaymentRegistry>,
}

impl SettlementReconciler {
    pub fn new(db: Database, payments: Arc<PaymentRegistry>) -> Self {
        Self { db, payments }
    }

    /// Handles one callback from the provider behind `provider`.
    pub async fn handle_notification(
        &self,
        provider: PaymentMethod,
        notification: &PaymentNotification,
    ) -> SettlementOutcome {
        let Some(strategy) = self.payments.strategy_for(provider) else {
            warn!(method = %provider, "Notification for a method with no strategy");
            return SettlementOutcome::ignored(format!("no strategy for {provider}"));
        };

        if let Err(err) = strategy.verify(notification) {
            warn!(method = %provider, error = %err, "Rejected payment notification");
            return SettlementOutcome::ignored("invalid signature");
        }

        let outcome = strategy.outcome(notification);
        if outcome == NotificationOutcome::Pending {
            return SettlementOutcome::ignored("no payment outcome yet");
        }

        let target = match strategy.resolve_target(notification).await {
            Ok(target) if !target.is_unresolved() => target,
            Ok(_) => {
                warn!(method = %provider, "Notification does not name an order");
                return SettlementOutcome::ignored("order unresolved");
            }
            Err(err) => {
                error!(method = %provider, error = %err, "Could not resolve order for notification");
                return SettlementOutcome::ignored("order unresolved");
            }
        };

        match self.apply(provider, &target, outcome).await {
            Ok(result) => result,
            Err(err) => {
                error!(order_id = ?target.order_id, reference = ?target.reference, method = %provider, error = %err, "Settlement failed");
                SettlementOutcome::ignored(format!("internal error: {err}"))
            }
        }
    }

    async fn apply(
        &self,
        provider: PaymentMethod,
        target: &NotificationTarget,
        outcome: NotificationOutcome,
    ) -> DbResult<SettlementOutcome> {
        let mut tx = self.db.begin().await?;

        let found = match (target.order_id.as_deref(), target.reference.as_deref()) {
            (Some(order_id), _) => order::fetch_live_order(&mut tx, order_id).await?,
            (None, Some(reference)) => order::fetch_by_payment_reference(&mut tx, reference).await?,
            (None, None) => None,
        };
        let Some(current) = found else {
            warn!(order_id = ?target.order_id, reference = ?target.reference, "Notification for unknown order");
            return Ok(SettlementOutcome::ignored("order not found"));
        };
        let order_id = current.id.as_str();

        if target.is_stale_for(current.payment_reference.as_deref()) {
            warn!(
                order_id = %order_id,
                method = %provider,
                reference = ?target.reference,
                expected = ?current.payment_reference,
                "Notification for a superseded payment session"
            );
            return Ok(SettlementOutcome::ignored("stale payment session"));
        }

        if current.payment_method != Some(provider) {
            warn!(
                order_id = %order_id,
                method = %provider,
                order_method = ?current.payment_method,
                "Notification from a provider the order was not placed with"
            );
            return Ok(SettlementOutcome::ignored("payment method mismatch"));
        }

        let result = match outcome {
            NotificationOutcome::Succeeded => {
                if order::transition(
                    &mut tx,
                    order_id,
                    OrderStatus::AwaitingPayment,
                    OrderStatus::Processing,
                )
                .await?
                {
                    info!(order_id = %order_id, method = %provider, "Payment settled");
                    SettlementOutcome::Settled {
                        order_id: order_id.to_string(),
                    }
                } else {
                    SettlementOutcome::ignored(format!("order is {}", current.status))
                }
            }
            NotificationOutcome::Failed { reason } => {
                if order::transition(
                    &mut tx,
                    order_id,
                    OrderStatus::AwaitingPayment,
                    OrderStatus::Cancelled,
                )
                .await?
                {
                    let items = order::fetch_items(&mut tx, order_id).await?;
                    let restocked =
                        inventory::release_all(&mut tx, &inventory::lines_of(&items)).await?;
                    info!(order_id = %order_id, method = %provider, %reason, restocked, "Payment failed, order cancelled");
                    SettlementOutcome::Cancelled {
                        order_id: order_id.to_string(),
                    }
                } else {
                    SettlementOutcome::ignored(format!("order is {}", current.status))
                }
            }
            NotificationOutcome::Pending => SettlementOutcome::ignored("no payment outcome yet"),
        };

        if !result.is_ignored() {
            tx.commit().await?;
        }
        Ok(result)
    }
}
