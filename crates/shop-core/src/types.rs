//! # Domain Types
//!
//! Core domain types used throughout the checkout core.
//!
//! ## Type Map
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │    Variant      │   │      Order      │   │     Coupon      │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  id (UUID)      │   │  id (UUID)      │   │  id (UUID)      │       │
//! │  │  product_id     │   │  user_id        │   │  code (unique)  │       │
//! │  │  stock          │   │  status         │   │  times_used     │       │
//! │  │  price_cents    │   │  coupon_id ─────┼──►│  version        │       │
//! │  └────────▲────────┘   └────────┬────────┘   └─────────────────┘       │
//! │           │                     │ owns (cascade)                        │
//! │  ┌────────┴────────┐   ┌────────▼────────┐                              │
//! │  │    CartItem     │   │    OrderItem    │  price snapshot, immutable   │
//! │  └─────────────────┘   └─────────────────┘                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Identity
//! Entities reference each other by opaque UUID strings only. Relationship
//! lookups (coupon scope, category trees, addresses) go through explicit
//! repository queries instead of live object graphs.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;
use crate::money::Money;

// =============================================================================
// Catalog
// =============================================================================

/// A product. Variants carry the price and stock; products carry the
/// category memberships coupons are scoped by.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Product {
    pub id: String,
    pub name: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// A node of the category tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Category {
    pub id: String,
    pub name: String,
    pub parent_id: Option<String>,
}

/// A purchasable variant of a product.
///
/// `stock` is only ever changed through the inventory ledger's conditional
/// updates; it can never go negative (CHECK constraint in the schema).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Variant {
    pub id: String,
    pub product_id: String,
    pub sku: String,
    pub stock: i64,
    pub price_cents: i64,
    pub discount_price_cents: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Variant {
    /// Returns the price the shopper pays right now.
    pub fn effective_price(&self) -> Money {
        Money::from_cents(self.discount_price_cents.unwrap_or(self.price_cents))
    }
}

// =============================================================================
// Order Status
// =============================================================================

/// The lifecycle state of an order.
///
/// ```text
///   pending ──checkout(COD)──► processing ──► shipped ──► delivered
///      │                          ▲
///      └──checkout(redirect)──► awaiting_payment
///                                 │
///                                 └──payment failed──► cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Live, mutable checkout-in-progress. One per shopper.
    Pending,
    /// Stock reserved, waiting on the payment provider.
    AwaitingPayment,
    /// Paid (or cash on delivery), ready for fulfilment.
    Processing,
    /// Cancelled by the shopper, an admin, or a failed payment.
    Cancelled,
    /// Handed to the carrier.
    Shipped,
    /// Received by the shopper.
    Delivered,
}

impl OrderStatus {
    /// Returns the storage/wire name of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::AwaitingPayment => "awaiting_payment",
            OrderStatus::Processing => "processing",
            OrderStatus::Cancelled => "cancelled",
            OrderStatus::Shipped => "shipped",
            OrderStatus::Delivered => "delivered",
        }
    }

    /// Whether stock has been reserved for an order in this state.
    pub fn holds_reservation(&self) -> bool {
        matches!(
            self,
            OrderStatus::AwaitingPayment | OrderStatus::Processing
        )
    }

    /// Whether the lifecycle allows moving from `self` to `next`.
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (self, next),
            (Pending, AwaitingPayment)
                | (Pending, Processing)
                | (Pending, Cancelled)
                | (AwaitingPayment, Processing)
                | (AwaitingPayment, Cancelled)
                | (Processing, Cancelled)
                | (Processing, Shipped)
                | (Shipped, Delivered)
        )
    }
}

impl Default for OrderStatus {
    fn default() -> Self {
        OrderStatus::Pending
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Payment Method
// =============================================================================

/// The closed set of payment methods the checkout core knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    /// Pay the courier; settles immediately.
    CashOnDelivery,
    /// E-wallet redirect (MoMo-like).
    WalletRedirect,
    /// Hosted card page redirect (Stripe-like).
    CardRedirect,
}

impl PaymentMethod {
    /// All methods, in a stable order.
    pub const ALL: [PaymentMethod; 3] = [
        PaymentMethod::CashOnDelivery,
        PaymentMethod::WalletRedirect,
        PaymentMethod::CardRedirect,
    ];

    /// Returns the storage/wire name of the method.
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::CashOnDelivery => "cash_on_delivery",
            PaymentMethod::WalletRedirect => "wallet_redirect",
            PaymentMethod::CardRedirect => "card_redirect",
        }
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentMethod {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "cash_on_delivery" | "cod" | "cash" => Ok(PaymentMethod::CashOnDelivery),
            "wallet_redirect" | "momo" | "wallet" => Ok(PaymentMethod::WalletRedirect),
            "card_redirect" | "stripe" | "card" => Ok(PaymentMethod::CardRedirect),
            other => Err(CoreError::UnsupportedPaymentMethod(other.to_string())),
        }
    }
}

// =============================================================================
// Order
// =============================================================================

/// A shopper's order.
///
/// While `status` is `Pending` this is the live representation of "current
/// cart checkout in progress"; afterwards it is a durable record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Order {
    pub id: String,
    pub user_id: String,
    pub status: OrderStatus,
    pub sub_total_cents: i64,
    pub final_total_cents: i64,
    pub payment_method: Option<PaymentMethod>,
    pub coupon_id: Option<String>,
    pub shipping_address_id: Option<String>,
    pub message: Option<String>,
    /// Provider-side reference used to correlate payment callbacks.
    pub payment_reference: Option<String>,
    /// Soft-delete marker.
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    #[inline]
    pub fn sub_total(&self) -> Money {
        Money::from_cents(self.sub_total_cents)
    }

    #[inline]
    pub fn final_total(&self) -> Money {
        Money::from_cents(self.final_total_cents)
    }

    /// Returns true once the order has been soft-deleted.
    #[inline]
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

// =============================================================================
// Order Item
// =============================================================================

/// A line of an order.
/// Uses the snapshot pattern: prices are frozen at materialization time.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct OrderItem {
    pub id: String,
    pub order_id: String,
    pub variant_id: String,
    /// Product at time of materialization (frozen), used for coupon scoping.
    pub product_id: String,
    pub quantity: i64,
    pub price_at_purchase_cents: i64,
    pub discount_price_at_purchase_cents: Option<i64>,
    pub created_at: DateTime<Utc>,
}

impl OrderItem {
    /// The unit price charged: the discounted snapshot when present.
    #[inline]
    pub fn unit_price(&self) -> Money {
        Money::from_cents(
            self.discount_price_at_purchase_cents
                .unwrap_or(self.price_at_purchase_cents),
        )
    }

    /// Unit price × quantity.
    #[inline]
    pub fn line_total(&self) -> Money {
        self.unit_price().multiply_quantity(self.quantity)
    }
}

/// Sums the line totals of a set of items.
pub fn sub_total_of(items: &[OrderItem]) -> Money {
    items.iter().map(OrderItem::line_total).sum()
}

/// An order together with its lines.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderWithItems {
    pub order: Order,
    pub items: Vec<OrderItem>,
}

// =============================================================================
// Coupon
// =============================================================================

/// How a coupon's `discount_value` is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum DiscountType {
    /// `discount_value` is in basis points (1000 = 10%).
    Percentage,
    /// `discount_value` is in cents.
    Fixed,
}

/// Which part of an order a coupon discounts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum CouponTarget {
    /// The whole subtotal.
    All,
    /// Only lines whose product is in the coupon's product/category scope.
    Single,
}

/// A discount coupon.
///
/// ## Concurrency
/// `times_used` and `version` are only changed by version-checked updates in
/// the coupon ledger. Invariant: `max_usage IS NULL OR times_used <= max_usage`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Coupon {
    pub id: String,
    pub code: String,
    pub discount_type: DiscountType,
    pub discount_value: i64,
    pub target: CouponTarget,
    pub minimum_order_cents: i64,
    pub maximum_discount_cents: Option<i64>,
    pub times_used: i64,
    /// `None` means unlimited.
    pub max_usage: Option<i64>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub version: i64,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Coupon {
    #[inline]
    pub fn minimum_order(&self) -> Money {
        Money::from_cents(self.minimum_order_cents)
    }

    #[inline]
    pub fn maximum_discount(&self) -> Option<Money> {
        self.maximum_discount_cents.map(Money::from_cents)
    }
}

// =============================================================================
// Cart
// =============================================================================

/// A line in a shopper's cart. Ephemeral; consumed when checkout commits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct CartItem {
    pub id: String,
    pub user_id: String,
    pub variant_id: String,
    pub quantity: i64,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Shipping Address
// =============================================================================

/// A shopper's shipping address (owned by the address book collaborator).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct ShippingAddress {
    pub id: String,
    pub user_id: String,
    pub recipient: String,
    pub line1: String,
    pub city: String,
    pub country: String,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn item(price: i64, discount: Option<i64>, qty: i64) -> OrderItem {
        OrderItem {
            id: "i".to_string(),
            order_id: "o".to_string(),
            variant_id: "v".to_string(),
            product_id: "p".to_string(),
            quantity: qty,
            price_at_purchase_cents: price,
            discount_price_at_purchase_cents: discount,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_line_total_prefers_discount_snapshot() {
        assert_eq!(item(1000, None, 2).line_total().cents(), 2000);
        assert_eq!(item(1000, Some(800), 2).line_total().cents(), 1600);
    }

    #[test]
    fn test_sub_total_of() {
        let items = vec![item(1000, None, 1), item(500, Some(400), 3)];
        assert_eq!(sub_total_of(&items).cents(), 2200);
    }

    #[test]
    fn test_order_status_default_and_names() {
        assert_eq!(OrderStatus::default(), OrderStatus::Pending);
        assert_eq!(OrderStatus::AwaitingPayment.to_string(), "awaiting_payment");
    }

    #[test]
    fn test_status_transitions() {
        assert!(OrderStatus::AwaitingPayment.can_transition_to(OrderStatus::Processing));
        assert!(OrderStatus::AwaitingPayment.can_transition_to(OrderStatus::Cancelled));
        assert!(!OrderStatus::Cancelled.can_transition_to(OrderStatus::Processing));
        assert!(!OrderStatus::Delivered.can_transition_to(OrderStatus::Cancelled));
        assert!(!OrderStatus::Pending.can_transition_to(OrderStatus::Shipped));
    }

    #[test]
    fn test_payment_method_parsing() {
        assert_eq!(
            "cod".parse::<PaymentMethod>().unwrap(),
            PaymentMethod::CashOnDelivery
        );
        assert_eq!(
            "MoMo".parse::<PaymentMethod>().unwrap(),
            PaymentMethod::WalletRedirect
        );
        assert_eq!(
            "card_redirect".parse::<PaymentMethod>().unwrap(),
            PaymentMethod::CardRedirect
        );
        assert!(matches!(
            "paypal".parse::<PaymentMethod>(),
            Err(CoreError::UnsupportedPaymentMethod(_))
        ));
    }
}
