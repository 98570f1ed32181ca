//! # Order Repository
//!
//! The cart materializer and the order reads/writes the checkout flow runs
//! inside its own transactions.
//!
//! ## Materialization
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  materialize(user, [variant ids])             ONE TRANSACTION          │
//! │                                                                         │
//! │  1. normalise selection (trim, dedupe, sort)   empty → InvalidSelection│
//! │  2. cart_items ⋈ variants for the selection    missing → InvalidSel.   │
//! │  3. find-or-create the shopper's pending order                         │
//! │  4. DELETE old order_items, INSERT snapshots                           │
//! │       (price, discount price, product, cart quantity)                  │
//! │  5. sub_total = Σ line totals                                          │
//! │  6. attached coupon still eligible? keep + reprice : detach + release  │
//! │  7. attached address still the shopper's?  keep : clear               │
//! │                                                                         │
//! │  Any error → rollback → previous item set untouched                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## One Pending Order
//! The partial unique index `idx_orders_one_pending_per_user` rejects a
//! second live pending order for the same shopper. A materialize that loses
//! the create race re-reads the winner's row and carries on with it.

use chrono::{NaiveDate, Utc};
use sqlx::{QueryBuilder, Sqlite, SqliteConnection, SqlitePool};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use crate::pool::begin_write;
use crate::repository::{address, coupon};
use shop_core::coupon::check_attached;
use shop_core::discount::{self, calc_final_total};
use shop_core::validation::{normalize_selection, validate_message};
use shop_core::{
    sub_total_of, CoreError, Money, Order, OrderItem, OrderStatus, OrderWithItems, PaymentMethod,
    ValidationError,
};

const ORDER_SELECT: &str = r#"
    SELECT
        id, user_id, status,
        sub_total_cents, final_total_cents,
        payment_method, coupon_id, shipping_address_id,
        message, payment_reference, deleted_at,
        created_at, updated_at
    FROM orders
"#;

/// A selected cart line joined with its variant's current pricing.
#[derive(Debug, sqlx::FromRow)]
struct SelectedLine {
    variant_id: String,
    product_id: String,
    quantity: i64,
    price_cents: i64,
    discount_price_cents: Option<i64>,
}

// =============================================================================
// Connection-Scoped Reads
// =============================================================================

/// Reads a live (not soft-deleted) order.
pub async fn fetch_live_order(conn: &mut SqliteConnection, order_id: &str) -> DbResult<Option<Order>> {
    let order = sqlx::query_as::<_, Order>(&format!(
        "{ORDER_SELECT} WHERE id = ?1 AND deleted_at IS NULL"
    ))
    .bind(order_id)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(order)
}

/// Reads the shopper's live pending order.
pub async fn fetch_pending_for_user(
    conn: &mut SqliteConnection,
    user_id: &str,
) -> DbResult<Option<Order>> {
    let order = sqlx::query_as::<_, Order>(&format!(
        "{ORDER_SELECT} WHERE user_id = ?1 AND status = 'pending' AND deleted_at IS NULL"
    ))
    .bind(user_id)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(order)
}

/// Reads an order's lines, ordered by variant id.
pub async fn fetch_items(conn: &mut SqliteConnection, order_id: &str) -> DbResult<Vec<OrderItem>> {
    let items = sqlx::query_as::<_, OrderItem>(
        r#"
        SELECT
            id, order_id, variant_id, product_id, quantity,
            price_at_purchase_cents, discount_price_at_purchase_cents,
            created_at
        FROM order_items
        WHERE order_id = ?1
        ORDER BY variant_id
        "#,
    )
    .bind(order_id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(items)
}

/// Reads a live order by the provider reference stored at checkout.
pub async fn fetch_by_payment_reference(
    conn: &mut SqliteConnection,
    reference: &str,
) -> DbResult<Option<Order>> {
    let order = sqlx::query_as::<_, Order>(&format!(
        "{ORDER_SELECT} WHERE payment_reference = ?1 AND deleted_at IS NULL"
    ))
    .bind(reference)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(order)
}

// =============================================================================
// Connection-Scoped Writes
// =============================================================================

/// Stores the coupon and totals of a pending order.
pub async fn store_pricing(
    conn: &mut SqliteConnection,
    order_id: &str,
    coupon_id: Option<&str>,
    sub_total: Money,
    final_total: Money,
) -> DbResult<()> {
    let result = sqlx::query(
        r#"
        UPDATE orders SET
            coupon_id = ?2,
            sub_total_cents = ?3,
            final_total_cents = ?4,
            updated_at = ?5
        WHERE id = ?1 AND status = 'pending' AND deleted_at IS NULL
        "#,
    )
    .bind(order_id)
    .bind(coupon_id)
    .bind(sub_total.cents())
    .bind(final_total.cents())
    .bind(Utc::now())
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::not_found("Order (pending)", order_id));
    }

    Ok(())
}

/// Moves a pending order into its post-checkout state.
///
/// Returns false if the order was no longer pending (a concurrent checkout
/// or cancel got there first).
pub async fn record_checkout(
    conn: &mut SqliteConnection,
    order_id: &str,
    status: OrderStatus,
    method: PaymentMethod,
    payment_reference: Option<&str>,
    final_total: Money,
) -> DbResult<bool> {
    let result = sqlx::query(
        r#"
        UPDATE orders SET
            status = ?2,
            payment_method = ?3,
            payment_reference = ?4,
            final_total_cents = ?5,
            updated_at = ?6
        WHERE id = ?1 AND status = 'pending' AND deleted_at IS NULL
        "#,
    )
    .bind(order_id)
    .bind(status)
    .bind(method)
    .bind(payment_reference)
    .bind(final_total.cents())
    .bind(Utc::now())
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Conditional status change `from → to`. Returns false if the order was
/// not in `from` (already moved, soft-deleted, or missing).
pub async fn transition(
    conn: &mut SqliteConnection,
    order_id: &str,
    from: OrderStatus,
    to: OrderStatus,
) -> DbResult<bool> {
    let result = sqlx::query(
        r#"
        UPDATE orders SET
            status = ?3,
            updated_at = ?4
        WHERE id = ?1 AND status = ?2 AND deleted_at IS NULL
        "#,
    )
    .bind(order_id)
    .bind(from)
    .bind(to)
    .bind(Utc::now())
    .execute(&mut *conn)
    .await?;

    let moved = result.rows_affected() == 1;
    if moved {
        info!(order_id = %order_id, from = %from, to = %to, "Order status changed");
    }
    Ok(moved)
}

/// Cancels and soft-deletes an order that is currently in `from`.
pub async fn cancel_and_archive(
    conn: &mut SqliteConnection,
    order_id: &str,
    from: OrderStatus,
) -> DbResult<bool> {
    let now = Utc::now();
    let result = sqlx::query(
        r#"
        UPDATE orders SET
            status = 'cancelled',
            deleted_at = ?3,
            updated_at = ?3
        WHERE id = ?1 AND status = ?2 AND deleted_at IS NULL
        "#,
    )
    .bind(order_id)
    .bind(from)
    .bind(now)
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Removes the cart lines an order was built from. Called by checkout in
/// its transaction so the cart only empties once the order is placed.
pub async fn consume_cart_lines(
    conn: &mut SqliteConnection,
    user_id: &str,
    order_id: &str,
) -> DbResult<u64> {
    let result = sqlx::query(
        r#"
        DELETE FROM cart_items
        WHERE user_id = ?1
          AND variant_id IN (SELECT variant_id FROM order_items WHERE order_id = ?2)
        "#,
    )
    .bind(user_id)
    .bind(order_id)
    .execute(&mut *conn)
    .await?;

    debug!(user_id = %user_id, order_id = %order_id, removed = result.rows_affected(), "Cart lines consumed");
    Ok(result.rows_affected())
}

// =============================================================================
// Materializer Steps
// =============================================================================

async fn selected_lines(
    conn: &mut SqliteConnection,
    user_id: &str,
    selection: &[String],
) -> DbResult<Vec<SelectedLine>> {
    let mut query: QueryBuilder<Sqlite> = QueryBuilder::new(
        r#"
        SELECT c.variant_id, v.product_id, c.quantity, v.price_cents, v.discount_price_cents
        FROM cart_items c
        JOIN variants v ON v.id = c.variant_id
        WHERE c.quantity > 0 AND c.user_id = "#,
    );
    query.push_bind(user_id);
    query.push(" AND c.variant_id IN (");
    let mut ids = query.separated(", ");
    for variant_id in selection {
        ids.push_bind(variant_id.as_str());
    }
    ids.push_unseparated(") ORDER BY c.variant_id");

    let lines = query
        .build_query_as::<SelectedLine>()
        .fetch_all(&mut *conn)
        .await?;

    Ok(lines)
}

async fn create_pending(conn: &mut SqliteConnection, user_id: &str) -> DbResult<Order> {
    let now = Utc::now();
    let id = Uuid::new_v4().to_string();

    let inserted = sqlx::query(
        r#"
        INSERT INTO orders (
            id, user_id, status,
            sub_total_cents, final_total_cents,
            created_at, updated_at
        ) VALUES (?1, ?2, 'pending', 0, 0, ?3, ?3)
        "#,
    )
    .bind(&id)
    .bind(user_id)
    .bind(now)
    .execute(&mut *conn)
    .await;

    match inserted.map_err(DbError::from) {
        Ok(_) => {
            info!(order_id = %id, user_id = %user_id, "Pending order created");
        }
        Err(DbError::UniqueViolation { .. }) => {
            debug!(user_id = %user_id, "Lost pending-order create race, re-reading");
        }
        Err(other) => return Err(other),
    }

    fetch_pending_for_user(conn, user_id)
        .await?
        .ok_or_else(|| DbError::not_found("Order (pending)", user_id))
}

async fn replace_items(
    conn: &mut SqliteConnection,
    order_id: &str,
    lines: &[SelectedLine],
) -> DbResult<Vec<OrderItem>> {
    sqlx::query("DELETE FROM order_items WHERE order_id = ?1")
        .bind(order_id)
        .execute(&mut *conn)
        .await?;

    let now = Utc::now();
    let mut items = Vec::with_capacity(lines.len());

    for line in lines {
        let item = OrderItem {
            id: Uuid::new_v4().to_string(),
            order_id: order_id.to_string(),
            variant_id: line.variant_id.clone(),
            product_id: line.product_id.clone(),
            quantity: line.quantity,
            price_at_purchase_cents: line.price_cents,
            discount_price_at_purchase_cents: line.discount_price_cents,
            created_at: now,
        };

        sqlx::query(
            r#"
            INSERT INTO order_items (
                id, order_id, variant_id, product_id, quantity,
                price_at_purchase_cents, discount_price_at_purchase_cents,
                created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(&item.id)
        .bind(&item.order_id)
        .bind(&item.variant_id)
        .bind(&item.product_id)
        .bind(item.quantity)
        .bind(item.price_at_purchase_cents)
        .bind(item.discount_price_at_purchase_cents)
        .bind(item.created_at)
        .execute(&mut *conn)
        .await?;

        items.push(item);
    }

    Ok(items)
}

/// Body of [`OrderRepository::materialize`], on the caller's transaction.
pub async fn materialize_in(
    conn: &mut SqliteConnection,
    user_id: &str,
    variant_ids: &[String],
    today: NaiveDate,
) -> DbResult<OrderWithItems> {
    let selection = normalize_selection(variant_ids).map_err(|err| match err {
        ValidationError::Required { .. } => CoreError::InvalidSelection {
            variant_ids: Vec::new(),
        },
        other => CoreError::Validation(other),
    })?;

    let lines = selected_lines(conn, user_id, &selection).await?;
    if lines.len() != selection.len() {
        let missing: Vec<String> = selection
            .iter()
            .filter(|id| !lines.iter().any(|line| &line.variant_id == *id))
            .cloned()
            .collect();
        warn!(user_id = %user_id, missing = ?missing, "Selection not in cart");
        return Err(CoreError::InvalidSelection { variant_ids: missing }.into());
    }

    let order = match fetch_pending_for_user(conn, user_id).await? {
        Some(order) => order,
        None => create_pending(conn, user_id).await?,
    };

    let items = replace_items(conn, &order.id, &lines).await?;
    let sub_total = sub_total_of(&items);

    let mut coupon_id = order.coupon_id.clone();
    let mut final_total = sub_total;
    if let Some(attached) = order.coupon_id.as_deref() {
        match coupon::fetch_coupon(conn, attached).await? {
            Some(found) => match check_attached(&found, sub_total, today) {
                Ok(()) => {
                    let scoped = coupon::scope(conn, found).await?;
                    final_total =
                        calc_final_total(sub_total, &discount::lines_of(&items), Some(&scoped));
                }
                Err(why) => {
                    warn!(order_id = %order.id, coupon_id = %attached, reason = %why, "Detaching coupon that no longer qualifies");
                    coupon::release_slot(conn, attached).await?;
                    coupon_id = None;
                }
            },
            None => coupon_id = None,
        }
    }

    let mut shipping_address_id = order.shipping_address_id.clone();
    if let Some(address_id) = order.shipping_address_id.as_deref() {
        if address::resolve_for_user(conn, user_id, address_id).await?.is_none() {
            debug!(order_id = %order.id, address_id = %address_id, "Dropping unresolvable shipping address");
            shipping_address_id = None;
        }
    }

    sqlx::query(
        r#"
        UPDATE orders SET
            sub_total_cents = ?2,
            final_total_cents = ?3,
            coupon_id = ?4,
            shipping_address_id = ?5,
            updated_at = ?6
        WHERE id = ?1
        "#,
    )
    .bind(&order.id)
    .bind(sub_total.cents())
    .bind(final_total.cents())
    .bind(&coupon_id)
    .bind(&shipping_address_id)
    .bind(Utc::now())
    .execute(&mut *conn)
    .await?;

    info!(
        order_id = %order.id,
        user_id = %user_id,
        lines = items.len(),
        sub_total = %sub_total,
        final_total = %final_total,
        "Order materialized"
    );

    let order = fetch_live_order(conn, &order.id)
        .await?
        .ok_or_else(|| CoreError::OrderNotFound(order.id.clone()))?;

    Ok(OrderWithItems { order, items })
}

// =============================================================================
// Repository
// =============================================================================

/// Repository for orders.
#[derive(Debug, Clone)]
pub struct OrderRepository {
    pool: SqlitePool,
}

impl OrderRepository {
    /// Creates a new OrderRepository.
    pub fn new(pool: SqlitePool) -> Self {
        OrderRepository { pool }
    }

    /// Turns the selected cart lines into the shopper's pending order.
    ///
    /// ## Errors
    /// * `Rejected(InvalidSelection)` - empty selection, or variants that are
    ///   not in the shopper's cart (listed in the error)
    /// * `Rejected(CouponConflict)` - the attached coupon had to be detached
    ///   but its usage counter moved concurrently
    pub async fn materialize(
        &self,
        user_id: &str,
        variant_ids: &[String],
        today: NaiveDate,
    ) -> DbResult<OrderWithItems> {
        let mut tx = begin_write(&self.pool).await?;
        let materialized = materialize_in(&mut tx, user_id, variant_ids, today).await?;
        tx.commit().await?;
        Ok(materialized)
    }

    /// Gets a live order by ID.
    pub async fn get_order(&self, order_id: &str) -> DbResult<Option<Order>> {
        let mut conn = self.pool.acquire().await?;
        fetch_live_order(&mut conn, order_id).await
    }

    /// Gets an order by ID, soft-deleted ones included.
    pub async fn get_order_any(&self, order_id: &str) -> DbResult<Option<Order>> {
        let order = sqlx::query_as::<_, Order>(&format!("{ORDER_SELECT} WHERE id = ?1"))
            .bind(order_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(order)
    }

    /// Gets all items for an order.
    pub async fn get_items(&self, order_id: &str) -> DbResult<Vec<OrderItem>> {
        let mut conn = self.pool.acquire().await?;
        fetch_items(&mut conn, order_id).await
    }

    /// Gets a live order with its items.
    pub async fn get_with_items(&self, order_id: &str) -> DbResult<OrderWithItems> {
        let mut conn = self.pool.acquire().await?;
        let order = fetch_live_order(&mut conn, order_id)
            .await?
            .ok_or_else(|| CoreError::OrderNotFound(order_id.to_string()))?;
        let items = fetch_items(&mut conn, order_id).await?;
        Ok(OrderWithItems { order, items })
    }

    /// The shopper's pending order, if any.
    pub async fn pending_for_user(&self, user_id: &str) -> DbResult<Option<OrderWithItems>> {
        let mut conn = self.pool.acquire().await?;
        let Some(order) = fetch_pending_for_user(&mut conn, user_id).await? else {
            return Ok(None);
        };
        let items = fetch_items(&mut conn, &order.id).await?;
        Ok(Some(OrderWithItems { order, items }))
    }

    /// Points the shopper's pending order at one of their addresses.
    pub async fn set_shipping_address(&self, user_id: &str, address_id: &str) -> DbResult<Order> {
        let mut tx = begin_write(&self.pool).await?;

        let order = fetch_pending_for_user(&mut tx, user_id)
            .await?
            .ok_or_else(|| CoreError::OrderNotFound(format!("pending order of {user_id}")))?;

        if address::resolve_for_user(&mut tx, user_id, address_id)
            .await?
            .is_none()
        {
            return Err(CoreError::not_found("ShippingAddress", address_id).into());
        }

        sqlx::query("UPDATE orders SET shipping_address_id = ?2, updated_at = ?3 WHERE id = ?1")
            .bind(&order.id)
            .bind(address_id)
            .bind(Utc::now())
            .execute(&mut *tx)
            .await?;

        let order = fetch_live_order(&mut tx, &order.id)
            .await?
            .ok_or_else(|| CoreError::OrderNotFound(order.id.clone()))?;
        tx.commit().await?;

        debug!(order_id = %order.id, address_id = %address_id, "Shipping address set");
        Ok(order)
    }

    /// Sets (or clears, with `None` / blank) the note on the pending order.
    pub async fn set_message(&self, user_id: &str, message: Option<&str>) -> DbResult<Order> {
        let message = validate_message(message)?;
        let mut tx = begin_write(&self.pool).await?;

        let order = fetch_pending_for_user(&mut tx, user_id)
            .await?
            .ok_or_else(|| CoreError::OrderNotFound(format!("pending order of {user_id}")))?;

        sqlx::query("UPDATE orders SET message = ?2, updated_at = ?3 WHERE id = ?1")
            .bind(&order.id)
            .bind(&message)
            .bind(Utc::now())
            .execute(&mut *tx)
            .await?;

        let order = fetch_live_order(&mut tx, &order.id)
            .await?
            .ok_or_else(|| CoreError::OrderNotFound(order.id.clone()))?;
        tx.commit().await?;

        Ok(order)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
