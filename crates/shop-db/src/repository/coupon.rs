//! # Coupon Ledger
//!
//! Attaches, swaps and detaches coupons on pending orders without ever
//! letting `times_used` exceed `max_usage`.
//!
//! ## Optimistic Version Lock
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  try_apply(order, new_coupon)                 ONE TRANSACTION          │
//! │                                                                         │
//! │  1. read order           (must be live + pending)                      │
//! │  2. read new coupon      → eligibility check (pure, shop-core)         │
//! │  3. for each slot change, in ascending coupon-id order:                │
//! │                                                                         │
//! │       release old:  UPDATE coupons SET times_used = times_used - 1,    │
//! │                            version = version + 1                       │
//! │                     WHERE id = old AND version = seen AND times_used>0 │
//! │                                                                         │
//! │       take new:     UPDATE coupons SET times_used = times_used + 1,    │
//! │                            version = version + 1                       │
//! │                     WHERE id = new AND version = seen                  │
//! │                       AND <same eligibility filter, in SQL>            │
//! │                                                                         │
//! │     rows_affected == 0 → VersionConflict, whole transaction rolls back │
//! │                                                                         │
//! │  4. recompute final total (shop-core::discount), store coupon_id       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Two shoppers racing for the last use both read `version = 7`; the first
//! UPDATE moves it to 8, the second matches no row and gets a
//! `VersionConflict`, the only coupon error worth re-running. No retry
//! happens here.

use chrono::{NaiveDate, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use std::collections::HashSet;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use crate::pool::begin_write;
use crate::repository::order;
use shop_core::coupon::{check_eligibility, check_window};
use shop_core::discount::{self, calc_final_total, ScopedCoupon};
use shop_core::validation::validate_coupon_code;
use shop_core::{
    Coupon, CouponTarget, CoreError, DiscountType, Money, Order, OrderStatus, ValidationError,
    FULL_PERCENT_BPS,
};

const COUPON_SELECT: &str = r#"
    SELECT
        id, code, discount_type, discount_value, target,
        minimum_order_cents, maximum_discount_cents,
        times_used, max_usage, start_date, end_date,
        version, is_active, created_at, updated_at
    FROM coupons
"#;

// =============================================================================
// Reads
// =============================================================================

/// Reads a coupon on the caller's connection.
pub async fn fetch_coupon(conn: &mut SqliteConnection, coupon_id: &str) -> DbResult<Option<Coupon>> {
    let coupon = sqlx::query_as::<_, Coupon>(&format!("{COUPON_SELECT} WHERE id = ?1"))
        .bind(coupon_id)
        .fetch_optional(&mut *conn)
        .await?;

    Ok(coupon)
}

/// Products a `single`-target coupon discounts: its direct products plus
/// every product in any category at or below its categories.
pub async fn eligible_products(
    conn: &mut SqliteConnection,
    coupon_id: &str,
) -> DbResult<HashSet<String>> {
    let ids: Vec<String> = sqlx::query_scalar(
        r#"
        SELECT product_id FROM coupon_products WHERE coupon_id = ?1
        UNION
        SELECT pc.product_id
        FROM coupon_categories cc
        JOIN category_closure cl ON cl.ancestor_id = cc.category_id
        JOIN product_categories pc ON pc.category_id = cl.descendant_id
        WHERE cc.coupon_id = ?1
        "#,
    )
    .bind(coupon_id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(ids.into_iter().collect())
}

/// Resolves a coupon's product scope for the discount calculator.
pub async fn scope(conn: &mut SqliteConnection, coupon: Coupon) -> DbResult<ScopedCoupon> {
    match coupon.target {
        CouponTarget::All => Ok(ScopedCoupon::whole_order(coupon)),
        CouponTarget::Single => {
            let products = eligible_products(conn, &coupon.id).await?;
            Ok(ScopedCoupon::new(coupon, products))
        }
    }
}

/// Re-checks an attached coupon at checkout time: it must still exist, be
/// active and be inside its date window. Usage is not re-counted.
pub async fn confirm_active(
    conn: &mut SqliteConnection,
    coupon_id: &str,
    today: NaiveDate,
) -> DbResult<ScopedCoupon> {
    let coupon = fetch_coupon(conn, coupon_id)
        .await?
        .ok_or_else(|| CoreError::coupon_conflict(coupon_id, "coupon no longer exists"))?;

    check_window(&coupon, today).map_err(|why| why.into_conflict(coupon_id))?;

    scope(conn, coupon).await
}

// =============================================================================
// Version-Checked Writes
// =============================================================================

/// Counts one use of `coupon` if it is still at the version we read and
/// still eligible for an order of `sub_total` on `today`.
async fn take_slot(
    conn: &mut SqliteConnection,
    coupon: &Coupon,
    sub_total: Money,
    today: NaiveDate,
) -> DbResult<()> {
    let result = sqlx::query(
        r#"
        UPDATE coupons SET
            times_used = times_used + 1,
            version = version + 1,
            updated_at = ?3
        WHERE id = ?1
          AND version = ?2
          AND is_active = 1
          AND (max_usage IS NULL OR times_used < max_usage)
          AND (start_date IS NULL OR start_date <= ?4)
          AND (end_date IS NULL OR end_date >= ?4)
          AND minimum_order_cents <= ?5
        "#,
    )
    .bind(&coupon.id)
    .bind(coupon.version)
    .bind(Utc::now())
    .bind(today)
    .bind(sub_total.cents())
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        warn!(coupon_id = %coupon.id, seen_version = coupon.version, "Coupon slot lost to a concurrent writer");
        return Err(DbError::version_conflict("Coupon", &coupon.id));
    }

    debug!(coupon_id = %coupon.id, version = coupon.version + 1, "Coupon slot taken");
    Ok(())
}

/// Gives back one use of `coupon_id`, guarded by the version just read.
///
/// A coupon that has been deleted, or whose counter is already zero, has
/// nothing to give back.
pub async fn release_slot(conn: &mut SqliteConnection, coupon_id: &str) -> DbResult<()> {
    let Some(coupon) = fetch_coupon(conn, coupon_id).await? else {
        warn!(coupon_id = %coupon_id, "Releasing slot of a missing coupon");
        return Ok(());
    };

    if coupon.times_used == 0 {
        warn!(coupon_id = %coupon_id, "Coupon usage already at zero");
        return Ok(());
    }

    let result = sqlx::query(
        r#"
        UPDATE coupons SET
            times_used = times_used - 1,
            version = version + 1,
            updated_at = ?3
        WHERE id = ?1 AND version = ?2 AND times_used > 0
        "#,
    )
    .bind(coupon_id)
    .bind(coupon.version)
    .bind(Utc::now())
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::version_conflict("Coupon", coupon_id));
    }

    debug!(coupon_id = %coupon_id, version = coupon.version + 1, "Coupon slot released");
    Ok(())
}

/// One side of a coupon swap.
enum SlotChange<'a> {
    Release(&'a str),
    Take(&'a Coupon),
}

impl SlotChange<'_> {
    fn coupon_id(&self) -> &str {
        match self {
            SlotChange::Release(id) => id,
            SlotChange::Take(coupon) => &coupon.id,
        }
    }
}

// =============================================================================
// Transaction Bodies
// =============================================================================

async fn load_pending(conn: &mut SqliteConnection, order_id: &str) -> DbResult<Order> {
    let order = order::fetch_live_order(conn, order_id)
        .await?
        .ok_or_else(|| CoreError::OrderNotFound(order_id.to_string()))?;

    if order.status != OrderStatus::Pending {
        return Err(CoreError::InvalidOrderStatus {
            order_id: order.id,
            current_status: order.status.to_string(),
        }
        .into());
    }

    Ok(order)
}

/// Body of [`CouponRepository::try_apply`], on the caller's transaction.
pub async fn apply_to_order(
    conn: &mut SqliteConnection,
    order_id: &str,
    coupon_id: &str,
    today: NaiveDate,
) -> DbResult<Order> {
    let order = load_pending(conn, order_id).await?;

    if order.coupon_id.as_deref() == Some(coupon_id) {
        debug!(order_id = %order_id, coupon_id = %coupon_id, "Coupon already applied");
        return Ok(order);
    }

    let coupon = fetch_coupon(conn, coupon_id)
        .await?
        .ok_or_else(|| CoreError::not_found("Coupon", coupon_id))?;

    check_eligibility(&coupon, order.sub_total(), today)
        .map_err(|why| why.into_conflict(coupon_id))?;

    let mut changes = vec![SlotChange::Take(&coupon)];
    if let Some(old) = order.coupon_id.as_deref() {
        changes.push(SlotChange::Release(old));
    }
    changes.sort_by(|a, b| a.coupon_id().cmp(b.coupon_id()));

    for change in &changes {
        match change {
            SlotChange::Release(id) => release_slot(conn, id).await?,
            SlotChange::Take(coupon) => take_slot(conn, coupon, order.sub_total(), today).await?,
        }
    }
    drop(changes);

    let items = order::fetch_items(conn, order_id).await?;
    let scoped = scope(conn, coupon).await?;
    let final_total = calc_final_total(
        order.sub_total(),
        &discount::lines_of(&items),
        Some(&scoped),
    );

    order::store_pricing(conn, order_id, Some(coupon_id), order.sub_total(), final_total).await?;

    info!(
        order_id = %order_id,
        coupon_id = %coupon_id,
        previous_coupon = ?order.coupon_id,
        final_total = %final_total,
        "Coupon applied"
    );

    order::fetch_live_order(conn, order_id)
        .await?
        .ok_or_else(|| CoreError::OrderNotFound(order_id.to_string()).into())
}

/// Body of [`CouponRepository::detach`], on the caller's transaction.
pub async fn detach_from_order(conn: &mut SqliteConnection, order_id: &str) -> DbResult<Order> {
    let order = load_pending(conn, order_id).await?;

    let Some(coupon_id) = order.coupon_id.as_deref() else {
        return Ok(order);
    };

    release_slot(conn, coupon_id).await?;
    order::store_pricing(conn, order_id, None, order.sub_total(), order.sub_total()).await?;

    info!(order_id = %order_id, coupon_id = %coupon_id, "Coupon detached");

    order::fetch_live_order(conn, order_id)
        .await?
        .ok_or_else(|| CoreError::OrderNotFound(order_id.to_string()).into())
}

// =============================================================================
// New Coupon Builder
// =============================================================================

/// A coupon to create.
///
/// ## Example
/// ```rust,ignore
/// let coupon = db.coupons().insert(
///     NewCoupon::percentage("SAVE10", 1000).max_usage(100).minimum_order(2000)
/// ).await?;
/// ```
#[derive(Debug, Clone)]
pub struct NewCoupon {
    pub code: String,
    pub discount_type: DiscountType,
    pub discount_value: i64,
    pub target: CouponTarget,
    pub minimum_order_cents: i64,
    pub maximum_discount_cents: Option<i64>,
    pub max_usage: Option<i64>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

impl NewCoupon {
    fn new(code: &str, discount_type: DiscountType, discount_value: i64) -> Self {
        NewCoupon {
            code: code.to_string(),
            discount_type,
            discount_value,
            target: CouponTarget::All,
            minimum_order_cents: 0,
            maximum_discount_cents: None,
            max_usage: None,
            start_date: None,
            end_date: None,
        }
    }

    /// A whole-order percentage coupon; `bps` in basis points (1000 = 10%).
    pub fn percentage(code: &str, bps: i64) -> Self {
        NewCoupon::new(code, DiscountType::Percentage, bps)
    }

    /// A whole-order fixed-amount coupon.
    pub fn fixed(code: &str, cents: i64) -> Self {
        NewCoupon::new(code, DiscountType::Fixed, cents)
    }

    /// Restricts the coupon to its product/category scope.
    pub fn single(mut self) -> Self {
        self.target = CouponTarget::Single;
        self
    }

    pub fn minimum_order(mut self, cents: i64) -> Self {
        self.minimum_order_cents = cents;
        self
    }

    pub fn maximum_discount(mut self, cents: i64) -> Self {
        self.maximum_discount_cents = Some(cents);
        self
    }

    pub fn max_usage(mut self, max: i64) -> Self {
        self.max_usage = Some(max);
        self
    }

    /// Inclusive validity window; either bound may be open.
    pub fn window(mut self, start: Option<NaiveDate>, end: Option<NaiveDate>) -> Self {
        self.start_date = start;
        self.end_date = end;
        self
    }

    fn validate(&self) -> Result<String, ValidationError> {
        let code = validate_coupon_code(&self.code)?;

        let max_value = match self.discount_type {
            DiscountType::Percentage => FULL_PERCENT_BPS as i64,
            DiscountType::Fixed => i64::MAX,
        };
        if !(0..=max_value).contains(&self.discount_value) {
            return Err(ValidationError::OutOfRange {
                field: "discount_value".to_string(),
                min: 0,
                max: max_value,
            });
        }

        if let Some(max) = self.max_usage {
            if max < 0 {
                return Err(ValidationError::OutOfRange {
                    field: "max_usage".to_string(),
                    min: 0,
                    max: i64::MAX,
                });
            }
        }

        if let (Some(start), Some(end)) = (self.start_date, self.end_date) {
            if start > end {
                return Err(ValidationError::InvalidFormat {
                    field: "end_date".to_string(),
                    reason: "must not be before start_date".to_string(),
                });
            }
        }

        Ok(code)
    }
}

// =============================================================================
// Repository
// =============================================================================

/// Repository for coupon operations.
#[derive(Debug, Clone)]
pub struct CouponRepository {
    pool: SqlitePool,
}

impl CouponRepository {
    /// Creates a new CouponRepository.
    pub fn new(pool: SqlitePool) -> Self {
        CouponRepository { pool }
    }

    /// Attaches `coupon_id` to the pending order `order_id`, swapping out any
    /// coupon already attached.
    ///
    /// ## Errors
    /// * `Rejected(OrderNotFound)` - no live order with that id
    /// * `Rejected(InvalidOrderStatus)` - the order is past `pending`
    /// * `Rejected(ResourceNotFound)` - no such coupon
    /// * `Rejected(CouponConflict)` - ineligible or exhausted; the order
    ///   keeps its previous coupon
    /// * `VersionConflict` - the version moved underneath us; safe to re-run
    pub async fn try_apply(&self, order_id: &str, coupon_id: &str, today: NaiveDate) -> DbResult<Order> {
        let mut tx = begin_write(&self.pool).await?;
        let order = apply_to_order(&mut tx, order_id, coupon_id, today).await?;
        tx.commit().await?;
        Ok(order)
    }

    /// Removes the coupon from a pending order and gives its use back.
    pub async fn detach(&self, order_id: &str) -> DbResult<Order> {
        let mut tx = begin_write(&self.pool).await?;
        let order = detach_from_order(&mut tx, order_id).await?;
        tx.commit().await?;
        Ok(order)
    }

    /// Creates a coupon. The code is stored upper-cased.
    pub async fn insert(&self, new: NewCoupon) -> DbResult<Coupon> {
        let code = new.validate()?;
        let now = Utc::now();

        let coupon = Coupon {
            id: Uuid::new_v4().to_string(),
            code,
            discount_type: new.discount_type,
            discount_value: new.discount_value,
            target: new.target,
            minimum_order_cents: new.minimum_order_cents,
            maximum_discount_cents: new.maximum_discount_cents,
            times_used: 0,
            max_usage: new.max_usage,
            start_date: new.start_date,
            end_date: new.end_date,
            version: 0,
            is_active: true,
            created_at: now,
            updated_at: now,
        };

        debug!(id = %coupon.id, code = %coupon.code, "Inserting coupon");

        sqlx::query(
            r#"
            INSERT INTO coupons (
                id, code, discount_type, discount_value, target,
                minimum_order_cents, maximum_discount_cents,
                times_used, max_usage, start_date, end_date,
                version, is_active, created_at, updated_at
            ) VALUES (
                ?1, ?2, ?3, ?4, ?5,
                ?6, ?7,
                ?8, ?9, ?10, ?11,
                ?12, ?13, ?14, ?15
            )
            "#,
        )
        .bind(&coupon.id)
        .bind(&coupon.code)
        .bind(coupon.discount_type)
        .bind(coupon.discount_value)
        .bind(coupon.target)
        .bind(coupon.minimum_order_cents)
        .bind(coupon.maximum_discount_cents)
        .bind(coupon.times_used)
        .bind(coupon.max_usage)
        .bind(coupon.start_date)
        .bind(coupon.end_date)
        .bind(coupon.version)
        .bind(coupon.is_active)
        .bind(coupon.created_at)
        .bind(coupon.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| match DbError::from(e) {
            DbError::UniqueViolation { field, .. } => DbError::UniqueViolation {
                field,
                value: coupon.code.clone(),
            },
            other => other,
        })?;

        Ok(coupon)
    }

    /// Gets a coupon by ID.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Coupon>> {
        let mut conn = self.pool.acquire().await?;
        fetch_coupon(&mut conn, id).await
    }

    /// Gets a coupon by its (case-insensitive) code.
    pub async fn get_by_code(&self, code: &str) -> DbResult<Option<Coupon>> {
        let code = validate_coupon_code(code)?;

        let coupon = sqlx::query_as::<_, Coupon>(&format!("{COUPON_SELECT} WHERE code = ?1"))
            .bind(code)
            .fetch_optional(&self.pool)
            .await?;

        Ok(coupon)
    }

    /// Adds products to a coupon's scope.
    pub async fn attach_products(&self, coupon_id: &str, product_ids: &[&str]) -> DbResult<()> {
        let mut tx = begin_write(&self.pool).await?;
        for product_id in product_ids {
            sqlx::query("INSERT OR IGNORE INTO coupon_products (coupon_id, product_id) VALUES (?1, ?2)")
                .bind(coupon_id)
                .bind(product_id)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Adds categories (and so everything below them) to a coupon's scope.
    pub async fn attach_categories(&self, coupon_id: &str, category_ids: &[&str]) -> DbResult<()> {
        let mut tx = begin_write(&self.pool).await?;
        for category_id in category_ids {
            sqlx::query("INSERT OR IGNORE INTO coupon_categories (coupon_id, category_id) VALUES (?1, ?2)")
                .bind(coupon_id)
                .bind(category_id)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// A coupon together with its resolved product scope.
    pub async fn scoped(&self, coupon_id: &str) -> DbResult<ScopedCoupon> {
        let mut conn = self.pool.acquire().await?;
        let coupon = fetch_coupon(&mut conn, coupon_id)
            .await?
            .ok_or_else(|| DbError::not_found("Coupon", coupon_id))?;
        scope(&mut conn, coupon).await
    }

    /// Enables or disables a coupon. Bumps the version so in-flight
    /// applications that read the old row lose their race.
    pub async fn set_active(&self, coupon_id: &str, active: bool) -> DbResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE coupons SET
                is_active = ?2,
                version = version + 1,
                updated_at = ?3
            WHERE id = ?1
            "#,
        )
        .bind(coupon_id)
        .bind(active)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Coupon", coupon_id));
        }

        info!(coupon_id = %coupon_id, active, "Coupon availability changed");
        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 6, 1).unwrap()
    }

    /// Shopper with a pending order worth $50 (one product, one line).
    async fn order_worth_fifty(db: &Database, user: &str) -> (Order, String) {
        let product = db.catalog().insert_product("Jacket").await.unwrap();
        let variant = db
            .catalog()
            .insert_variant(&product.id, &format!("JKT-{user}"), 10, 5000, None)
            .await
            .unwrap();
        db.carts().upsert(user, &variant.id, 1).await.unwrap();
        let materialized = db
            .orders()
            .materialize(user, &[variant.id.clone()], today())
            .await
            .unwrap();
        (materialized.order, product.id)
    }

    #[tokio::test]
    async fn test_apply_percentage_coupon() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let (order, _) = order_worth_fifty(&db, "u-1").await;
        let coupon = db
            .coupons()
            .insert(NewCoupon::percentage("save10", 1000))
            .await
            .unwrap();
        assert_eq!(coupon.code, "SAVE10");

        let applied = db.coupons().try_apply(&order.id, &coupon.id, today()).await.unwrap();
        assert_eq!(applied.coupon_id.as_deref(), Some(coupon.id.as_str()));
        assert_eq!(applied.final_total_cents, 4500);

        let stored = db.coupons().get_by_id(&coupon.id).await.unwrap().unwrap();
        assert_eq!(stored.times_used, 1);
        assert_eq!(stored.version, 1);

        // Re-applying the same coupon is a no-op.
        db.coupons().try_apply(&order.id, &coupon.id, today()).await.unwrap();
        let stored = db.coupons().get_by_code("SAVE10").await.unwrap().unwrap();
        assert_eq!(stored.times_used, 1);
    }

    #[tokio::test]
    async fn test_swap_releases_previous_coupon() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let (order, _) = order_worth_fifty(&db, "u-1").await;
        let first = db.coupons().insert(NewCoupon::fixed("FIVE", 500)).await.unwrap();
        let second = db.coupons().insert(NewCoupon::fixed("TEN", 1000)).await.unwrap();

        db.coupons().try_apply(&order.id, &first.id, today()).await.unwrap();
        let swapped = db.coupons().try_apply(&order.id, &second.id, today()).await.unwrap();
        assert_eq!(swapped.final_total_cents, 4000);

        let first = db.coupons().get_by_id(&first.id).await.unwrap().unwrap();
        let second = db.coupons().get_by_id(&second.id).await.unwrap().unwrap();
        assert_eq!(first.times_used, 0);
        assert_eq!(first.version, 2);
        assert_eq!(second.times_used, 1);
    }

    #[tokio::test]
    async fn test_exhausted_coupon_conflicts_and_keeps_previous() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let (first_order, _) = order_worth_fifty(&db, "u-1").await;
        let (second_order, _) = order_worth_fifty(&db, "u-2").await;
        let keep = db.coupons().insert(NewCoupon::fixed("KEEP", 100)).await.unwrap();
        let scarce = db
            .coupons()
            .insert(NewCoupon::fixed("ONCE", 500).max_usage(1))
            .await
            .unwrap();

        db.coupons().try_apply(&first_order.id, &scarce.id, today()).await.unwrap();
        db.coupons().try_apply(&second_order.id, &keep.id, today()).await.unwrap();

        let err = db
            .coupons()
            .try_apply(&second_order.id, &scarce.id, today())
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Rejected(CoreError::CouponConflict { .. })));
        assert!(!err.is_retryable_conflict());

        let order = db.orders().get_order(&second_order.id).await.unwrap().unwrap();
        assert_eq!(order.coupon_id.as_deref(), Some(keep.id.as_str()));
        assert_eq!(order.final_total_cents, 4900);
        let keep = db.coupons().get_by_id(&keep.id).await.unwrap().unwrap();
        assert_eq!(keep.times_used, 1);
    }

    #[tokio::test]
    async fn test_ineligible_coupons_are_rejected() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let (order, _) = order_worth_fifty(&db, "u-1").await;

        let big_minimum = db
            .coupons()
            .insert(NewCoupon::fixed("BIG", 500).minimum_order(10_000))
            .await
            .unwrap();
        let expired = db
            .coupons()
            .insert(NewCoupon::fixed("OLD", 500).window(None, NaiveDate::from_ymd_opt(2026, 1, 31)))
            .await
            .unwrap();

        for coupon_id in [&big_minimum.id, &expired.id] {
            let err = db
                .coupons()
                .try_apply(&order.id, coupon_id, today())
                .await
                .unwrap_err();
            assert!(matches!(err, DbError::Rejected(CoreError::CouponConflict { .. })));
            assert!(!err.is_retryable_conflict());
        }

        assert!(matches!(
            db.coupons().try_apply(&order.id, "missing", today()).await,
            Err(DbError::Rejected(CoreError::ResourceNotFound { .. }))
        ));
        assert!(matches!(
            db.coupons().try_apply("missing", &expired.id, today()).await,
            Err(DbError::Rejected(CoreError::OrderNotFound(_)))
        ));
    }

    #[tokio::test]
    async fn test_stale_version_loses() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let coupon = db.coupons().insert(NewCoupon::fixed("RACE", 100)).await.unwrap();
        let mut stale = coupon.clone();

        // Another writer moves the version on.
        db.coupons().set_active(&coupon.id, true).await.unwrap();

        let mut conn = db.pool().acquire().await.unwrap();
        let err = take_slot(&mut conn, &stale, Money::from_cents(5000), today())
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::VersionConflict { .. }));
        assert!(err.is_retryable_conflict());

        stale.version += 1;
        take_slot(&mut conn, &stale, Money::from_cents(5000), today())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_single_target_scope_follows_category_tree() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let catalog = db.catalog();
        let apparel = catalog.insert_category("Apparel", None).await.unwrap();
        let shirts = catalog.insert_category("Shirts", Some(&apparel.id)).await.unwrap();
        let shirt = catalog.insert_product("Oxford Shirt").await.unwrap();
        let mug = catalog.insert_product("Mug").await.unwrap();
        let poster = catalog.insert_product("Poster").await.unwrap();
        catalog.assign_category(&shirt.id, &shirts.id).await.unwrap();

        let coupon = db
            .coupons()
            .insert(NewCoupon::percentage("APPAREL", 2000).single())
            .await
            .unwrap();
        db.coupons().attach_categories(&coupon.id, &[apparel.id.as_str()]).await.unwrap();
        db.coupons().attach_products(&coupon.id, &[poster.id.as_str()]).await.unwrap();

        let scoped = db.coupons().scoped(&coupon.id).await.unwrap();
        assert!(scoped.eligible_products.contains(&shirt.id));
        assert!(scoped.eligible_products.contains(&poster.id));
        assert!(!scoped.eligible_products.contains(&mug.id));
    }

    #[tokio::test]
    async fn test_detach_restores_subtotal() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let (order, _) = order_worth_fifty(&db, "u-1").await;
        let coupon = db.coupons().insert(NewCoupon::fixed("FIVE", 500)).await.unwrap();

        db.coupons().try_apply(&order.id, &coupon.id, today()).await.unwrap();
        let detached = db.coupons().detach(&order.id).await.unwrap();
        assert!(detached.coupon_id.is_none());
        assert_eq!(detached.final_total_cents, detached.sub_total_cents);

        let coupon = db.coupons().get_by_id(&coupon.id).await.unwrap().unwrap();
        assert_eq!(coupon.times_used, 0);
    }

    #[tokio::test]
    async fn test_insert_validation() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        assert!(db.coupons().insert(NewCoupon::percentage("TOO_MUCH", 10_001)).await.is_err());
        assert!(db.coupons().insert(NewCoupon::fixed("bad code", 100)).await.is_err());

        db.coupons().insert(NewCoupon::fixed("DUP", 100)).await.unwrap();
        assert!(matches!(
            db.coupons().insert(NewCoupon::fixed("dup", 100)).await,
            Err(DbError::UniqueViolation { ref value, .. }) if value == "DUP"
        ));
    }
}
