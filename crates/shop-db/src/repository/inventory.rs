//! # Inventory Ledger
//!
//! Stock reservation and release for variants.
//!
//! ## Reservation
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  reserve(conn, variant, q)                                             │
//! │                                                                         │
//! │    UPDATE variants SET stock = stock - q                               │
//! │    WHERE id = ? AND stock >= q          ← one statement, no read first │
//! │                                                                         │
//! │    rows_affected == 1  → reserved                                      │
//! │    rows_affected == 0  → InsufficientStock (or unknown variant)        │
//! │                                                                         │
//! │  Two requests racing for the last unit: the database serializes the    │
//! │  two UPDATEs; the second one sees stock = 0 and matches no row.        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Transactions
//! Every function here runs on the caller's connection, which is normally an
//! open transaction. Nothing here commits, rolls back, or retries: a failed
//! `reserve_all` leaves earlier lines decremented inside the caller's
//! transaction, and the caller's rollback restores them.
//!
//! ## Lock Order
//! `reserve_all` / `release_all` merge duplicate variants and apply lines in
//! ascending variant-id order, so two multi-line checkouts always touch rows
//! in the same order.

use sqlx::{SqliteConnection, SqlitePool};
use std::collections::BTreeMap;
use tracing::{debug, warn};

use crate::error::{DbError, DbResult};
use crate::pool::begin_write;
use shop_core::validation::validate_quantity;
use shop_core::{CoreError, OrderItem};

// =============================================================================
// Stock Lines
// =============================================================================

/// A quantity of one variant to reserve or release.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockLine {
    pub variant_id: String,
    pub quantity: i64,
}

impl StockLine {
    pub fn new(variant_id: impl Into<String>, quantity: i64) -> Self {
        StockLine {
            variant_id: variant_id.into(),
            quantity,
        }
    }
}

impl From<&OrderItem> for StockLine {
    fn from(item: &OrderItem) -> Self {
        StockLine::new(item.variant_id.clone(), item.quantity)
    }
}

/// Builds stock lines from order items.
pub fn lines_of(items: &[OrderItem]) -> Vec<StockLine> {
    items.iter().map(StockLine::from).collect()
}

/// Sums quantities per variant; the result is sorted by variant id.
fn merge_lines(lines: &[StockLine]) -> Vec<StockLine> {
    let mut merged: BTreeMap<&str, i64> = BTreeMap::new();
    for line in lines {
        *merged.entry(line.variant_id.as_str()).or_insert(0) += line.quantity;
    }
    merged
        .into_iter()
        .map(|(variant_id, quantity)| StockLine::new(variant_id, quantity))
        .collect()
}

// =============================================================================
// Ledger Operations
// =============================================================================

/// Atomically takes `quantity` units of `variant_id`.
///
/// ## Errors
/// * `Rejected(InsufficientStock)` - fewer than `quantity` units left, or the
///   variant does not exist
/// * `Rejected(Validation)` - `quantity` is not positive
pub async fn reserve(conn: &mut SqliteConnection, variant_id: &str, quantity: i64) -> DbResult<()> {
    validate_quantity(quantity)?;

    let result = sqlx::query(
        r#"
        UPDATE variants SET
            stock = stock - ?2,
            updated_at = ?3
        WHERE id = ?1 AND stock >= ?2
        "#,
    )
    .bind(variant_id)
    .bind(quantity)
    .bind(chrono::Utc::now())
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        debug!(variant_id = %variant_id, requested = quantity, "Reservation rejected");
        return Err(CoreError::InsufficientStock {
            variant_id: variant_id.to_string(),
            requested: quantity,
        }
        .into());
    }

    debug!(variant_id = %variant_id, quantity, "Stock reserved");
    Ok(())
}

/// Returns `quantity` units of `variant_id` to stock.
///
/// ## Errors
/// * `NotFound` - the variant no longer exists
pub async fn release(conn: &mut SqliteConnection, variant_id: &str, quantity: i64) -> DbResult<()> {
    validate_quantity(quantity)?;

    let result = sqlx::query(
        r#"
        UPDATE variants SET
            stock = stock + ?2,
            updated_at = ?3
        WHERE id = ?1
        "#,
    )
    .bind(variant_id)
    .bind(quantity)
    .bind(chrono::Utc::now())
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::not_found("Variant", variant_id));
    }

    debug!(variant_id = %variant_id, quantity, "Stock released");
    Ok(())
}

/// Reserves every line in ascending variant-id order.
///
/// Stops at the first shortage; the caller must roll back its transaction
/// to undo the lines already taken.
pub async fn reserve_all(conn: &mut SqliteConnection, lines: &[StockLine]) -> DbResult<()> {
    for line in merge_lines(lines) {
        reserve(conn, &line.variant_id, line.quantity).await?;
    }
    Ok(())
}

/// Releases every line in ascending variant-id order.
///
/// Order lines keep their variant id after the variant is deleted from the
/// catalog. Such lines have no stock to return and are skipped, so unwinding
/// an order never fails on them. Returns how many lines were restocked.
pub async fn release_all(conn: &mut SqliteConnection, lines: &[StockLine]) -> DbResult<usize> {
    let mut restocked = 0;
    for line in merge_lines(lines) {
        match release(conn, &line.variant_id, line.quantity).await {
            Ok(()) => restocked += 1,
            Err(DbError::NotFound { .. }) => {
                warn!(variant_id = %line.variant_id, quantity = line.quantity, "Variant no longer exists, stock not returned");
            }
            Err(err) => return Err(err),
        }
    }
    Ok(restocked)
}

// =============================================================================
// Read Side
// =============================================================================

/// Current stock of a variant, read on the caller's connection.
pub async fn stock_of(conn: &mut SqliteConnection, variant_id: &str) -> DbResult<i64> {
    let stock: Option<i64> = sqlx::query_scalar("SELECT stock FROM variants WHERE id = ?1")
        .bind(variant_id)
        .fetch_optional(&mut *conn)
        .await?;

    stock.ok_or_else(|| DbError::not_found("Variant", variant_id))
}

/// Pool-backed read access to stock levels.
#[derive(Debug, Clone)]
pub struct InventoryLedger {
    pool: SqlitePool,
}

impl InventoryLedger {
    /// Creates a new InventoryLedger.
    pub fn new(pool: SqlitePool) -> Self {
        InventoryLedger { pool }
    }

    /// Current stock of a variant.
    pub async fn stock_level(&self, variant_id: &str) -> DbResult<i64> {
        let stock: Option<i64> = sqlx::query_scalar("SELECT stock FROM variants WHERE id = ?1")
            .bind(variant_id)
            .fetch_optional(&self.pool)
            .await?;

        stock.ok_or_else(|| DbError::not_found("Variant", variant_id))
    }

    /// Reserves `lines` in a transaction of its own: all or nothing.
    pub async fn reserve_lines(&self, lines: &[StockLine]) -> DbResult<()> {
        let mut tx = begin_write(&self.pool).await?;
        reserve_all(&mut *tx, lines).await?;
        tx.commit().await?;
        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
