//! # Schema Migrations
//!
//! The schema lives in `migrations/sqlite/` at the workspace root and is
//! embedded into the binary at compile time.
//!
//! ```text
//! 001_initial_schema.sql
//!   catalog   products, categories, category_closure, product_categories, variants
//!   shopper   cart_items, shipping_addresses
//!   coupons   coupons (times_used + version), coupon_products, coupon_categories
//!   orders    orders (one live pending order per user), order_items
//! ```
//!
//! Applied files are recorded in `_sqlx_migrations`. Never edit a file that
//! has shipped; add `002_...sql` instead.

use sqlx::SqlitePool;
use tracing::{debug, info};

use crate::error::DbResult;

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("../../migrations/sqlite");

/// Applies every embedded migration not yet recorded. Idempotent.
pub async fn run_migrations(pool: &SqlitePool) -> DbResult<()> {
    let before = schema_version(pool).await?;
    MIGRATOR.run(pool).await?;
    let after = schema_version(pool).await?;

    if before == after {
        debug!(version = ?after, "Schema up to date");
    } else {
        info!(from = ?before, to = ?after, "Schema migrated");
    }
    Ok(())
}

/// Highest applied migration version, `None` on a fresh database.
pub async fn schema_version(pool: &SqlitePool) -> DbResult<Option<i64>> {
    let table: Option<String> = sqlx::query_scalar(
        "SELECT name FROM sqlite_master WHERE type = 'table' AND name = '_sqlx_migrations'",
    )
    .fetch_optional(pool)
    .await?;
    if table.is_none() {
        return Ok(None);
    }

    let version: Option<i64> =
        sqlx::query_scalar("SELECT MAX(version) FROM _sqlx_migrations WHERE success = 1")
            .fetch_one(pool)
            .await?;
    Ok(version)
}

/// Version of the newest embedded migration.
pub fn latest_version() -> Option<i64> {
    MIGRATOR.iter().map(|m| m.version).max()
}
