//! # Cart Repository
//!
//! The shopper's cart lines. One row per (shopper, variant); adding the same
//! variant again overwrites the quantity.

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;
use uuid::Uuid;

use crate::error::DbResult;
use shop_core::validation::validate_quantity;
use shop_core::CartItem;

/// Repository for cart lines.
#[derive(Debug, Clone)]
pub struct CartRepository {
    pool: SqlitePool,
}

impl CartRepository {
    /// Creates a new CartRepository.
    pub fn new(pool: SqlitePool) -> Self {
        CartRepository { pool }
    }

    /// Sets the quantity of `variant_id` in the shopper's cart.
    pub async fn upsert(&self, user_id: &str, variant_id: &str, quantity: i64) -> DbResult<CartItem> {
        validate_quantity(quantity)?;

        debug!(user_id = %user_id, variant_id = %variant_id, quantity, "Upserting cart line");

        sqlx::query(
            r#"
            INSERT INTO cart_items (id, user_id, variant_id, quantity, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT (user_id, variant_id) DO UPDATE SET quantity = excluded.quantity
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(user_id)
        .bind(variant_id)
        .bind(quantity)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        let item = sqlx::query_as::<_, CartItem>(
            r#"
            SELECT id, user_id, variant_id, quantity, created_at
            FROM cart_items
            WHERE user_id = ?1 AND variant_id = ?2
            "#,
        )
        .bind(user_id)
        .bind(variant_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(item)
    }

    /// Removes a line; returns false if it was not there.
    pub async fn remove(&self, user_id: &str, variant_id: &str) -> DbResult<bool> {
        let result = sqlx::query("DELETE FROM cart_items WHERE user_id = ?1 AND variant_id = ?2")
            .bind(user_id)
            .bind(variant_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// All lines in the shopper's cart.
    pub async fn list(&self, user_id: &str) -> DbResult<Vec<CartItem>> {
        let items = sqlx::query_as::<_, CartItem>(
            r#"
            SELECT id, user_id, variant_id, quantity, created_at
            FROM cart_items
            WHERE user_id = ?1
            ORDER BY variant_id
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(items)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
