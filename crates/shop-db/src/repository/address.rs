//! # Shipping Address Repository
//!
//! The address book is owned by another service; the checkout core only
//! needs to store a few rows for tests and answer one question: does this
//! address id belong to this shopper?

use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use uuid::Uuid;

use crate::error::DbResult;
use shop_core::{ShippingAddress, ValidationError};

/// Resolves `address_id` for `user_id`; `None` if missing or someone else's.
pub async fn resolve_for_user(
    conn: &mut SqliteConnection,
    user_id: &str,
    address_id: &str,
) -> DbResult<Option<ShippingAddress>> {
    let address = sqlx::query_as::<_, ShippingAddress>(
        r#"
        SELECT id, user_id, recipient, line1, city, country, created_at
        FROM shipping_addresses
        WHERE id = ?1 AND user_id = ?2
        "#,
    )
    .bind(address_id)
    .bind(user_id)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(address)
}

/// Repository for shipping addresses.
#[derive(Debug, Clone)]
pub struct AddressRepository {
    pool: SqlitePool,
}

impl AddressRepository {
    /// Creates a new AddressRepository.
    pub fn new(pool: SqlitePool) -> Self {
        AddressRepository { pool }
    }

    /// Stores an address for a shopper.
    pub async fn insert(
        &self,
        user_id: &str,
        recipient: &str,
        line1: &str,
        city: &str,
        country: &str,
    ) -> DbResult<ShippingAddress> {
        for (field, value) in [("recipient", recipient), ("line1", line1), ("city", city)] {
            if value.trim().is_empty() {
                return Err(ValidationError::Required {
                    field: field.to_string(),
                }
                .into());
            }
        }

        let address = ShippingAddress {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            recipient: recipient.trim().to_string(),
            line1: line1.trim().to_string(),
            city: city.trim().to_string(),
            country: country.trim().to_uppercase(),
            created_at: Utc::now(),
        };

        sqlx::query(
            r#"
            INSERT INTO shipping_addresses (id, user_id, recipient, line1, city, country, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(&address.id)
        .bind(&address.user_id)
        .bind(&address.recipient)
        .bind(&address.line1)
        .bind(&address.city)
        .bind(&address.country)
        .bind(address.created_at)
        .execute(&self.pool)
        .await?;

        Ok(address)
    }

    /// Pool-backed [`resolve_for_user`].
    pub async fn resolve(&self, user_id: &str, address_id: &str) -> DbResult<Option<ShippingAddress>> {
        let mut conn = self.pool.acquire().await?;
        resolve_for_user(&mut conn, user_id, address_id).await
    }

    /// Deletes an address; orders pointing at it lose the reference.
    pub async fn delete(&self, address_id: &str) -> DbResult<bool> {
        let result = sqlx::query("DELETE FROM shipping_addresses WHERE id = ?1")
            .bind(address_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
