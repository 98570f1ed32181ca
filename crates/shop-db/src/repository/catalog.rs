//! # Catalog Repository
//!
//! Minimal product / category / variant writes, enough to seed the entities
//! the checkout core reads. Catalog management proper lives elsewhere.
//!
//! ## Category Tree
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Apparel                      category_closure                         │
//! │  └── Shirts                   ancestor   descendant   depth            │
//! │      └── T-Shirts             Apparel    Apparel      0                │
//! │                               Apparel    Shirts       1                │
//! │                               Apparel    T-Shirts     2                │
//! │                               Shirts     Shirts       0                │
//! │                               Shirts     T-Shirts     1                │
//! │                               T-Shirts   T-Shirts     0                │
//! │                                                                         │
//! │  "every product under Apparel" is one join, no recursion:              │
//! │  closure(ancestor = Apparel) ⋈ product_categories                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use crate::pool::begin_write;
use shop_core::validation::validate_price_cents;
use shop_core::{Category, Product, ValidationError, Variant};

/// Repository for catalog writes and lookups.
#[derive(Debug, Clone)]
pub struct CatalogRepository {
    pool: SqlitePool,
}

impl CatalogRepository {
    /// Creates a new CatalogRepository.
    pub fn new(pool: SqlitePool) -> Self {
        CatalogRepository { pool }
    }

    /// Inserts an active product.
    pub async fn insert_product(&self, name: &str) -> DbResult<Product> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ValidationError::Required {
                field: "name".to_string(),
            }
            .into());
        }

        let product = Product {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            is_active: true,
            created_at: Utc::now(),
        };

        debug!(id = %product.id, name = %product.name, "Inserting product");

        sqlx::query(
            r#"
            INSERT INTO products (id, name, is_active, created_at)
            VALUES (?1, ?2, ?3, ?4)
            "#,
        )
        .bind(&product.id)
        .bind(&product.name)
        .bind(product.is_active)
        .bind(product.created_at)
        .execute(&self.pool)
        .await?;

        Ok(product)
    }

    /// Inserts a category under `parent_id` and extends the closure table.
    pub async fn insert_category(&self, name: &str, parent_id: Option<&str>) -> DbResult<Category> {
        let category = Category {
            id: Uuid::new_v4().to_string(),
            name: name.trim().to_string(),
            parent_id: parent_id.map(str::to_string),
        };

        debug!(id = %category.id, parent_id = ?category.parent_id, "Inserting category");

        let mut tx = begin_write(&self.pool).await?;

        sqlx::query("INSERT INTO categories (id, name, parent_id) VALUES (?1, ?2, ?3)")
            .bind(&category.id)
            .bind(&category.name)
            .bind(&category.parent_id)
            .execute(&mut *tx)
            .await?;

        // Self row, then one row per ancestor of the parent.
        sqlx::query(
            r#"
            INSERT INTO category_closure (ancestor_id, descendant_id, depth)
            SELECT ?1, ?1, 0
            UNION ALL
            SELECT ancestor_id, ?1, depth + 1
            FROM category_closure
            WHERE descendant_id = ?2
            "#,
        )
        .bind(&category.id)
        .bind(&category.parent_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(category)
    }

    /// Places a product in a category.
    pub async fn assign_category(&self, product_id: &str, category_id: &str) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT OR IGNORE INTO product_categories (product_id, category_id)
            VALUES (?1, ?2)
            "#,
        )
        .bind(product_id)
        .bind(category_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Ids of `category_id` and every category below it.
    pub async fn descendants(&self, category_id: &str) -> DbResult<Vec<String>> {
        let ids: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT descendant_id
            FROM category_closure
            WHERE ancestor_id = ?1
            ORDER BY depth, descendant_id
            "#,
        )
        .bind(category_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(ids)
    }

    /// Inserts a variant with an initial stock level.
    pub async fn insert_variant(
        &self,
        product_id: &str,
        sku: &str,
        stock: i64,
        price_cents: i64,
        discount_price_cents: Option<i64>,
    ) -> DbResult<Variant> {
        validate_price_cents(price_cents)?;
        if let Some(discount) = discount_price_cents {
            validate_price_cents(discount)?;
        }
        if stock < 0 {
            return Err(ValidationError::OutOfRange {
                field: "stock".to_string(),
                min: 0,
                max: i64::MAX,
            }
            .into());
        }

        let now = Utc::now();
        let variant = Variant {
            id: Uuid::new_v4().to_string(),
            product_id: product_id.to_string(),
            sku: sku.to_string(),
            stock,
            price_cents,
            discount_price_cents,
            created_at: now,
            updated_at: now,
        };

        debug!(id = %variant.id, sku = %variant.sku, stock, "Inserting variant");

        sqlx::query(
            r#"
            INSERT INTO variants (
                id, product_id, sku, stock,
                price_cents, discount_price_cents,
                created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(&variant.id)
        .bind(&variant.product_id)
        .bind(&variant.sku)
        .bind(variant.stock)
        .bind(variant.price_cents)
        .bind(variant.discount_price_cents)
        .bind(variant.created_at)
        .bind(variant.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(variant)
    }

    /// Gets a variant by ID.
    pub async fn get_variant(&self, id: &str) -> DbResult<Option<Variant>> {
        let variant = sqlx::query_as::<_, Variant>(
            r#"
            SELECT
                id, product_id, sku, stock,
                price_cents, discount_price_cents,
                created_at, updated_at
            FROM variants
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(variant)
    }

    /// Reprices a variant. Existing order lines keep their snapshot.
    pub async fn set_price(
        &self,
        variant_id: &str,
        price_cents: i64,
        discount_price_cents: Option<i64>,
    ) -> DbResult<()> {
        validate_price_cents(price_cents)?;

        let result = sqlx::query(
            r#"
            UPDATE variants SET
                price_cents = ?2,
                discount_price_cents = ?3,
                updated_at = ?4
            WHERE id = ?1
            "#,
        )
        .bind(variant_id)
        .bind(price_cents)
        .bind(discount_price_cents)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Variant", variant_id));
        }

        Ok(())
    }

    /// Removes a variant from the catalog (cart lines cascade).
    pub async fn delete_variant(&self, variant_id: &str) -> DbResult<()> {
        let result = sqlx::query("DELETE FROM variants WHERE id = ?1")
            .bind(variant_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Variant", variant_id));
        }

        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use crate::pool::{Database, DbConfig};
    use crate::DbError;

    #[tokio::test]
    async fn test_category_closure_tracks_every_ancestor() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let catalog = db.catalog();

        let apparel = catalog.insert_category("Apparel", None).await.unwrap();
        let shirts = catalog
            .insert_category("Shirts", Some(&apparel.id))
            .await
            .unwrap();
        let tees = catalog
            .insert_category("T-Shirts", Some(&shirts.id))
            .await
            .unwrap();

        let under_apparel = catalog.descendants(&apparel.id).await.unwrap();
        assert_eq!(under_apparel.len(), 3);
        assert_eq!(under_apparel[0], apparel.id);
        assert!(under_apparel.contains(&tees.id));

        let under_tees = catalog.descendants(&tees.id).await.unwrap();
        assert_eq!(under_tees, vec![tees.id.clone()]);
    }

    #[tokio::test]
    async fn test_variant_insert_and_reprice() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let catalog = db.catalog();

        let product = catalog.insert_product("Poster").await.unwrap();
        let variant = catalog
            .insert_variant(&product.id, "POSTER-A2", 4, 1500, Some(1200))
            .await
            .unwrap();

        let stored = catalog.get_variant(&variant.id).await.unwrap().unwrap();
        assert_eq!(stored.stock, 4);
        assert_eq!(stored.effective_price().cents(), 1200);

        catalog.set_price(&variant.id, 1800, None).await.unwrap();
        let stored = catalog.get_variant(&variant.id).await.unwrap().unwrap();
        assert_eq!(stored.effective_price().cents(), 1800);

        assert!(matches!(
            catalog
                .insert_variant(&product.id, "POSTER-A2", 1, 100, None)
                .await,
            Err(DbError::UniqueViolation { .. })
        ));
        assert!(catalog
            .insert_variant(&product.id, "POSTER-A3", -1, 100, None)
            .await
            .is_err());
    }
}
