//! # Seed Data Generator
//!
//! Populates the database with a small demo storefront for development.
//!
//! ## Usage
//! ```bash
//! # Seed ./shop_dev.db with the demo catalog
//! cargo run -p shop-db --bin seed
//!
//! # Specify database path and number of variants per product
//! cargo run -p shop-db --bin seed -- --db ./data/shop.db --sizes 3
//! ```
//!
//! ## Generated Data
//! - Category tree: Apparel > Shirts, Apparel > Outerwear, Home
//! - Products in each category, one variant per size with stock 0 - 24
//! - Coupons: `WELCOME10` (10% off everything, 100 uses),
//!   `SHIRTS5` ($5 off each shirt line), `BIGSPEND` ($15 off orders of $100+)
//! - Shopper `demo-user` with an address and two cart lines

use chrono::Utc;
use std::env;
use shop_db::{Database, DbConfig, NewCoupon};

/// Demo catalog: (category path, products with base price in cents).
const CATALOG: &[(&str, Option<&str>, &[(&str, i64)])] = &[
    ("Shirts", Some("Apparel"), &[("Oxford Shirt", 3900), ("Linen Shirt", 4500), ("Graphic Tee", 1900)]),
    ("Outerwear", Some("Apparel"), &[("Rain Jacket", 8900), ("Fleece", 5900)]),
    ("Home", None, &[("Stoneware Mug", 1400), ("Wool Throw", 6900), ("Desk Lamp", 4900)]),
];

const SIZES: &[&str] = &["S", "M", "L", "XL"];

const DEMO_USER: &str = "demo-user";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = env::args().collect();

    let mut db_path = String::from("./shop_dev.db");
    let mut sizes: usize = SIZES.len();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = args[i + 1].clone();
                    i += 1;
                }
            }
            "--sizes" | "-s" => {
                if i + 1 < args.len() {
                    sizes = args[i + 1].parse().unwrap_or(SIZES.len()).clamp(1, SIZES.len());
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Storefront Seed Data Generator");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -d, --db <PATH>    Database file path (default: ./shop_dev.db)");
                println!("  -s, --sizes <N>    Variants per product, 1-4 (default: 4)");
                println!("  -h, --help         Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    println!("🌱 Storefront Seed Data Generator");
    println!("================================");
    println!("Database: {}", db_path);
    println!();

    let db = Database::new(DbConfig::new(&db_path)).await?;

    println!("✓ Connected to database");
    println!("✓ Migrations applied");

    if db.coupons().get_by_code("WELCOME10").await?.is_some() {
        println!("⚠ Database is already seeded");
        println!("  Delete the database file to regenerate.");
        return Ok(());
    }

    let catalog = db.catalog();
    let apparel = catalog.insert_category("Apparel", None).await?;

    let mut shirts_category = None;
    let mut variants = Vec::new();
    let mut seed = 0usize;

    for (category_name, parent, products) in CATALOG {
        let parent_id = parent.map(|_| apparel.id.as_str());
        let category = catalog.insert_category(category_name, parent_id).await?;
        if *category_name == "Shirts" {
            shirts_category = Some(category.id.clone());
        }

        for (name, base_price) in products.iter() {
            let product = catalog.insert_product(name).await?;
            catalog.assign_category(&product.id, &category.id).await?;

            for size in SIZES.iter().take(sizes) {
                seed += 1;
                let sku = format!(
                    "{}-{}",
                    name.replace(' ', "").to_uppercase(),
                    size
                );
                let stock = (seed * 7 % 25) as i64;
                // Every third variant is on sale at 80%.
                let sale = (seed % 3 == 0).then_some(base_price * 80 / 100);
                let variant = catalog
                    .insert_variant(&product.id, &sku, stock, *base_price, sale)
                    .await?;
                variants.push(variant);
            }
        }
    }

    println!("✓ Created {} variants", variants.len());

    let coupons = db.coupons();
    coupons
        .insert(NewCoupon::percentage("WELCOME10", 1000).max_usage(100))
        .await?;
    let shirts5 = coupons.insert(NewCoupon::fixed("SHIRTS5", 500).single()).await?;
    if let Some(category_id) = shirts_category.as_deref() {
        coupons.attach_categories(&shirts5.id, &[category_id]).await?;
    }
    let today = Utc::now().date_naive();
    coupons
        .insert(
            NewCoupon::fixed("BIGSPEND", 1500)
                .minimum_order(10_000)
                .window(Some(today), today.checked_add_days(chrono::Days::new(30))),
        )
        .await?;

    println!("✓ Created coupons WELCOME10, SHIRTS5, BIGSPEND");

    db.addresses()
        .insert(DEMO_USER, "Demo Shopper", "1 Market Street", "Springfield", "US")
        .await?;
    for variant in variants.iter().filter(|v| v.stock > 0).take(2) {
        db.carts().upsert(DEMO_USER, &variant.id, 1).await?;
    }

    println!("✓ Created shopper '{}' with an address and a cart", DEMO_USER);
    println!();
    println!("✓ Seed complete!");

    Ok(())
}
