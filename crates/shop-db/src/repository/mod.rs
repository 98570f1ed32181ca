//! # Repository Module
//!
//! Database repository implementations for the checkout core.
//!
//! ## Two Access Styles
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Pool-backed repositories         Connection-scoped functions          │
//! │  (own their transaction)          (run inside the caller's one)        │
//! │                                                                         │
//! │  db.orders().materialize(..)      order::record_checkout(&mut tx, ..)  │
//! │  db.coupons().try_apply(..)       coupon::confirm_active(&mut tx, ..)  │
//! │  db.catalog().insert_variant(..)  inventory::reserve_all(&mut tx, ..)  │
//! │                                                                         │
//! │  Checkout and settlement compose the right-hand column into a single   │
//! │  transaction; everything else uses the left-hand column.               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`OrderRepository`](order::OrderRepository) - Cart materializer, order reads
//! - [`CouponRepository`](coupon::CouponRepository) - Coupon ledger
//! - [`InventoryLedger`](inventory::InventoryLedger) - Stock reads
//! - [`CatalogRepository`](catalog::CatalogRepository) - Products, categories, variants
//! - [`CartRepository`](cart::CartRepository) - Cart lines
//! - [`AddressRepository`](address::AddressRepository) - Shipping addresses

pub mod address;
pub mod cart;
pub mod catalog;
pub mod coupon;
pub mod inventory;
pub mod order;
