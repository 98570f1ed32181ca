//! Racing shoppers: stock never goes negative and coupons never exceed
//! their usage cap.

mod common;

use common::Store;
use shop_checkout::{CheckoutError, CheckoutService};
use shop_core::{CoreError, OrderStatus, Variant};
use shop_db::{DbError, NewCoupon, StockLine};

/// Gives `user_id` a pending order for `quantity` of `variant`, with an
/// address on file. Returns the order id.
async fn shopper_with_order(store: &Store, user_id: &str, variant: &Variant, quantity: i64) -> String {
    store.add_to_cart(user_id, variant, quantity).await;
    let pending = store
        .service
        .materialize(user_id, &[variant.id.clone()])
        .await
        .unwrap();
    let address = store
        .db
        .addresses()
        .insert(user_id, "Racer", "2 Side Street", "Springfield", "US")
        .await
        .unwrap();
    store
        .service
        .set_shipping_address(user_id, &address.id)
        .await
        .unwrap();
    pending.order.id
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_parallel_reservations_never_oversell() {
    let store = Store::new().await;
    let tee = store.shirt("TEE-M", 5, 2500).await;

    let mut handles = Vec::new();
    for _ in 0..12 {
        let inventory = store.db.inventory();
        let line = StockLine::new(tee.id.clone(), 1);
        handles.push(tokio::spawn(async move {
            inventory.reserve_lines(&[line]).await
        }));
    }

    let mut reserved = 0;
    let mut refused = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(()) => reserved += 1,
            Err(DbError::Rejected(CoreError::InsufficientStock { .. })) => refused += 1,
            Err(other) => panic!("unexpected error: {other:?}"),
        }
    }

    assert_eq!(reserved, 5);
    assert_eq!(refused, 7);
    assert_eq!(store.stock(&tee).await, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_coupon_usage_cap_holds_under_contention() {
    let store = Store::new().await;
    let tee = store.shirt("TEE-M", 50, 2500).await;
    let coupon = store
        .coupon(NewCoupon::percentage("FIRST3", 1000).max_usage(3))
        .await;

    let mut orders = Vec::new();
    for n in 0..8 {
        orders.push(shopper_with_order(&store, &format!("racer-{n}"), &tee, 1).await);
    }

    let mut handles = Vec::new();
    for order_id in orders {
        let service: CheckoutService = store.service.clone();
        let coupon_id = coupon.id.clone();
        handles.push(tokio::spawn(async move {
            service.apply_coupon(&order_id, &coupon_id).await
        }));
    }

    let mut applied = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(order) => {
                assert_eq!(order.final_total_cents, 2250);
                applied += 1;
            }
            Err(err) => assert!(
                matches!(err.as_rejection(), Some(CoreError::CouponConflict { .. })),
                "unexpected error: {err:?}"
            ),
        }
    }

    let coupon = store.db.coupons().get_by_id(&coupon.id).await.unwrap().unwrap();
    assert_eq!(applied, 3);
    assert_eq!(coupon.times_used, 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_racing_checkouts_share_the_last_units() {
    let store = Store::new().await;
    let tee = store.shirt("TEE-LAST", 3, 2500).await;

    let mut shoppers = Vec::new();
    for n in 0..6 {
        let user_id = format!("racer-{n}");
        shopper_with_order(&store, &user_id, &tee, 1).await;
        shoppers.push(user_id);
    }

    let mut handles = Vec::new();
    for user_id in shoppers {
        let service = store.service.clone();
        handles.push(tokio::spawn(async move {
            service.checkout(&user_id, "cash_on_delivery").await
        }));
    }

    let mut placed = 0;
    let mut sold_out = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(outcome) => {
                assert_eq!(outcome.order.status, OrderStatus::Processing);
                placed += 1;
            }
            Err(CheckoutError::Rejected(CoreError::InsufficientStock { .. })) => sold_out += 1,
            Err(other) => panic!("unexpected error: {other:?}"),
        }
    }

    assert_eq!(placed, 3);
    assert_eq!(sold_out, 3);
    assert_eq!(store.stock(&tee).await, 0);
}

// =============================================================================
// File-backed pool
// =============================================================================
//
// Eight connections on one WAL file: every writer below contends for
// SQLite's write lock instead of queueing for a single pooled connection.

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_parallel_reservations_on_shared_file() {
    let store = Store::on_disk(8).await;
    let tee = store.shirt("TEE-M", 5, 2500).await;

    let mut handles = Vec::new();
    for _ in 0..16 {
        let inventory = store.db.inventory();
        let line = StockLine::new(tee.id.clone(), 1);
        handles.push(tokio::spawn(async move {
            inventory.reserve_lines(&[line]).await
        }));
    }

    let mut reserved = 0;
    let mut refused = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(()) => reserved += 1,
            Err(DbError::Rejected(CoreError::InsufficientStock { .. })) => refused += 1,
            Err(other) => panic!("unexpected error: {other:?}"),
        }
    }

    assert_eq!(reserved, 5);
    assert_eq!(refused, 11);
    assert_eq!(store.stock(&tee).await, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_coupon_usage_cap_on_shared_file() {
    let store = Store::on_disk(8).await;
    let tee = store.shirt("TEE-M", 50, 2500).await;
    let coupon = store
        .coupon(NewCoupon::percentage("FIRST3", 1000).max_usage(3))
        .await;

    let mut orders = Vec::new();
    for n in 0..12 {
        orders.push(shopper_with_order(&store, &format!("racer-{n}"), &tee, 1).await);
    }

    let mut handles = Vec::new();
    for order_id in orders {
        let service = store.service.clone();
        let coupon_id = coupon.id.clone();
        handles.push(tokio::spawn(async move {
            service.apply_coupon(&order_id, &coupon_id).await
        }));
    }

    let mut applied = 0;
    let mut refused = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => applied += 1,
            Err(err) => {
                assert!(
                    matches!(err.as_rejection(), Some(CoreError::CouponConflict { .. })),
                    "unexpected error: {err:?}"
                );
                refused += 1;
            }
        }
    }

    let coupon = store.db.coupons().get_by_id(&coupon.id).await.unwrap().unwrap();
    assert_eq!(applied, 3);
    assert_eq!(refused, 9);
    assert_eq!(coupon.times_used, 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_cod_checkouts_on_shared_file() {
    let store = Store::on_disk(8).await;
    let tee = store.shirt("TEE-M", 100, 2500).await;

    let mut shoppers = Vec::new();
    for n in 0..16 {
        let user_id = format!("racer-{n}");
        shopper_with_order(&store, &user_id, &tee, 1).await;
        shoppers.push(user_id);
    }

    let mut handles = Vec::new();
    for user_id in shoppers {
        let service = store.service.clone();
        handles.push(tokio::spawn(async move {
            service.checkout(&user_id, "cash_on_delivery").await
        }));
    }

    for handle in handles {
        let outcome = handle.await.unwrap().unwrap();
        assert_eq!(outcome.order.status, OrderStatus::Processing);
    }
    assert_eq!(store.stock(&tee).await, 84);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_racing_checkouts_on_shared_file_share_the_last_units() {
    let store = Store::on_disk(8).await;
    let tee = store.shirt("TEE-LAST", 3, 2500).await;

    let mut shoppers = Vec::new();
    for n in 0..10 {
        let user_id = format!("racer-{n}");
        shopper_with_order(&store, &user_id, &tee, 1).await;
        shoppers.push(user_id);
    }

    let mut handles = Vec::new();
    for user_id in shoppers {
        let service = store.service.clone();
        handles.push(tokio::spawn(async move {
            service.checkout(&user_id, "cash_on_delivery").await
        }));
    }

    let mut placed = 0;
    let mut sold_out = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => placed += 1,
            Err(CheckoutError::Rejected(CoreError::InsufficientStock { .. })) => sold_out += 1,
            Err(other) => panic!("unexpected error: {other:?}"),
        }
    }

    assert_eq!(placed, 3);
    assert_eq!(sold_out, 7);
    assert_eq!(store.stock(&tee).await, 0);
}
