//! Shared fixtures for the checkout integration tests.
//!
//! Every test gets its own database (in memory, or a file in a scratch
//! directory for multi-connection runs) and a scripted gateway that stands
//! in for the wallet and card providers.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use shop_checkout::CheckoutService;
use shop_core::{Coupon, Variant};
use shop_db::{Database, DbConfig, NewCoupon};
use shop_payment::{
    NotificationOutcome, NotificationTarget, PaymentError, PaymentGateway, PaymentNotification,
    PaymentRegistry, PaymentResult, PaymentSession, SessionRequest,
};
use tempfile::TempDir;

pub const SHOPPER: &str = "shopper-1";

// =============================================================================
// Scripted Gateway
// =============================================================================

/// How the scripted gateway answers `create_session`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Script {
    Redirect,
    Refuse,
    Hang,
}

/// Provider double.
///
/// Notifications are JSON objects `{"order_id", "ref", "status", "sig"}`;
/// `sig` must equal `"valid"`, `ref` (optional) names the session the
/// callback belongs to, and `status` is `"paid"`, `"failed"` or anything
/// else for an informational event.
pub struct ScriptedGateway {
    name: &'static str,
    script: Script,
    sessions: AtomicUsize,
}

impl ScriptedGateway {
    pub fn new(name: &'static str, script: Script) -> Arc<Self> {
        Arc::new(Self {
            name,
            script,
            sessions: AtomicUsize::new(0),
        })
    }

    pub fn sessions_created(&self) -> usize {
        self.sessions.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PaymentGateway for ScriptedGateway {
    fn name(&self) -> &str {
        self.name
    }

    async fn create_session(&self, request: &SessionRequest) -> PaymentResult<PaymentSession> {
        match self.script {
            Script::Redirect => {
                let n = self.sessions.fetch_add(1, Ordering::SeqCst) + 1;
                Ok(PaymentSession::redirect(
                    format!(
                        "https://{}.test/pay/{}?amount={}",
                        self.name,
                        request.order_id,
                        request.amount.cents()
                    ),
                    format!("{}-session-{}", self.name, n),
                ))
            }
            Script::Refuse => Err(PaymentError::provider(self.name, "resultCode 1001: declined")),
            Script::Hang => {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Err(PaymentError::provider(self.name, "unreachable"))
            }
        }
    }

    fn verify_notification(&self, notification: &PaymentNotification) -> PaymentResult<()> {
        match notification.str_field("sig") {
            Some("valid") => Ok(()),
            _ => Err(PaymentError::InvalidSignature("bad sig".into())),
        }
    }

    async fn lookup_target(
        &self,
        notification: &PaymentNotification,
    ) -> PaymentResult<NotificationTarget> {
        Ok(NotificationTarget::new(
            notification.str_field("order_id").map(str::to_string),
            notification.str_field("ref").map(str::to_string),
        ))
    }

    fn interpret(&self, notification: &PaymentNotification) -> NotificationOutcome {
        match notification.str_field("status") {
            Some("paid") => NotificationOutcome::Succeeded,
            Some("failed") => NotificationOutcome::Failed {
                reason: "declined".into(),
            },
            _ => NotificationOutcome::Pending,
        }
    }
}

pub fn notification(order_id: &str, status: &str) -> PaymentNotification {
    notification_signed(order_id, status, "valid")
}

pub fn notification_signed(order_id: &str, status: &str, sig: &str) -> PaymentNotification {
    let body = json!({ "order_id": order_id, "status": status, "sig": sig });
    PaymentNotification::from_body(body.to_string(), None).unwrap()
}

/// A signed callback carrying the provider session reference. An empty
/// `order_id` is left out, so the order must be found by reference.
pub fn session_notification(order_id: &str, reference: &str, status: &str) -> PaymentNotification {
    let mut body = json!({ "ref": reference, "status": status, "sig": "valid" });
    if !order_id.is_empty() {
        body["order_id"] = json!(order_id);
    }
    PaymentNotification::from_body(body.to_string(), None).unwrap()
}

// =============================================================================
// Store Fixture
// =============================================================================

/// A small store: one shirt product in "Apparel > Shirts", one mug in
/// "Home", a shopper with an address.
pub struct Store {
    pub db: Database,
    pub service: CheckoutService,
    pub wallet: Arc<ScriptedGateway>,
    pub card: Arc<ScriptedGateway>,
    pub shirt_product: String,
    pub mug_product: String,
    pub shirts_category: String,
    pub address_id: String,
    /// Keeps a file-backed database alive until the store is dropped.
    _dir: Option<TempDir>,
}

impl Store {
    pub async fn new() -> Self {
        Self::with_scripts(Script::Redirect, Script::Redirect).await
    }

    pub async fn with_scripts(wallet: Script, card: Script) -> Self {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();

        let wallet = ScriptedGateway::new("wallet", wallet);
        let card = ScriptedGateway::new("card", card);
        let registry = PaymentRegistry::new()
            .with_wallet(wallet.clone())
            .with_card(card.clone());
        Self::build(db, registry, wallet, card, None).await
    }

    /// A store on a WAL database file served by `connections` connections,
    /// so concurrent tasks really contend for SQLite's write lock.
    pub async fn on_disk(connections: u32) -> Self {
        let dir = TempDir::new().unwrap();
        let config = DbConfig::new(dir.path().join("shop.db")).max_connections(connections);
        let db = Database::new(config).await.unwrap();

        let wallet = ScriptedGateway::new("wallet", Script::Redirect);
        let card = ScriptedGateway::new("card", Script::Redirect);
        let registry = PaymentRegistry::new()
            .with_wallet(wallet.clone())
            .with_card(card.clone());
        Self::build(db, registry, wallet, card, Some(dir)).await
    }

    pub async fn with_registry(
        build: impl FnOnce(Arc<ScriptedGateway>, Arc<ScriptedGateway>) -> PaymentRegistry,
    ) -> Self {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let wallet = ScriptedGateway::new("wallet", Script::Redirect);
        let card = ScriptedGateway::new("card", Script::Redirect);
        let registry = build(wallet.clone(), card.clone());
        Self::build(db, registry, wallet, card, None).await
    }

    async fn build(
        db: Database,
        registry: PaymentRegistry,
        wallet: Arc<ScriptedGateway>,
        card: Arc<ScriptedGateway>,
        dir: Option<TempDir>,
    ) -> Self {
        let catalog = db.catalog();
        let apparel = catalog.insert_category("Apparel", None).await.unwrap();
        let shirts = catalog
            .insert_category("Shirts", Some(&apparel.id))
            .await
            .unwrap();
        let home = catalog.insert_category("Home", None).await.unwrap();

        let shirt = catalog.insert_product("Oxford Shirt").await.unwrap();
        catalog.assign_category(&shirt.id, &shirts.id).await.unwrap();
        let mug = catalog.insert_product("Stoneware Mug").await.unwrap();
        catalog.assign_category(&mug.id, &home.id).await.unwrap();

        let address = db
            .addresses()
            .insert(SHOPPER, "Ada Shopper", "1 Market Street", "Springfield", "US")
            .await
            .unwrap();

        let service = CheckoutService::new(db.clone(), registry)
            .with_gateway_timeout(Duration::from_millis(200));

        Store {
            db,
            service,
            wallet,
            card,
            shirt_product: shirt.id,
            mug_product: mug.id,
            shirts_category: shirts.id,
            address_id: address.id,
            _dir: dir,
        }
    }

    /// Adds a variant of the shirt product.
    pub async fn shirt(&self, sku: &str, stock: i64, price_cents: i64) -> Variant {
        self.db
            .catalog()
            .insert_variant(&self.shirt_product, sku, stock, price_cents, None)
            .await
            .unwrap()
    }

    /// Adds a variant of the mug product.
    pub async fn mug(&self, sku: &str, stock: i64, price_cents: i64) -> Variant {
        self.db
            .catalog()
            .insert_variant(&self.mug_product, sku, stock, price_cents, None)
            .await
            .unwrap()
    }

    pub async fn add_to_cart(&self, user_id: &str, variant: &Variant, quantity: i64) {
        self.db
            .carts()
            .upsert(user_id, &variant.id, quantity)
            .await
            .unwrap();
    }

    /// Puts `lines` in the shopper's cart, materializes them all and sets
    /// the shopper's address. Returns the pending order id.
    pub async fn pending_order(&self, lines: &[(&Variant, i64)]) -> String {
        for (variant, quantity) in lines {
            self.add_to_cart(SHOPPER, variant, *quantity).await;
        }
        let selection: Vec<String> = lines.iter().map(|(v, _)| v.id.clone()).collect();
        let pending = self.service.materialize(SHOPPER, &selection).await.unwrap();
        self.service
            .set_shipping_address(SHOPPER, &self.address_id)
            .await
            .unwrap();
        pending.order.id
    }

    pub async fn coupon(&self, new: NewCoupon) -> Coupon {
        self.db.coupons().insert(new).await.unwrap()
    }

    pub async fn stock(&self, variant: &Variant) -> i64 {
        self.db.inventory().stock_level(&variant.id).await.unwrap()
    }

    pub async fn cart_len(&self, user_id: &str) -> usize {
        self.db.carts().list(user_id).await.unwrap().len()
    }
}
