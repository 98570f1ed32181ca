//! # Connection Pool
//!
//! One `SqlitePool` shared by every repository and every checkout.
//!
//! ## Writers and Readers
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  SqlitePool (max_connections)                                           │
//! │                                                                         │
//! │  checkout A ──► conn 1   BEGIN IMMEDIATE  reserve … record  COMMIT      │
//! │  checkout B ──► conn 2   BEGIN IMMEDIATE … waits on the write lock …    │
//! │  stock read ──► conn 3   (WAL: never blocked by A or B)                 │
//! │                                                                         │
//! │  SQLite has one writer at a time. Write transactions start with         │
//! │  BEGIN IMMEDIATE and wait up to `busy_timeout` for the lock; only then  │
//! │  do they fail with DbError::Busy.                                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! `:memory:` databases exist per connection, so an in-memory pool is
//! always capped at one connection. Callers holding a transaction must not
//! call pool-backed repository methods until it is committed or dropped.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Sqlite, SqlitePool, Transaction};
use tracing::{info, warn};

use crate::error::{DbError, DbResult};
use crate::migrations;
use crate::repository::address::AddressRepository;
use crate::repository::cart::CartRepository;
use crate::repository::catalog::CatalogRepository;
use crate::repository::coupon::CouponRepository;
use crate::repository::inventory::InventoryLedger;
use crate::repository::order::OrderRepository;

const MEMORY_PATH: &str = ":memory:";

// =============================================================================
// Configuration
// =============================================================================

/// Pool settings.
///
/// ```rust,ignore
/// let config = DbConfig::new("/var/lib/shop/shop.db").max_connections(8);
/// ```
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// Database file; created on first connect.
    pub path: PathBuf,
    pub max_connections: u32,
    /// How long a request waits for a free connection.
    pub acquire_timeout: Duration,
    /// How long a statement waits on SQLite's write lock.
    pub busy_timeout: Duration,
    pub migrate: bool,
}

impl DbConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        DbConfig {
            path: path.into(),
            max_connections: 5,
            acquire_timeout: Duration::from_secs(30),
            busy_timeout: Duration::from_secs(5),
            migrate: true,
        }
    }

    /// Private database for one test.
    pub fn in_memory() -> Self {
        DbConfig {
            max_connections: 1,
            acquire_timeout: Duration::from_secs(10),
            ..DbConfig::new(MEMORY_PATH)
        }
    }

    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    pub fn acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    pub fn busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    /// Connect without applying migrations (schema managed elsewhere).
    pub fn without_migrations(mut self) -> Self {
        self.migrate = false;
        self
    }

    pub fn is_in_memory(&self) -> bool {
        self.path == Path::new(MEMORY_PATH)
    }

    fn connect_options(&self) -> DbResult<SqliteConnectOptions> {
        let options = if self.is_in_memory() {
            SqliteConnectOptions::from_str("sqlite::memory:")
                .map_err(|e| DbError::ConnectionFailed(e.to_string()))?
        } else {
            SqliteConnectOptions::new()
                .filename(&self.path)
                .create_if_missing(true)
                .journal_mode(SqliteJournalMode::Wal)
                .synchronous(SqliteSynchronous::Normal)
        };

        Ok(options.foreign_keys(true).busy_timeout(self.busy_timeout))
    }

    fn pool_size(&self) -> u32 {
        if self.is_in_memory() && self.max_connections != 1 {
            warn!(
                requested = self.max_connections,
                "In-memory database is per connection; using a single connection"
            );
            return 1;
        }
        self.max_connections.max(1)
    }
}

// =============================================================================
// Write Transactions
// =============================================================================

/// Opens a transaction holding SQLite's write lock from its first statement.
///
/// A deferred `BEGIN` that reads and later writes cannot wait for the lock:
/// SQLite fails the upgrade at once with SQLITE_BUSY. `BEGIN IMMEDIATE`
/// queues on `busy_timeout` instead, so concurrent checkouts serialize.
pub(crate) async fn begin_write(pool: &SqlitePool) -> DbResult<Transaction<'static, Sqlite>> {
    let tx = pool.begin_with("BEGIN IMMEDIATE").await?;
    Ok(tx)
}

// =============================================================================
// Database
// =============================================================================

/// Pool handle and repository factory. Clones share the pool.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Opens the pool and, unless disabled, brings the schema up to date.
    pub async fn new(config: DbConfig) -> DbResult<Self> {
        let connections = config.pool_size();
        let mut options = SqlitePoolOptions::new()
            .max_connections(connections)
            .min_connections(1)
            .acquire_timeout(config.acquire_timeout);
        if config.is_in_memory() {
            // Closing the only connection would drop the database.
            options = options.idle_timeout(None).max_lifetime(None);
        }

        let pool = options
            .connect_with(config.connect_options()?)
            .await
            .map_err(|e| DbError::ConnectionFailed(e.to_string()))?;

        info!(
            path = %config.path.display(),
            connections,
            "Database pool ready"
        );

        if config.migrate {
            migrations::run_migrations(&pool).await?;
        }

        Ok(Database { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Starts a write transaction. Dropping it without `commit()` rolls back.
    pub async fn begin(&self) -> DbResult<Transaction<'static, Sqlite>> {
        begin_write(&self.pool).await
    }

    /// Cart materializer and order reads.
    pub fn orders(&self) -> OrderRepository {
        OrderRepository::new(self.pool.clone())
    }

    /// Coupon ledger.
    pub fn coupons(&self) -> CouponRepository {
        CouponRepository::new(self.pool.clone())
    }

    pub fn inventory(&self) -> InventoryLedger {
        InventoryLedger::new(self.pool.clone())
    }

    pub fn catalog(&self) -> CatalogRepository {
        CatalogRepository::new(self.pool.clone())
    }

    pub fn carts(&self) -> CartRepository {
        CartRepository::new(self.pool.clone())
    }

    pub fn addresses(&self) -> AddressRepository {
        AddressRepository::new(self.pool.clone())
    }
}
