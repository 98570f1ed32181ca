//! # Conflict Retry
//!
//! Bounded re-run of an operation that lost an optimistic race.
//!
//! ```text
//! attempt 1 ── VersionConflict / Busy ──► attempt 2 ── ... ──► attempt N
//!     │                                      │                    │
//!     └── Ok / other error: returned as is ──┴────────────────────┘
//! ```
//!
//! With `attempts = 1` (the default) the first conflict is surfaced
//! directly, so a retry is always an explicit configuration choice.

use std::future::Future;

use shop_db::DbResult;
use tracing::warn;

/// Runs `op` up to `attempts` times while it fails with a retryable
/// conflict (see [`shop_db::DbError::is_retryable_conflict`]).
pub async fn retry_on_conflict<T, F, Fut>(attempts: u32, mut op: F) -> DbResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = DbResult<T>>,
{
    let attempts = attempts.max(1);
    let mut attempt = 1;
    loop {
        match op().await {
            Err(err) if err.is_retryable_conflict() && attempt < attempts => {
                warn!(attempt, max_attempts = attempts, error = %err, "Retrying after conflict");
                attempt += 1;
                tokio::task::yield_now().await;
            }
            result => return result,
        }
    }
}
