//! # Tracing Setup
//!
//! Installs the process-wide `tracing` subscriber.
//!
//! ## Filter
//! `RUST_LOG` wins when set; otherwise `info` for everything, `debug` for the
//! checkout crates, and only warnings from sqlx.
//! ```bash
//! RUST_LOG=shop_db=trace,shop_checkout=debug cargo run ...
//! ```

use tracing_subscriber::EnvFilter;

/// Default filter directives.
pub const DEFAULT_FILTER: &str = "info,shop=debug,sqlx=warn";

/// Installs a fmt subscriber with an env filter.
///
/// Returns false if a global subscriber was already installed (tests, or an
/// embedding application that set up its own).
pub fn init_tracing() -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .is_ok()
}
