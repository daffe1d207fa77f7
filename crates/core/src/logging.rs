//! Logging initialization.

use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Default filter when `RUST_LOG` is not set: renderer crates at debug,
/// everything else at info.
const DEFAULT_FILTER: &str = "info,helio=debug,helio_rhi=debug,helio_render=debug";

/// Initialize the logging system with tracing.
///
/// Filtering comes from `RUST_LOG` when set, [`DEFAULT_FILTER`] otherwise.
///
/// # Example
/// ```
/// helio_core::init_logging();
/// tracing::info!("Renderer initialized");
/// ```
pub fn init_logging() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true).compact())
        .init();
}
