pub mod config;
pub mod engine;
pub mod error;
pub mod handlers;
pub mod logql;
pub mod marshal;
pub mod metrics;
pub mod model;
pub mod params;
pub mod request;
pub mod server;
pub mod tail;

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialize tracing/logging
///
/// RUST_LOG wins over the configured level. Note: this function can only be
/// called once per process.
pub fn init_tracing(level: &str, format: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.to_string()));

    let registry = tracing_subscriber::registry().with(filter);
    if format == "json" {
        registry.with(fmt::layer().json().with_target(true)).init();
    } else {
        registry.with(fmt::layer().with_target(true)).init();
    }
}
