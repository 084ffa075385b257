//! Tracing subscriber setup for the binary.

use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt};

/// Install a global `tracing` subscriber.
///
/// - `RUST_LOG` controls filtering (default `info`).
/// - `RUST_LOG_FORMAT=json` switches to JSON lines.
/// - Both formats write to stderr.
///
/// Returns an error if a global subscriber is already installed.
pub fn init() -> Result<(), tracing_subscriber::util::TryInitError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("RUST_LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false);

    let layer: Box<dyn Layer<Registry> + Send + Sync> = if json {
        fmt::layer()
            .with_ansi(false)
            .with_target(true)
            .with_writer(std::io::stderr)
            .json()
            .with_filter(filter)
            .boxed()
    } else {
        fmt::layer()
            .with_target(false)
            .with_writer(std::io::stderr)
            .with_filter(filter)
            .boxed()
    };

    tracing_subscriber::registry().with(layer).try_init()
}
