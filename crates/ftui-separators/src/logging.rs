#![forbid(unsafe_code)]

//! JSON log output for production hosts (feature `tracing-json`).

use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;

/// Filter used when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "ftui_separators=info,ftui_reactive=warn";

/// Install a global JSON subscriber filtered by `RUST_LOG`.
///
/// Returns `false` if a global subscriber was already installed.
pub fn init_json_subscriber() -> bool {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().json().with_current_span(true))
        .try_init()
        .is_ok()
}
