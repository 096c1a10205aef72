//! Tracing setup shared by rplan front ends.
//!
//! Output goes to stderr so schedule listings on stdout stay pipeable.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Install the subscriber at `info` for this crate
pub fn init() {
    init_with_level("info")
}

/// Install the subscriber with `level` applied to `reading_core`.
///
/// Other crates log at `warn`. `RUST_LOG`, when set and valid, replaces the
/// whole filter. Repeated calls keep the first subscriber.
pub fn init_with_level(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter(level));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .compact()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .try_init();
}

fn default_filter(level: &str) -> EnvFilter {
    EnvFilter::try_new(format!("warn,reading_core={}", level))
        .unwrap_or_else(|_| EnvFilter::new("warn"))
}

/// Route logs through the test harness writer
#[cfg(test)]
pub fn init_test() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter(default_filter("debug"))
        .try_init();
}
