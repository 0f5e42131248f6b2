//! Logging setup for hosts and test runs.
//!
//! The reconciler emits `tracing` events and spans for every submission,
//! poll and lookup, each carrying the `resource_id` field. These helpers
//! install a subscriber that writes them to **stderr**.
//!
//! # Quick Start
//!
//! ```ignore
//! use hemmer_reconciler::init_logging;
//!
//! #[tokio::main]
//! async fn main() {
//!     // Reads RUST_LOG, defaults to `info`.
//!     init_logging();
//!     tracing::info!("Reconciling");
//! }
//! ```
//!
//! # Environment Variables
//!
//! - `RUST_LOG`: Controls log levels (e.g., `info`, `hemmer_reconciler=debug`)
//!
//! ```bash
//! # Follow every poll of every operation
//! RUST_LOG=hemmer_reconciler::reconciler=debug cargo test
//! ```

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

fn stderr_layer<S>() -> impl tracing_subscriber::Layer<S>
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
{
    fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
}

/// Initialize the default logging subscriber.
///
/// Respects `RUST_LOG` and defaults to `info`.
///
/// # Panics
///
/// Panics if a global subscriber has already been set.
pub fn init_logging() {
    init_logging_with_default("info");
}

/// Initialize logging with a custom default level.
///
/// Like [`init_logging`], but `default_level` is used when `RUST_LOG` is not
/// set.
///
/// # Panics
///
/// Panics if a global subscriber has already been set.
///
/// # Example
///
/// ```ignore
/// use hemmer_reconciler::init_logging_with_default;
///
/// init_logging_with_default("hemmer_reconciler=debug");
/// ```
pub fn init_logging_with_default(default_level: &str) {
    tracing_subscriber::registry()
        .with(filter(default_level))
        .with(stderr_layer())
        .init();
}

/// Try to initialize logging, returning false if already initialized.
pub fn try_init_logging() -> bool {
    tracing_subscriber::registry()
        .with(filter("info"))
        .with(stderr_layer())
        .try_init()
        .is_ok()
}

/// Initialize logging for tests.
///
/// Output goes through the test harness's capture, so it only shows for
/// failing tests (or with `--nocapture`). Safe to call from every test;
/// only the first call installs a subscriber.
///
/// # Example
///
/// ```
/// hemmer_reconciler::try_init_test_logging();
/// hemmer_reconciler::try_init_test_logging();
/// ```
pub fn try_init_test_logging() -> bool {
    tracing_subscriber::registry()
        .with(filter("warn,hemmer_reconciler=debug"))
        .with(fmt::layer().with_test_writer().with_target(true))
        .try_init()
        .is_ok()
}
