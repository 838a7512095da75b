//! Diagnostic tracing for the fix and refactor loops.
//!
//! Tracing is developer-facing: it goes to stderr and is filtered by `RUST_LOG`.
//! Loop results (the ledger, session summaries, `--report` files) are product
//! output and never depend on the filter.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the tracing subscriber.
///
/// Reads `RUST_LOG`. When unset, defaults to `warn`, or to `fixloop=info` when
/// `verbose` is requested so iteration progress becomes visible.
///
/// # Example
/// ```bash
/// RUST_LOG=fixloop=debug fixloop fix tests/test_accounts.py
/// ```
pub fn init(verbose: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbose)));

    // A second init (e.g. from tests driving `main` paths) is not fatal.
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .try_init();
}

fn default_directive(verbose: bool) -> &'static str {
    if verbose { "warn,fixloop=info" } else { "warn" }
}
