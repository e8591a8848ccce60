//! Development-time tracing.
//!
//! Tracing is for diagnostics only and goes to stderr. Check progress lines and
//! reports are product output and are printed regardless of `RUST_LOG`.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Install the global subscriber. `RUST_LOG` overrides the default `warn` level.
///
/// ```bash
/// RUST_LOG=bonsai=debug bonsai check --mode AUDIT
/// ```
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}
