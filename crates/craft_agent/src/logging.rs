//! Tracing setup for the `craft_agent` binary. The library never installs a subscriber.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Installs a compact stderr subscriber filtered by `RUST_LOG`, default `warn`.
///
/// Safe to call more than once; later calls are no-ops.
///
/// ```bash
/// RUST_LOG=craft_agent=debug craft_agent --chains get_wood
/// ```
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .try_init();
}
