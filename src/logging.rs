//! Ambient logging setup: a single `tracing-subscriber` layer writing to
//! stderr, scoped down from the richer multi-sink setup in the pattern this
//! is grounded on — this engine only ever needs one sink and two levels.

use tracing_subscriber::EnvFilter;

/// Initializes the global `tracing` subscriber. `verbose` raises the
/// default level from `info` to `debug`; `RUST_LOG` always takes priority
/// when set, so scripted invocations can still ask for `trace` or per-module
/// filtering without a second flag.
pub fn init(verbose: bool) {
    let default_directive = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init()
        .ok();
}
