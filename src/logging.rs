// Tracing setup shared by both binaries

use tracing_subscriber::prelude::*;

/// Install the global subscriber.
///
/// Default level is INFO (DEBUG when SEGTRAIN_DEBUG=1/true); RUST_LOG
/// overrides both. Logs go to stderr so the trainer's own stdout and the
/// harness's status lines stay readable.
pub fn init_tracing() {
    let show_debug = std::env::var("SEGTRAIN_DEBUG")
        .map(|v| v == "1" || v.to_lowercase() == "true")
        .unwrap_or(false);
    let default_level = if show_debug { "debug" } else { "info" };

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(show_debug);

    // try_init: a second call (tests, embedding) must not panic
    let installed = tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
        .is_ok();

    // Bridge log crate → tracing (for dependencies using log crate)
    if installed {
        tracing_log::LogTracer::init().ok();
    }
}
