//! Tracing subscriber setup.

use tracing_subscriber::EnvFilter;

/// Default filter for a `-v` count: 0 warn, 1 info, 2 debug, 3+ trace.
pub fn filter_for_verbosity(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}

/// Install a fmt subscriber. `RUST_LOG` overrides the verbosity default.
///
/// Only the first call installs anything; later calls are no-ops.
pub fn setup_logging(verbosity: u8) {
    let filter = filter_for_verbosity(verbosity);

    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(std::io::stderr)
        .try_init();
}
