//! Tracing subscriber setup.
//!
//! Diagnostics go to stderr so that command output on stdout stays
//! machine-readable (`--json`). The filter comes from `RUST_LOG`, then the
//! `--log-level` flag, then `info`.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

pub fn init(level: Option<&str>) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level.unwrap_or("info")))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    // A second init (e.g. in tests) keeps the first subscriber.
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .try_init();
}
