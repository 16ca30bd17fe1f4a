//! Structured logging setup, matching `bins/gauss-server`'s use of
//! `tracing-subscriber`'s `EnvFilter` + `fmt` layer: `RUST_LOG` controls
//! verbosity when set, defaulting to `info`, or `warn` when `quiet` is set
//! (spec.md §8.2, scenario S2's `--quiet`).
use tracing_subscriber::EnvFilter;

pub fn init(quiet: bool) {
    let default = if quiet { "warn" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
}
