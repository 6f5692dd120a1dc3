//! Tracing setup for the command-line entry points.

use std::sync::OnceLock;

use tracing_subscriber::EnvFilter;

static INSTALLED: OnceLock<bool> = OnceLock::new();

/// Installs the fmt subscriber once per process, writing to stderr.
///
/// `RUST_LOG` wins over `level` when it is set. Returns whether a subscriber
/// from this module is active; a subscriber installed elsewhere first is left
/// alone.
pub fn setup(level: &str) -> bool {
    *INSTALLED.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(false)
            .try_init()
            .is_ok()
    })
}

/// Whether [`setup`] has already run.
pub fn is_configured() -> bool {
    INSTALLED.get().is_some()
}
