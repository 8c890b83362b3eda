//! Structured logging for fan-acoustics using the tracing crate.
//!
//! Batch runs log to stderr so stdout stays free for tables and summaries.
//! Every skipped file, trial or fan speed is reported at `warn`.

use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

/// Initializes the logging system.
///
/// Log level is controlled by the RUST_LOG environment variable; without it the
/// level is "info", or "debug" when `verbose` is set.
///
/// # Errors
/// - If a global subscriber is already installed
pub fn init_logging(verbose: bool) -> Result<(), anyhow::Error> {
    let default_level = if verbose { "debug" } else { "info" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(verbose)
                .with_level(true),
        )
        .try_init()
        .map_err(|e| anyhow::anyhow!("Logging already initialized: {e}"))?;

    tracing::debug!("Logging initialized at level {}", default_level);
    Ok(())
}
