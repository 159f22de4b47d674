//! Diagnostic logging for the shell.
//!
//! Output goes to stderr so it never interleaves with the transcript on
//! stdout. Filtering follows `SOPHIA_LOG` (an `EnvFilter` directive) and
//! falls back to `warn`, or `debug` when `--verbose` is passed.

use tracing_subscriber::EnvFilter;

pub const LOG_ENV: &str = "SOPHIA_LOG";

/// Install the global subscriber. Call once, from `main`.
pub fn init(verbose: bool) -> anyhow::Result<()> {
    let fallback = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(fallback));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|err| anyhow::anyhow!("failed to initialize logging: {err}"))
}

pub fn info(message: impl AsRef<str>) {
    tracing::info!("{}", message.as_ref());
}

pub fn warn(message: impl AsRef<str>) {
    tracing::warn!("{}", message.as_ref());
}

pub fn debug(message: impl AsRef<str>) {
    tracing::debug!("{}", message.as_ref());
}
