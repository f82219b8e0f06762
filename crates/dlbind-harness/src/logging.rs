//! Diagnostic logging via tracing-subscriber.
//!
//! Separate from the JSONL contract in [`crate::structured_log`]: this is the
//! human-facing stderr stream, including the `debug!` events the loader
//! wrapper emits on every open/lookup/close.

use tracing_subscriber::EnvFilter;

use crate::error::HarnessError;

/// Install the global subscriber.
///
/// `RUST_LOG` wins when set; otherwise `level` (`"warn"`, `"debug"`, ...) is
/// used.
pub fn init(level: &str) -> Result<(), HarnessError> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .map_err(|e| HarnessError::Logger(format!("invalid log level '{level}': {e}")))?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| HarnessError::Logger(format!("failed to set subscriber: {e}")))
}
