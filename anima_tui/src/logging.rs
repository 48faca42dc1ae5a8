//! Tracing setup.
//!
//! The terminal is in raw mode while the UI runs, so logs never go to stderr.
//! They are written to the file passed with `--log-file`; without one, tracing
//! stays uninitialised and the core's events are dropped.

use std::{fs::File, path::Path, sync::Mutex};

use anyhow::{Context, Result};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialise file logging. Reads `RUST_LOG`, defaulting to `info`.
///
/// # Example
/// ```bash
/// RUST_LOG=anima_core=debug anima_tui --log-file anima.log
/// ```
pub fn init(path: Option<&Path>) -> Result<()> {
    let Some(path) = path else {
        return Ok(());
    };
    let file = File::create(path).with_context(|| format!("create {}", path.display()))?;
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(Mutex::new(file))
                .with_ansi(false)
                .compact(),
        )
        .try_init()
        .context("install tracing subscriber")?;
    Ok(())
}
