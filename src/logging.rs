//! Tracing setup for the binary.
//!
//! Two sinks share one filter: human-readable output on stderr and a plain
//! (non-ANSI) copy in `<logs_dir>/docqa_<YYYYmmdd_HHMMSS>.log`. `RUST_LOG`
//! overrides the default level (`info`, or `debug` with `--verbose`).

use anyhow::{Context, Result};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Installs the global subscriber and returns the log file path.
///
/// Calling this twice is harmless: the second subscriber is discarded.
pub fn init(logs_dir: &Path, verbose: bool) -> Result<PathBuf> {
    std::fs::create_dir_all(logs_dir)
        .with_context(|| format!("Failed to create logs directory: {}", logs_dir.display()))?;

    let log_path = logs_dir.join(format!(
        "docqa_{}.log",
        chrono::Local::now().format("%Y%m%d_%H%M%S")
    ));
    let file = File::create(&log_path)
        .with_context(|| format!("Failed to create log file: {}", log_path.display()))?;

    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .with(fmt::layer().with_writer(Mutex::new(file)).with_ansi(false))
        .try_init()
        .ok();

    Ok(log_path)
}
