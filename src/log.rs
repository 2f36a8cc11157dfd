//! Structured logging for fedplan.
//!
//! All modules log through the `tracing` macros. This module only installs
//! the subscriber:
//! - ERROR/WARN: failed transactions, swallowed cleanup failures
//! - INFO: compute plan lifecycle (creation, completion, cancellation)
//! - DEBUG: store traffic, DAG passes, status resolution
//!
//! Debug mode can be enabled with `--debug` flag or `FEDPLAN_DEBUG=1` env var.

use std::fs::File;
use std::path::PathBuf;
use std::sync::Mutex;

use tracing::Level;

/// Environment variable that turns on debug logging.
pub const DEBUG_ENV: &str = "FEDPLAN_DEBUG";

/// Initialize logging to ~/.fedplan/fedplan.log with explicit debug mode setting.
///
/// Calling this more than once is harmless: only the first subscriber wins.
pub fn init_with_debug(debug: bool) {
    let level = level_for(debug || env_debug());

    let Some(path) = log_path() else {
        return;
    };
    if let Some(dir) = path.parent() {
        let _ = std::fs::create_dir_all(dir);
    }
    // Truncate file on startup
    let Ok(file) = File::create(&path) else {
        return;
    };

    let _ = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(true)
        .with_ansi(false)
        .with_writer(Mutex::new(file))
        .try_init();
}

/// Location of the log file, if a home directory is available.
pub fn log_path() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(".fedplan").join("fedplan.log"))
}

fn env_debug() -> bool {
    std::env::var(DEBUG_ENV)
        .map(|v| parse_debug_flag(&v))
        .unwrap_or(false)
}

fn parse_debug_flag(value: &str) -> bool {
    value == "1" || value.eq_ignore_ascii_case("true")
}

fn level_for(debug: bool) -> Level {
    if debug {
        Level::DEBUG
    } else {
        Level::INFO
    }
}
