//! Structured logging for debugging orc.
//!
//! Log levels:
//! - ERROR: Critical failures that prevent operations from completing
//! - WARN: Unexpected conditions that are recoverable (failed phases, repaired state)
//! - INFO: High-level operation notifications (runs, phases, gate decisions)
//! - DEBUG: Detailed operation traces (registry, subscribers, store paths)
//! - TRACE: Very detailed traces (dropped events)
//!
//! Debug mode can be enabled with `--debug` flag or `ORC_DEBUG=1` env var.
//! `RUST_LOG` overrides both.

use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::Config;

pub const LOG_FILE: &str = "orc.log";

/// Whether `ORC_DEBUG` asks for debug logging.
pub fn debug_from_env() -> bool {
    std::env::var("ORC_DEBUG")
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

fn filter(debug: bool) -> EnvFilter {
    let default = if debug { "orc=debug" } else { "orc=info" };
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default))
}

/// Initialize logging to ~/.orc/orc.log
pub fn init() -> Option<WorkerGuard> {
    init_with_debug(false)
}

/// Initialize logging with explicit debug mode setting.
///
/// The returned guard flushes the log on drop and must be kept alive by the
/// caller. Returns `None` if there is no home directory or a subscriber is
/// already installed.
pub fn init_with_debug(debug: bool) -> Option<WorkerGuard> {
    let dir = Config::orc_dir().ok()?;
    std::fs::create_dir_all(&dir).ok()?;
    init_in(&dir, debug || debug_from_env())
}

/// Initialize logging into `dir/orc.log`.
pub fn init_in(dir: &Path, debug: bool) -> Option<WorkerGuard> {
    let appender = tracing_appender::rolling::never(dir, LOG_FILE);
    let (writer, guard) = tracing_appender::non_blocking(appender);
    tracing_subscriber::registry()
        .with(filter(debug))
        .with(fmt::layer().with_writer(writer).with_ansi(false).with_target(false))
        .try_init()
        .ok()?;
    let enabled = debug;
    tracing::info!(debug = enabled, "logging initialized");
    Some(guard)
}
