//! Logging setup for the kinder binary.
//!
//! Filter comes from `KINDER_LOG`, then `RUST_LOG`, then `info`.
//! `KINDER_DEBUG_LOG=1` forces `debug`. Logs go to stderr (stdout carries
//! notifications) and, when the data directory is usable, to a daily file
//! under `~/.kinder/logs`.

use std::env;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

const LOG_ENV: &str = "KINDER_LOG";
const DEBUG_ENV: &str = "KINDER_DEBUG_LOG";
const LOG_FILE_PREFIX: &str = "kinder.log";

fn debug_enabled() -> bool {
    env::var(DEBUG_ENV)
        .map(|value| matches!(value.as_str(), "1" | "true" | "TRUE" | "yes" | "YES"))
        .unwrap_or(false)
}

fn build_filter() -> EnvFilter {
    if debug_enabled() {
        return EnvFilter::new("debug");
    }
    EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Installs the global subscriber. Keep the guard alive until exit so the
/// file writer flushes.
pub fn init() -> Option<WorkerGuard> {
    let mut guard = None;
    let file_layer = match kinder_core::data_dir().map(|dir| dir.join("logs")) {
        Some(log_dir) => match fs_err::create_dir_all(&log_dir) {
            Ok(()) => {
                let appender = tracing_appender::rolling::daily(log_dir, LOG_FILE_PREFIX);
                let (writer, worker_guard) = tracing_appender::non_blocking(appender);
                guard = Some(worker_guard);
                Some(
                    tracing_subscriber::fmt::layer()
                        .with_writer(writer)
                        .with_ansi(false)
                        .with_filter(build_filter()),
                )
            }
            Err(err) => {
                eprintln!("Warning: failed to create log directory: {}", err);
                None
            }
        },
        None => None,
    };

    let console_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_filter(build_filter());

    let _ = tracing_subscriber::registry()
        .with(file_layer)
        .with(console_layer)
        .try_init();

    guard
}
