//! Shared logging initialization for fsq binaries.

use std::sync::OnceLock;

static INIT: OnceLock<()> = OnceLock::new();

fn parse_level(value: &str) -> tracing::Level {
    match value.to_ascii_lowercase().as_str() {
        "trace" => tracing::Level::TRACE,
        "debug" => tracing::Level::DEBUG,
        "warn" => tracing::Level::WARN,
        "error" => tracing::Level::ERROR,
        _ => tracing::Level::INFO,
    }
}

/// Initialize process-level tracing output from `FSQ_LOG`.
///
/// Safe to call multiple times; only the first call installs the
/// subscriber. Best-effort, never returns an error.
pub fn init() {
    let level = std::env::var("FSQ_LOG").unwrap_or_else(|_| "info".to_string());
    init_with_level(parse_level(&level));
}

/// Initialize tracing at an explicit level, e.g. from a `-v` flag.
pub fn init_with_level(level: tracing::Level) {
    if INIT.get().is_some() {
        return;
    }
    let _ = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
    let _ = INIT.set(());
}
