//! Logging initialization.
//!
//! Console output always; a file sink when `onvif.log_file` is set. The
//! level comes from `onvif.log_level`, overridable with `RUST_LOG`. Handler
//! failures are logged in the `[{Service}::{Operation}] message` form by the
//! dispatcher.

use std::sync::OnceLock;

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::ConfigRuntime;

static FILE_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();

/// Initialize tracing. Safe to call more than once; later calls are no-ops.
pub fn init(config: &ConfigRuntime) {
    let level = config
        .get_str("onvif", "log_level")
        .unwrap_or_else(|_| "info".to_string());
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("onvifd={level},warn")));

    let log_file = config.get_str("onvif", "log_file").unwrap_or_default();

    let registry = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false));

    let result = if log_file.is_empty() {
        registry.try_init()
    } else {
        let appender = tracing_appender::rolling::never(
            std::path::Path::new(&log_file)
                .parent()
                .unwrap_or_else(|| std::path::Path::new(".")),
            std::path::Path::new(&log_file)
                .file_name()
                .unwrap_or_else(|| std::ffi::OsStr::new("onvifd.log")),
        );
        let (writer, guard) = tracing_appender::non_blocking(appender);
        let _ = FILE_GUARD.set(guard);
        registry
            .with(fmt::layer().with_writer(writer).with_ansi(false))
            .try_init()
    };

    if result.is_ok() {
        tracing::info!(level = %level, "logging initialized");
    }
}
