//! Process-wide tracing setup.
//!
//! Writes human-readable logs to stdout and newline-delimited JSON logs to a
//! rolling daily file under [`Settings::log_dir`](crate::config::Settings::log_dir).
//! Unlike the richer logging layer this is descended from, filter level is
//! fixed at startup from `RUST_LOG`/`LOG_LEVEL` - there is no runtime reload
//! and no log-streaming endpoint, since nothing in this system subscribes to one.

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Guard returned by [`init`]; drop it at the very end of `main` to flush the
/// non-blocking file appender before the process exits.
pub struct LoggingGuard {
    _file_guard: WorkerGuard,
}

pub fn init(log_dir: &str) -> std::io::Result<LoggingGuard> {
    std::fs::create_dir_all(log_dir)?;

    let env_filter = EnvFilter::try_from_env("RUST_LOG")
        .or_else(|_| EnvFilter::try_new(default_directive()))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let file_appender = tracing_appender::rolling::daily(log_dir, "gateway.log");
    let (non_blocking, file_guard) = tracing_appender::non_blocking(file_appender);

    let stdout_layer = fmt::layer().with_target(true).with_ansi(true);
    let file_layer = fmt::layer()
        .json()
        .with_writer(non_blocking)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer)
        .with(file_layer)
        .init();

    Ok(LoggingGuard {
        _file_guard: file_guard,
    })
}

fn default_directive() -> String {
    std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string())
}
