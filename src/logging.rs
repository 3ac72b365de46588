use crate::config::AppConfig;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{self, RollingFileAppender};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

fn file_appender(config: &AppConfig) -> RollingFileAppender {
    // rolling::* panics if the directory cannot be created later on
    if let Err(e) = std::fs::create_dir_all(&config.log_dir) {
        eprintln!("cannot create log dir {}: {}", config.log_dir, e);
    }
    match config.rotation.as_str() {
        "hourly" => rolling::hourly(&config.log_dir, &config.log_file),
        "daily" => rolling::daily(&config.log_dir, &config.log_file),
        _ => rolling::never(&config.log_dir, &config.log_file),
    }
}

/// Default directives: the configured level everywhere, with
/// `sqlx=warn` so per-statement logs don't bury the transfer traces.
fn default_filter(config: &AppConfig) -> EnvFilter {
    EnvFilter::new(format!(
        "{level},ledger_locks={level},sqlx=warn",
        level = config.log_level
    ))
}

/// Install the global subscriber: rolling file (JSON or plain) plus coloured
/// stdout. Keep the returned guard alive for the whole process or buffered
/// file output is lost.
pub fn init_logging(config: &AppConfig) -> WorkerGuard {
    let (writer, guard) = tracing_appender::non_blocking(file_appender(config));
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter(config));

    let stdout_layer = fmt::layer().with_target(false).with_ansi(true);
    let registry = tracing_subscriber::registry().with(filter).with(stdout_layer);

    if config.use_json {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(false)
                    .with_writer(writer)
                    .with_ansi(false),
            )
            .init();
    } else {
        registry
            .with(fmt::layer().with_writer(writer).with_ansi(false))
            .init();
    }

    guard
}
