//! Logging setup for CLI commands and the daemon

use ckanserver::{RuntimeConfig, config::DaemonConfig};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

const LOG_FILE_NAME: &str = "ckanserver.log";

/// Initialize logging for client commands (console only, warnings and up)
pub fn init_cli_logging() {
  let env_filter = EnvFilter::builder()
    .with_default_directive(tracing::Level::WARN.into())
    .from_env_lossy();
  tracing_subscriber::fmt().with_env_filter(env_filter).with_target(false).init();
}

/// Parse log level from config string
fn parse_log_level(level: &str) -> tracing::Level {
  match level.to_lowercase().as_str() {
    "off" | "error" => tracing::Level::ERROR,
    "warn" => tracing::Level::WARN,
    "debug" => tracing::Level::DEBUG,
    "trace" => tracing::Level::TRACE,
    _ => tracing::Level::INFO,
  }
}

/// Initialize logging for the daemon.
///
/// Foreground daemons log to the console with colors; background daemons log
/// to a rolling file in the data directory. `RUST_LOG` overrides the
/// configured level either way.
///
/// Returns the guard that must be kept alive for the duration of the program
pub fn init_daemon_logging(runtime: &RuntimeConfig) -> Option<WorkerGuard> {
  let daemon_config: &DaemonConfig = &runtime.config.daemon;
  let env_filter = EnvFilter::builder()
    .with_default_directive(parse_log_level(&daemon_config.log_level).into())
    .from_env_lossy();

  if runtime.foreground {
    tracing_subscriber::fmt()
      .with_env_filter(env_filter)
      .with_target(true)
      .with_ansi(true)
      .init();
    return None;
  }

  let log_dir = &runtime.data_dir;
  if std::fs::create_dir_all(log_dir).is_err() {
    init_cli_logging();
    return None;
  }

  let file_appender = match daemon_config.log_rotation.as_str() {
    "hourly" => tracing_appender::rolling::hourly(log_dir, LOG_FILE_NAME),
    "never" => tracing_appender::rolling::never(log_dir, LOG_FILE_NAME),
    _ => tracing_appender::rolling::daily(log_dir, LOG_FILE_NAME),
  };
  let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

  tracing_subscriber::fmt()
    .with_env_filter(env_filter)
    .with_target(true)
    .with_ansi(false)
    .with_writer(file_writer)
    .init();

  Some(guard)
}
