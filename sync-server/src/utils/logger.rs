//! Logging setup
//!
//! `RUST_LOG` wins over the configured level. With a log directory the
//! output goes to a daily rolling file instead of stdout.

use std::path::Path;
use tracing_subscriber::EnvFilter;

/// Initialize the logger with optional file output
pub fn init_logger_with_file(log_level: &str, log_dir: Option<&str>) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("sync_server={log_level},tower_http={log_level}"))
    });

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_file(false)
        .with_line_number(false)
        .with_thread_ids(false)
        .with_target(false);

    if let Some(dir) = log_dir {
        let log_path = Path::new(dir);
        if std::fs::create_dir_all(log_path).is_ok()
            && let Some(dir_str) = log_path.to_str()
        {
            let file_appender = tracing_appender::rolling::daily(dir_str, "sync-server");
            subscriber.with_ansi(false).with_writer(file_appender).init();
            return;
        }
    }

    subscriber.init();
}
