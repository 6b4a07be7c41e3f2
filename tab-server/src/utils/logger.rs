//! Logging Infrastructure
//!
//! `RUST_LOG` 优先于配置的日志级别；`log_dir` 存在时写入按天滚动的日志文件。

use std::path::Path;

use tracing_subscriber::EnvFilter;

/// Initialize the logger
pub fn init_logger() {
    init_logger_with_file(None, None);
}

/// Initialize the logger with optional file output
pub fn init_logger_with_file(log_level: Option<&str>, log_dir: Option<&str>) {
    let level = log_level.unwrap_or("info");
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_file(false)
        .with_line_number(false)
        .with_thread_ids(false)
        .with_target(false);

    if let Some(dir) = log_dir {
        let log_path = Path::new(dir);
        if log_path.exists() {
            let file_appender = tracing_appender::rolling::daily(log_path, "tab-server");
            // 文件输出不带 ANSI 颜色
            if subscriber
                .with_ansi(false)
                .with_writer(file_appender)
                .try_init()
                .is_err()
            {
                eprintln!("Logger already initialized");
            }
            return;
        }
        eprintln!("Log directory {dir} does not exist, logging to stdout");
    }

    if subscriber.try_init().is_err() {
        eprintln!("Logger already initialized");
    }
}
