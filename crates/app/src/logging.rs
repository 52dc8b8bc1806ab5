use candlekeep_core::config::LogConfig;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

/// 初始化全局日志：终端输出，并在配置了目录时按天滚动写入文件。
///
/// # Logic
/// 1. 日志级别优先取 `RUST_LOG`，否则取配置。
/// 2. 文件层使用非阻塞写入，返回的 guard 必须存活到进程退出。
///
/// # Returns
/// * 写入文件时返回 `WorkerGuard`，否则为 `None`。
pub fn init(config: &LogConfig) -> Option<WorkerGuard> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));
    let stdout = fmt::layer().with_target(false);

    match config.dir.as_deref().filter(|dir| !dir.is_empty()) {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, &config.file_prefix);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::registry()
                .with(filter)
                .with(stdout)
                .with(fmt::layer().with_ansi(false).with_writer(writer))
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::registry().with(filter).with(stdout).init();
            None
        }
    }
}
