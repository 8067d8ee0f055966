//! 可观测性：tracing 订阅器初始化 + 进程内的有界运行日志

mod log_buffer;

pub use log_buffer::{LogBuffer, LogEntry, LogLevel, LogQuery};

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// 日志写到 stderr，stdout 只留给 JSON 输出；默认 info，可通过 RUST_LOG 覆盖
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .try_init();
}
