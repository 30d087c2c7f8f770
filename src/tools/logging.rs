//! 日志初始化
//!
//! 日志写入stderr，stdout只留给进度行与JSON事件。

use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::time::UtcTime;

/// 初始化全局日志订阅者（重复调用无副作用）
///
/// `RUST_LOG` 优先；否则 `--verbose` 时为 info，默认 warn。
pub fn init(verbose: bool) {
    let default_level = if verbose { "info" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false)
        .with_level(true)
        .with_writer(std::io::stderr)
        .try_init();
}
