//! 工具模块集合
//!
//! 包含CLI、日志、文件扫描、格式化等工具模块，支持main.rs的流程控制。

pub mod cli;
pub mod constants;
pub mod formatter;
pub mod logging;
pub mod scanner;
pub mod utils;

// 重新导出主要的公共接口
pub use cli::{AppConfig, parse_args, parse_args_from, show_startup_info};
pub use formatter::{
    create_report, event_json_line, format_event, format_stats, render_summary_table,
    write_report,
};
pub use scanner::{collect_inputs, scan_flac_files, show_scan_results};
