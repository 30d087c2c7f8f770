//! FLAC2WAV - 主程序入口
//!
//! 纯流程控制器，负责协调编码器探测、转换引擎与各个工具模块。

use flac2wav::{
    encoder::{self, INSTALL_GUIDE},
    engine::{BatchSummary, ConversionEngine, ConversionEvent},
    error::{ConvertError, ErrorCategory, spawn_error},
    tools::{self, AppConfig},
};
use crossbeam_channel::Receiver;
use std::process;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// 退出码定义
mod exit_codes {
    /// 全部成功（含跳过）
    pub const SUCCESS: i32 = 0;
    /// 通用/I/O错误
    pub const GENERAL_ERROR: i32 = 1;
    /// 输入错误
    pub const INPUT_ERROR: i32 = 2;
    /// 存在编码失败
    pub const ENCODE_ERROR: i32 = 3;
    /// 编码器不可用
    pub const ENCODER_UNAVAILABLE: i32 = 4;
    /// 资源/并发错误
    pub const RESOURCE_ERROR: i32 = 5;
    /// 用户中断（Ctrl-C）
    pub const CANCELLED: i32 = 130;
}

/// 获取错误建议文本
fn get_error_suggestion(error: &ConvertError) -> &'static str {
    match error {
        ConvertError::InvalidInput(_) => {
            "检查输入路径是否存在，使用 --help 查看完整用法 / Check that input paths exist, use --help to see full usage"
        }
        ConvertError::IoError(_) => {
            "检查文件路径是否正确、输出目录是否可写 / Check file paths and that the output directory is writable"
        }
        ConvertError::EncodeError(_) | ConvertError::Timeout(_) => {
            "源文件可能损坏；使用 --verbose 查看编码器输出 / Source may be corrupted; rerun with --verbose to see encoder output"
        }
        ConvertError::SpawnError(_) => {
            "安装FFmpeg或使用 --ffmpeg 指定路径 / Install FFmpeg or pass --ffmpeg <PATH>"
        }
        ConvertError::ResourceError(_) => {
            "资源不可用，请重试；若持续失败请降低并发度（--jobs 1） / Resource unavailable, retry or reduce parallelism (--jobs 1)"
        }
    }
}

/// 错误处理和建议
fn handle_error(error: ConvertError) -> ! {
    eprintln!("[ERROR] 错误 / Error: {error}");
    eprintln!("[INFO] 建议 / Suggestion: {}", get_error_suggestion(&error));

    if matches!(error, ConvertError::SpawnError(_)) {
        eprintln!("{INSTALL_GUIDE}");
    }

    let exit_code = match &error {
        ConvertError::InvalidInput(_) => exit_codes::INPUT_ERROR,
        ConvertError::IoError(_) => exit_codes::GENERAL_ERROR,
        ConvertError::EncodeError(_) | ConvertError::Timeout(_) => exit_codes::ENCODE_ERROR,
        ConvertError::SpawnError(_) => exit_codes::ENCODER_UNAVAILABLE,
        ConvertError::ResourceError(_) => exit_codes::RESOURCE_ERROR,
    };

    process::exit(exit_code);
}

/// 批次失败对应的退出码：编码类失败优先于I/O，I/O优先于输入
fn failure_exit_code(summary: &BatchSummary) -> i32 {
    let categories = &summary.stats.error_stats;
    if [ErrorCategory::Encode, ErrorCategory::Spawn, ErrorCategory::Other]
        .iter()
        .any(|c| categories.contains_key(c))
    {
        exit_codes::ENCODE_ERROR
    } else if categories.contains_key(&ErrorCategory::Io) {
        exit_codes::GENERAL_ERROR
    } else {
        exit_codes::INPUT_ERROR
    }
}

/// 输出单个事件（人类可读行或JSON行）
fn print_event(config: &AppConfig, event: &ConversionEvent) {
    if config.json {
        match tools::event_json_line(event) {
            Ok(line) => println!("{line}"),
            Err(e) => tracing::warn!(error = %e, "failed to serialise event"),
        }
        return;
    }

    // 非verbose模式只显示结果行
    let noisy = matches!(
        event,
        ConversionEvent::Started { .. } | ConversionEvent::Progress { .. }
    );
    if (config.verbose || !noisy)
        && let Some(line) = tools::format_event(event)
    {
        println!("{line}");
    }
}

/// 单文件模式
fn process_single_mode(
    config: &AppConfig,
    engine: &ConversionEngine,
    events: &Receiver<ConversionEvent>,
) -> Result<i32, ConvertError> {
    let source = &config.inputs[0];
    let result = engine.convert_file(
        source,
        config.output_dir.as_deref(),
        config.output_name.as_deref(),
    );

    // convert_file 同步发布事件，返回时事件已全部入队
    for event in events.try_iter() {
        print_event(config, &event);
    }

    let output = result?;
    if config.verbose
        && !config.json
        && let Some(info) = tools::formatter::describe_wav(&output)
    {
        println!("   {info}");
    }
    Ok(exit_codes::SUCCESS)
}

/// 批量模式
fn process_batch_mode(
    config: &AppConfig,
    engine: &ConversionEngine,
    events: &Receiver<ConversionEvent>,
) -> Result<i32, ConvertError> {
    let files = tools::collect_inputs(&config.inputs, config.recursive)?;
    tools::show_scan_results(config, &files);

    if files.is_empty() {
        return Ok(exit_codes::SUCCESS);
    }
    if config.output_name.is_some() {
        tracing::warn!("--output-name only applies to a single input file, ignored");
    }

    let handle = engine.convert_batch(files, config.output_dir.clone());

    for event in events.iter() {
        print_event(config, &event);
        match event {
            ConversionEvent::Error { .. } if config.fail_fast => engine.cancel(),
            ConversionEvent::BatchDone => break,
            _ => {}
        }
    }

    let summary = handle.wait()?;

    if config.json {
        match serde_json::to_string(&summary) {
            Ok(line) => println!("{line}"),
            Err(e) => tracing::warn!(error = %e, "failed to serialise summary"),
        }
    } else {
        println!();
        println!("{}", tools::render_summary_table(&summary, config.verbose));
        print!("{}", tools::format_stats(&summary));
    }

    if let Some(path) = &config.report {
        tools::write_report(path, &tools::create_report(&summary))?;
        if !config.json {
            println!("📄 报告已保存 / Report saved: {}", path.display());
        }
    }

    Ok(if summary.stats.failed > 0 {
        failure_exit_code(&summary)
    } else {
        exit_codes::SUCCESS
    })
}

/// 应用程序主逻辑（便于测试和复用）
fn run() -> Result<i32, ConvertError> {
    // 1. 解析命令行参数并初始化日志
    let config = tools::parse_args();
    tools::logging::init(config.verbose);

    // 2. 定位并探测编码器（不可用时阻断）
    let encoder_path = encoder::locate_encoder(config.encoder_path.as_deref());
    if !encoder::probe(&encoder_path) {
        return Err(spawn_error(
            "无法调用 / Cannot invoke",
            encoder_path.display(),
        ));
    }
    let version = encoder::detect_version(&encoder_path);

    // 3. 构建引擎
    let (engine, events) = ConversionEngine::with_channel(config.engine_config(encoder_path))?;
    tools::show_startup_info(
        &config,
        &engine.config().encoder_path,
        version.as_deref(),
        engine.worker_count(),
    );

    // 4. Ctrl-C 取消当前批次
    let interrupted = Arc::new(AtomicBool::new(false));
    {
        let engine = engine.clone();
        let interrupted = Arc::clone(&interrupted);
        if let Err(e) = ctrlc::set_handler(move || {
            interrupted.store(true, Ordering::SeqCst);
            engine.cancel();
        }) {
            tracing::warn!(error = %e, "failed to install Ctrl-C handler");
        }
    }

    // 5. 根据模式选择处理方式
    let result = if config.is_single_file_mode() {
        process_single_mode(&config, &engine, &events)
    } else {
        process_batch_mode(&config, &engine, &events)
    };

    if interrupted.load(Ordering::SeqCst) {
        eprintln!("[INFO] 已被用户中断 / Interrupted by user");
        return Ok(exit_codes::CANCELLED);
    }
    result
}

fn main() {
    match run() {
        Ok(code) => process::exit(code),
        Err(error) => handle_error(error),
    }
}
