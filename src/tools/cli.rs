//! 命令行接口模块
//!
//! 负责命令行参数解析、配置管理和程序信息展示。

use crate::encoder::invocation::{BitDepth, EncodeProfile};
use crate::engine::converter::EngineConfig;
use crate::tools::constants::worker_limits::MAX_WORKERS;
use crate::utils::worker_estimator;
use clap::{Arg, ArgAction, ArgMatches, Command};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// 应用程序版本信息
const VERSION: &str = env!("CARGO_PKG_VERSION");
const DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");

/// 应用程序配置
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// 输入文件或目录（未指定时为可执行文件所在目录）
    pub inputs: Vec<PathBuf>,

    /// 输出目录（缺省为各源文件所在目录）
    pub output_dir: Option<PathBuf>,

    /// 输出文件名（仅单文件模式）
    pub output_name: Option<String>,

    /// 递归扫描子目录
    pub recursive: bool,

    /// 显式指定的编码器路径
    pub encoder_path: Option<PathBuf>,

    /// 工作线程数（None 时按主机资源估算）
    pub jobs: Option<usize>,

    /// 输出位深
    pub bit_depth: BitDepth,

    /// 批量模式保留源采样率/声道
    pub native: bool,

    /// 单个编码调用时限
    pub timeout: Option<Duration>,

    /// 覆盖已存在的输出（关闭跳过）
    pub overwrite: bool,

    /// 第一个错误后取消整个批次
    pub fail_fast: bool,

    /// 以JSON行输出事件
    pub json: bool,

    /// 写入文本报告的路径
    pub report: Option<PathBuf>,

    /// 是否显示详细信息
    pub verbose: bool,
}

impl AppConfig {
    /// 单文件模式：恰好一个输入且为文件
    #[inline]
    pub fn is_single_file_mode(&self) -> bool {
        matches!(self.inputs.as_slice(), [only] if only.is_file())
    }

    /// 构建引擎配置
    pub fn engine_config(&self, encoder_path: PathBuf) -> EngineConfig {
        let workers = self.jobs.unwrap_or_else(worker_estimator::estimate);
        let mut config = EngineConfig::with_workers(encoder_path, workers);

        let mut batch = EncodeProfile::batch(config.workers).with_bit_depth(self.bit_depth);
        if self.native {
            batch = batch.preserving_format();
        }
        config.batch_profile = batch;
        config.single_profile = EncodeProfile::single(config.workers).with_bit_depth(self.bit_depth);
        config.skip_existing = !self.overwrite;
        config.job_timeout = self.timeout;
        config
    }
}

/// 构建命令行定义
pub fn build_command() -> Command {
    Command::new("flac2wav")
        .version(VERSION)
        .about(DESCRIPTION)
        .arg(
            Arg::new("INPUT")
                .help("FLAC文件或目录路径。如果不指定，将扫描可执行文件所在目录")
                .num_args(0..)
                .value_parser(clap::value_parser!(PathBuf))
                .index(1),
        )
        .arg(
            Arg::new("output-dir")
                .long("output-dir")
                .short('o')
                .help("输出目录（默认与源文件同目录）")
                .value_name("DIR")
                .value_parser(clap::value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("output-name")
                .long("output-name")
                .help("输出文件名，扩展名强制为 .wav（仅单文件）")
                .value_name("NAME"),
        )
        .arg(
            Arg::new("recursive")
                .long("recursive")
                .short('r')
                .help("递归扫描子目录")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("ffmpeg")
                .long("ffmpeg")
                .help("FFmpeg可执行文件路径（默认依次查找 FLAC2WAV_FFMPEG、PATH、bin/）")
                .value_name("PATH")
                .value_parser(clap::value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("jobs")
                .long("jobs")
                .short('j')
                .help("并行转换数（默认按CPU核心与内存估算，1-8）")
                .value_name("N")
                .value_parser(clap::value_parser!(u16).range(1..=MAX_WORKERS as i64)),
        )
        .arg(
            Arg::new("bit-depth")
                .long("bit-depth")
                .help("输出位深")
                .value_name("BITS")
                .value_parser(["16", "24"])
                .default_value("16"),
        )
        .arg(
            Arg::new("native")
                .long("native")
                .help("批量模式保留源采样率与声道（默认归一化为44.1kHz立体声）")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("timeout")
                .long("timeout")
                .help("单个文件编码时限（秒），超时终止编码器")
                .value_name("SECS")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
        .arg(
            Arg::new("overwrite")
                .long("overwrite")
                .help("重新编码已存在的输出文件")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("fail-fast")
                .long("fail-fast")
                .help("遇到第一个错误即取消剩余任务")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("json")
                .long("json")
                .help("以JSON行输出事件")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("report")
                .long("report")
                .help("将转换报告写入文件")
                .value_name("FILE")
                .value_parser(clap::value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("verbose")
                .long("verbose")
                .short('v')
                .help("显示详细处理信息")
                .action(ArgAction::SetTrue),
        )
}

/// 解析命令行参数并创建配置（参数错误时打印用法并退出）
pub fn parse_args() -> AppConfig {
    from_matches(&build_command().get_matches())
}

/// 从给定参数解析配置
pub fn parse_args_from<I, T>(args: I) -> Result<AppConfig, clap::Error>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    build_command()
        .try_get_matches_from(args)
        .map(|matches| from_matches(&matches))
}

fn from_matches(matches: &ArgMatches) -> AppConfig {
    let mut inputs: Vec<PathBuf> = matches
        .get_many::<PathBuf>("INPUT")
        .map(|values| values.cloned().collect())
        .unwrap_or_default();

    if inputs.is_empty() {
        // 双击启动模式：使用可执行文件所在目录
        let exe_path = std::env::current_exe().unwrap_or_else(|_| PathBuf::from("."));
        inputs.push(super::utils::get_parent_dir(&exe_path).to_path_buf());
    }

    let bit_depth = matches
        .get_one::<String>("bit-depth")
        .and_then(|bits| bits.parse().ok())
        .and_then(BitDepth::from_bits)
        .unwrap_or(BitDepth::Pcm16);

    AppConfig {
        inputs,
        output_dir: matches.get_one::<PathBuf>("output-dir").cloned(),
        output_name: matches.get_one::<String>("output-name").cloned(),
        recursive: matches.get_flag("recursive"),
        encoder_path: matches.get_one::<PathBuf>("ffmpeg").cloned(),
        jobs: matches.get_one::<u16>("jobs").map(|&n| usize::from(n)),
        bit_depth,
        native: matches.get_flag("native"),
        timeout: matches
            .get_one::<u64>("timeout")
            .map(|&secs| Duration::from_secs(secs)),
        overwrite: matches.get_flag("overwrite"),
        fail_fast: matches.get_flag("fail-fast"),
        json: matches.get_flag("json"),
        report: matches.get_one::<PathBuf>("report").cloned(),
        verbose: matches.get_flag("verbose"),
    }
}

/// 显示程序启动信息
pub fn show_startup_info(
    config: &AppConfig,
    encoder: &Path,
    encoder_version: Option<&str>,
    workers: usize,
) {
    if config.json {
        return;
    }
    println!("🚀 FLAC2WAV v{VERSION} 启动");
    println!("📝 {DESCRIPTION}");
    if config.verbose {
        println!("🔧 编码器: {}", encoder.display());
        if let Some(version) = encoder_version {
            println!("   {version}");
        }
        println!("🧵 并行数: {workers}");
        println!(
            "🎚️  输出: {}-bit{}",
            config.bit_depth.bits(),
            if config.native {
                "，保留源格式"
            } else {
                ""
            }
        );
    }
    println!();
}
