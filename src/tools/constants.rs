//! 常量和默认配置集中管理
//!
//! 将所有重要常量集中定义，避免"默认值漂移"和重复定义

/// 工作线程数估算常量
pub mod worker_limits {
    /// 最小并发度
    pub const MIN_WORKERS: usize = 1;

    /// 最大并发度
    ///
    /// 每个工作槽位对应一个编码器子进程，超过8个收益递减
    pub const MAX_WORKERS: usize = 8;

    /// 低内存阈值（GiB），低于此值按0.5倍核心数计算
    pub const LOW_MEMORY_GIB: f64 = 4.0;

    /// 中等内存阈值（GiB），低于此值按0.75倍核心数计算
    pub const MEDIUM_MEMORY_GIB: f64 = 8.0;

    /// 无法获取内存信息时假定的总内存（GiB）
    pub const FALLBACK_TOTAL_MEMORY_GIB: f64 = 8.0;

    /// 无法获取可用内存时使用的保守内存系数
    pub const FALLBACK_MEMORY_FACTOR: f64 = 0.8;

    /// 可用内存系数分母：每2GiB可用内存对应满负荷
    pub const MEMORY_FACTOR_DIVISOR_GIB: f64 = 2.0;

    /// 无法获取核心数时假定的物理核心数
    pub const FALLBACK_CORES: usize = 2;
}

/// 编码参数默认值
pub mod encoding {
    /// 批量模式默认采样率（CD标准）
    pub const DEFAULT_SAMPLE_RATE: u32 = 44_100;

    /// 批量模式默认声道数（立体声）
    pub const DEFAULT_CHANNELS: u16 = 2;

    /// 传递给编码器自身的最小线程提示
    pub const MIN_ENCODER_THREADS: usize = 2;

    /// 输出扩展名
    pub const OUTPUT_EXTENSION: &str = "wav";

    /// 扫描目录时识别的源文件扩展名
    pub const SOURCE_EXTENSIONS: &[&str] = &["flac"];
}

/// 进程管理常量
pub mod process {
    /// 子进程退出轮询间隔（毫秒）
    ///
    /// 轮询期间不持有进程锁，cancel() 可随时终止子进程
    pub const EXIT_POLL_INTERVAL_MS: u64 = 20;

    /// 编码器路径覆盖环境变量
    pub const ENCODER_ENV_VAR: &str = "FLAC2WAV_FFMPEG";

    /// 编码器可执行文件名
    #[cfg(target_os = "windows")]
    pub const ENCODER_BINARY: &str = "ffmpeg.exe";
    #[cfg(not(target_os = "windows"))]
    pub const ENCODER_BINARY: &str = "ffmpeg";

    /// 随程序分发的编码器所在子目录
    pub const BUNDLED_DIR: &str = "bin";
}
