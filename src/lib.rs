//! FLAC2WAV - 基于外部编码器的FLAC转WAV批量转换工具
//!
//! 编码完全委托给FFmpeg子进程，本库负责的是调度：
//!
//! ## 核心特性
//! - 固定大小的工作线程池，大小按物理核心数与可用内存估算（1-8）
//! - 后台调度，调用方从不被阻塞；类型化事件流（开始/进度/完成/错误/批次结束）
//! - 部分失败隔离：单个文件失败不影响批次中的其他文件
//! - 取消：停止派发新任务，并立即终止运行中的编码器进程
//! - 输出文件存在才算成功，零退出码本身不够

pub mod encoder;
pub mod engine;
pub mod error;
pub mod tools;
pub mod utils;

// 重新导出核心类型
pub use encoder::{BitDepth, EncodeProfile, INSTALL_GUIDE, locate_encoder, probe};
pub use engine::{
    BatchHandle, BatchSummary, ConversionEngine, ConversionEvent, ConversionOutcome,
    ConversionResult, EngineConfig, EventSink, JobDescriptor,
};
pub use error::{ConvertError, ConvertResult, ErrorCategory};
