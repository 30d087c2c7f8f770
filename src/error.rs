//! 统一错误处理框架
//!
//! 转换流程中所有失败的类型定义。任何错误都在任务边界被捕获并转换为
//! 事件，不会从工作线程传播到调度线程或调用方。

use std::fmt;
use std::io;
use std::time::Duration;

/// 转换相关的统一错误类型
#[derive(Debug)]
pub enum ConvertError {
    /// 输入错误：源文件不存在或参数无效，任务不会被派发
    InvalidInput(String),

    /// 文件I/O错误（创建输出目录等）
    IoError(io::Error),

    /// 编码错误：编码器非零退出，或零退出但未生成输出文件
    EncodeError(String),

    /// 启动错误：编码器不存在或无法执行
    SpawnError(String),

    /// 单个编码调用超过配置的时限，子进程已被终止
    Timeout(Duration),

    /// 资源错误（线程池创建失败等）
    ResourceError(String),
}

impl fmt::Display for ConvertError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConvertError::InvalidInput(msg) => write!(f, "输入验证失败 / Invalid input: {msg}"),
            ConvertError::IoError(err) => write!(f, "文件I/O错误 / I/O error: {err}"),
            ConvertError::EncodeError(msg) => write!(f, "编码失败 / Encode failed: {msg}"),
            ConvertError::SpawnError(msg) => {
                write!(f, "编码器无法启动 / Encoder unavailable: {msg}")
            }
            ConvertError::Timeout(limit) => {
                write!(f, "编码超时 / Encode timed out after {:.1}s", limit.as_secs_f64())
            }
            ConvertError::ResourceError(msg) => write!(f, "资源访问错误 / Resource error: {msg}"),
        }
    }
}

impl std::error::Error for ConvertError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConvertError::IoError(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for ConvertError {
    fn from(err: io::Error) -> Self {
        ConvertError::IoError(err)
    }
}

/// 转换操作的标准Result类型
pub type ConvertResult<T> = Result<T, ConvertError>;

// ==================== 错误转换Helper函数 ====================

/// 创建编码错误的helper函数
#[inline]
pub fn encode_error<E: fmt::Display>(context: &str, err: E) -> ConvertError {
    ConvertError::EncodeError(format!("{context}: {err}"))
}

/// 创建启动错误的helper函数
#[inline]
pub fn spawn_error<E: fmt::Display>(context: &str, err: E) -> ConvertError {
    ConvertError::SpawnError(format!("{context}: {err}"))
}

// ==================== 错误分类系统 ====================
// 用于批量转换中的失败统计和退出码映射

/// 错误类别枚举
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, PartialOrd, Ord, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// 输入错误（源文件缺失等）
    Input,
    /// 编码错误（非零退出、无输出、超时）
    Encode,
    /// 编码器启动失败
    Spawn,
    /// 文件系统错误
    Io,
    /// 其他未分类错误
    Other,
}

impl ErrorCategory {
    /// 从ConvertError提取错误类别
    pub fn from_convert_error(e: &ConvertError) -> Self {
        match e {
            ConvertError::InvalidInput(_) => Self::Input,
            ConvertError::EncodeError(_) | ConvertError::Timeout(_) => Self::Encode,
            ConvertError::SpawnError(_) => Self::Spawn,
            ConvertError::IoError(_) => Self::Io,
            ConvertError::ResourceError(_) => Self::Other,
        }
    }

    /// 获取错误类别的显示名称
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Input => "输入错误 / Input",
            Self::Encode => "编码错误 / Encode",
            Self::Spawn => "启动错误 / Spawn",
            Self::Io => "I/O错误 / I/O",
            Self::Other => "其他错误 / Other",
        }
    }
}
