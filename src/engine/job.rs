//! 任务描述与转换结果
//!
//! 两者都是不可变值对象，在线程与事件边界之间按值传递，无需同步。

use crate::error::{ConvertError, ErrorCategory};
use crate::tools::constants::encoding::OUTPUT_EXTENSION;
use crate::tools::utils;
use serde::Serialize;
use std::path::{Path, PathBuf};

/// 单个文件的转换任务
///
/// 不变式：`output_path == output_dir / output_filename`，扩展名始终为 `.wav`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct JobDescriptor {
    source_path: PathBuf,
    output_dir: PathBuf,
    output_filename: String,
    output_path: PathBuf,
}

impl JobDescriptor {
    /// 创建任务
    ///
    /// - `output_dir` 缺省为源文件所在目录
    /// - `output_filename` 缺省为源文件名去扩展名；给定时扩展名强制改为 `.wav`
    pub fn new(
        source_path: impl AsRef<Path>,
        output_dir: Option<&Path>,
        output_filename: Option<&str>,
    ) -> Self {
        let source_path = source_path.as_ref().to_path_buf();
        let output_dir = output_dir
            .map(Path::to_path_buf)
            .unwrap_or_else(|| utils::get_parent_dir(&source_path).to_path_buf());

        let stem = match output_filename {
            Some(name) => utils::extract_file_stem_string(Path::new(name)),
            None => utils::extract_file_stem_string(&source_path),
        };
        let output_filename = format!("{stem}.{OUTPUT_EXTENSION}");
        let output_path = output_dir.join(&output_filename);

        Self {
            source_path,
            output_dir,
            output_filename,
            output_path,
        }
    }

    /// 批量任务：文件名由源文件派生
    pub fn for_batch(source_path: impl AsRef<Path>, output_dir: Option<&Path>) -> Self {
        Self::new(source_path, output_dir, None)
    }

    pub fn source_path(&self) -> &Path {
        &self.source_path
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn output_filename(&self) -> &str {
        &self.output_filename
    }

    pub fn output_path(&self) -> &Path {
        &self.output_path
    }

    /// 用于日志/表格显示的源文件名
    pub fn display_name(&self) -> String {
        utils::extract_filename_lossy(&self.source_path)
    }
}

/// 单个任务的结局
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ConversionOutcome {
    /// 编码成功，输出文件已存在于磁盘
    Success { output: PathBuf },
    /// 失败（输入缺失、编码失败、超时等）
    Failure {
        category: ErrorCategory,
        message: String,
    },
    /// 输出已存在，跳过重复编码
    Skipped { output: PathBuf },
    /// 被取消：进程被终止或从未启动
    Cancelled,
}

impl ConversionOutcome {
    pub fn from_error(err: &ConvertError) -> Self {
        Self::Failure {
            category: ErrorCategory::from_convert_error(err),
            message: err.to_string(),
        }
    }

    /// 成功或跳过时的输出路径
    pub fn output_path(&self) -> Option<&Path> {
        match self {
            Self::Success { output } | Self::Skipped { output } => Some(output),
            _ => None,
        }
    }
}

/// 单个任务的结果，每个任务恰好产生一次
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConversionResult {
    pub job: JobDescriptor,
    pub outcome: ConversionOutcome,
}

impl ConversionResult {
    pub fn new(job: JobDescriptor, outcome: ConversionOutcome) -> Self {
        Self { job, outcome }
    }

    pub fn failed(job: JobDescriptor, err: &ConvertError) -> Self {
        Self::new(job, ConversionOutcome::from_error(err))
    }

    #[inline]
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, ConversionOutcome::Success { .. })
    }

    #[inline]
    pub fn is_skipped(&self) -> bool {
        matches!(self.outcome, ConversionOutcome::Skipped { .. })
    }

    #[inline]
    pub fn is_failure(&self) -> bool {
        matches!(self.outcome, ConversionOutcome::Failure { .. })
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        matches!(self.outcome, ConversionOutcome::Cancelled)
    }
}
