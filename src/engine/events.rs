//! 转换事件流
//!
//! 引擎通过 [`EventSink`] 观察者接口向外发布事件，GUI/CLI 等协作方只消费事件。
//! 单个任务内事件严格有序：`Started → Progress* → (Completed | Error | Cancelled)`；
//! 任务之间按完成先后上报；`BatchDone` 永远是一个批次的最后一个事件，且只发一次。

use crossbeam_channel::{Receiver, Sender};
use serde::Serialize;
use std::path::PathBuf;

/// 转换事件
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ConversionEvent {
    /// 开始编码
    Started { source: PathBuf },
    /// 进度（按提交序号计算，0..=100）
    Progress { source: PathBuf, percent: u8 },
    /// 完成；`skipped` 表示输出已存在未重新编码
    Completed {
        source: PathBuf,
        output: PathBuf,
        skipped: bool,
    },
    /// 单个任务失败，不影响批次中其他任务
    Error { source: PathBuf, message: String },
    /// 任务被取消
    Cancelled { source: PathBuf },
    /// 批次结束
    BatchDone,
}

impl ConversionEvent {
    /// 事件关联的源文件（BatchDone 没有）
    pub fn source(&self) -> Option<&PathBuf> {
        match self {
            Self::Started { source }
            | Self::Progress { source, .. }
            | Self::Completed { source, .. }
            | Self::Error { source, .. }
            | Self::Cancelled { source } => Some(source),
            Self::BatchDone => None,
        }
    }

    /// 是否为单个任务的终结事件
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed { .. } | Self::Error { .. } | Self::Cancelled { .. }
        )
    }
}

/// 事件观察者
///
/// 由工作线程并发调用，实现必须线程安全且不应阻塞。
pub trait EventSink: Send + Sync {
    fn emit(&self, event: ConversionEvent);
}

impl EventSink for Sender<ConversionEvent> {
    fn emit(&self, event: ConversionEvent) {
        // 接收端已关闭时丢弃事件
        let _ = self.send(event);
    }
}

/// 丢弃所有事件
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: ConversionEvent) {}
}

/// 创建无界事件通道，工作线程发布事件永不阻塞
pub fn event_channel() -> (Sender<ConversionEvent>, Receiver<ConversionEvent>) {
    crossbeam_channel::unbounded()
}
