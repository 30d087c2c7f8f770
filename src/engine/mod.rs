//! 批量转换引擎
//!
//! 有界并发的任务调度：固定大小的工作线程池、后台调度线程、事件流与取消协议。

pub mod batch_state;
pub mod converter;
pub mod events;
pub mod job;
pub mod state;

pub use batch_state::{BatchStatsSnapshot, BatchSummary, ParallelBatchStats};
pub use converter::{BatchHandle, ConversionEngine, EngineConfig, progress_percent};
pub use events::{ConversionEvent, EventSink, NullSink, event_channel};
pub use job::{ConversionOutcome, ConversionResult, JobDescriptor};
pub use state::{BatchGeneration, EngineState, ProcessToken};
