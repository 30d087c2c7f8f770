//! 批次统计管理
//!
//! 统计成功/跳过/失败/取消数与按类别分组的失败文件，可被多个线程并发更新。

use super::job::{ConversionOutcome, ConversionResult};
use crate::error::ErrorCategory;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// 批次统计快照
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchStatsSnapshot {
    /// 编码成功的文件数
    pub converted: usize,
    /// 输出已存在而跳过的文件数
    pub skipped: usize,
    /// 失败的文件数
    pub failed: usize,
    /// 被取消的文件数（已派发但被终止或未启动）
    pub cancelled: usize,
    /// 错误分类统计（错误类型 -> 失败文件列表）
    pub error_stats: BTreeMap<ErrorCategory, Vec<String>>,
}

impl BatchStatsSnapshot {
    /// 产生结果的任务总数
    pub fn finished(&self) -> usize {
        self.converted + self.skipped + self.failed + self.cancelled
    }

    /// 没有失败也没有取消
    pub fn is_clean(&self) -> bool {
        self.failed == 0 && self.cancelled == 0
    }
}

/// 并行批次统计（多线程安全）
///
/// 克隆共享同一份计数（Arc）
#[derive(Debug, Clone, Default)]
pub struct ParallelBatchStats {
    converted: Arc<AtomicUsize>,
    skipped: Arc<AtomicUsize>,
    failed: Arc<AtomicUsize>,
    cancelled: Arc<AtomicUsize>,
    error_stats: Arc<Mutex<BTreeMap<ErrorCategory, Vec<String>>>>,
}

impl ParallelBatchStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// 按结果累加计数
    pub fn record(&self, result: &ConversionResult) {
        match &result.outcome {
            ConversionOutcome::Success { .. } => {
                self.converted.fetch_add(1, Ordering::Relaxed);
            }
            ConversionOutcome::Skipped { .. } => {
                self.skipped.fetch_add(1, Ordering::Relaxed);
            }
            ConversionOutcome::Cancelled => {
                self.cancelled.fetch_add(1, Ordering::Relaxed);
            }
            ConversionOutcome::Failure { category, .. } => {
                self.inc_failed(*category, result.job.display_name());
            }
        }
    }

    /// 增加失败计数并记录错误分类
    pub fn inc_failed(&self, category: ErrorCategory, filename: String) -> usize {
        let count = self.failed.fetch_add(1, Ordering::Relaxed) + 1;

        if let Ok(mut stats) = self.error_stats.lock() {
            stats.entry(category).or_default().push(filename);
        }

        count
    }

    /// 获取统计快照
    pub fn snapshot(&self) -> BatchStatsSnapshot {
        BatchStatsSnapshot {
            converted: self.converted.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            cancelled: self.cancelled.load(Ordering::Relaxed),
            error_stats: self
                .error_stats
                .lock()
                .map(|stats| stats.clone())
                .unwrap_or_default(),
        }
    }
}

/// 批次汇总，`BatchHandle::wait()` 的返回值
#[derive(Debug, Clone, Serialize)]
pub struct BatchSummary {
    /// 输入任务总数
    pub total: usize,
    /// 因取消从未派发的任务数
    pub not_dispatched: usize,
    pub stats: BatchStatsSnapshot,
    /// 按输入顺序排列的结果
    pub results: Vec<ConversionResult>,
    #[serde(with = "duration_secs")]
    pub elapsed: Duration,
}

impl BatchSummary {
    pub fn was_cancelled(&self) -> bool {
        self.not_dispatched > 0 || self.stats.cancelled > 0
    }
}

mod duration_secs {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::job::JobDescriptor;
    use crate::error::ConvertError;

    fn result(name: &str, outcome: ConversionOutcome) -> ConversionResult {
        ConversionResult::new(JobDescriptor::for_batch(name, None), outcome)
    }

    #[test]
    fn test_record_each_outcome() {
        let stats = ParallelBatchStats::new();
        stats.record(&result(
            "a.flac",
            ConversionOutcome::Success {
                output: "a.wav".into(),
            },
        ));
        stats.record(&result(
            "b.flac",
            ConversionOutcome::Skipped {
                output: "b.wav".into(),
            },
        ));
        stats.record(&ConversionResult::failed(
            JobDescriptor::for_batch("c.flac", None),
            &ConvertError::EncodeError("boom".into()),
        ));
        stats.record(&result("d.flac", ConversionOutcome::Cancelled));

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.converted, 1);
        assert_eq!(snapshot.skipped, 1);
        assert_eq!(snapshot.failed, 1);
        assert_eq!(snapshot.cancelled, 1);
        assert_eq!(snapshot.finished(), 4);
        assert!(!snapshot.is_clean());
        assert_eq!(snapshot.error_stats[&ErrorCategory::Encode], vec!["c.flac"]);
    }

    #[test]
    fn test_parallel_stats_concurrent_updates() {
        use rayon::prelude::*;

        let stats = ParallelBatchStats::new();

        (0..100).into_par_iter().for_each(|i| {
            stats.record(&result(
                &format!("ok{i}.flac"),
                ConversionOutcome::Success {
                    output: format!("ok{i}.wav").into(),
                },
            ));
        });
        (0..50).into_par_iter().for_each(|i| {
            stats.inc_failed(ErrorCategory::Input, format!("missing{i}.flac"));
        });

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.converted, 100);
        assert_eq!(snapshot.failed, 50);
        assert_eq!(snapshot.error_stats[&ErrorCategory::Input].len(), 50);
    }

    #[test]
    fn test_parallel_stats_clone_shares_state() {
        let stats1 = ParallelBatchStats::new();
        stats1.inc_failed(ErrorCategory::Io, "x.flac".into());

        let stats2 = stats1.clone();
        stats2.inc_failed(ErrorCategory::Io, "y.flac".into());

        assert_eq!(stats1.snapshot().failed, 2);
        assert_eq!(stats2.snapshot().failed, 2);
    }

    #[test]
    fn test_empty_snapshot_is_clean() {
        let snapshot = ParallelBatchStats::new().snapshot();
        assert!(snapshot.is_clean());
        assert_eq!(snapshot.finished(), 0);
    }
}
