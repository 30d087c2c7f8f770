//! 引擎共享状态
//!
//! 取消标志与活动子进程表是调度线程、工作线程与 `cancel()` 调用方之间唯一共享的
//! 可变状态，二者放在同一把锁下，保证"登记进程"与"取消"不会交错出漏网之鱼。
//!
//! 每个批次开始时领取一个递增的代号；`cancel()` 作用于截至当时已领取的全部代号，
//! 之后开始的批次不受影响，也不会清除更早批次的取消状态。

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Child;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// 共享子进程句柄
pub type SharedChild = Arc<Mutex<Child>>;

/// 批次代号，从1开始递增
pub type BatchGeneration = u64;

/// 单次登记的凭据，同一源文件的并发调用各自持有不同凭据
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProcessToken(u64);

#[derive(Debug, Default)]
struct StateInner {
    issued_batches: BatchGeneration,
    cancelled_through: BatchGeneration,
    next_token: u64,
    active_processes: HashMap<ProcessToken, (PathBuf, SharedChild)>,
}

/// 引擎独占的进程级状态
#[derive(Debug, Default)]
pub struct EngineState {
    inner: Mutex<StateInner>,
}

impl EngineState {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, StateInner> {
        // 持锁期间不会panic，中毒时继续使用内部数据
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 开始新批次并返回其代号
    pub fn begin_batch(&self) -> BatchGeneration {
        let mut inner = self.lock();
        inner.issued_batches += 1;
        inner.issued_batches
    }

    /// 指定批次是否已被取消
    pub fn is_cancelled(&self, batch: BatchGeneration) -> bool {
        batch <= self.lock().cancelled_through
    }

    /// 取消所有已开始的批次，终止全部活动子进程并清空进程表
    ///
    /// 终止失败静默忽略，不等待子进程退出。返回发出终止请求的进程数。
    pub fn request_cancel(&self) -> usize {
        let drained: Vec<(PathBuf, SharedChild)> = {
            let mut inner = self.lock();
            inner.cancelled_through = inner.issued_batches;
            inner.active_processes.drain().map(|(_, entry)| entry).collect()
        };

        for (source, child) in &drained {
            if let Err(e) = lock_child(child).kill() {
                tracing::warn!(source = %source.display(), error = %e, "failed to terminate encoder");
            }
        }
        drained.len()
    }

    /// 登记正在运行的子进程
    ///
    /// `batch` 所属批次已取消时拒绝登记并返回 None，调用方应自行终止子进程。
    /// 单文件调用传 None，不受批次取消影响。
    pub fn register(
        &self,
        source: &Path,
        child: SharedChild,
        batch: Option<BatchGeneration>,
    ) -> Option<ProcessToken> {
        let mut inner = self.lock();
        if batch.is_some_and(|b| b <= inner.cancelled_through) {
            return None;
        }
        inner.next_token += 1;
        let token = ProcessToken(inner.next_token);
        inner
            .active_processes
            .insert(token, (source.to_path_buf(), child));
        Some(token)
    }

    /// 注销子进程；返回 false 表示登记项已被 `request_cancel` 移除
    pub fn unregister(&self, token: ProcessToken) -> bool {
        self.lock().active_processes.remove(&token).is_some()
    }

    /// 当前活动子进程数
    pub fn active_count(&self) -> usize {
        self.lock().active_processes.len()
    }
}

/// 获取子进程锁，中毒时继续使用
pub fn lock_child(child: &SharedChild) -> MutexGuard<'_, Child> {
    child.lock().unwrap_or_else(PoisonError::into_inner)
}
