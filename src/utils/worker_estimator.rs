//! 工作线程数估算
//!
//! 根据物理核心数与系统内存推导转换线程池的并发度。
//! 估算本身是纯函数，主机探测与策略计算分离，便于在任意输入下验证。

use crate::tools::constants::worker_limits::{
    FALLBACK_CORES, FALLBACK_MEMORY_FACTOR, FALLBACK_TOTAL_MEMORY_GIB, LOW_MEMORY_GIB, MAX_WORKERS,
    MEDIUM_MEMORY_GIB, MEMORY_FACTOR_DIVISOR_GIB, MIN_WORKERS,
};
use sysinfo::{MemoryRefreshKind, RefreshKind, System};

const BYTES_PER_GIB: f64 = 1024.0 * 1024.0 * 1024.0;

/// 主机资源快照
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HostResources {
    /// 物理核心数（探测失败时为逻辑核心数或回退值）
    pub physical_cores: usize,
    /// 系统总内存（GiB），None 表示无法探测
    pub total_memory_gib: Option<f64>,
    /// 当前可用内存（GiB），None 表示无法探测
    pub available_memory_gib: Option<f64>,
}

impl HostResources {
    /// 探测当前主机
    ///
    /// 任一项探测失败都以 None/回退值表示，从不报错
    pub fn detect() -> Self {
        let mut system = System::new_with_specifics(
            RefreshKind::new().with_memory(MemoryRefreshKind::everything()),
        );
        system.refresh_memory();

        let physical_cores = system
            .physical_core_count()
            .filter(|&n| n > 0)
            .or_else(|| std::thread::available_parallelism().ok().map(|n| n.get()))
            .unwrap_or(FALLBACK_CORES);

        // sysinfo 返回字节；0 视为平台不支持
        let to_gib = |bytes: u64| (bytes > 0).then(|| bytes as f64 / BYTES_PER_GIB);

        Self {
            physical_cores,
            total_memory_gib: to_gib(system.total_memory()),
            available_memory_gib: to_gib(system.available_memory()),
        }
    }

    /// 可用内存系数：每2GiB可用内存对应满负荷，上限1.0
    pub fn memory_factor(&self) -> f64 {
        match self.available_memory_gib {
            Some(available) => (available / MEMORY_FACTOR_DIVISOR_GIB).min(1.0),
            None => FALLBACK_MEMORY_FACTOR,
        }
    }
}

/// 按主机资源计算工作线程数，结果始终落在 [1, 8]
///
/// - 总内存 < 4GiB：`max(1, round(cores × 0.5 × factor))`
/// - 4GiB ≤ 总内存 < 8GiB：`max(2, round(cores × 0.75 × factor))`
/// - 总内存 ≥ 8GiB：`max(2, round(cores × factor))`
pub fn estimate_worker_count(host: &HostResources) -> usize {
    let cores = host.physical_cores as f64;
    let total = host.total_memory_gib.unwrap_or(FALLBACK_TOTAL_MEMORY_GIB);
    let factor = host.memory_factor();

    let scaled = |ratio: f64| (cores * ratio * factor).round().max(0.0) as usize;

    let count = if total < LOW_MEMORY_GIB {
        scaled(0.5).max(1)
    } else if total < MEDIUM_MEMORY_GIB {
        scaled(0.75).max(2)
    } else {
        scaled(1.0).max(2)
    };

    count.clamp(MIN_WORKERS, MAX_WORKERS)
}

/// 探测当前主机并估算工作线程数
pub fn estimate() -> usize {
    let host = HostResources::detect();
    let workers = estimate_worker_count(&host);
    tracing::debug!(
        cores = host.physical_cores,
        total_gib = ?host.total_memory_gib,
        available_gib = ?host.available_memory_gib,
        workers,
        "estimated worker count"
    );
    workers
}

#[cfg(test)]
mod tests {
    use super::*;

    fn host(cores: usize, total: Option<f64>, available: Option<f64>) -> HostResources {
        HostResources {
            physical_cores: cores,
            total_memory_gib: total,
            available_memory_gib: available,
        }
    }

    #[test]
    fn test_low_memory_tier() {
        // 2GiB总内存，1GiB可用 → factor 0.5 → 4 × 0.5 × 0.5 = 1
        assert_eq!(estimate_worker_count(&host(4, Some(2.0), Some(1.0))), 1);
        // 内存系数极小时仍保证至少1个
        assert_eq!(estimate_worker_count(&host(4, Some(2.0), Some(0.01))), 1);
    }

    #[test]
    fn test_medium_memory_tier() {
        // 6GiB总内存，充足可用 → 8 × 0.75 × 1.0 = 6
        assert_eq!(estimate_worker_count(&host(8, Some(6.0), Some(4.0))), 6);
        // 下限为2
        assert_eq!(estimate_worker_count(&host(1, Some(6.0), Some(4.0))), 2);
    }

    #[test]
    fn test_high_memory_tier_and_ceiling() {
        assert_eq!(estimate_worker_count(&host(6, Some(16.0), Some(8.0))), 6);
        // 64核也不超过8
        assert_eq!(estimate_worker_count(&host(64, Some(128.0), Some(100.0))), 8);
        // 可用内存1GiB → factor 0.5 → 6 × 0.5 = 3
        assert_eq!(estimate_worker_count(&host(6, Some(16.0), Some(1.0))), 3);
    }

    #[test]
    fn test_rounding_not_truncation() {
        // 3 × 0.75 × 1.0 = 2.25 → 2；5 × 0.75 = 3.75 → 4
        assert_eq!(estimate_worker_count(&host(3, Some(6.0), Some(3.0))), 2);
        assert_eq!(estimate_worker_count(&host(5, Some(6.0), Some(3.0))), 4);
    }

    #[test]
    fn test_introspection_unavailable_fallback() {
        // 假定8GiB总内存、factor 0.8：4 × 0.8 = 3.2 → 3
        assert_eq!(estimate_worker_count(&host(4, None, None)), 3);
        assert!((host(4, None, None).memory_factor() - FALLBACK_MEMORY_FACTOR).abs() < 1e-9);
    }

    #[test]
    fn test_always_within_bounds() {
        let totals = [None, Some(0.5), Some(3.9), Some(4.0), Some(7.9), Some(8.0), Some(256.0)];
        let availables = [None, Some(0.0), Some(0.3), Some(1.9), Some(2.0), Some(64.0)];

        for cores in [0, 1, 2, 3, 7, 16, 128] {
            for total in totals {
                for available in availables {
                    let n = estimate_worker_count(&host(cores, total, available));
                    assert!(
                        (MIN_WORKERS..=MAX_WORKERS).contains(&n),
                        "cores={cores} total={total:?} available={available:?} → {n}"
                    );
                }
            }
        }
    }

    #[test]
    fn test_detect_current_host() {
        let host = HostResources::detect();
        assert!(host.physical_cores > 0);
        let n = estimate();
        assert!((1..=8).contains(&n));
    }
}
