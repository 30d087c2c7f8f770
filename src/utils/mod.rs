//! 工具模块
//!
//! 主机资源探测与并发度估算。

pub mod worker_estimator;

// 重新导出公共接口
pub use worker_estimator::{HostResources, estimate, estimate_worker_count};
