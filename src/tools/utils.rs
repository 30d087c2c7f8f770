//! 工具函数模块
//!
//! 文件路径处理等通用工具函数。

use std::path::Path;

/// 提取文件名（统一处理路径提取逻辑）
#[inline]
pub fn extract_filename(path: &Path) -> &str {
    path.file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("Unknown")
}

/// 提取文件名（返回String，用于日志显示）
#[inline]
pub fn extract_filename_lossy(path: &Path) -> String {
    path.file_name()
        .unwrap_or_default()
        .to_string_lossy()
        .to_string()
}

/// 获取父目录，裸文件名的父目录视为当前目录
#[inline]
pub fn get_parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}

/// 安全提取文件stem（返回String）
#[inline]
pub fn extract_file_stem_string(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .filter(|stem| !stem.is_empty())
        .unwrap_or_else(|| "audio".to_string())
}

/// 扩展名是否在给定列表中（不区分大小写）
#[inline]
pub fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| extensions.iter().any(|e| e.eq_ignore_ascii_case(ext)))
}

/// 格式化耗时（秒，保留两位小数）
#[inline]
pub fn format_elapsed(elapsed: std::time::Duration) -> String {
    format!("{:.2}s", elapsed.as_secs_f64())
}
