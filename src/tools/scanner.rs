//! 文件扫描模块
//!
//! 把命令行输入（文件或目录）展开为有序、去重的FLAC文件列表。

use super::cli::AppConfig;
use super::constants::encoding::SOURCE_EXTENSIONS;
use super::utils;
use crate::error::{ConvertError, ConvertResult};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// 扫描目录中的FLAC文件（按路径排序）
pub fn scan_flac_files(dir_path: &Path, recursive: bool) -> ConvertResult<Vec<PathBuf>> {
    if !dir_path.exists() {
        return Err(ConvertError::IoError(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("目录不存在: {}", dir_path.display()),
        )));
    }

    if !dir_path.is_dir() {
        return Err(ConvertError::InvalidInput(format!(
            "路径不是目录: {}",
            dir_path.display()
        )));
    }

    let walker = WalkDir::new(dir_path)
        .min_depth(1)
        .max_depth(if recursive { usize::MAX } else { 1 })
        .follow_links(true);

    let mut files = Vec::new();
    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                // 无权限的子目录等：跳过，不中断扫描
                tracing::warn!(error = %e, "skipping unreadable entry");
                continue;
            }
        };

        if entry.file_type().is_file() && utils::has_extension(entry.path(), SOURCE_EXTENSIONS) {
            files.push(entry.into_path());
        }
    }

    files.sort();
    Ok(files)
}

/// 展开输入列表
///
/// 目录被扫描；其他路径原样保留（不存在的文件交给引擎报告输入错误）。
/// 结果保持首次出现的顺序并去重。
pub fn collect_inputs(inputs: &[PathBuf], recursive: bool) -> ConvertResult<Vec<PathBuf>> {
    let mut seen = HashSet::new();
    let mut files = Vec::new();

    for input in inputs {
        let expanded = if input.is_dir() {
            scan_flac_files(input, recursive)?
        } else {
            vec![input.clone()]
        };

        for file in expanded {
            if seen.insert(file.clone()) {
                files.push(file);
            }
        }
    }

    Ok(files)
}

/// 显示文件扫描结果
pub fn show_scan_results(config: &AppConfig, files: &[PathBuf]) {
    if config.json {
        return;
    }

    if files.is_empty() {
        for input in &config.inputs {
            println!("⚠️  在 {} 中没有找到FLAC文件", input.display());
        }
        if !config.recursive {
            println!("   提示: 使用 --recursive 扫描子目录");
        }
        return;
    }

    println!("🎵 找到 {} 个FLAC文件", files.len());

    if config.verbose {
        for (i, file) in files.iter().enumerate() {
            println!("   {}. {}", i + 1, utils::extract_filename_lossy(file));
        }
    }
    println!();
}
