//! 编码器定位
//!
//! 按优先级查找外部编码器：显式路径 → 环境变量 → PATH → 随程序分发的 bin/ 目录。
//! 定位总会给出一个路径，是否可用由 prober 判定。

use crate::tools::constants::process::{BUNDLED_DIR, ENCODER_BINARY, ENCODER_ENV_VAR};
use std::path::{Path, PathBuf};

/// FFmpeg安装指南（跨平台）
pub const INSTALL_GUIDE: &str = r#"
FFmpeg is required for FLAC → WAV conversion / 需要安装FFmpeg才能进行FLAC转WAV

Installation / 安装方法:
  macOS:   brew install ffmpeg
  Windows: https://www.gyan.dev/ffmpeg/builds/
           或使用: winget install Gyan.FFmpeg
  Linux:
    - Ubuntu/Debian: sudo apt install ffmpeg
    - Fedora/RHEL:   sudo dnf install ffmpeg
    - Arch:          sudo pacman -S ffmpeg

也可以用 --ffmpeg <PATH> 或环境变量 FLAC2WAV_FFMPEG 指定路径
Or pass --ffmpeg <PATH> / set FLAC2WAV_FFMPEG

Official site / 官方网站: https://ffmpeg.org/download.html
"#;

/// 定位编码器可执行文件
pub fn locate_encoder(explicit: Option<&Path>) -> PathBuf {
    if let Some(path) = explicit {
        return path.to_path_buf();
    }

    if let Some(path) = std::env::var_os(ENCODER_ENV_VAR).filter(|v| !v.is_empty()) {
        return PathBuf::from(path);
    }

    if let Ok(path) = which::which(ENCODER_BINARY) {
        return path;
    }

    // 便携部署：与可执行文件同目录的 bin/ 子目录
    bundled_encoder_path()
        .filter(|path| path.is_file())
        .unwrap_or_else(|| PathBuf::from(ENCODER_BINARY))
}

/// 随程序分发的编码器路径（可执行文件目录/bin/ffmpeg）
pub fn bundled_encoder_path() -> Option<PathBuf> {
    let exe = std::env::current_exe().ok()?;
    Some(exe.parent()?.join(BUNDLED_DIR).join(ENCODER_BINARY))
}

/// 当前平台名称（windows/macos/linux）
pub fn platform_name() -> &'static str {
    if cfg!(target_os = "windows") {
        "windows"
    } else if cfg!(target_os = "macos") {
        "macos"
    } else {
        "linux"
    }
}
