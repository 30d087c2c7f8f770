//! 编码器能力探测
//!
//! 以 `-version` 调用编码器，输出被捕获后丢弃。启动失败或非零退出都视为不可用，
//! 从不返回错误：调用方把 `false` 当作"功能不可用"提示用户。

use std::path::Path;
use std::process::{Command, Stdio};

/// 探测编码器是否可调用
pub fn probe(encoder: &Path) -> bool {
    match version_output(encoder) {
        Some(_) => true,
        None => {
            tracing::warn!(encoder = %encoder.display(), "encoder probe failed");
            false
        }
    }
}

/// 读取编码器版本（`-version` 输出的第一行）
pub fn detect_version(encoder: &Path) -> Option<String> {
    version_output(encoder)?
        .lines()
        .next()
        .map(|line| line.trim().to_string())
        .filter(|line| !line.is_empty())
}

fn version_output(encoder: &Path) -> Option<String> {
    let output = Command::new(encoder)
        .arg("-version")
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .ok()?;

    output
        .status
        .success()
        .then(|| String::from_utf8_lossy(&output.stdout).into_owned())
}
