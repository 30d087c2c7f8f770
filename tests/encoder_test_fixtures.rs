//! 编码器测试固件生成器
//!
//! 在临时目录中生成伪造的编码器脚本，替代真实FFmpeg驱动引擎。
//! 每个脚本都把收到的参数追加到 `invocations.log`，便于断言调用次数与参数。
#![cfg(unix)]
#![allow(dead_code)]

use hound::{SampleFormat, WavSpec, WavWriter};
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tempfile::TempDir;

pub fn log(msg_zh: impl AsRef<str>, msg_en: impl AsRef<str>) {
    println!("{} / {}", msg_zh.as_ref(), msg_en.as_ref());
}

/// 测试工作区：源文件目录、输出目录、编码器脚本与调用日志
pub struct EncoderFixture {
    dir: TempDir,
}

impl EncoderFixture {
    pub fn new() -> anyhow::Result<Self> {
        let fixture = Self {
            dir: tempfile::tempdir()?,
        };
        fs::create_dir_all(fixture.music_dir())?;
        fixture.write_wav_template()?;
        Ok(fixture)
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn music_dir(&self) -> PathBuf {
        self.root().join("music")
    }

    pub fn out_dir(&self) -> PathBuf {
        self.root().join("out")
    }

    fn template_path(&self) -> PathBuf {
        self.root().join("template.wav")
    }

    fn log_path(&self) -> PathBuf {
        self.root().join("invocations.log")
    }

    /// 0.1秒静音立体声WAV，成功的编码器把它复制到输出路径
    fn write_wav_template(&self) -> anyhow::Result<()> {
        let spec = WavSpec {
            channels: 2,
            sample_rate: 44_100,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let mut writer = WavWriter::create(self.template_path(), spec)?;
        for _ in 0..4_410 {
            writer.write_sample(0i16)?;
            writer.write_sample(0i16)?;
        }
        writer.finalize()?;
        Ok(())
    }

    /// 在 music/ 下创建源文件（内容无关紧要）
    pub fn source(&self, name: &str) -> anyhow::Result<PathBuf> {
        let path = self.music_dir().join(name);
        fs::write(&path, b"fLaC\0\0\0\x22")?;
        Ok(path)
    }

    pub fn sources(&self, names: &[&str]) -> anyhow::Result<Vec<PathBuf>> {
        names.iter().map(|name| self.source(name)).collect()
    }

    fn write_script(&self, name: &str, body: &str) -> anyhow::Result<PathBuf> {
        let path = self.root().join(name);
        let script = format!(
            "#!/bin/sh\necho \"$@\" >> '{log}'\nfor last; do :; done\n{body}\n",
            log = self.log_path().display()
        );
        fs::write(&path, script)?;
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755))?;
        Ok(path)
    }

    /// 总是成功：把模板WAV复制到最后一个参数（输出路径）
    pub fn success_encoder(&self) -> anyhow::Result<PathBuf> {
        let body = format!("cp '{}' \"$last\"", self.template_path().display());
        self.write_script("ok-encoder.sh", &body)
    }

    /// 输出文件名为 `fail_output` 时非零退出，其余成功
    pub fn failing_encoder(&self, fail_output: &str) -> anyhow::Result<PathBuf> {
        let body = format!(
            "case \"$last\" in\n  */{fail_output}) echo 'Invalid data found when processing input' >&2; exit 1;;\nesac\ncp '{}' \"$last\"",
            self.template_path().display()
        );
        self.write_script("failing-encoder.sh", &body)
    }

    /// 零退出但不写任何输出
    pub fn silent_encoder(&self) -> anyhow::Result<PathBuf> {
        self.write_script("silent-encoder.sh", "exit 0")
    }

    /// 长时间运行（exec 使终止信号直接落在 sleep 上并关闭管道）
    pub fn slow_encoder(&self, secs: u32) -> anyhow::Result<PathBuf> {
        self.write_script("slow-encoder.sh", &format!("exec sleep {secs}"))
    }

    /// 先写入4字节的截断输出，再执行 `then`（挂起或失败）
    pub fn partial_encoder(&self, then: &str) -> anyhow::Result<PathBuf> {
        self.write_script("partial-encoder.sh", &format!("printf RIFF > \"$last\"\n{then}"))
    }

    /// 已记录的编码器调用（每行一次调用的完整参数）
    pub fn invocations(&self) -> Vec<String> {
        fs::read_to_string(self.log_path())
            .map(|content| content.lines().map(str::to_string).collect())
            .unwrap_or_default()
    }
}

/// 轮询直到条件成立或超时
pub fn wait_until(limit: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let started = Instant::now();
    while started.elapsed() < limit {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    condition()
}
