//! 外部编码器调用
//!
//! 单个任务的执行单元：构建命令行、启动子进程、等待退出，并以输出文件存在作为
//! 成功信号（零退出码本身不够）。
//!
//! 子进程句柄登记在 [`EngineState`] 中，等待期间以短间隔轮询退出状态且不持有锁，
//! 因此 `cancel()` 可以在任意时刻终止正在运行的编码器。

use crate::engine::job::JobDescriptor;
use crate::engine::state::{BatchGeneration, EngineState, lock_child};
use crate::error::{ConvertError, ConvertResult, encode_error};
use crate::tools::constants::encoding::{DEFAULT_CHANNELS, DEFAULT_SAMPLE_RATE, MIN_ENCODER_THREADS};
use crate::tools::constants::process::EXIT_POLL_INTERVAL_MS;
use serde::Serialize;
use std::ffi::OsString;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// PCM位深
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BitDepth {
    /// 16-bit（CD标准，DJ设备兼容性最好）
    Pcm16,
    /// 24-bit（保留高解析度源的动态范围）
    Pcm24,
}

impl BitDepth {
    /// 从位数解析
    pub fn from_bits(bits: u16) -> Option<Self> {
        match bits {
            16 => Some(Self::Pcm16),
            24 => Some(Self::Pcm24),
            _ => None,
        }
    }

    /// 对应的编码器codec名称
    pub fn codec(&self) -> &'static str {
        match self {
            Self::Pcm16 => "pcm_s16le",
            Self::Pcm24 => "pcm_s24le",
        }
    }

    pub fn bits(&self) -> u16 {
        match self {
            Self::Pcm16 => 16,
            Self::Pcm24 => 24,
        }
    }
}

/// 采样率/声道归一化参数
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Normalization {
    pub sample_rate: u32,
    pub channels: u16,
}

impl Default for Normalization {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            channels: DEFAULT_CHANNELS,
        }
    }
}

/// 编码参数策略
///
/// 批量模式默认归一化到 44.1kHz/立体声，单文件模式保留源格式；
/// `encoder_threads` 是传给编码器自身的线程提示，与引擎线程池大小无关。
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EncodeProfile {
    pub bit_depth: BitDepth,
    pub normalize: Option<Normalization>,
    pub encoder_threads: usize,
}

impl EncodeProfile {
    /// 批量模式：16-bit/44.1kHz/立体声，线程提示 max(2, workers/2)
    pub fn batch(workers: usize) -> Self {
        Self {
            bit_depth: BitDepth::Pcm16,
            normalize: Some(Normalization::default()),
            encoder_threads: (workers / 2).max(MIN_ENCODER_THREADS),
        }
    }

    /// 单文件模式：16-bit，保留源采样率/声道，线程提示 max(2, workers-1)
    pub fn single(workers: usize) -> Self {
        Self {
            bit_depth: BitDepth::Pcm16,
            normalize: None,
            encoder_threads: workers.saturating_sub(1).max(MIN_ENCODER_THREADS),
        }
    }

    pub fn with_bit_depth(mut self, bit_depth: BitDepth) -> Self {
        self.bit_depth = bit_depth;
        self
    }

    /// 关闭采样率/声道归一化
    pub fn preserving_format(mut self) -> Self {
        self.normalize = None;
        self
    }
}

/// 编码调用结果（错误走 `Err`）
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvocationOutcome {
    /// 零退出且输出文件存在
    Encoded(PathBuf),
    /// 子进程被 `cancel()` 终止，或取消请求先于登记到达
    Cancelled,
}

/// 单个编码调用
#[derive(Debug, Clone)]
pub struct Invocation<'a> {
    encoder: &'a Path,
    job: &'a JobDescriptor,
    profile: &'a EncodeProfile,
}

impl<'a> Invocation<'a> {
    pub fn new(encoder: &'a Path, job: &'a JobDescriptor, profile: &'a EncodeProfile) -> Self {
        Self {
            encoder,
            job,
            profile,
        }
    }

    /// 构建编码器参数（不含程序本身）
    pub fn args(&self) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            "-nostdin".into(),
            "-y".into(),
            "-loglevel".into(),
            "error".into(),
            "-i".into(),
            self.job.source_path().as_os_str().to_owned(),
            "-c:a".into(),
            self.profile.bit_depth.codec().into(),
        ];

        if let Some(norm) = self.profile.normalize {
            args.extend([
                "-ar".into(),
                norm.sample_rate.to_string().into(),
                "-ac".into(),
                norm.channels.to_string().into(),
            ]);
        }

        // 去除元数据 + bit-exact，保证输出字节可复现
        args.extend(
            [
                "-map_metadata",
                "-1",
                "-fflags",
                "+bitexact",
                "-flags:a",
                "+bitexact",
                "-bitexact",
                "-f",
                "wav",
                "-rf64",
                "never",
                "-threads",
            ]
            .map(OsString::from),
        );
        args.push(self.profile.encoder_threads.to_string().into());
        args.push(self.job.output_path().as_os_str().to_owned());
        args
    }

    /// 运行编码器直至退出
    ///
    /// `batch` 为所属批次代号，该批次已取消时子进程启动后立即终止；单文件调用传 None。
    /// 编码器启动后未能成功结束（取消、超时、失败）时删除残留的输出文件。
    pub fn run(
        &self,
        state: &EngineState,
        batch: Option<BatchGeneration>,
        timeout: Option<Duration>,
    ) -> ConvertResult<InvocationOutcome> {
        tracing::debug!(
            encoder = %self.encoder.display(),
            args = ?self.args(),
            "spawning encoder"
        );

        let child = Command::new(self.encoder)
            .args(self.args())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                // 启动期探测之后编码器仍可能消失，此处按编码错误处理
                encode_error(
                    &format!("无法启动编码器 / Failed to spawn {}", self.encoder.display()),
                    e,
                )
            })?;

        let outcome = self.supervise(child, state, batch, timeout);
        if !matches!(outcome, Ok(InvocationOutcome::Encoded(_))) {
            self.discard_partial_output();
        }
        outcome
    }

    fn supervise(
        &self,
        mut child: Child,
        state: &EngineState,
        batch: Option<BatchGeneration>,
        timeout: Option<Duration>,
    ) -> ConvertResult<InvocationOutcome> {
        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());
        let child = Arc::new(Mutex::new(child));

        let Some(token) = state.register(self.job.source_path(), Arc::clone(&child), batch) else {
            terminate(&child);
            let _ = (join_drain(stdout), join_drain(stderr));
            return Ok(InvocationOutcome::Cancelled);
        };

        let waited = wait_for_exit(&child, timeout);
        // 登记项已被 cancel() 移除说明子进程是被取消终止的
        let still_registered = state.unregister(token);
        let _stdout = join_drain(stdout);
        let diagnostics = join_drain(stderr);

        let status = match waited {
            Ok(status) => status,
            Err(WaitError::TimedOut(limit)) => return Err(ConvertError::Timeout(limit)),
            Err(WaitError::Io(e)) => return Err(ConvertError::IoError(e)),
        };

        if !still_registered {
            return Ok(InvocationOutcome::Cancelled);
        }

        self.validate(status, diagnostics.trim())
    }

    /// 删除未完成的输出文件，失败只记录警告
    fn discard_partial_output(&self) {
        let output = self.job.output_path();
        match std::fs::remove_file(output) {
            Ok(()) => tracing::debug!(output = %output.display(), "removed partial output"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(output = %output.display(), error = %e, "failed to remove partial output")
            }
        }
    }

    /// 零退出码 + 输出文件存在才算成功
    fn validate(&self, status: ExitStatus, diagnostics: &str) -> ConvertResult<InvocationOutcome> {
        let output = self.job.output_path();

        if !status.success() {
            return Err(ConvertError::EncodeError(format!(
                "编码器异常退出 / Encoder exited with {status}: {diagnostics}"
            )));
        }

        if !output.exists() {
            return Err(ConvertError::EncodeError(format!(
                "编码器报告成功但未生成输出文件 / Encoder reported success but wrote nothing: {}",
                output.display()
            )));
        }

        Ok(InvocationOutcome::Encoded(output.to_path_buf()))
    }
}

enum WaitError {
    TimedOut(Duration),
    Io(std::io::Error),
}

/// 轮询等待子进程退出，每次只短暂持有锁
fn wait_for_exit(
    child: &Arc<Mutex<Child>>,
    timeout: Option<Duration>,
) -> Result<ExitStatus, WaitError> {
    let started = Instant::now();
    let poll = Duration::from_millis(EXIT_POLL_INTERVAL_MS);

    loop {
        let polled = lock_child(child).try_wait();
        match polled {
            Ok(Some(status)) => return Ok(status),
            Ok(None) => {}
            Err(e) => {
                terminate(child);
                return Err(WaitError::Io(e));
            }
        }

        if let Some(limit) = timeout
            && started.elapsed() >= limit
        {
            tracing::warn!(limit_secs = limit.as_secs_f64(), "encoder timed out, killing");
            terminate(child);
            return Err(WaitError::TimedOut(limit));
        }

        thread::sleep(poll);
    }
}

/// 终止并回收子进程，失败静默
fn terminate(child: &Arc<Mutex<Child>>) {
    let mut guard = lock_child(child);
    let _ = guard.kill();
    let _ = guard.wait();
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> Option<JoinHandle<String>> {
    let mut pipe = pipe?;
    Some(thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = pipe.read_to_end(&mut buf);
        String::from_utf8_lossy(&buf).into_owned()
    }))
}

fn join_drain(handle: Option<JoinHandle<String>>) -> String {
    handle
        .and_then(|h| h.join().ok())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job() -> JobDescriptor {
        JobDescriptor::new(
            Path::new("/music/in/track.flac"),
            Some(Path::new("/music/out")),
            None,
        )
    }

    fn args_as_strings(args: &[OsString]) -> Vec<String> {
        args.iter().map(|a| a.to_string_lossy().into_owned()).collect()
    }

    #[test]
    fn test_batch_profile_args() {
        let job = job();
        let profile = EncodeProfile::batch(6);
        let args = args_as_strings(&Invocation::new(Path::new("ffmpeg"), &job, &profile).args());

        let pos = |flag: &str| args.iter().position(|a| a == flag).expect(flag);
        assert_eq!(args[pos("-i") + 1], "/music/in/track.flac");
        assert_eq!(args[pos("-c:a") + 1], "pcm_s16le");
        assert_eq!(args[pos("-ar") + 1], "44100");
        assert_eq!(args[pos("-ac") + 1], "2");
        assert_eq!(args[pos("-map_metadata") + 1], "-1");
        assert_eq!(args[pos("-loglevel") + 1], "error");
        assert_eq!(args[pos("-threads") + 1], "3");
        assert!(args.contains(&"-y".to_string()));
        assert!(args.contains(&"-bitexact".to_string()));
        assert!(args.contains(&"-nostdin".to_string()));
        assert_eq!(args.last().map(String::as_str), Some("/music/out/track.wav"));
    }

    #[test]
    fn test_single_profile_preserves_format() {
        let job = job();
        let profile = EncodeProfile::single(4).with_bit_depth(BitDepth::Pcm24);
        let args = args_as_strings(&Invocation::new(Path::new("ffmpeg"), &job, &profile).args());

        assert!(!args.contains(&"-ar".to_string()));
        assert!(!args.contains(&"-ac".to_string()));
        assert!(args.contains(&"pcm_s24le".to_string()));
        let threads = args.iter().position(|a| a == "-threads").unwrap();
        assert_eq!(args[threads + 1], "3");
    }

    #[test]
    fn test_encoder_thread_hint_floor() {
        assert_eq!(EncodeProfile::batch(1).encoder_threads, 2);
        assert_eq!(EncodeProfile::batch(8).encoder_threads, 4);
        assert_eq!(EncodeProfile::single(1).encoder_threads, 2);
        assert_eq!(EncodeProfile::single(8).encoder_threads, 7);
    }

    #[test]
    fn test_bit_depth_parsing() {
        assert_eq!(BitDepth::from_bits(16), Some(BitDepth::Pcm16));
        assert_eq!(BitDepth::from_bits(24), Some(BitDepth::Pcm24));
        assert_eq!(BitDepth::from_bits(32), None);
        assert_eq!(BitDepth::Pcm24.bits(), 24);
    }

    #[test]
    fn test_spawn_failure_is_encode_error() {
        let job = job();
        let profile = EncodeProfile::batch(2);
        let state = EngineState::new();
        let batch = state.begin_batch();
        let result = Invocation::new(Path::new("/nonexistent/ffmpeg_xyz"), &job, &profile).run(
            &state,
            Some(batch),
            None,
        );

        assert!(matches!(result, Err(ConvertError::EncodeError(_))));
        assert_eq!(state.active_count(), 0);
    }
}
