//! 批量转换引擎
//!
//! 持有一个固定大小的rayon线程池（构造时按主机资源确定大小），每个批次由一个
//! 后台调度线程按输入顺序向线程池提交任务，调用方从不被阻塞。
//!
//! ```text
//! convert_batch ─▶ [dispatch thread] ─submit─▶ [worker pool × N] ─▶ encoder child
//!                        │                           │
//!                        │◀──────── results ─────────┘
//!                        └─▶ BatchDone（所有已提交任务结束后恰好一次）
//! ```
//!
//! 取消分两层：未提交的任务不再提交（协作式），运行中的子进程被直接终止（强制式）。

use super::batch_state::{BatchSummary, ParallelBatchStats};
use super::events::{ConversionEvent, EventSink, event_channel};
use super::job::{ConversionOutcome, ConversionResult, JobDescriptor};
use super::state::{BatchGeneration, EngineState};
use crate::encoder::invocation::{EncodeProfile, Invocation, InvocationOutcome};
use crate::encoder::{locator, prober};
use crate::error::{ConvertError, ConvertResult};
use crate::tools::constants::worker_limits::{MAX_WORKERS, MIN_WORKERS};
use crate::utils::worker_estimator;
use crossbeam_channel::Receiver;
use std::collections::HashSet;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// 引擎配置
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// 外部编码器路径
    pub encoder_path: PathBuf,
    /// 线程池大小
    pub workers: usize,
    /// 批量模式编码参数
    pub batch_profile: EncodeProfile,
    /// 单文件模式编码参数
    pub single_profile: EncodeProfile,
    /// 批量模式下输出已存在时跳过
    pub skip_existing: bool,
    /// 单个编码调用的时限，None 表示不限
    pub job_timeout: Option<Duration>,
}

impl EngineConfig {
    /// 按主机资源估算线程池大小
    pub fn new(encoder_path: impl Into<PathBuf>) -> Self {
        Self::with_workers(encoder_path, worker_estimator::estimate())
    }

    /// 指定线程池大小，限制在 1-8 之间
    pub fn with_workers(encoder_path: impl Into<PathBuf>, workers: usize) -> Self {
        let workers = workers.clamp(MIN_WORKERS, MAX_WORKERS);
        Self {
            encoder_path: encoder_path.into(),
            workers,
            batch_profile: EncodeProfile::batch(workers),
            single_profile: EncodeProfile::single(workers),
            skip_existing: true,
            job_timeout: None,
        }
    }
}

impl Default for EngineConfig {
    /// 自动定位编码器并按主机资源估算并发度
    fn default() -> Self {
        Self::new(locator::locate_encoder(None))
    }
}

struct EngineInner {
    config: EngineConfig,
    pool: rayon::ThreadPool,
    state: EngineState,
    sink: Arc<dyn EventSink>,
}

/// 转换引擎句柄，克隆后共享同一线程池与状态
#[derive(Clone)]
pub struct ConversionEngine {
    inner: Arc<EngineInner>,
}

impl std::fmt::Debug for ConversionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversionEngine")
            .field("config", &self.inner.config)
            .field("active_processes", &self.inner.state.active_count())
            .finish()
    }
}

/// 后台批次句柄
#[derive(Debug)]
pub struct BatchHandle {
    inner: HandleInner,
}

#[derive(Debug)]
enum HandleInner {
    Dispatching(JoinHandle<BatchSummary>),
    /// 调度线程无法创建时在调用线程内完成
    Finished(Box<BatchSummary>),
}

impl BatchHandle {
    /// 阻塞等待批次结束（BatchDone 已发出）
    pub fn wait(self) -> ConvertResult<BatchSummary> {
        match self.inner {
            HandleInner::Dispatching(join) => join.join().map_err(|_| {
                ConvertError::ResourceError(
                    "调度线程异常退出 / Dispatch thread panicked".to_string(),
                )
            }),
            HandleInner::Finished(summary) => Ok(*summary),
        }
    }

    pub fn is_finished(&self) -> bool {
        match &self.inner {
            HandleInner::Dispatching(join) => join.is_finished(),
            HandleInner::Finished(_) => true,
        }
    }
}

impl ConversionEngine {
    /// 创建引擎并构建固定大小的线程池
    pub fn new(config: EngineConfig, sink: Arc<dyn EventSink>) -> ConvertResult<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.workers)
            .thread_name(|i| format!("flac2wav-worker-{i}"))
            .build()
            .map_err(|e| ConvertError::ResourceError(format!("线程池创建失败: {e}")))?;

        tracing::info!(
            workers = config.workers,
            encoder = %config.encoder_path.display(),
            "conversion engine ready"
        );

        Ok(Self {
            inner: Arc::new(EngineInner {
                config,
                pool,
                state: EngineState::new(),
                sink,
            }),
        })
    }

    /// 创建引擎，事件发布到返回的接收端
    pub fn with_channel(config: EngineConfig) -> ConvertResult<(Self, Receiver<ConversionEvent>)> {
        let (tx, rx) = event_channel();
        Ok((Self::new(config, Arc::new(tx))?, rx))
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    pub fn worker_count(&self) -> usize {
        self.inner.pool.current_num_threads()
    }

    /// 当前运行中的编码器子进程数
    pub fn active_processes(&self) -> usize {
        self.inner.state.active_count()
    }

    /// 探测配置的编码器是否可用
    pub fn is_encoder_available(&self) -> bool {
        prober::probe(&self.inner.config.encoder_path)
    }

    fn emit(&self, event: ConversionEvent) {
        self.inner.sink.emit(event);
    }

    /// 同步转换单个任务（批量语义：输出已存在时跳过，使用批量编码参数）
    ///
    /// 不发布事件；所有错误都转换为 `Failure`，从不向外传播。
    pub fn convert_one(&self, job: &JobDescriptor) -> ConversionResult {
        let config = &self.inner.config;
        self.execute(job, &config.batch_profile, config.skip_existing, None)
    }

    fn execute(
        &self,
        job: &JobDescriptor,
        profile: &EncodeProfile,
        skip_existing: bool,
        batch: Option<BatchGeneration>,
    ) -> ConversionResult {
        match self.try_execute(job, profile, skip_existing, batch) {
            Ok(outcome) => ConversionResult::new(job.clone(), outcome),
            Err(e) => {
                tracing::warn!(source = %job.source_path().display(), error = %e, "conversion failed");
                ConversionResult::failed(job.clone(), &e)
            }
        }
    }

    fn try_execute(
        &self,
        job: &JobDescriptor,
        profile: &EncodeProfile,
        skip_existing: bool,
        batch: Option<BatchGeneration>,
    ) -> ConvertResult<ConversionOutcome> {
        ensure_source_exists(job.source_path())?;
        std::fs::create_dir_all(job.output_dir())?;

        if skip_existing && job.output_path().exists() {
            tracing::debug!(output = %job.output_path().display(), "output exists, skipping");
            return Ok(ConversionOutcome::Skipped {
                output: job.output_path().to_path_buf(),
            });
        }

        let config = &self.inner.config;
        let invocation = Invocation::new(&config.encoder_path, job, profile);
        Ok(
            match invocation.run(&self.inner.state, batch, config.job_timeout)? {
                InvocationOutcome::Encoded(output) => ConversionOutcome::Success { output },
                InvocationOutcome::Cancelled => ConversionOutcome::Cancelled,
            },
        )
    }

    /// 同步转换单个文件（单文件语义：总是重新编码，保留源格式）
    ///
    /// 发布 `Started → Progress(100) → (Completed | Error | Cancelled)` 事件。源文件不存在时只发布
    /// `Error` 并返回 `InvalidInput`，不触碰编码器。
    pub fn convert_file(
        &self,
        source: impl AsRef<Path>,
        output_dir: Option<&Path>,
        output_filename: Option<&str>,
    ) -> ConvertResult<PathBuf> {
        let job = JobDescriptor::new(source, output_dir, output_filename);
        let source = job.source_path().to_path_buf();

        if let Err(e) = ensure_source_exists(&source) {
            self.emit(ConversionEvent::Error {
                source,
                message: e.to_string(),
            });
            return Err(e);
        }

        self.emit(ConversionEvent::Started {
            source: source.clone(),
        });
        self.emit(ConversionEvent::Progress {
            source: source.clone(),
            percent: 100,
        });

        let profile = &self.inner.config.single_profile;
        match self.try_execute(&job, profile, false, None) {
            Ok(ConversionOutcome::Success { output }) | Ok(ConversionOutcome::Skipped { output }) => {
                self.emit(ConversionEvent::Completed {
                    source,
                    output: output.clone(),
                    skipped: false,
                });
                Ok(output)
            }
            Ok(ConversionOutcome::Cancelled) => {
                self.emit(ConversionEvent::Cancelled { source });
                Err(ConvertError::EncodeError(
                    "转换已取消 / Conversion cancelled".to_string(),
                ))
            }
            Ok(ConversionOutcome::Failure { message, .. }) => {
                self.emit(ConversionEvent::Error {
                    source,
                    message: message.clone(),
                });
                Err(ConvertError::EncodeError(message))
            }
            Err(e) => {
                self.emit(ConversionEvent::Error {
                    source,
                    message: e.to_string(),
                });
                Err(e)
            }
        }
    }

    /// 异步批量转换，输出目录缺省为各源文件所在目录
    pub fn convert_batch(&self, files: Vec<PathBuf>, output_dir: Option<PathBuf>) -> BatchHandle {
        let jobs = files
            .iter()
            .map(|f| JobDescriptor::for_batch(f, output_dir.as_deref()))
            .collect();
        self.convert_jobs(jobs)
    }

    /// 异步批量转换一组任务
    ///
    /// 立即返回；调度在后台线程进行。重复的源路径只保留第一次出现。
    /// 多个批次可以并存，`cancel()` 作用于调用时已开始的全部批次。
    pub fn convert_jobs(&self, jobs: Vec<JobDescriptor>) -> BatchHandle {
        // 在返回前领取代号，调用方随后的 cancel() 一定对本批次生效
        let batch = self.inner.state.begin_batch();

        let engine = self.clone();
        let pending = jobs.clone();
        let spawned = thread::Builder::new()
            .name("flac2wav-dispatch".to_string())
            .spawn(move || engine.dispatch(jobs, batch));

        let inner = match spawned {
            Ok(join) => HandleInner::Dispatching(join),
            Err(e) => {
                tracing::warn!(error = %e, "dispatch thread unavailable, dispatching inline");
                HandleInner::Finished(Box::new(self.dispatch(pending, batch)))
            }
        };

        BatchHandle { inner }
    }

    fn dispatch(&self, jobs: Vec<JobDescriptor>, batch: BatchGeneration) -> BatchSummary {
        let started = Instant::now();
        let state = &self.inner.state;

        let jobs = dedup_by_source(jobs);
        let total = jobs.len();
        tracing::info!(total, "batch started");

        let stats = ParallelBatchStats::new();
        let mut results: Vec<(usize, ConversionResult)> = Vec::with_capacity(total);
        let (result_tx, result_rx) = crossbeam_channel::unbounded::<(usize, ConversionResult)>();
        let mut handled = 0;

        for (index, job) in jobs.into_iter().enumerate() {
            if state.is_cancelled(batch) {
                tracing::info!(remaining = total - index, "cancel requested, stop dispatching");
                break;
            }
            handled += 1;

            // 进度按提交序号计算，可能领先于实际完成进度
            let percent = progress_percent(index + 1, total);

            if let Err(e) = ensure_source_exists(job.source_path()) {
                self.emit(ConversionEvent::Error {
                    source: job.source_path().to_path_buf(),
                    message: e.to_string(),
                });
                let result = ConversionResult::failed(job, &e);
                stats.record(&result);
                results.push((index, result));
                continue;
            }

            let engine = self.clone();
            let tx = result_tx.clone();
            self.inner.pool.spawn(move || {
                let result = engine.run_batch_job(job, percent, batch);
                let _ = tx.send((index, result));
            });
        }
        drop(result_tx);

        // 所有工作闭包结束（发送端全部释放）后迭代终止
        for (index, result) in result_rx.iter() {
            stats.record(&result);
            results.push((index, result));
        }
        results.sort_by_key(|(index, _)| *index);

        let snapshot = stats.snapshot();
        tracing::info!(
            converted = snapshot.converted,
            skipped = snapshot.skipped,
            failed = snapshot.failed,
            cancelled = snapshot.cancelled,
            "batch finished"
        );
        self.emit(ConversionEvent::BatchDone);

        BatchSummary {
            total,
            not_dispatched: total - handled,
            stats: snapshot,
            results: results.into_iter().map(|(_, r)| r).collect(),
            elapsed: started.elapsed(),
        }
    }

    /// 在工作线程中执行单个批量任务并发布该任务的全部事件
    fn run_batch_job(
        &self,
        job: JobDescriptor,
        percent: u8,
        batch: BatchGeneration,
    ) -> ConversionResult {
        let source = job.source_path().to_path_buf();

        // 排队期间收到取消：不启动编码器
        if self.inner.state.is_cancelled(batch) {
            self.emit(ConversionEvent::Cancelled { source });
            return ConversionResult::new(job, ConversionOutcome::Cancelled);
        }

        self.emit(ConversionEvent::Started {
            source: source.clone(),
        });
        self.emit(ConversionEvent::Progress {
            source: source.clone(),
            percent,
        });

        let config = &self.inner.config;
        let result = catch_unwind(AssertUnwindSafe(|| {
            self.execute(&job, &config.batch_profile, config.skip_existing, Some(batch))
        }))
        .unwrap_or_else(|_| {
            ConversionResult::failed(
                job.clone(),
                &ConvertError::ResourceError("工作线程异常 / Worker panicked".to_string()),
            )
        });

        let event = match &result.outcome {
            ConversionOutcome::Success { output } => ConversionEvent::Completed {
                source,
                output: output.clone(),
                skipped: false,
            },
            ConversionOutcome::Skipped { output } => ConversionEvent::Completed {
                source,
                output: output.clone(),
                skipped: true,
            },
            ConversionOutcome::Failure { message, .. } => ConversionEvent::Error {
                source,
                message: message.clone(),
            },
            ConversionOutcome::Cancelled => ConversionEvent::Cancelled { source },
        };
        self.emit(event);
        result
    }

    /// 取消已开始的批次：停止提交新任务并终止所有运行中的编码器，不等待其退出
    pub fn cancel(&self) {
        let terminated = self.inner.state.request_cancel();
        tracing::info!(terminated, "cancellation requested");
    }
}

/// 提交进度百分比：round(index / total × 100)
pub fn progress_percent(index: usize, total: usize) -> u8 {
    if total == 0 {
        return 100;
    }
    ((index as f64 / total as f64) * 100.0).round().clamp(0.0, 100.0) as u8
}

fn ensure_source_exists(source: &Path) -> ConvertResult<()> {
    if source.is_file() {
        Ok(())
    } else {
        Err(ConvertError::InvalidInput(format!(
            "源文件不存在 / Source file not found: {}",
            source.display()
        )))
    }
}

fn dedup_by_source(jobs: Vec<JobDescriptor>) -> Vec<JobDescriptor> {
    let mut seen = HashSet::new();
    jobs.into_iter()
        .filter(|job| {
            let fresh = seen.insert(job.source_path().to_path_buf());
            if !fresh {
                tracing::warn!(source = %job.source_path().display(), "duplicate source dropped");
            }
            fresh
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::events::NullSink;

    #[test]
    fn test_progress_percent_rounding() {
        assert_eq!(progress_percent(1, 3), 33);
        assert_eq!(progress_percent(2, 3), 67);
        assert_eq!(progress_percent(3, 3), 100);
        assert_eq!(progress_percent(1, 8), 13);
        assert_eq!(progress_percent(0, 0), 100);
    }

    #[test]
    fn test_dedup_keeps_first_occurrence() {
        let jobs = vec![
            JobDescriptor::for_batch("/m/a.flac", None),
            JobDescriptor::for_batch("/m/b.flac", None),
            JobDescriptor::for_batch("/m/a.flac", Some(Path::new("/other"))),
        ];
        let deduped = dedup_by_source(jobs);
        assert_eq!(deduped.len(), 2);
        assert_eq!(deduped[0].output_dir(), Path::new("/m"));
    }

    #[test]
    fn test_config_worker_bounds() {
        assert_eq!(EngineConfig::with_workers("ffmpeg", 64).workers, 8);
        assert_eq!(EngineConfig::with_workers("ffmpeg", 8).workers, 8);
        let config = EngineConfig::with_workers("ffmpeg", 0);
        assert_eq!(config.workers, 1);
        assert!(config.skip_existing);
        assert!(config.job_timeout.is_none());
        assert!(config.batch_profile.normalize.is_some());
        assert!(config.single_profile.normalize.is_none());
    }

    #[test]
    fn test_default_config_is_usable() {
        let config = EngineConfig::default();
        assert!((1..=8).contains(&config.workers));
        assert!(!config.encoder_path.as_os_str().is_empty());
    }

    #[test]
    fn test_engine_pool_size_matches_config() {
        let engine =
            ConversionEngine::new(EngineConfig::with_workers("ffmpeg", 3), Arc::new(NullSink))
                .unwrap();
        assert_eq!(engine.worker_count(), 3);
        assert_eq!(engine.active_processes(), 0);
    }

    #[test]
    fn test_engine_pool_never_exceeds_ceiling() {
        let engine =
            ConversionEngine::new(EngineConfig::with_workers("ffmpeg", 64), Arc::new(NullSink))
                .unwrap();
        assert_eq!(engine.worker_count(), 8);
    }

    #[test]
    fn test_missing_source_fails_without_encoder() {
        let engine = ConversionEngine::new(
            EngineConfig::with_workers("/nonexistent/ffmpeg", 1),
            Arc::new(NullSink),
        )
        .unwrap();
        let job = JobDescriptor::for_batch("/nonexistent/input.flac", None);

        let result = engine.convert_one(&job);
        assert!(matches!(
            result.outcome,
            ConversionOutcome::Failure {
                category: crate::error::ErrorCategory::Input,
                ..
            }
        ));
    }

    #[test]
    fn test_empty_batch_still_reports_done() {
        let (engine, events) =
            ConversionEngine::with_channel(EngineConfig::with_workers("ffmpeg", 2)).unwrap();
        let summary = engine.convert_batch(Vec::new(), None).wait().unwrap();

        assert_eq!(summary.total, 0);
        assert!(summary.results.is_empty());
        let received: Vec<_> = events.try_iter().collect();
        assert_eq!(received, vec![ConversionEvent::BatchDone]);
    }
}
