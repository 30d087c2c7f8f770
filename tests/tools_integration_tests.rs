//! 工具层集成测试
//!
//! 测试CLI解析、输入收集与引擎配置的集成功能。

use flac2wav::encoder::BitDepth;
use flac2wav::engine::{ConversionEngine, EngineConfig};
use flac2wav::tools::{self, AppConfig};
use std::fs;
use std::path::PathBuf;

fn parse(args: &[&str]) -> AppConfig {
    let mut argv = vec!["flac2wav"];
    argv.extend_from_slice(args);
    tools::parse_args_from(argv).expect("参数应能解析")
}

// ============================================================================
// CLI配置测试
// ============================================================================

/// 单个文件输入识别为单文件模式
#[test]
fn test_single_file_mode_detection() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let file = dir.path().join("a.flac");
    fs::write(&file, b"fLaC")?;

    let config = parse(&[file.to_str().unwrap_or_default()]);
    assert!(config.is_single_file_mode(), "单个文件应为单文件模式");

    let config = parse(&[dir.path().to_str().unwrap_or_default()]);
    assert!(!config.is_single_file_mode(), "目录应为批量模式");

    let config = parse(&[file.to_str().unwrap_or_default(), file.to_str().unwrap_or_default()]);
    assert!(!config.is_single_file_mode(), "多个输入应为批量模式");
    println!("  ✓ 模式识别正确");
    Ok(())
}

#[test]
fn test_all_flags_parsed() {
    let config = parse(&[
        "in.flac",
        "--output-dir",
        "/out",
        "--output-name",
        "mix",
        "--recursive",
        "--ffmpeg",
        "/opt/ffmpeg",
        "--bit-depth",
        "24",
        "--fail-fast",
        "--json",
        "--report",
        "report.txt",
        "-v",
    ]);

    assert_eq!(config.output_dir, Some(PathBuf::from("/out")));
    assert_eq!(config.output_name.as_deref(), Some("mix"));
    assert!(config.recursive);
    assert_eq!(config.encoder_path, Some(PathBuf::from("/opt/ffmpeg")));
    assert_eq!(config.bit_depth, BitDepth::Pcm24);
    assert!(config.fail_fast && config.json && config.verbose);
    assert_eq!(config.report, Some(PathBuf::from("report.txt")));
}

#[test]
fn test_estimated_workers_within_bounds() {
    let config = parse(&["in.flac"]);
    let engine = config.engine_config(PathBuf::from("ffmpeg"));
    assert!((1..=8).contains(&engine.workers), "估算并发度应在1-8之间");
    assert!(engine.skip_existing, "默认跳过已有输出");
    assert!(engine.batch_profile.normalize.is_some(), "批量模式默认归一化");
}

#[test]
fn test_jobs_flag_capped_at_eight() -> anyhow::Result<()> {
    let config = parse(&["in.flac", "--jobs", "8"]);
    let (engine, _events) =
        ConversionEngine::with_channel(config.engine_config(PathBuf::from("ffmpeg")))?;
    assert_eq!(engine.worker_count(), 8);

    assert!(tools::parse_args_from(["flac2wav", "in.flac", "--jobs", "64"]).is_err());
    assert_eq!(EngineConfig::with_workers("ffmpeg", 64).workers, 8);
    Ok(())
}

// ============================================================================
// 输入收集测试
// ============================================================================

#[test]
fn test_collect_inputs_mixed() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let album = dir.path().join("album");
    fs::create_dir_all(album.join("disc2"))?;
    for name in ["02.flac", "01.flac", "notes.txt"] {
        fs::write(album.join(name), b"x")?;
    }
    fs::write(album.join("disc2/03.flac"), b"x")?;
    let loose = dir.path().join("loose.flac");
    fs::write(&loose, b"x")?;

    let flat = tools::collect_inputs(&[album.clone(), loose.clone()], false)?;
    assert_eq!(
        flat,
        vec![album.join("01.flac"), album.join("02.flac"), loose.clone()]
    );

    let deep = tools::collect_inputs(&[album.clone()], true)?;
    assert_eq!(deep.len(), 3);
    assert!(deep.contains(&album.join("disc2/03.flac")));
    println!("  ✓ 目录扫描与去重正确");
    Ok(())
}
