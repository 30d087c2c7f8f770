//! 结果格式化模块
//!
//! 负责事件行、JSON事件流、汇总表格与报告文件的生成。

use super::utils;
use crate::engine::batch_state::BatchSummary;
use crate::engine::events::ConversionEvent;
use crate::engine::job::{ConversionOutcome, ConversionResult};
use crate::error::ConvertResult;
use comfy_table::{Cell, CellAlignment, ContentArrangement, Table, presets::UTF8_FULL};
use std::path::Path;
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// 表格中文件名列的最大显示宽度
const MAX_NAME_WIDTH: usize = 40;

/// 表格中消息列的最大显示宽度
const MAX_MESSAGE_WIDTH: usize = 60;

/// 按终端显示宽度截断（CJK字符占两列），超出部分以 `…` 结尾
pub fn truncate_display(text: &str, max_width: usize) -> String {
    if text.width() <= max_width {
        return text.to_string();
    }

    let budget = max_width.saturating_sub(1);
    let mut used = 0;
    let mut out = String::new();
    for ch in text.chars() {
        let w = ch.width().unwrap_or(0);
        if used + w > budget {
            break;
        }
        used += w;
        out.push(ch);
    }
    out.push('…');
    out
}

/// 人类可读的事件行（BatchDone 不输出）
pub fn format_event(event: &ConversionEvent) -> Option<String> {
    let name = |p: &Path| utils::extract_filename_lossy(p);
    let line = match event {
        ConversionEvent::Started { source } => format!("▶️  开始转换: {}", name(source)),
        ConversionEvent::Progress { source, percent } => {
            format!("[{percent:>3}%] {}", name(source))
        }
        ConversionEvent::Completed {
            source,
            skipped: true,
            ..
        } => format!("⏭️  已存在，跳过: {}", name(source)),
        ConversionEvent::Completed { source, output, .. } => {
            format!("✅ {} → {}", name(source), output.display())
        }
        ConversionEvent::Error { source, message } => {
            format!("❌ {}: {message}", name(source))
        }
        ConversionEvent::Cancelled { source } => format!("⛔ 已取消: {}", name(source)),
        ConversionEvent::BatchDone => return None,
    };
    Some(line)
}

/// 单行JSON事件
pub fn event_json_line(event: &ConversionEvent) -> Result<String, serde_json::Error> {
    serde_json::to_string(event)
}

/// 读取WAV头部并描述格式，无法解析时返回 None
pub fn describe_wav(path: &Path) -> Option<String> {
    let reader = hound::WavReader::open(path).ok()?;
    let spec = reader.spec();
    let frames = reader.duration();
    let seconds = if spec.sample_rate > 0 {
        frames as f64 / spec.sample_rate as f64
    } else {
        0.0
    };
    Some(format!(
        "{} Hz / {} ch / {}-bit / {seconds:.2}s",
        spec.sample_rate, spec.channels, spec.bits_per_sample
    ))
}

fn status_label(outcome: &ConversionOutcome) -> &'static str {
    match outcome {
        ConversionOutcome::Success { .. } => "✅ 成功",
        ConversionOutcome::Skipped { .. } => "⏭️ 跳过",
        ConversionOutcome::Failure { .. } => "❌ 失败",
        ConversionOutcome::Cancelled => "⛔ 取消",
    }
}

fn detail_cell(result: &ConversionResult, with_wav_info: bool) -> String {
    match &result.outcome {
        ConversionOutcome::Success { output } | ConversionOutcome::Skipped { output } => {
            let shown = truncate_display(&output.display().to_string(), MAX_MESSAGE_WIDTH);
            match with_wav_info.then(|| describe_wav(output)).flatten() {
                Some(info) => format!("{shown}\n{info}"),
                None => shown,
            }
        }
        ConversionOutcome::Failure { message, .. } => truncate_display(message, MAX_MESSAGE_WIDTH),
        ConversionOutcome::Cancelled => String::new(),
    }
}

/// 汇总表格；`verbose` 时附带输出文件的WAV格式
pub fn render_summary_table(summary: &BatchSummary, verbose: bool) -> String {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["#", "文件 / File", "状态 / Status", "详情 / Detail"]);

    for (i, result) in summary.results.iter().enumerate() {
        table.add_row(vec![
            Cell::new(i + 1).set_alignment(CellAlignment::Right),
            Cell::new(truncate_display(&result.job.display_name(), MAX_NAME_WIDTH)),
            Cell::new(status_label(&result.outcome)),
            Cell::new(detail_cell(result, verbose)),
        ]);
    }

    table.to_string()
}

/// 统计摘要（多行文本）
pub fn format_stats(summary: &BatchSummary) -> String {
    let stats = &summary.stats;
    let mut output = String::new();

    output.push_str("📊 批量转换完成 / Batch finished\n");
    output.push_str(&format!("   总文件数: {}\n", summary.total));
    output.push_str(&format!("   转换成功: {}\n", stats.converted));
    output.push_str(&format!("   已存在跳过: {}\n", stats.skipped));
    output.push_str(&format!("   转换失败: {}\n", stats.failed));
    if stats.cancelled > 0 || summary.not_dispatched > 0 {
        output.push_str(&format!(
            "   已取消: {} (未派发 {})\n",
            stats.cancelled, summary.not_dispatched
        ));
    }
    output.push_str(&format!(
        "   耗时: {}\n",
        utils::format_elapsed(summary.elapsed)
    ));

    for (category, files) in &stats.error_stats {
        output.push_str(&format!(
            "   {}: {} 个文件\n",
            category.display_name(),
            files.len()
        ));
    }

    output
}

/// 完整文本报告
pub fn create_report(summary: &BatchSummary) -> String {
    let mut output = String::new();

    output.push_str("=====================================\n");
    output.push_str(&format!("   FLAC2WAV v{VERSION} Conversion Report\n"));
    output.push_str("   批量转换结果\n");
    output.push_str("=====================================\n");
    let now = chrono::Local::now().format("%Y-%m-%d %H:%M:%S");
    output.push_str(&format!("log date: {now}\n\n"));

    output.push_str(&format_stats(summary));
    output.push('\n');
    output.push_str(&render_summary_table(summary, false));
    output.push('\n');

    for (category, files) in &summary.stats.error_stats {
        output.push_str(&format!("\n{}:\n", category.display_name()));
        for file in files {
            output.push_str(&format!("   - {file}\n"));
        }
    }

    output
}

/// 写入报告文件
pub fn write_report(path: &Path, content: &str) -> ConvertResult<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, content)?;
    Ok(())
}
