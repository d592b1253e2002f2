use colored::*;

use crate::downloader::{HistorySummary, ProgressView, TaskState, TaskStatus};

// 终端里 URL 的最大显示长度
const URL_DISPLAY_LEN: usize = 60;

/// 终端输出工具
pub struct PrettyLogger;

impl PrettyLogger {
    /// 显示成功消息
    pub fn success(message: impl AsRef<str>) {
        println!("{} {}", "✓".green().bold(), message.as_ref());
    }

    /// 显示信息消息
    pub fn info(message: impl AsRef<str>) {
        println!("{} {}", "ℹ".blue().bold(), message.as_ref());
    }

    /// 显示警告消息
    pub fn warning(message: impl AsRef<str>) {
        println!("{} {}", "⚠".yellow().bold(), message.as_ref());
    }

    /// 显示错误消息
    pub fn error(message: impl AsRef<str>) {
        println!("{} {}", "✗".red().bold(), message.as_ref());
    }

    /// 显示步骤开始
    pub fn step_start(step: impl AsRef<str>) {
        println!("\n{} {}", "▶".cyan().bold(), step.as_ref().bold());
    }

    pub fn separator() {
        println!("{}", "─".repeat(72).bright_black());
    }

    /// 预览模式下的资源列表
    pub fn resource_table(rows: &[TaskStatus]) {
        println!(
            "{:>4}  {:<9} {:>10}  {}",
            "#".bold(),
            "类型".bold(),
            "大小".bold(),
            "地址".bold()
        );
        Self::separator();
        for (i, row) in rows.iter().enumerate() {
            println!(
                "{:>4}  {:<9} {:>10}  {}",
                i + 1,
                row.resource_type.as_str().cyan(),
                format_file_size(row.size),
                shorten_url(&row.url, URL_DISPLAY_LEN)
            );
        }
        Self::separator();
    }

    /// 批次结束后的汇总，列出失败的资源
    pub fn batch_summary(view: &ProgressView) {
        println!("\n{}", "🎉 下载结束".green().bold());
        println!("  总数: {}", view.total);
        println!("  成功: {}", view.completed.to_string().green());
        println!("  失败: {}", view.failed.to_string().red());
        println!("  跳过: {}", view.skipped.to_string().yellow());
        println!("  耗时: {:.1} 秒，{:.2} 个/秒", view.duration, view.rate);

        let failed: Vec<&TaskStatus> = view
            .tasks
            .iter()
            .filter(|t| t.status == TaskState::Failed)
            .collect();
        if !failed.is_empty() {
            println!("\n{}", "失败的资源:".red().bold());
            for task in failed {
                println!(
                    "  {} (重试 {} 次)",
                    shorten_url(&task.url, URL_DISPLAY_LEN),
                    task.retry_count
                );
            }
        }
    }

    pub fn history_summary(summary: &HistorySummary) {
        println!("{}", "下载历史".bold());
        println!("  记录总数: {}", summary.total);
        println!("  成功: {}", summary.completed.to_string().green());
        println!("  失败: {}", summary.failed.to_string().red());
        println!("  跳过: {}", summary.skipped.to_string().yellow());
    }
}

/// 格式化文件大小，0 表示未知
pub fn format_file_size(size: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    if size == 0 {
        return "-".to_string();
    }
    let mut value = size as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} {}", size, UNITS[0])
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}

/// 过长的 URL 保留首尾，中间用省略号
pub fn shorten_url(url: &str, max_chars: usize) -> String {
    let count = url.chars().count();
    if count <= max_chars || max_chars < 5 {
        return url.to_string();
    }
    let keep = max_chars - 3;
    let head = keep / 2;
    let tail = keep - head;
    let start: String = url.chars().take(head).collect();
    let end: String = url.chars().skip(count - tail).collect();
    format!("{}...{}", start, end)
}

#[macro_export]
macro_rules! log_success {
    ($($arg:tt)*) => {
        $crate::common::logger::PrettyLogger::success(format!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        $crate::common::logger::PrettyLogger::info(format!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_warning {
    ($($arg:tt)*) => {
        $crate::common::logger::PrettyLogger::warning(format!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => {
        $crate::common::logger::PrettyLogger::error(format!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_step {
    ($($arg:tt)*) => {
        $crate::common::logger::PrettyLogger::step_start(format!($($arg)*))
    };
}
