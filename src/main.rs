use anyhow::Context;
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use res_downloader::{
    DownloaderConfig, Downloader,
    common::logger::PrettyLogger,
    downloader::{BatchHandle, TaskStatus},
    log_error, log_info, log_step, log_success, log_warning,
};
use tracing::{debug, info};

mod cli;

/// 命令行参数覆盖配置文件
fn apply_overrides(config: &mut DownloaderConfig, args: &cli::Cli) {
    if let Some(dir) = &args.output_dir {
        config.output_dir = dir.clone();
    }
    if !args.types.is_empty() {
        config.file_types = args.types.clone();
    }
    if let Some(n) = args.concurrency {
        config.max_concurrent = n;
    }
    if let Some(n) = args.retries {
        config.retry_times = n;
    }
    if let Some(secs) = args.timeout {
        config.timeout_secs = secs;
    }
    if let Some(file) = &args.history_file {
        config.history_file = file.clone();
    }
    if args.probe {
        config.probe_metadata = true;
    }
}

/// 定时刷新进度条，Ctrl-C 时取消批次，直到所有 worker 退出
async fn watch_batch(handle: &BatchHandle, config: &DownloaderConfig) -> anyhow::Result<()> {
    let total = handle.snapshot().total as u64;
    let pb = ProgressBar::new(total);
    pb.set_style(
        ProgressStyle::with_template(
            "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}",
        )?
        .progress_chars("#>-"),
    );

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut ticker = tokio::time::interval(config.progress_interval());

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            result = &mut ctrl_c, if !handle.is_cancelled() => {
                if let Err(e) = result {
                    debug!("监听 Ctrl-C 失败: {}", e);
                }
                pb.println("收到中断信号，等待进行中的下载结束...");
                handle.cancel();
            }
        }

        let view = handle.snapshot();
        pb.set_position(view.finished() as u64);
        pb.set_message(format!(
            "成功 {} 失败 {} 跳过 {} ({:.2}/s)",
            view.completed, view.failed, view.skipped, view.rate
        ));
        if handle.is_finished() {
            break;
        }
    }

    pb.finish_and_clear();
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = cli::Cli::parse();

    // 初始化日志
    tracing_subscriber::fmt()
        .with_max_level(if args.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        })
        .init();

    let mut config = DownloaderConfig::load(&args.config)
        .with_context(|| format!("加载配置失败: {}", args.config.display()))?;
    apply_overrides(&mut config, &args);
    config.validate()?;
    debug!("当前配置: {:?}", config);

    let downloader = Downloader::new(config.clone())?;

    if args.history {
        PrettyLogger::history_summary(&downloader.history().summary());
    }
    let Some(url) = args.url.as_deref() else {
        return Ok(());
    };

    log_step!("嗅探页面资源: {}", url);
    let tasks = match downloader.discover(url, &config.file_types).await {
        Ok(tasks) => tasks,
        Err(e) => {
            log_error!("{}", e);
            return Err(e.into());
        }
    };

    if tasks.is_empty() {
        log_warning!("页面中没有找到符合条件的资源");
        return Ok(());
    }
    log_info!("找到 {} 个资源", tasks.len());

    if args.preview {
        let rows: Vec<TaskStatus> = tasks.iter().map(TaskStatus::from).collect();
        PrettyLogger::resource_table(&rows);
        return Ok(());
    }

    log_step!("开始下载到 {}", config.output_dir.display());
    let handle = downloader.start_seeded_batch(Some(url), tasks, config.max_concurrent);
    info!("批次 id: {}", handle.id());
    watch_batch(&handle, &config).await?;

    let cancelled = handle.is_cancelled();
    let view = handle.wait().await;
    PrettyLogger::batch_summary(&view);

    if cancelled {
        log_warning!("下载已取消，{} 个资源未开始", view.total - view.finished());
    } else if view.failed == 0 {
        log_success!("全部资源处理完成");
    }
    Ok(())
}
