use res_downloader::{Downloader, DownloaderConfig};
use tempfile::TempDir;

/// 输出目录和历史文件都放在临时目录里，退避时间缩短到毫秒级
pub fn test_config(dir: &TempDir) -> DownloaderConfig {
    DownloaderConfig {
        output_dir: dir.path().join("out"),
        history_file: dir.path().join("history.json"),
        retry_times: 3,
        retry_delay_ms: 10,
        timeout_secs: 5,
        ..Default::default()
    }
}

pub fn test_downloader(dir: &TempDir) -> Downloader {
    Downloader::new(test_config(dir)).expect("downloader")
}
