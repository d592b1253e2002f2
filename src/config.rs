use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::downloader::models::ResourceType;

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/135.0.0.0 Safari/537.36";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("读取配置文件失败: {0}")]
    Io(#[from] std::io::Error),
    #[error("解析配置文件失败: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("无效的配置: {0}")]
    Invalid(String),
}

/// 下载器配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DownloaderConfig {
    /// 下载文件存放目录
    pub output_dir: PathBuf,
    /// 最大并发下载数
    pub max_concurrent: usize,
    /// 下载失败重试次数
    pub retry_times: u32,
    /// 请求超时（秒）
    pub timeout_secs: u64,
    /// 退避时间单位（毫秒）
    pub retry_delay_ms: u64,
    pub user_agent: String,
    /// 下载历史文件
    pub history_file: PathBuf,
    /// 允许下载的类型，为空表示全部
    pub file_types: Vec<ResourceType>,
    /// 下载前先用 HEAD 获取大小和修改时间
    pub probe_metadata: bool,
    /// 进度刷新间隔（毫秒）
    pub progress_interval_ms: u64,
}

impl Default for DownloaderConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("./download_data"),
            max_concurrent: 5,
            retry_times: 3,
            timeout_secs: 30,
            retry_delay_ms: 1000,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            history_file: PathBuf::from("download_history.json"),
            file_types: Vec::new(),
            probe_metadata: false,
            progress_interval_ms: 1000,
        }
    }
}

impl DownloaderConfig {
    /// 加载配置文件，文件不存在时写入默认配置
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            let config = Self::default();
            std::fs::write(path, serde_json::to_vec_pretty(&config)?)?;
            info!("已创建默认配置文件: {}", path.display());
            return Ok(config);
        }

        let data = std::fs::read(path)?;
        let config: Self = serde_json::from_slice(&data)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_concurrent == 0 {
            return Err(ConfigError::Invalid("max_concurrent 必须大于 0".to_string()));
        }
        if self.timeout_secs == 0 {
            return Err(ConfigError::Invalid("timeout_secs 必须大于 0".to_string()));
        }
        if self.user_agent.trim().is_empty() {
            return Err(ConfigError::Invalid("user_agent 不能为空".to_string()));
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms.max(1))
    }
}
