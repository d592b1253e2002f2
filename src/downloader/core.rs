use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use futures::StreamExt;
use reqwest::header::LAST_MODIFIED;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use super::{
    encoding,
    error::DownloadError,
    models::{DownloadTask, TaskState},
    retry::{RetryPolicy, RetryState},
};
use crate::common::client::HttpClient;

/// 执行单个任务的下载和重试
#[derive(Debug, Clone)]
pub struct TaskRunner {
    client: HttpClient,
    output_dir: PathBuf,
    policy: RetryPolicy,
}

impl TaskRunner {
    pub fn new(client: HttpClient, output_dir: impl AsRef<Path>, policy: RetryPolicy) -> Self {
        Self {
            client,
            output_dir: output_dir.as_ref().to_path_buf(),
            policy,
        }
    }

    pub fn destination(&self, task: &DownloadTask) -> PathBuf {
        task.destination(&self.output_dir)
    }

    /// 下载直到成功或重试次数用尽，返回处于终态的任务
    pub async fn run(&self, mut task: DownloadTask) -> DownloadTask {
        if task.state == TaskState::Pending {
            task.transition(TaskState::InProgress);
        }
        let destination = self.destination(&task);

        if self.already_present(&task, &destination).await {
            info!("⏭️ 文件已存在且大小一致，跳过下载: {}", destination.display());
            task.transition(TaskState::Completed);
            return task;
        }

        let mut state = RetryState::Pending;
        loop {
            state = match state {
                RetryState::Pending => self.policy.start(),
                RetryState::Attempting(attempt) => {
                    match self.attempt(&mut task, &destination).await {
                        Ok(written) => {
                            debug!("第 {} 次尝试成功，写入 {} 字节: {}", attempt, written, task.url);
                            self.policy.on_success(state)
                        }
                        Err(e) => {
                            warn!(
                                "下载失败 (第 {}/{} 次): {}: {}",
                                attempt,
                                self.policy.max_attempts(),
                                task.url,
                                e
                            );
                            let (next, wait) = self.policy.on_failure(state);
                            if let Some(delay) = wait {
                                task.retry_count += 1;
                                tokio::time::sleep(delay).await;
                            }
                            next
                        }
                    }
                }
                RetryState::Completed => {
                    task.transition(TaskState::Completed);
                    info!("✅ 下载完成: {}", destination.display());
                    return task;
                }
                RetryState::Failed => {
                    task.transition(TaskState::Failed);
                    warn!("❌ 下载失败，已重试 {} 次: {}", task.retry_count, task.url);
                    return task;
                }
            };
        }
    }

    // 已知大小且与本地文件一致时无需下载
    async fn already_present(&self, task: &DownloadTask, destination: &Path) -> bool {
        if task.size == 0 {
            return false;
        }
        match tokio::fs::metadata(destination).await {
            Ok(meta) => meta.is_file() && meta.len() == task.size,
            Err(_) => false,
        }
    }

    async fn attempt(&self, task: &mut DownloadTask, destination: &Path) -> Result<u64, DownloadError> {
        if let Some(dir) = destination.parent() {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|source| DownloadError::CreateDir {
                    path: dir.to_path_buf(),
                    source,
                })?;
        }

        let response = self.client.get(&task.url).await?;
        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::BadStatus {
                status: status.as_u16(),
                url: task.url.clone(),
            });
        }

        if task.last_modified.is_none() {
            task.last_modified = response
                .headers()
                .get(LAST_MODIFIED)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| httpdate::parse_http_date(v).ok())
                .map(DateTime::<Utc>::from);
        }

        let result = if task.resource_type.is_textual() {
            Self::write_text(response, destination).await
        } else {
            Self::write_stream(response, destination).await
        };

        match result {
            Ok((written, received)) => {
                task.size = written;
                task.source_size = received;
                Ok(written)
            }
            Err(e) => {
                // 删除写了一半的文件
                if let Err(rm) = tokio::fs::remove_file(destination).await {
                    if rm.kind() != std::io::ErrorKind::NotFound {
                        warn!("删除不完整文件失败: {}: {}", destination.display(), rm);
                    }
                }
                Err(e)
            }
        }
    }

    // 文本资源：整体读入，转换为 UTF-8 后写盘；返回 (写入字节数, 接收字节数)
    async fn write_text(
        response: reqwest::Response,
        destination: &Path,
    ) -> Result<(u64, u64), DownloadError> {
        let raw = response.bytes().await?;
        let content = encoding::normalize(&raw);
        let mut file = Self::create(destination).await?;
        file.write_all(&content).await?;
        file.flush().await?;
        Ok((content.len() as u64, raw.len() as u64))
    }

    // 二进制资源：边收边写，不整体缓存
    async fn write_stream(
        response: reqwest::Response,
        destination: &Path,
    ) -> Result<(u64, u64), DownloadError> {
        let mut file = Self::create(destination).await?;
        let mut stream = response.bytes_stream();
        let mut written = 0u64;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| DownloadError::StreamError(e.to_string()))?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;
        Ok((written, written))
    }

    async fn create(destination: &Path) -> Result<tokio::fs::File, DownloadError> {
        tokio::fs::File::create(destination)
            .await
            .map_err(|source| DownloadError::CreateFile {
                path: destination.to_path_buf(),
                source,
            })
    }
}
