use std::{collections::HashSet, sync::Arc};

use futures::StreamExt;
use tokio::{
    sync::{Mutex, mpsc},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use url::Url;
use uuid::Uuid;

use super::{
    context::BatchContext,
    core::TaskRunner,
    encoding,
    error::{BatchError, DownloadError, FetchError},
    history::HistoryStore,
    models::{DownloadTask, ResourceType, TaskState},
    progress::ProgressView,
    retry::RetryPolicy,
};
use crate::{
    common::client::HttpClient,
    config::DownloaderConfig,
    parser::{self, errors::ParseError},
};

// 任务队列容量
const QUEUE_CAPACITY: usize = 100;

type TaskQueue = Arc<Mutex<mpsc::Receiver<DownloadTask>>>;

/// 资源下载器：获取页面、嗅探资源、启动批次
pub struct Downloader {
    config: DownloaderConfig,
    client: HttpClient,
    history: Arc<HistoryStore>,
}

impl Downloader {
    /// 创建下载器并从配置的历史文件加载历史记录
    pub fn new(config: DownloaderConfig) -> Result<Self, DownloadError> {
        let history = Arc::new(HistoryStore::load(&config.history_file));
        Self::with_history(config, history)
    }

    pub fn with_history(
        config: DownloaderConfig,
        history: Arc<HistoryStore>,
    ) -> Result<Self, DownloadError> {
        let client = HttpClient::new(&config)?;
        Ok(Self {
            config,
            client,
            history,
        })
    }

    pub fn config(&self) -> &DownloaderConfig {
        &self.config
    }

    pub fn history(&self) -> &Arc<HistoryStore> {
        &self.history
    }

    /// 获取种子页面，返回转换为 UTF-8 后的字节
    pub async fn fetch_page(&self, seed: &str) -> Result<Vec<u8>, FetchError> {
        let url = parse_seed(seed)?;
        info!("开始获取页面: {}", url);
        let raw = self.client.fetch_page(&url).await?;
        Ok(encoding::normalize(&raw).into_owned())
    }

    pub fn extract(
        &self,
        html: &[u8],
        base_url: &Url,
        allowed: &[ResourceType],
    ) -> Result<Vec<DownloadTask>, ParseError> {
        parser::extract(html, base_url, allowed)
    }

    /// 获取页面并嗅探资源
    pub async fn discover(
        &self,
        seed: &str,
        allowed: &[ResourceType],
    ) -> Result<Vec<DownloadTask>, BatchError> {
        let base_url = parse_seed(seed)?;
        let html = self.fetch_page(seed).await?;
        let mut tasks = self.extract(&html, &base_url, allowed)?;
        if self.config.probe_metadata {
            self.probe(&mut tasks).await;
        }
        Ok(tasks)
    }

    /// 用 HEAD 请求补全大小和修改时间，失败不影响任务
    pub async fn probe(&self, tasks: &mut [DownloadTask]) {
        let client = &self.client;
        futures::stream::iter(tasks.iter_mut())
            .for_each_concurrent(self.config.max_concurrent.max(1), |task| async move {
                match client.probe(&task.url).await {
                    Ok(info) => {
                        if let Some(len) = info.content_length {
                            task.source_size = len;
                            // 文本资源落盘前会转码，原始长度不能当作本地文件大小
                            if !task.resource_type.is_textual() {
                                task.size = len;
                            }
                        }
                        if info.last_modified.is_some() {
                            task.last_modified = info.last_modified;
                        }
                    }
                    Err(e) => debug!("获取文件信息失败: {}: {}", task.url, e),
                }
            })
            .await;
    }

    /// 启动一个批次，立即返回
    ///
    /// 必须在 tokio 运行时内调用。
    pub fn start_batch(&self, tasks: Vec<DownloadTask>, concurrency: usize) -> BatchHandle {
        self.start_seeded_batch(None, tasks, concurrency)
    }

    /// 同 [`start_batch`](Self::start_batch)，并在批次记录里保存来源页面
    pub fn start_seeded_batch(
        &self,
        seed: Option<&str>,
        mut tasks: Vec<DownloadTask>,
        concurrency: usize,
    ) -> BatchHandle {
        let mut seen = HashSet::new();
        tasks.retain(|t| {
            let first = seen.insert(t.url.clone());
            if !first {
                debug!("重复的任务，忽略: {}", t.url);
            }
            first
        });
        self.fill_known_sizes(&mut tasks);

        let context = Arc::new(BatchContext::new(&tasks, Arc::clone(&self.history)));
        self.history.open_batch(
            context.id(),
            seed.map(str::to_string),
            self.config.file_types.clone(),
            tasks.len(),
        );
        let runner = Arc::new(TaskRunner::new(
            self.client.clone(),
            &self.config.output_dir,
            RetryPolicy::new(self.config.retry_times, self.config.retry_delay()),
        ));

        // 同一批次内保存路径冲突的任务直接跳过，避免后写覆盖先写
        let mut claimed = HashSet::new();
        let mut skipped_any = false;
        let mut queue = Vec::with_capacity(tasks.len());
        for mut task in tasks {
            let destination = runner.destination(&task);
            if claimed.insert(destination.clone()) {
                queue.push(task);
            } else {
                warn!(
                    "保存路径冲突，跳过任务: {} -> {}",
                    task.url,
                    destination.display()
                );
                task.transition(TaskState::Skipped);
                skipped_any |= context.record_outcome(&task);
            }
        }

        let token = CancellationToken::new();
        let (tx, rx) = mpsc::channel(QUEUE_CAPACITY);
        let rx: TaskQueue = Arc::new(Mutex::new(rx));

        info!(
            "批次 {} 开始: {} 个任务，并发数 {}",
            context.id(),
            queue.len(),
            concurrency
        );

        let producer_token = token.clone();
        let history = Arc::clone(&self.history);
        tokio::spawn(async move {
            if skipped_any {
                if let Err(e) = history.flush().await {
                    error!("保存历史记录失败: {}", e);
                }
            }
            for task in queue {
                tokio::select! {
                    _ = producer_token.cancelled() => {
                        debug!("批次已取消，停止分发任务");
                        break;
                    }
                    sent = tx.send(task) => {
                        if sent.is_err() {
                            break;
                        }
                    }
                }
            }
            // tx 在这里释放，队列关闭
        });

        let workers: Vec<JoinHandle<()>> = (0..concurrency.max(1))
            .map(|worker_id| {
                tokio::spawn(worker(
                    worker_id,
                    Arc::clone(&rx),
                    Arc::clone(&context),
                    Arc::clone(&runner),
                    token.clone(),
                ))
            })
            .collect();

        let batch_id = context.id();
        let supervisor = tokio::spawn(async move {
            for result in futures::future::join_all(workers).await {
                if let Err(e) = result {
                    error!("下载 worker 异常退出: {}", e);
                }
            }
            info!("批次 {} 的所有 worker 已退出", batch_id);
        });

        BatchHandle {
            context,
            token,
            supervisor,
        }
    }

    // 本地大小未知时，沿用历史中最近一次成功下载的落盘大小；
    // 探测到的原始长度与历史记录不一致说明内容已变化，不沿用
    fn fill_known_sizes(&self, tasks: &mut [DownloadTask]) {
        for task in tasks.iter_mut().filter(|t| t.size == 0) {
            let Some(entry) = self.history.last_completed(&task.url, &task.filename) else {
                continue;
            };
            if task.source_size > 0
                && entry.source_size > 0
                && task.source_size != entry.source_size
            {
                debug!(
                    "资源长度已变化 ({} -> {})，重新下载: {}",
                    entry.source_size, task.source_size, task.url
                );
                continue;
            }
            task.size = entry.size;
            if task.source_size == 0 {
                task.source_size = entry.source_size;
            }
            if task.last_modified.is_none() {
                task.last_modified = entry.last_modified;
            }
        }
    }
}

fn parse_seed(seed: &str) -> Result<Url, FetchError> {
    let url = Url::parse(seed.trim())
        .map_err(|e| FetchError::InvalidUrl(format!("{}: {}", seed, e)))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(FetchError::InvalidUrl(format!("不支持的协议: {}", other))),
    }
}

async fn worker(
    worker_id: usize,
    queue: TaskQueue,
    context: Arc<BatchContext>,
    runner: Arc<TaskRunner>,
    token: CancellationToken,
) {
    loop {
        // 空闲的 worker 领取下一个任务
        let next = { queue.lock().await.recv().await };
        let Some(task) = next else {
            break;
        };

        // 取消后只清空队列，不再开始新任务
        if token.is_cancelled() {
            debug!("Worker {} 丢弃未开始的任务: {}", worker_id, task.url);
            continue;
        }
        if !context.mark_in_progress(&task.url) {
            continue;
        }

        debug!("Worker {} 开始处理任务: {}", worker_id, task.url);
        let finished = runner.run(task).await;
        if context.record_outcome(&finished) {
            if let Err(e) = context.history().flush().await {
                error!("保存历史记录失败: {}", e);
            }
        }
        debug!("Worker {} 完成任务: {}", worker_id, finished.url);
    }
    debug!("Worker {} 退出", worker_id);
}

/// 正在运行的批次
pub struct BatchHandle {
    context: Arc<BatchContext>,
    token: CancellationToken,
    supervisor: JoinHandle<()>,
}

impl BatchHandle {
    pub fn id(&self) -> Uuid {
        self.context.id()
    }

    pub fn context(&self) -> &Arc<BatchContext> {
        &self.context
    }

    pub fn snapshot(&self) -> ProgressView {
        self.context.snapshot()
    }

    /// 通知批次结束：不再开始新任务，进行中的任务自然完成
    pub fn cancel(&self) {
        if !self.token.is_cancelled() {
            info!("取消批次 {}", self.id());
            self.token.cancel();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// 所有 worker 都已退出
    pub fn is_finished(&self) -> bool {
        self.supervisor.is_finished()
    }

    /// 等待所有 worker 退出，返回最终进度并关闭批次记录
    pub async fn wait(self) -> ProgressView {
        if let Err(e) = self.supervisor.await {
            error!("批次 {} 异常结束: {}", self.context.id(), e);
        }
        let view = self.context.snapshot();
        self.context
            .history()
            .close_batch(self.context.id(), &view, self.token.is_cancelled());
        view
    }
}
