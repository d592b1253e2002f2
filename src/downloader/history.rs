use std::{
    io,
    path::{Path, PathBuf},
    sync::Arc,
};

use chrono::Utc;
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{
    models::{BatchRecord, BatchStatus, HistoryEntry, ResourceType, TaskState},
    progress::ProgressView,
};

/// 下载历史，只追加；落盘时整体重写文件
///
/// 批次记录只保存在内存中。
pub struct HistoryStore {
    path: Option<PathBuf>,
    entries: Mutex<Vec<HistoryEntry>>,
    batches: Mutex<Vec<BatchRecord>>,
    // 串行化写文件，后写的一定包含先写的全部记录
    write_lock: Mutex<()>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct HistorySummary {
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl HistoryStore {
    /// 从文件加载，文件缺失或损坏时从空记录开始
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let entries = match std::fs::read(&path) {
            Ok(data) => match serde_json::from_slice::<Vec<HistoryEntry>>(&data) {
                Ok(entries) => {
                    info!("已加载 {} 条下载历史: {}", entries.len(), path.display());
                    entries
                }
                Err(e) => {
                    warn!("解析历史记录文件失败: {}: {}", path.display(), e);
                    Vec::new()
                }
            },
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("历史记录文件不存在: {}", path.display());
                Vec::new()
            }
            Err(e) => {
                warn!("读取历史记录文件失败: {}: {}", path.display(), e);
                Vec::new()
            }
        };

        Self::with_entries(Some(path), entries)
    }

    /// 不落盘的历史（测试或预览用）
    pub fn in_memory() -> Self {
        Self::with_entries(None, Vec::new())
    }

    fn with_entries(path: Option<PathBuf>, entries: Vec<HistoryEntry>) -> Self {
        Self {
            path,
            entries: Mutex::new(entries),
            batches: Mutex::new(Vec::new()),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// 只追加到内存，由 [`flush`](Self::flush) 或 [`persist`](Self::persist) 落盘
    pub fn record(&self, entry: HistoryEntry) {
        self.entries.lock().push(entry);
    }

    /// 追加一条记录并同步持久化；持久化失败时记录仍保留在内存中
    pub fn append(&self, entry: HistoryEntry) -> io::Result<()> {
        self.record(entry);
        self.persist()
    }

    /// 在阻塞线程池里把当前记录写到磁盘，供异步 worker 调用
    pub async fn flush(self: &Arc<Self>) -> io::Result<()> {
        if self.path.is_none() {
            return Ok(());
        }
        let store = Arc::clone(self);
        tokio::task::spawn_blocking(move || store.persist())
            .await
            .map_err(io::Error::other)?
    }

    pub fn entries(&self) -> Vec<HistoryEntry> {
        self.entries.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// 按 URL 或文件名查找，大小写不敏感
    pub fn search(&self, query: &str) -> Vec<HistoryEntry> {
        let query = query.to_lowercase();
        self.entries
            .lock()
            .iter()
            .filter(|e| {
                e.url.to_lowercase().contains(&query) || e.filename.to_lowercase().contains(&query)
            })
            .cloned()
            .collect()
    }

    /// 同一 URL 和文件名最近一次成功下载的记录
    pub fn last_completed(&self, url: &str, filename: &str) -> Option<HistoryEntry> {
        self.entries
            .lock()
            .iter()
            .rev()
            .find(|e| e.status == TaskState::Completed && e.url == url && e.filename == filename)
            .cloned()
    }

    pub fn summary(&self) -> HistorySummary {
        let entries = self.entries.lock();
        let mut summary = HistorySummary {
            total: entries.len(),
            ..Default::default()
        };
        for entry in entries.iter() {
            match entry.status {
                TaskState::Completed => summary.completed += 1,
                TaskState::Failed => summary.failed += 1,
                TaskState::Skipped => summary.skipped += 1,
                TaskState::Pending | TaskState::InProgress => {}
            }
        }
        summary
    }

    pub fn clear(&self) -> io::Result<()> {
        self.entries.lock().clear();
        self.persist()
    }

    /// 登记一个新批次，状态为 running
    pub fn open_batch(
        &self,
        id: Uuid,
        url: Option<String>,
        file_types: Vec<ResourceType>,
        total: usize,
    ) {
        self.batches
            .lock()
            .push(BatchRecord::open(id, url, file_types, total));
    }

    /// 批次结束时写入最终计数；已关闭的批次不再修改
    pub fn close_batch(&self, id: Uuid, view: &ProgressView, cancelled: bool) -> bool {
        let mut batches = self.batches.lock();
        let Some(record) = batches
            .iter_mut()
            .find(|b| b.id == id && b.status == BatchStatus::Running)
        else {
            return false;
        };
        record.completed = view.completed;
        record.failed = view.failed;
        record.skipped = view.skipped;
        record.status = if cancelled {
            BatchStatus::Cancelled
        } else {
            BatchStatus::Completed
        };
        record.end_time = Some(Utc::now());
        true
    }

    pub fn batch(&self, id: Uuid) -> Option<BatchRecord> {
        self.batches.lock().iter().find(|b| b.id == id).cloned()
    }

    pub fn batches(&self) -> Vec<BatchRecord> {
        self.batches.lock().clone()
    }

    /// 同步写盘：先写临时文件再改名，避免写到一半留下损坏的文件
    pub fn persist(&self) -> io::Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let _guard = self.write_lock.lock();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_vec_pretty(&*self.entries.lock())?;
        let mut tmp = path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        std::fs::write(&tmp, data)?;
        std::fs::rename(&tmp, path)
    }
}
