use std::{
    fmt,
    path::{Path, PathBuf},
    str::FromStr,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::filename;

/// 扩展名映射表的版本号，修改下表属于兼容性变更
pub const EXTENSION_TABLE_VERSION: u32 = 1;

// 资源类型 -> 扩展名，顺序即匹配优先级（ogg 归为视频，svg 归为图片，csv 归为文档）
const EXTENSION_TABLE: &[(ResourceType, &[&str])] = &[
    (
        ResourceType::Image,
        &["jpg", "jpeg", "png", "gif", "bmp", "svg", "webp", "ico", "tiff", "apng"],
    ),
    (ResourceType::Script, &["js", "mjs", "ts", "jsx", "coffee"]),
    (ResourceType::Style, &["css", "scss", "less", "sass", "styl"]),
    (
        ResourceType::Video,
        &["mp4", "webm", "ogg", "flv", "avi", "mov", "wmv", "mkv", "mpeg", "3gp"],
    ),
    (
        ResourceType::Audio,
        &["mp3", "wav", "ogg", "aac", "flac", "m4a", "wma", "opus"],
    ),
    (
        ResourceType::Font,
        &["woff", "woff2", "ttf", "otf", "eot", "svg", "fnt"],
    ),
    (
        ResourceType::Document,
        &["pdf", "doc", "docx", "xls", "xlsx", "ppt", "pptx", "txt", "rtf", "csv", "odt"],
    ),
    (
        ResourceType::Archive,
        &["zip", "rar", "7z", "tar", "gz", "bz2", "xz", "iso"],
    ),
    (
        ResourceType::Html,
        &["html", "htm", "xhtml", "php", "asp", "aspx", "jsp", "cfm"],
    ),
    (
        ResourceType::Data,
        &["json", "xml", "yaml", "yml", "toml", "csv", "jsonld"],
    ),
    (
        ResourceType::Binary,
        &["exe", "dll", "so", "dmg", "pkg", "deb", "rpm", "msi"],
    ),
];

// 被视为 HTML 页面的扩展名（iframe/a 标签的判定用）
const HTML_PAGE_EXTENSIONS: &[&str] = &["html", "htm", "xhtml", "php", "asp", "aspx", "jsp"];

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum ResourceType {
    #[default]
    Image,
    Script,
    Style,
    Video,
    Audio,
    Font,
    Document,
    Archive,
    Html,
    Data,
    Binary,
}

impl ResourceType {
    pub const ALL: [ResourceType; 11] = [
        ResourceType::Image,
        ResourceType::Script,
        ResourceType::Style,
        ResourceType::Video,
        ResourceType::Audio,
        ResourceType::Font,
        ResourceType::Document,
        ResourceType::Archive,
        ResourceType::Html,
        ResourceType::Data,
        ResourceType::Binary,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceType::Image => "image",
            ResourceType::Script => "script",
            ResourceType::Style => "style",
            ResourceType::Video => "video",
            ResourceType::Audio => "audio",
            ResourceType::Font => "font",
            ResourceType::Document => "document",
            ResourceType::Archive => "archive",
            ResourceType::Html => "html",
            ResourceType::Data => "data",
            ResourceType::Binary => "binary",
        }
    }

    /// 该类型登记的全部扩展名
    pub fn extensions(&self) -> &'static [&'static str] {
        EXTENSION_TABLE
            .iter()
            .find(|(t, _)| t == self)
            .map(|(_, exts)| *exts)
            .unwrap_or(&[])
    }

    /// 缺省扩展名（表中第一个）
    pub fn canonical_extension(&self) -> &'static str {
        self.extensions().first().copied().unwrap_or("bin")
    }

    /// 文本类资源需要缓冲并做编码转换，其余类型直接流式写盘
    pub fn is_textual(&self) -> bool {
        matches!(
            self,
            ResourceType::Html
                | ResourceType::Script
                | ResourceType::Style
                | ResourceType::Document
                | ResourceType::Data
        )
    }

    /// 根据扩展名查表，不带点，大小写不敏感
    pub fn from_extension(ext: &str) -> Option<Self> {
        let ext = ext.to_ascii_lowercase();
        EXTENSION_TABLE
            .iter()
            .find(|(_, exts)| exts.contains(&ext.as_str()))
            .map(|(t, _)| *t)
    }
}

/// 扩展名是否指向 HTML 页面
pub fn is_html_extension(ext: &str) -> bool {
    HTML_PAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str())
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        ResourceType::ALL
            .iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s))
            .copied()
            .ok_or_else(|| format!("未知的资源类型: {}", s))
    }
}

// --------------------------------------------------------------------
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    #[default]
    Pending,
    InProgress,
    Completed,
    Failed,
    Skipped,
}

impl TaskState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskState::Pending => "pending",
            TaskState::InProgress => "in_progress",
            TaskState::Completed => "completed",
            TaskState::Failed => "failed",
            TaskState::Skipped => "skipped",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskState::Completed | TaskState::Failed | TaskState::Skipped
        )
    }

    /// 状态只能向前推进：pending -> in_progress -> 终态；pending 也可直接跳过
    pub fn can_transition_to(&self, next: TaskState) -> bool {
        match (self, next) {
            (TaskState::Pending, TaskState::InProgress) => true,
            (TaskState::Pending, TaskState::Skipped) => true,
            (TaskState::InProgress, next) => next.is_terminal(),
            _ => false,
        }
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 一个待下载的资源
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DownloadTask {
    pub url: String,
    #[serde(rename = "type")]
    pub resource_type: ResourceType,
    pub filename: String,
    /// 落盘字节数，0 表示未知
    pub size: u64,
    /// 服务器返回的原始字节数；文本资源转码后与 size 不同
    #[serde(default)]
    pub source_size: u64,
    pub last_modified: Option<DateTime<Utc>>,
    pub retry_count: u32,
    #[serde(rename = "status")]
    pub state: TaskState,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
}

impl DownloadTask {
    pub fn new(url: impl Into<String>, resource_type: ResourceType) -> Self {
        let url = url.into();
        let filename = filename::generate_filename(&url, resource_type);
        Self {
            url,
            resource_type,
            filename,
            size: 0,
            source_size: 0,
            last_modified: None,
            retry_count: 0,
            state: TaskState::Pending,
            start_time: None,
            end_time: None,
        }
    }

    pub fn with_size(mut self, size: u64) -> Self {
        self.size = size;
        self
    }

    /// 保存路径: <output_dir>/<type>/<filename>
    pub fn destination(&self, output_dir: &Path) -> PathBuf {
        filename::destination_path(output_dir, self.resource_type, &self.filename)
    }

    /// 推进状态，非法迁移返回 false 且不修改
    pub fn transition(&mut self, next: TaskState) -> bool {
        if !self.state.can_transition_to(next) {
            return false;
        }
        match next {
            TaskState::InProgress => self.start_time = Some(Utc::now()),
            s if s.is_terminal() => {
                self.start_time.get_or_insert_with(Utc::now);
                self.end_time = Some(Utc::now());
            }
            _ => {}
        }
        self.state = next;
        true
    }
}

/// 进度查询用的任务状态视图
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskStatus {
    pub url: String,
    pub filename: String,
    #[serde(rename = "type")]
    pub resource_type: ResourceType,
    pub size: u64,
    pub status: TaskState,
    pub retry_count: u32,
    pub last_modified: String,
}

impl From<&DownloadTask> for TaskStatus {
    fn from(task: &DownloadTask) -> Self {
        Self {
            url: task.url.clone(),
            filename: task.filename.clone(),
            resource_type: task.resource_type,
            size: task.size,
            status: task.state,
            retry_count: task.retry_count,
            last_modified: task
                .last_modified
                .map(|t| t.to_rfc3339())
                .unwrap_or_default(),
        }
    }
}

/// 历史记录，创建后不再修改
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HistoryEntry {
    pub url: String,
    pub filename: String,
    #[serde(rename = "type")]
    pub resource_type: ResourceType,
    pub size: u64,
    #[serde(default)]
    pub source_size: u64,
    pub status: TaskState,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub retry_count: u32,
    pub last_modified: Option<DateTime<Utc>>,
}

impl HistoryEntry {
    pub fn from_task(task: &DownloadTask) -> Self {
        let now = Utc::now();
        let end_time = task.end_time.unwrap_or(now);
        Self {
            url: task.url.clone(),
            filename: task.filename.clone(),
            resource_type: task.resource_type,
            size: task.size,
            source_size: task.source_size,
            status: task.state,
            start_time: task.start_time.unwrap_or(end_time),
            end_time,
            retry_count: task.retry_count,
            last_modified: task.last_modified,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchStatus {
    Running,
    Completed,
    Cancelled,
}

/// 一次批次的记录：来源页面、类型过滤和最终计数
///
/// 只保存在内存中，不写入历史文件。
#[derive(Debug, Clone, PartialEq)]
pub struct BatchRecord {
    pub id: Uuid,
    pub url: Option<String>,
    pub file_types: Vec<ResourceType>,
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub status: BatchStatus,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
}

impl BatchRecord {
    pub fn open(
        id: Uuid,
        url: Option<String>,
        file_types: Vec<ResourceType>,
        total: usize,
    ) -> Self {
        Self {
            id,
            url,
            file_types,
            total,
            completed: 0,
            failed: 0,
            skipped: 0,
            status: BatchStatus::Running,
            start_time: Utc::now(),
            end_time: None,
        }
    }
}
