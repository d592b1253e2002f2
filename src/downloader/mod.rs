pub mod context;
pub mod core;
pub mod encoding;
pub mod error;
pub mod filename;
pub mod history;
pub mod manager;
pub mod models;
pub mod progress;
pub mod registry;
pub mod retry;

pub use context::BatchContext;
pub use error::{BatchError, DownloadError, FetchError};
pub use history::{HistoryStore, HistorySummary};
pub use manager::{BatchHandle, Downloader};
pub use models::{
    BatchRecord, BatchStatus, DownloadTask, HistoryEntry, ResourceType, TaskState, TaskStatus,
};
pub use progress::{Progress, ProgressView};
pub use registry::BatchRegistry;
