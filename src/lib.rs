//! 网页资源嗅探与批量下载
//!
//! 获取一个页面，找出其中引用的图片、样式、脚本、音视频、字体和文档，
//! 按类型过滤、去重后并发下载，记录进度和下载历史。

pub mod common;
pub mod config;
pub mod downloader;
pub mod parser;

pub use config::DownloaderConfig;
pub use downloader::{
    BatchError, BatchHandle, BatchRegistry, DownloadTask, Downloader, ProgressView, ResourceType,
    TaskState,
};
