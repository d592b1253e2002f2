use std::path::PathBuf;

use thiserror::Error;

/// 单个资源下载过程中的错误，只影响该任务
#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("HTTP错误: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("IO错误: {0}")]
    IoError(#[from] std::io::Error),

    #[error("HTTP状态码错误: {status}，URL: {url}")]
    BadStatus { status: u16, url: String },

    #[error("创建目录失败: {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("创建文件失败: {path}: {source}")]
    CreateFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("下载中断: {0}")]
    StreamError(String),

    #[error("HTTP客户端初始化失败: {0}")]
    ClientBuild(String),
}

/// 获取种子页面失败，整个批次无法开始
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("无效的URL: {0}")]
    InvalidUrl(String),

    #[error("请求失败: {0}")]
    Request(#[from] reqwest::Error),

    #[error("HTTP状态码错误: {0}")]
    Status(u16),

    #[error("解压响应体失败: {0}")]
    Decompress(String),

    #[error("达到最大重试次数({attempts})，仍未成功获取页面: {last}")]
    Exhausted { attempts: u32, last: Box<FetchError> },
}

/// 批次级错误：页面获取失败或页面无法解析
#[derive(Debug, Error)]
pub enum BatchError {
    #[error("获取网页内容失败: {0}")]
    Fetch(#[from] FetchError),

    #[error("分析资源失败: {0}")]
    Parse(#[from] crate::parser::errors::ParseError),
}
