use thiserror::Error;

/// 整个页面无法解析，批次直接失败
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("HTML解析失败: 文档为空")]
    EmptyDocument,
    #[error("HTML解析失败: 内容不是文本")]
    NotHtml,
}

/// 单个引用无法解析为可下载地址，跳过即可
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ResolveError {
    #[error("不支持data URL")]
    DataUrl,
    #[error("不支持的协议: {0}")]
    UnsupportedScheme(String),
    #[error("URL解析失败: {0}")]
    Malformed(String),
    #[error("空引用")]
    Empty,
}

impl From<url::ParseError> for ResolveError {
    fn from(err: url::ParseError) -> Self {
        ResolveError::Malformed(err.to_string())
    }
}
