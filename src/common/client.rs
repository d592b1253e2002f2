use std::io::Read;

use chrono::{DateTime, Utc};
use flate2::read::{DeflateDecoder, GzDecoder};
use reqwest::{
    Client, ClientBuilder, Response,
    header::{
        ACCEPT, ACCEPT_ENCODING, ACCEPT_LANGUAGE, CONTENT_ENCODING, CONTENT_LENGTH, HeaderMap,
        HeaderValue, LAST_MODIFIED, REFERER, USER_AGENT,
    },
};
use tracing::{debug, warn};
use url::Url;

use crate::config::DownloaderConfig;
use crate::downloader::error::{DownloadError, FetchError};

// 获取种子页面的最大尝试次数
const PAGE_FETCH_ATTEMPTS: u32 = 3;

/// 资源的元信息（HEAD 请求）
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResourceInfo {
    pub content_length: Option<u64>,
    pub last_modified: Option<DateTime<Utc>>,
}

// 所有请求共用的客户端，带统一的 User-Agent 和超时
#[derive(Debug, Clone)]
pub struct HttpClient {
    inner: Client,
    user_agent: HeaderValue,
}

impl HttpClient {
    pub fn new(config: &DownloaderConfig) -> Result<Self, DownloadError> {
        let user_agent = HeaderValue::from_str(&config.user_agent)
            .map_err(|e| DownloadError::ClientBuild(format!("无效的 User-Agent: {}", e)))?;
        let inner = ClientBuilder::new()
            .timeout(config.timeout())
            .pool_max_idle_per_host(config.max_concurrent)
            .build()
            .map_err(|e| DownloadError::ClientBuild(e.to_string()))?;
        Ok(Self { inner, user_agent })
    }

    fn page_headers(&self, referer: &Url) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, self.user_agent.clone());
        headers.insert(
            ACCEPT,
            HeaderValue::from_static(
                "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8",
            ),
        );
        headers.insert(
            ACCEPT_LANGUAGE,
            HeaderValue::from_static("zh-CN,zh;q=0.8,en-US;q=0.5,en;q=0.3"),
        );
        headers.insert(ACCEPT_ENCODING, HeaderValue::from_static("gzip, deflate"));
        if let Ok(value) = HeaderValue::from_str(referer.as_str()) {
            headers.insert(REFERER, value);
        }
        headers
    }

    /// 下载资源用的 GET，只带 User-Agent
    pub async fn get(&self, url: &str) -> Result<Response, reqwest::Error> {
        self.inner
            .get(url)
            .header(USER_AGENT, self.user_agent.clone())
            .send()
            .await
    }

    /// 获取种子页面的原始字节（已解压，未做编码转换）
    pub async fn fetch_page(&self, url: &Url) -> Result<Vec<u8>, FetchError> {
        let mut last_error = None;
        for attempt in 1..=PAGE_FETCH_ATTEMPTS {
            match self.fetch_page_once(url).await {
                Ok(body) => return Ok(body),
                Err(e) => {
                    warn!("获取页面失败 (第 {}/{} 次): {}", attempt, PAGE_FETCH_ATTEMPTS, e);
                    last_error = Some(e);
                }
            }
        }
        Err(FetchError::Exhausted {
            attempts: PAGE_FETCH_ATTEMPTS,
            last: Box::new(last_error.unwrap_or(FetchError::InvalidUrl(url.to_string()))),
        })
    }

    async fn fetch_page_once(&self, url: &Url) -> Result<Vec<u8>, FetchError> {
        let response = self
            .inner
            .get(url.clone())
            .headers(self.page_headers(url))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        let content_encoding = response
            .headers()
            .get(CONTENT_ENCODING)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.trim().to_ascii_lowercase());
        debug!("Content-Encoding: {:?}", content_encoding);

        let raw = response.bytes().await?;
        decompress(&raw, content_encoding.as_deref())
    }

    /// HEAD 请求获取大小和最后修改时间
    pub async fn probe(&self, url: &str) -> Result<ResourceInfo, DownloadError> {
        let response = self
            .inner
            .head(url)
            .header(USER_AGENT, self.user_agent.clone())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::BadStatus {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let headers = response.headers();
        let content_length = headers
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok());
        let last_modified = headers
            .get(LAST_MODIFIED)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| httpdate::parse_http_date(v).ok())
            .map(DateTime::<Utc>::from);

        Ok(ResourceInfo {
            content_length,
            last_modified,
        })
    }
}

// 按 Content-Encoding 手动解压
fn decompress(bytes: &[u8], content_encoding: Option<&str>) -> Result<Vec<u8>, FetchError> {
    match content_encoding {
        Some("gzip") | Some("x-gzip") => {
            let mut decoded = Vec::new();
            GzDecoder::new(bytes)
                .read_to_end(&mut decoded)
                .map_err(|e| FetchError::Decompress(format!("gzip: {}", e)))?;
            Ok(decoded)
        }
        Some("deflate") => {
            let mut decoded = Vec::new();
            DeflateDecoder::new(bytes)
                .read_to_end(&mut decoded)
                .map_err(|e| FetchError::Decompress(format!("deflate: {}", e)))?;
            Ok(decoded)
        }
        Some("identity") | None => Ok(bytes.to_vec()),
        Some(other) => {
            warn!("未知的内容编码: {}，按原样处理", other);
            Ok(bytes.to_vec())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::{Compression, write::GzEncoder};
    use std::io::Write;

    #[test]
    fn test_decompress_gzip() {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(b"<html>hello</html>").unwrap();
        let compressed = encoder.finish().unwrap();
        assert_eq!(
            decompress(&compressed, Some("gzip")).unwrap(),
            b"<html>hello</html>"
        );
    }

    #[test]
    fn test_decompress_passthrough_and_errors() {
        assert_eq!(decompress(b"plain", None).unwrap(), b"plain");
        assert_eq!(decompress(b"plain", Some("br")).unwrap(), b"plain");
        assert!(matches!(
            decompress(b"not gzip", Some("gzip")),
            Err(FetchError::Decompress(_))
        ));
    }
}
