//! 页面资源嗅探
//!
//! 解析单个 HTML 文档，按标签规则找出资源引用，解析为绝对地址、分类、过滤并去重。

use itertools::Itertools;
use scraper::{ElementRef, Html};
use tracing::{debug, info};
use url::Url;

use crate::downloader::{
    encoding,
    filename::url_extension,
    models::{DownloadTask, ResourceType, is_html_extension},
};
use errors::{ParseError, ResolveError};
use handlers::{Candidate, Classify};

pub mod errors;
pub mod handlers;
pub mod utils;

// 判断二进制内容时检查的字节数
const SNIFF_LIMIT: usize = 1024;

/// 从 HTML 中提取下载任务
pub fn extract(
    html: &[u8],
    base_url: &Url,
    allowed: &[ResourceType],
) -> Result<Vec<DownloadTask>, ParseError> {
    ResourceExtractor::new(base_url.clone(), allowed).extract(html)
}

pub struct ResourceExtractor {
    base_url: Url,
    allowed: Vec<ResourceType>,
}

impl ResourceExtractor {
    /// `allowed` 为空表示允许所有类型
    pub fn new(base_url: Url, allowed: &[ResourceType]) -> Self {
        Self {
            base_url,
            allowed: allowed.to_vec(),
        }
    }

    pub fn is_allowed(&self, resource_type: ResourceType) -> bool {
        self.allowed.is_empty() || self.allowed.contains(&resource_type)
    }

    pub fn extract(&self, html: &[u8]) -> Result<Vec<DownloadTask>, ParseError> {
        let content = encoding::normalize(html);
        if content.iter().all(|b| b.is_ascii_whitespace()) {
            return Err(ParseError::EmptyDocument);
        }
        if content[..content.len().min(SNIFF_LIMIT)].contains(&0) {
            return Err(ParseError::NotHtml);
        }

        let text = String::from_utf8_lossy(&content);
        let document = Html::parse_document(&text);
        let base_url = self.document_base(&document);

        let mut tasks = Vec::new();
        for node in document.tree.root().descendants() {
            let Some(element) = ElementRef::wrap(node) else {
                continue;
            };
            self.visit(&element, &base_url, &mut tasks);
        }

        let found = tasks.len();
        let tasks: Vec<DownloadTask> = tasks
            .into_iter()
            .unique_by(|task| task.url.clone())
            .collect();
        info!("共发现 {} 个资源引用，去重后 {} 个", found, tasks.len());
        Ok(tasks)
    }

    fn visit(&self, element: &ElementRef<'_>, base_url: &Url, tasks: &mut Vec<DownloadTask>) {
        let candidate = handlers::handler_for(element.value().name()).and_then(|h| h(element));
        if let Some(candidate) = candidate {
            if let Some(task) = self.accept(candidate, base_url) {
                tasks.push(task);
            }
        }

        // 任意元素的内联样式
        if let Some(style) = element.value().attr("style") {
            for raw in utils::extract_css_urls(style) {
                let candidate = Candidate {
                    raw,
                    classify: Classify::Fixed(ResourceType::Image),
                };
                if let Some(task) = self.accept(candidate, base_url) {
                    tasks.push(task);
                }
            }
        }
    }

    fn accept(&self, candidate: Candidate<'_>, base_url: &Url) -> Option<DownloadTask> {
        let url = match utils::resolve_url(base_url, candidate.raw) {
            Ok(url) => url,
            Err(e) => {
                debug!("跳过引用 {}: {}", candidate.raw, e);
                return None;
            }
        };

        let resource_type = classify(candidate.classify, &url)?;
        if !self.is_allowed(resource_type) {
            debug!("类型 {} 不在允许列表中: {}", resource_type, url);
            return None;
        }
        Some(DownloadTask::new(url.as_str(), resource_type))
    }

    /// 页面中的 <base href> 优先于页面地址
    fn document_base(&self, document: &Html) -> Url {
        document
            .tree
            .root()
            .descendants()
            .filter_map(ElementRef::wrap)
            .find(|el| el.value().name() == "base" && el.value().attr("href").is_some())
            .and_then(|el| el.value().attr("href"))
            .and_then(|href| match utils::resolve_url(&self.base_url, href) {
                Ok(url) => Some(url),
                Err(ResolveError::Empty) => None,
                Err(e) => {
                    debug!("忽略无效的 base href {}: {}", href, e);
                    None
                }
            })
            .unwrap_or_else(|| self.base_url.clone())
    }
}

fn classify(rule: Classify, url: &Url) -> Option<ResourceType> {
    let ext = url_extension(url);
    match rule {
        Classify::Fixed(resource_type) => Some(resource_type),
        Classify::Frame => match ext.as_deref() {
            Some(ext) if is_html_extension(ext) => Some(ResourceType::Html),
            _ => Some(ResourceType::Document),
        },
        // 普通导航链接不下载
        Classify::Anchor => {
            let ext = ext?;
            if is_html_extension(&ext) {
                Some(ResourceType::Html)
            } else {
                ResourceType::from_extension(&ext)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("https://example.com/page/index.html").unwrap()
    }

    fn urls(tasks: &[DownloadTask]) -> Vec<(&str, ResourceType)> {
        tasks
            .iter()
            .map(|t| (t.url.as_str(), t.resource_type))
            .collect()
    }

    #[test]
    fn test_allowed_types_filter() {
        let html = br#"<html><body>
            <img src="/a.png">
            <script src="b.js"></script>
            <a href="report.pdf">report</a>
        </body></html>"#;
        let tasks = extract(html, &base(), &[ResourceType::Image, ResourceType::Document]).unwrap();
        assert_eq!(
            urls(&tasks),
            vec![
                ("https://example.com/a.png", ResourceType::Image),
                ("https://example.com/page/report.pdf", ResourceType::Document),
            ]
        );
        assert_eq!(tasks[0].filename, "a.png");
        assert_eq!(tasks[1].filename, "report.pdf");
    }

    #[test]
    fn test_inline_style_url() {
        let html = br#"<div style="background:url('x.png')">hi</div>"#;
        let tasks = extract(html, &base(), &[]).unwrap();
        assert_eq!(
            urls(&tasks),
            vec![("https://example.com/page/x.png", ResourceType::Image)]
        );
    }

    #[test]
    fn test_duplicates_removed_in_first_seen_order() {
        let html = br#"
            <img src="a.png"><img src="b.png"><img src="a.png#frag">
            <div style="background:url(b.png)"></div>
            <video><source src="v.mp4"></video>"#;
        let tasks = extract(html, &base(), &[]).unwrap();
        assert_eq!(
            urls(&tasks),
            vec![
                ("https://example.com/page/a.png", ResourceType::Image),
                ("https://example.com/page/b.png", ResourceType::Image),
                ("https://example.com/page/v.mp4", ResourceType::Video),
            ]
        );
    }

    #[test]
    fn test_anchor_rules() {
        let html = br#"
            <a href="/about">about</a>
            <a href="next.html">next</a>
            <a href="files/data.zip?dl=1">zip</a>
            <a href="feed.json">json</a>
            <a href="mailto:x@example.com">mail</a>
            <a href="song.ogg">song</a>"#;
        let tasks = extract(html, &base(), &[]).unwrap();
        assert_eq!(
            urls(&tasks),
            vec![
                ("https://example.com/page/next.html", ResourceType::Html),
                ("https://example.com/page/files/data.zip?dl=1", ResourceType::Archive),
                ("https://example.com/page/feed.json", ResourceType::Data),
                ("https://example.com/page/song.ogg", ResourceType::Video),
            ]
        );
    }

    #[test]
    fn test_frames_and_embeds() {
        let html = br#"
            <iframe src="widget.php"></iframe>
            <embed src="/media/slides.swf">
            <object data="manual"></object>"#;
        let tasks = extract(html, &base(), &[]).unwrap();
        assert_eq!(
            urls(&tasks),
            vec![
                ("https://example.com/page/widget.php", ResourceType::Html),
                ("https://example.com/media/slides.swf", ResourceType::Document),
                ("https://example.com/page/manual", ResourceType::Document),
            ]
        );
    }

    #[test]
    fn test_data_urls_are_skipped() {
        let html = br#"<img src="data:image/png;base64,AAAA"><img src="ok.gif">"#;
        let tasks = extract(html, &base(), &[]).unwrap();
        assert_eq!(
            urls(&tasks),
            vec![("https://example.com/page/ok.gif", ResourceType::Image)]
        );
    }

    #[test]
    fn test_base_href_overrides_page_url() {
        let html = br#"<html><head><base href="https://cdn.example.net/assets/"></head>
            <body><img src="logo.svg"></body></html>"#;
        let tasks = extract(html, &base(), &[]).unwrap();
        assert_eq!(
            urls(&tasks),
            vec![("https://cdn.example.net/assets/logo.svg", ResourceType::Image)]
        );
    }

    #[test]
    fn test_malformed_markup_is_tolerated() {
        let html = br#"<html><body><div><img src="a.png"<p>unclosed <script src="s.js">"#;
        let tasks = extract(html, &base(), &[ResourceType::Script]).unwrap();
        assert!(!tasks.is_empty());
        assert!(tasks.iter().all(|t| t.resource_type == ResourceType::Script));
    }

    #[test]
    fn test_unparsable_documents() {
        assert!(matches!(
            extract(b"  \n\t ", &base(), &[]),
            Err(ParseError::EmptyDocument)
        ));
        assert!(matches!(
            extract(b"\x00\x01\x02binary\x00", &base(), &[]),
            Err(ParseError::NotHtml)
        ));
    }
}
