use std::borrow::Cow;

use chardetng::EncodingDetector;
use encoding_rs::{Encoding, UTF_8};
use lazy_static::lazy_static;
use regex::bytes::Regex;
use tracing::{debug, warn};

// 只在文档开头查找声明的字符集
const PRESCAN_LIMIT: usize = 1024;

lazy_static! {
    static ref META_CHARSET: Regex =
        Regex::new(r#"(?i)<meta(?-u:[^>])+charset\s*=\s*["']?\s*([A-Za-z0-9_\-:.]+)"#).unwrap();
    static ref XML_ENCODING: Regex =
        Regex::new(r#"(?i)<\?xml(?-u:[^>])+encoding\s*=\s*["']([A-Za-z0-9_\-:.]+)["']"#).unwrap();
    static ref CSS_CHARSET: Regex =
        Regex::new(r#"(?i)^\s*@charset\s+["']([A-Za-z0-9_\-:.]+)["']"#).unwrap();
}

/// 编码探测结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Detection {
    /// 有把握的判断
    Certain(&'static Encoding),
    /// 无法确定，原样保留
    Inconclusive,
}

/// 探测字节内容的编码
pub fn detect(bytes: &[u8]) -> Detection {
    if let Some((encoding, _)) = Encoding::for_bom(bytes) {
        debug!("根据 BOM 识别编码: {}", encoding.name());
        return Detection::Certain(encoding);
    }

    // 合法的 UTF-8 不再转换，已转换过的内容保留原有声明也不会被二次解码
    if std::str::from_utf8(bytes).is_ok() {
        return Detection::Certain(UTF_8);
    }

    // 带控制字符的内容（如 PDF 等被归为文档的二进制文件）不做猜测
    if looks_binary(bytes) {
        return Detection::Inconclusive;
    }

    if let Some(encoding) = declared_charset(bytes) {
        debug!("根据声明识别编码: {}", encoding.name());
        return Detection::Certain(encoding);
    }

    let mut detector = EncodingDetector::new();
    detector.feed(bytes, true);
    let (encoding, backed_by_content) = detector.guess_assess(None, true);
    if backed_by_content {
        debug!("内容嗅探识别编码: {}", encoding.name());
        Detection::Certain(encoding)
    } else {
        Detection::Inconclusive
    }
}

/// 转换为 UTF-8；无法确定编码时原样返回
pub fn normalize(bytes: &[u8]) -> Cow<'_, [u8]> {
    let encoding = match detect(bytes) {
        Detection::Certain(encoding) => encoding,
        Detection::Inconclusive => {
            debug!("编码无法确定，保持原始字节");
            return Cow::Borrowed(bytes);
        }
    };

    // decode 会识别并去掉 BOM
    let (decoded, actual, had_errors) = encoding.decode(bytes);
    if had_errors {
        warn!("按 {} 解码时出现错误，可能存在字符丢失", actual.name());
    }

    match decoded {
        Cow::Borrowed(s) if s.len() == bytes.len() => Cow::Borrowed(bytes),
        Cow::Borrowed(s) => Cow::Owned(s.as_bytes().to_vec()),
        Cow::Owned(s) => Cow::Owned(s.into_bytes()),
    }
}

fn looks_binary(bytes: &[u8]) -> bool {
    bytes
        .iter()
        .any(|&b| matches!(b, 0x00..=0x08 | 0x0E..=0x1A | 0x1C..=0x1F))
}

fn declared_charset(bytes: &[u8]) -> Option<&'static Encoding> {
    let head = &bytes[..bytes.len().min(PRESCAN_LIMIT)];
    let label = META_CHARSET
        .captures(head)
        .or_else(|| XML_ENCODING.captures(head))
        .or_else(|| CSS_CHARSET.captures(head))
        .and_then(|caps| caps.get(1))?;
    // 文本里声明 UTF-16 没有意义，按 HTML 规范当作 UTF-8
    let encoding = Encoding::for_label(label.as_bytes()).map(|e| e.output_encoding());
    if encoding.is_none() {
        debug!("未知的字符集声明: {}", String::from_utf8_lossy(label.as_bytes()));
    }
    encoding
}
