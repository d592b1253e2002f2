use std::path::{Path, PathBuf};

use chrono::Utc;
use url::Url;

use super::models::ResourceType;

/// 文件名最大字符数
pub const MAX_FILENAME_LEN: usize = 100;

/// 根据 URL 和资源类型生成保存文件名
///
/// 同一输入总是得到同一结果，只有 URL 没有可用的路径段时才会退化为带时间戳的名字。
pub fn generate_filename(raw_url: &str, resource_type: ResourceType) -> String {
    let parsed = match Url::parse(raw_url) {
        Ok(url) => url,
        Err(_) => {
            return sanitize(&format!(
                "unknown_{}.{}",
                nano_timestamp(),
                resource_type.canonical_extension()
            ));
        }
    };

    let last_segment = parsed
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .unwrap_or("");
    let decoded = urlencoding::decode(last_segment)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| last_segment.to_string());

    let mut base_name = if decoded.is_empty() || decoded == "." || decoded == "/" {
        format!("resource_{}_{}", resource_type, nano_timestamp())
    } else {
        decoded
    };

    if extension(&base_name).is_none() {
        base_name.push('.');
        base_name.push_str(resource_type.canonical_extension());
    }

    sanitize(&base_name)
}

/// 清理文件名：只保留字母、数字、空格、`-`、`_`、`.`，其余替换为 `_`，并限制长度
pub fn sanitize(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| match c {
            ' ' | '-' | '_' | '.' => c,
            c if c.is_alphanumeric() => c,
            _ => '_',
        })
        .collect();

    if cleaned.chars().count() <= MAX_FILENAME_LEN {
        return cleaned;
    }

    // 超长时截断主干，保留扩展名
    match extension(&cleaned) {
        Some(ext) if ext.chars().count() < MAX_FILENAME_LEN => {
            let ext_len = ext.chars().count();
            let stem_len = cleaned.chars().count() - ext_len;
            let stem: String = cleaned
                .chars()
                .take(stem_len.min(MAX_FILENAME_LEN - ext_len))
                .collect();
            format!("{}{}", stem, ext)
        }
        _ => cleaned.chars().take(MAX_FILENAME_LEN).collect(),
    }
}

/// 扩展名（含点），最后一个点之后必须有内容
pub fn extension(name: &str) -> Option<&str> {
    let idx = name.rfind('.')?;
    if idx + 1 >= name.len() {
        return None;
    }
    Some(&name[idx..])
}

/// URL 路径最后一段的扩展名（不含点），忽略查询串和片段
pub fn url_extension(url: &Url) -> Option<String> {
    let last = url.path_segments()?.next_back()?;
    extension(last).map(|ext| ext[1..].to_ascii_lowercase())
}

pub fn destination_path(output_dir: &Path, resource_type: ResourceType, filename: &str) -> PathBuf {
    output_dir.join(resource_type.as_str()).join(filename)
}

fn nano_timestamp() -> i64 {
    let now = Utc::now();
    now.timestamp_nanos_opt()
        .unwrap_or_else(|| now.timestamp_micros() * 1000)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filename_from_last_segment() {
        assert_eq!(
            generate_filename("https://example.com/static/logo.png?v=3", ResourceType::Image),
            "logo.png"
        );
        assert_eq!(
            generate_filename("https://example.com/files/my%20report.pdf", ResourceType::Document),
            "my report.pdf"
        );
    }

    #[test]
    fn test_missing_extension_gets_canonical_one() {
        assert_eq!(
            generate_filename("https://example.com/styles/main", ResourceType::Style),
            "main.css"
        );
        assert_eq!(
            generate_filename("https://example.com/download", ResourceType::Binary),
            "download.exe"
        );
    }

    #[test]
    fn test_empty_path_synthesizes_name() {
        let name = generate_filename("https://example.com/", ResourceType::Video);
        assert!(name.starts_with("resource_video_"), "{}", name);
        assert!(name.ends_with(".mp4"), "{}", name);
    }

    #[test]
    fn test_sanitize_replaces_disallowed_characters() {
        assert_eq!(sanitize("a:b*c?.png"), "a_b_c_.png");
        assert_eq!(sanitize("图片 01-x_y.jpg"), "图片 01-x_y.jpg");
    }

    #[test]
    fn test_sanitize_caps_length_and_keeps_extension() {
        let long = format!("{}.jpeg", "x".repeat(150));
        let out = sanitize(&long);
        assert_eq!(out.chars().count(), MAX_FILENAME_LEN);
        assert!(out.ends_with(".jpeg"));
    }

    #[test]
    fn test_sanitize_is_idempotent() {
        let very_long = "y".repeat(300);
        let long_ext = format!("{}.{}", "a".repeat(90), "b".repeat(20));
        let samples = [
            "normal.png",
            "we/ird\\name?.css",
            "ünïcödé名前.js",
            "",
            ".hidden",
            very_long.as_str(),
            long_ext.as_str(),
        ];
        for s in samples {
            let once = sanitize(s);
            assert_eq!(sanitize(&once), once, "input: {}", s);
        }
    }

    #[test]
    fn test_url_extension_ignores_query() {
        let url = Url::parse("https://example.com/a/report.PDF?dl=1#top").unwrap();
        assert_eq!(url_extension(&url).as_deref(), Some("pdf"));
        let url = Url::parse("https://example.com/a/").unwrap();
        assert_eq!(url_extension(&url), None);
    }
}
