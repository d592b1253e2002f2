use lazy_static::lazy_static;
use regex::Regex;
use url::Url;

use super::errors::ResolveError;

lazy_static! {
    // url("a.png") / url('a.png') / url(a.png)
    static ref CSS_URL: Regex =
        Regex::new(r#"(?i)url\(\s*(?:"([^"]*)"|'([^']*)'|([^)"'\s][^)]*?))\s*\)"#).unwrap();
}

/// 把页面中的引用解析为绝对地址，去掉片段
pub fn resolve_url(base: &Url, raw: &str) -> Result<Url, ResolveError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(ResolveError::Empty);
    }
    if raw
        .get(..5)
        .is_some_and(|scheme| scheme.eq_ignore_ascii_case("data:"))
    {
        return Err(ResolveError::DataUrl);
    }

    let mut url = base.join(raw)?;
    match url.scheme() {
        "http" | "https" => {}
        other => return Err(ResolveError::UnsupportedScheme(other.to_string())),
    }
    url.set_fragment(None);
    Ok(url)
}

/// 提取 CSS 片段中所有 url(...) 引用
pub fn extract_css_urls(css: &str) -> Vec<&str> {
    CSS_URL
        .captures_iter(css)
        .filter_map(|caps| caps.get(1).or_else(|| caps.get(2)).or_else(|| caps.get(3)))
        .map(|m| m.as_str().trim())
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("https://example.com/blog/post.html").unwrap()
    }

    #[test]
    fn test_resolve_relative_and_absolute() {
        assert_eq!(
            resolve_url(&base(), "img/a.png").unwrap().as_str(),
            "https://example.com/blog/img/a.png"
        );
        assert_eq!(
            resolve_url(&base(), "/a.png").unwrap().as_str(),
            "https://example.com/a.png"
        );
        assert_eq!(
            resolve_url(&base(), "//cdn.example.org/x.js").unwrap().as_str(),
            "https://cdn.example.org/x.js"
        );
    }

    #[test]
    fn test_resolve_strips_fragment() {
        assert_eq!(
            resolve_url(&base(), "doc.pdf?x=1#page=2").unwrap().as_str(),
            "https://example.com/blog/doc.pdf?x=1"
        );
    }

    #[test]
    fn test_resolve_rejects_data_and_other_schemes() {
        assert_eq!(
            resolve_url(&base(), "DATA:image/png;base64,AAAA"),
            Err(ResolveError::DataUrl)
        );
        assert_eq!(
            resolve_url(&base(), "javascript:void(0)"),
            Err(ResolveError::UnsupportedScheme("javascript".to_string()))
        );
        assert_eq!(
            resolve_url(&base(), "mailto:a@b.c"),
            Err(ResolveError::UnsupportedScheme("mailto".to_string()))
        );
        assert_eq!(resolve_url(&base(), "   "), Err(ResolveError::Empty));
    }

    #[test]
    fn test_extract_css_urls() {
        let css = r#"background:url('x.png'); border-image: URL("b.svg") ; mask: url( c.webp )"#;
        assert_eq!(extract_css_urls(css), vec!["x.png", "b.svg", "c.webp"]);
        assert!(extract_css_urls("color: red").is_empty());
        assert!(extract_css_urls("background: url('')").is_empty());
    }
}
