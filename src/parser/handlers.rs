use std::collections::HashMap;

use lazy_static::lazy_static;
use scraper::ElementRef;

use crate::downloader::models::ResourceType;

/// 引用的分类方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classify {
    /// 类型由标签决定
    Fixed(ResourceType),
    /// iframe/frame/embed/object：HTML 页面或文档
    Frame,
    /// a 标签：HTML 页面或按扩展名查表，其余忽略
    Anchor,
}

/// 元素上发现的一个原始引用
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Candidate<'a> {
    pub raw: &'a str,
    pub classify: Classify,
}

impl<'a> Candidate<'a> {
    fn new(raw: &'a str, classify: Classify) -> Self {
        Self { raw, classify }
    }
}

pub type Handler = for<'a> fn(&ElementRef<'a>) -> Option<Candidate<'a>>;

lazy_static! {
    // 标签名 -> 处理函数
    static ref HANDLERS: HashMap<&'static str, Handler> = {
        let mut m: HashMap<&'static str, Handler> = HashMap::new();
        m.insert("img", image as Handler);
        m.insert("image", image as Handler);
        m.insert("script", script as Handler);
        m.insert("link", link as Handler);
        m.insert("video", media as Handler);
        m.insert("audio", media as Handler);
        m.insert("source", source as Handler);
        m.insert("iframe", frame as Handler);
        m.insert("frame", frame as Handler);
        m.insert("embed", frame as Handler);
        m.insert("object", frame as Handler);
        m.insert("a", anchor as Handler);
        m
    };
}

pub fn handler_for(name: &str) -> Option<Handler> {
    HANDLERS.get(name).copied()
}

fn attr<'a>(el: &ElementRef<'a>, name: &str) -> Option<&'a str> {
    el.value()
        .attr(name)
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

fn media_type(name: &str) -> Option<ResourceType> {
    match name {
        "video" => Some(ResourceType::Video),
        "audio" => Some(ResourceType::Audio),
        _ => None,
    }
}

fn image<'a>(el: &ElementRef<'a>) -> Option<Candidate<'a>> {
    attr(el, "src").map(|src| Candidate::new(src, Classify::Fixed(ResourceType::Image)))
}

fn script<'a>(el: &ElementRef<'a>) -> Option<Candidate<'a>> {
    attr(el, "src").map(|src| Candidate::new(src, Classify::Fixed(ResourceType::Script)))
}

fn link<'a>(el: &ElementRef<'a>) -> Option<Candidate<'a>> {
    let rel = el.value().attr("rel")?.trim().to_ascii_lowercase();
    let resource_type = if rel == "stylesheet" {
        ResourceType::Style
    } else if rel.contains("icon") {
        ResourceType::Image
    } else {
        return None;
    };
    attr(el, "href").map(|href| Candidate::new(href, Classify::Fixed(resource_type)))
}

// 没有 src 时取第一个 source 子元素
fn media<'a>(el: &ElementRef<'a>) -> Option<Candidate<'a>> {
    let resource_type = media_type(el.value().name())?;
    let src = attr(el, "src").or_else(|| {
        el.children()
            .filter_map(ElementRef::wrap)
            .find(|child| child.value().name() == "source")
            .and_then(|child| attr(&child, "src"))
    })?;
    Some(Candidate::new(src, Classify::Fixed(resource_type)))
}

fn source<'a>(el: &ElementRef<'a>) -> Option<Candidate<'a>> {
    let parent = el.parent().and_then(ElementRef::wrap)?;
    let resource_type = media_type(parent.value().name())?;
    attr(el, "src").map(|src| Candidate::new(src, Classify::Fixed(resource_type)))
}

fn frame<'a>(el: &ElementRef<'a>) -> Option<Candidate<'a>> {
    attr(el, "src")
        .or_else(|| attr(el, "data"))
        .map(|target| Candidate::new(target, Classify::Frame))
}

fn anchor<'a>(el: &ElementRef<'a>) -> Option<Candidate<'a>> {
    attr(el, "href").map(|href| Candidate::new(href, Classify::Anchor))
}
