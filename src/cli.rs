use clap::Parser;
use res_downloader::ResourceType;
use std::path::PathBuf;

/// 网页资源下载器
#[derive(Parser, Debug)]
#[command(name = "resdl")]
#[command(version = "1.0")]
#[command(about = "嗅探网页中的图片、样式、脚本、音视频等资源并批量下载", long_about = None)]
pub struct Cli {
    /// 要嗅探的网页地址
    #[arg(long, value_name = "URL")]
    #[arg(value_hint = clap::ValueHint::Url)]
    #[arg(required_unless_present = "history")]
    pub url: Option<String>,

    /// 下载保存目录
    #[arg(long, value_name = "DIR")]
    #[arg(value_hint = clap::ValueHint::DirPath)]
    pub output_dir: Option<PathBuf>,

    /// 允许下载的资源类型，逗号分隔
    #[arg(long, value_name = "TYPES", value_delimiter = ',')]
    #[arg(help = "资源类型: image,video,audio,document,style,script,font，默认全部")]
    pub types: Vec<ResourceType>,

    /// 最大并发下载数
    #[arg(long, value_name = "N")]
    pub concurrency: Option<usize>,

    /// 失败后的重试次数
    #[arg(long, value_name = "N")]
    pub retries: Option<u32>,

    /// 请求超时（秒）
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// 配置文件
    #[arg(long, value_name = "FILE", default_value = "config.json")]
    #[arg(value_hint = clap::ValueHint::FilePath)]
    pub config: PathBuf,

    /// 下载历史文件
    #[arg(long, value_name = "FILE")]
    #[arg(value_hint = clap::ValueHint::FilePath)]
    pub history_file: Option<PathBuf>,

    /// 只列出资源，不下载
    #[arg(long)]
    pub preview: bool,

    /// 下载前用 HEAD 请求获取大小和修改时间
    #[arg(long)]
    pub probe: bool,

    /// 显示下载历史汇总
    #[arg(long)]
    pub history: bool,

    /// 输出调试日志
    #[arg(short, long)]
    pub verbose: bool,
}
