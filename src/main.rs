//! 分段媒体下载器。
//!
//! 输入一条捕获到的媒体 URL（普通 m3u8 清单、范围寻址的容器 chunklist
//! 或直链文件），并发抓取全部分段后用 ffmpeg 合并输出。
//!
//! 代码结构（读代码入口）：
//! - `base_system`：配置/日志等基础设施
//! - `capture`：捕获请求的目标挑选与请求头过滤
//! - `download`：分类、清单解析、工作池抓取与装配

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::Parser;
use tracing::info;

mod base_system;
mod capture;
mod download;

use base_system::config::{self, Config};
use base_system::logging::{LogOptions, LogSystem};
use download::downloader;
use download::models::TargetKind;

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Parser)]
#[command(name = "media-stream-downloader")]
#[command(about = "Segmented media stream downloader")]
struct Cli {
    /// 捕获到的媒体 URL（m3u8 清单、范围寻址容器或直链文件）；
    /// 传 `-` 时从标准输入逐行读捕获记录并自动挑选目标
    url: String,

    /// 输出文件路径（相对路径以配置里的 save_path 为根）
    output: PathBuf,

    /// 启用调试日志输出
    #[arg(long, default_value_t = false)]
    debug: bool,

    /// 覆盖配置中的并发线程数
    #[arg(long)]
    workers: Option<usize>,

    /// 请求携带的 User-Agent（缺省用配置值）
    #[arg(long)]
    user_agent: Option<String>,

    /// 请求携带的 Referer
    #[arg(long)]
    referer: Option<String>,

    /// 请求携带的 Cookie
    #[arg(long)]
    cookie: Option<String>,

    /// 请求携带的 Origin
    #[arg(long)]
    origin: Option<String>,

    /// 数据目录路径（存放 config.yml 和 logs，方便 Docker 挂载）
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// 显示版本信息后退出
    #[arg(long, default_value_t = false)]
    version: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.version {
        println!("media-stream-downloader v{VERSION}");
        return Ok(());
    }

    let data_dir = cli.data_dir.as_deref();
    let _log = LogSystem::init(
        LogOptions {
            debug: cli.debug,
            // 进度条占用 stderr，控制台日志只在调试时打开
            console: cli.debug,
            ..LogOptions::default()
        },
        data_dir,
    )?;
    info!(target: "startup", "当前版本: v{VERSION}");

    let mut config = config::load_or_create(data_dir)?;
    if let Some(workers) = cli.workers {
        config.max_workers = workers.max(1);
    }

    let mut headers: HashMap<String, String> = HashMap::new();
    headers.insert(
        "user-agent".to_string(),
        cli.user_agent.unwrap_or_else(|| config.user_agent.clone()),
    );
    if let Some(referer) = cli.referer {
        headers.insert("referer".to_string(), referer);
    }
    if let Some(cookie) = cli.cookie {
        headers.insert("cookie".to_string(), cookie);
    }
    if let Some(origin) = cli.origin {
        headers.insert("origin".to_string(), origin);
    }

    let target = if cli.url == "-" {
        read_captured_target(&headers)?
    } else {
        capture::stream_target_from(&cli.url, &headers)
    };
    let destination = resolve_destination(&config, &cli.output);

    if target.kind == TargetKind::StandardManifest && !capture::looks_like_manifest(&target.source_url)
    {
        downloader::download_direct(&config, &target, &destination)?;
        println!("下载完成: {}", destination.display());
        return Ok(());
    }

    let report = downloader::download_stream(&config, &target, &destination, None)?;
    println!(
        "下载完成: {} ({}/{} 分段)",
        destination.display(),
        report.fetched,
        report.total
    );
    Ok(())
}

/// 标准输入逐行读捕获到的 URL，全部入队后按优先级挑选下载目标。
fn read_captured_target(headers: &HashMap<String, String>) -> Result<download::models::StreamTarget> {
    use std::io::BufRead;

    let queue = capture::TargetQueue::new();
    let tx = queue.sender();
    for line in std::io::stdin().lock().lines() {
        let line = line?;
        let url = line.trim();
        if url.is_empty() {
            continue;
        }
        let _ = tx.send(capture::CapturedRequest {
            url: url.to_string(),
            headers: headers.clone(),
        });
    }

    let captured = queue.drain();
    capture::pick_stream_target(&captured)
        .ok_or_else(|| anyhow::anyhow!("捕获记录里没有可下载的媒体 URL"))
}

/// 相对输出路径以配置 save_path 为根；绝对路径原样使用。
fn resolve_destination(config: &Config, output: &Path) -> PathBuf {
    if output.is_absolute() || config.save_path.is_empty() {
        output.to_path_buf()
    } else {
        Path::new(&config.save_path).join(output)
    }
}
