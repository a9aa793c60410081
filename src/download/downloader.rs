//! 下载主流程编排。
//!
//! 一次会话：取清单 → 解析分段 → 工作池并发抓取 → 统计 → 装配。
//! 分段级失败不致命（对应分段在结果表里标记失败、装配时跳过）；只有
//! 清单拿不到、零成功或 ffmpeg 合并失败才让整个会话失败。分段产物由
//! 会话临时目录持有，无论哪条退出路径都会被删除。

use std::path::Path;
use std::time::Instant;

use anyhow::{Context, Result, anyhow};
use tracing::{info, warn};

use crate::base_system::config::Config;
use super::assembler;
use super::fetcher::SegmentFetcher;
use super::manifest::parse_manifest;
use super::models::{DownloadReport, ProgressSnapshot, StreamTarget, TargetKind};
use super::progress::ProgressReporter;
use super::range_url;
use super::segment_pool;

/// 下载一个分段流并合并输出到 `destination`。
pub fn download_stream(
    config: &Config,
    target: &StreamTarget,
    destination: &Path,
    progress_cb: Option<Box<dyn FnMut(ProgressSnapshot) + Send>>,
) -> Result<DownloadReport> {
    let start = Instant::now();
    info!(target: "download", url = %target.source_url, kind = ?target.kind, "开始下载流");

    let session = SegmentFetcher::new(config, target).context("构建会话客户端失败")?;
    let manifest = fetch_manifest(&session, target)?;
    let descriptors = parse_manifest(&manifest);
    if descriptors.is_empty() {
        return Err(anyhow!("清单中没有分段: {}", target.source_url));
    }
    info!(
        target: "download",
        segments = descriptors.len(),
        workers = config.max_workers,
        "清单解析完成，开始并发抓取"
    );

    let temp_dir = tempfile::tempdir().context("创建会话临时目录失败")?;
    let mut reporter = ProgressReporter::new(descriptors.len(), progress_cb);
    let results = segment_pool::run(config, target, &descriptors, temp_dir.path(), &mut reporter);
    reporter.finish();

    let total = descriptors.len();
    let fetched = results.values().filter(|r| r.is_success()).count();
    if fetched < total {
        warn!(
            target: "download",
            fetched,
            total,
            "部分分段缺失，输出可能不完整"
        );
    }

    assembler::assemble(config, &results, temp_dir.path(), destination)
        .map_err(|err| anyhow!(err).context("分段合并失败"))?;
    // temp_dir 析构时连同分段产物一起删除

    info!(
        target: "download",
        fetched,
        total,
        elapsed = format!("{:.1}s", start.elapsed().as_secs_f32()),
        dest = %destination.display(),
        "下载完成"
    );
    Ok(DownloadReport { fetched, total })
}

/// 非分段目标（如直链 MP4）整文件直接落盘。
pub fn download_direct(config: &Config, target: &StreamTarget, destination: &Path) -> Result<()> {
    let start = Instant::now();
    info!(target: "download", url = %target.source_url, "整文件直接下载");

    if let Some(parent) = destination.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("创建输出目录失败: {}", parent.display()))?;
    }

    let session = SegmentFetcher::new(config, target).context("构建会话客户端失败")?;
    let mut file = std::fs::File::create(destination)
        .with_context(|| format!("创建输出文件失败: {}", destination.display()))?;
    // 响应体分块直写文件，整文件不过内存
    let bytes = session
        .request_full_to(&target.source_url, &mut file)
        .ok_or_else(|| anyhow!("下载失败: {}", target.source_url))?;

    info!(
        target: "download",
        bytes,
        elapsed = format!("{:.1}s", start.elapsed().as_secs_f32()),
        dest = %destination.display(),
        "下载完成"
    );
    Ok(())
}

/// 取清单文本。清单 URL 本身是范围寻址时优先按 r_range 发范围请求
/// （容器里 chunklist 也只是一个字节区间），失败再退回整体请求。
fn fetch_manifest(session: &SegmentFetcher, target: &StreamTarget) -> Result<String> {
    if target.kind == TargetKind::RangeAddressedContainer
        && let Some(range) = range_url::extract(&target.source_url).and_then(|d| d.range)
    {
        if let Some(bytes) = session.request_range(&target.base_url, range) {
            return Ok(String::from_utf8_lossy(&bytes).into_owned());
        }
        warn!(target: "download", %range, "按范围取清单失败，退回整体请求");
    }

    let bytes = session
        .request_full(&target.source_url)
        .ok_or_else(|| anyhow!("清单请求失败: {}", target.source_url))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}
