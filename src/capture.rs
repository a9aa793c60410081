//! 捕获协作：接收外部探测到的媒体请求并挑出下载目标。
//!
//! 捕获方（浏览器扩展、抓包代理或命令行直接给 URL）只负责把 URL 和
//! 请求头送进来；这里做媒体判定、目标挑选和请求头白名单过滤，产出
//! 下载会话的 `StreamTarget`。

use std::collections::HashMap;

use crossbeam_channel as channel;

use crate::download::classify::classify;
use crate::download::models::{StreamTarget, TargetKind};
use crate::download::range_url;

/// 透传给下载会话的捕获请求头白名单（小写比较）。
pub const FORWARDED_HEADERS: [&str; 4] = ["user-agent", "referer", "cookie", "origin"];

/// 判定媒体 URL 的标记子串。
pub const MEDIA_MARKERS: [&str; 5] = [".ts", ".m3u8", ".mp4", ".m4s", ".tar"];

/// 捕获方送来的一次请求记录。
#[derive(Debug, Clone)]
pub struct CapturedRequest {
    pub url: String,
    pub headers: HashMap<String, String>,
}

/// 捕获请求的入队通道。发送端交给捕获方，下载侧在决定目标前一次性
/// 排干队列。
pub struct TargetQueue {
    tx: channel::Sender<CapturedRequest>,
    rx: channel::Receiver<CapturedRequest>,
}

impl TargetQueue {
    pub fn new() -> Self {
        let (tx, rx) = channel::unbounded();
        Self { tx, rx }
    }

    pub fn sender(&self) -> channel::Sender<CapturedRequest> {
        self.tx.clone()
    }

    /// 取出目前积压的全部捕获记录，保持到达顺序。
    pub fn drain(&self) -> Vec<CapturedRequest> {
        self.rx.try_iter().collect()
    }
}

impl Default for TargetQueue {
    fn default() -> Self {
        Self::new()
    }
}

/// 捕获请求头按白名单过滤，键统一小写。
pub fn forwarded_headers(headers: &HashMap<String, String>) -> Vec<(String, String)> {
    let mut forwarded = Vec::new();
    for name in FORWARDED_HEADERS {
        if let Some((_, value)) = headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
        {
            forwarded.push((name.to_string(), value.clone()));
        }
    }
    forwarded
}

pub fn is_media_url(url: &str) -> bool {
    MEDIA_MARKERS.iter().any(|marker| url.contains(marker))
}

/// 标准清单目标里，URL 含 .m3u8 的走分段流程，其余按直链整文件下载。
pub fn looks_like_manifest(url: &str) -> bool {
    url.contains(".m3u8")
}

/// 从捕获到的 URL 和请求头构造下载目标。
pub fn stream_target_from(url: &str, headers: &HashMap<String, String>) -> StreamTarget {
    let kind = classify(url);
    let (base_url, range_type) = match kind {
        TargetKind::RangeAddressedContainer => {
            // classify 已验证过 extract 必然成功
            match range_url::extract(url) {
                Some(desc) => (desc.base_url, desc.r_type),
                None => (range_url::base_of_str(url), None),
            }
        }
        TargetKind::StandardManifest => (range_url::base_of_str(url), None),
    };

    StreamTarget {
        source_url: url.to_string(),
        kind,
        base_url,
        range_type,
        headers: forwarded_headers(headers),
    }
}

/// 多条捕获记录里挑下载目标：第一条范围寻址的 chunklist 优先，其次
/// 第一条普通 .m3u8 清单（chunklist URL 不算），都没有就取最后一条
/// 媒体请求。
pub fn pick_stream_target(captured: &[CapturedRequest]) -> Option<StreamTarget> {
    let media: Vec<&CapturedRequest> = captured
        .iter()
        .filter(|req| is_media_url(&req.url))
        .collect();

    let best = media
        .iter()
        .find(|req| {
            classify(&req.url) == TargetKind::RangeAddressedContainer
                && req.url.contains("chunklist")
        })
        .or_else(|| {
            media
                .iter()
                .find(|req| req.url.contains(".m3u8") && !req.url.contains("chunklist"))
        })
        .or_else(|| media.last())?;

    Some(stream_target_from(&best.url, &best.headers))
}
