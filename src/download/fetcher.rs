//! 单个分段的抓取：固定顺序的三级回退链。
//!
//! 1. 清单字节范围指令 → 对容器基地址发范围请求；
//! 2. 分段 URL 自带 r_range → 用该范围对基地址发范围请求；
//! 3. 整体请求分段 URL（绝对）或组装出的容器 URL（相对引用）。
//!
//! 206 与 200 都算满足（有些服务器无视 Range 直接回全量）；任一策略的
//! 非预期状态码、传输错误或超时都只是推进到下一策略，链走完即失败，
//! 不做重试也不回溯。

use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use reqwest::StatusCode;
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, RANGE};
use tracing::{debug, warn};

use crate::base_system::config::Config;
use super::models::{ByteRange, FetchResult, SegmentDescriptor, StreamTarget};
use super::range_url::{self, RangeDescriptor};

/// 回退链中的一步。
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Strategy {
    /// 范围请求容器基地址。
    Range(ByteRange),
    /// 整体请求给定 URL。
    Full(String),
}

pub(crate) struct SegmentFetcher {
    client: Client,
    base_url: String,
    range_type: Option<String>,
}

impl SegmentFetcher {
    /// 每个 worker 构建独立会话：转发头、超时都固定在构建时，worker 间
    /// 不共享连接与 cookie 状态。
    pub(crate) fn new(config: &Config, target: &StreamTarget) -> anyhow::Result<Self> {
        let mut headers = HeaderMap::new();
        for (name, value) in &target.headers {
            let Ok(name) = HeaderName::from_bytes(name.as_bytes()) else {
                continue;
            };
            let Ok(value) = HeaderValue::from_str(value) else {
                continue;
            };
            headers.insert(name, value);
        }

        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(config.request_timeout.max(1)))
            .connect_timeout(Duration::from_secs(config.connect_timeout.max(1)))
            .build()?;

        Ok(Self {
            client,
            base_url: target.base_url.clone(),
            range_type: target.range_type.clone(),
        })
    }

    /// 走完回退链并把成功的分段落盘；结果恰好写一次。
    pub(crate) fn fetch(&self, desc: &SegmentDescriptor, temp_dir: &Path) -> FetchResult {
        fetch_with(
            &self.base_url,
            self.range_type.as_deref(),
            desc,
            temp_dir,
            |strategy| match strategy {
                Strategy::Range(range) => self.request_range(&self.base_url, *range),
                Strategy::Full(url) => self.request_full(url),
            },
        )
    }

    /// 范围请求；206 或 200 返回响应体。
    pub(crate) fn request_range(&self, url: &str, range: ByteRange) -> Option<Vec<u8>> {
        let header = format!("bytes={}-{}", range.start, range.end);
        let resp = self.client.get(url).header(RANGE, header).send().ok()?;
        match resp.status() {
            StatusCode::PARTIAL_CONTENT | StatusCode::OK => {
                Some(resp.bytes().ok()?.to_vec())
            }
            status => {
                debug!(target: "fetch", %status, "范围请求未被满足");
                None
            }
        }
    }

    /// 整体请求。
    pub(crate) fn request_full(&self, url: &str) -> Option<Vec<u8>> {
        let resp = self.client.get(url).send().ok()?;
        let resp = resp.error_for_status().ok()?;
        Some(resp.bytes().ok()?.to_vec())
    }

    /// 整体请求，响应体分块写入 writer（大文件不整体进内存）。
    pub(crate) fn request_full_to<W: Write>(&self, url: &str, writer: &mut W) -> Option<u64> {
        let resp = self.client.get(url).send().ok()?;
        let mut resp = resp.error_for_status().ok()?;
        copy_body(&mut resp, writer).ok()
    }
}

/// 回退链执行骨架：策略尝试从外部注入，便于确定性测试。
pub(crate) fn fetch_with(
    base_url: &str,
    range_type: Option<&str>,
    desc: &SegmentDescriptor,
    temp_dir: &Path,
    attempt: impl Fn(&Strategy) -> Option<Vec<u8>>,
) -> FetchResult {
    let full_url = resolve_url(base_url, range_type, desc);
    for strategy in strategy_chain(desc, &full_url) {
        let Some(bytes) = attempt(&strategy) else {
            debug!(target: "fetch", index = desc.index, ?strategy, "策略失败，尝试下一个");
            continue;
        };

        let path = artifact_path(temp_dir, desc.index);
        return match fs::write(&path, &bytes) {
            Ok(()) => FetchResult::succeeded(desc.index, path),
            Err(err) => {
                warn!(target: "fetch", index = desc.index, error = %err, "分段落盘失败");
                FetchResult::failed(desc.index)
            }
        };
    }

    warn!(target: "fetch", index = desc.index, "回退链耗尽，分段抓取失败");
    FetchResult::failed(desc.index)
}

/// 分块拷贝响应体，返回总字节数。
pub(crate) fn copy_body<R: Read, W: Write>(reader: &mut R, writer: &mut W) -> io::Result<u64> {
    let mut buf = [0u8; 8192];
    let mut total = 0u64;
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        writer.write_all(&buf[..n])?;
        total += n as u64;
    }
    Ok(total)
}

/// 计算本分段实际会尝试的策略序列（纯函数，便于单测）。
pub(crate) fn strategy_chain(desc: &SegmentDescriptor, full_url: &str) -> Vec<Strategy> {
    let mut chain = Vec::with_capacity(3);
    if let Some(range) = desc.byte_range {
        chain.push(Strategy::Range(range));
    }
    if let Some(range) = range_url::extract(full_url).and_then(|d| d.range)
        && !chain.contains(&Strategy::Range(range))
    {
        chain.push(Strategy::Range(range));
    }
    chain.push(Strategy::Full(full_url.to_string()));
    chain
}

/// 绝对 URL 原样使用；相对引用按容器寻址参数组装。
pub(crate) fn resolve_url(
    base_url: &str,
    range_type: Option<&str>,
    desc: &SegmentDescriptor,
) -> String {
    if desc.url.starts_with("http://") || desc.url.starts_with("https://") {
        return desc.url.clone();
    }
    range_url::build(&RangeDescriptor {
        base_url: base_url.to_string(),
        file_id: desc.url.clone(),
        r_type: range_type.map(str::to_string),
        range: desc.byte_range,
    })
}

/// 分段产物文件名由 index 唯一决定。
pub(crate) fn artifact_path(temp_dir: &Path, index: usize) -> PathBuf {
    temp_dir.join(format!("segment_{index:04}.ts"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(index: usize, url: &str, byte_range: Option<ByteRange>) -> SegmentDescriptor {
        SegmentDescriptor {
            index,
            url: url.to_string(),
            duration: None,
            byte_range,
        }
    }

    const BASE: &str = "https://cdn.example.com/media/video.tar";

    #[test]
    fn manifest_range_leads_the_chain() {
        let desc = descriptor(1, "seg1.ts", ByteRange::new(0, 499));
        let full_url = resolve_url(BASE, None, &desc);
        let chain = strategy_chain(&desc, &full_url);
        assert_eq!(chain[0], Strategy::Range(ByteRange::new(0, 499).unwrap()));
        assert!(matches!(chain.last(), Some(Strategy::Full(_))));
    }

    #[test]
    fn url_embedded_range_is_used_when_manifest_range_absent() {
        // 清单没给范围，但分段 URL 自带 r_range=500-999：策略 1 直接跳过，
        // 策略 2 采用 URL 内嵌范围
        let url = format!("{BASE}?r_file=seg2.ts&r_range=500-999");
        let desc = descriptor(2, &url, None);
        let full_url = resolve_url(BASE, None, &desc);
        let chain = strategy_chain(&desc, &full_url);
        assert_eq!(
            chain,
            vec![
                Strategy::Range(ByteRange::new(500, 999).unwrap()),
                Strategy::Full(url),
            ]
        );
    }

    #[test]
    fn bare_relative_ref_falls_through_to_full_request() {
        let desc = descriptor(0, "seg0.ts", None);
        let full_url = resolve_url(BASE, Some("video/mp2t"), &desc);
        let chain = strategy_chain(&desc, &full_url);
        assert_eq!(chain.len(), 1);
        assert_eq!(chain[0], Strategy::Full(full_url.clone()));
        assert!(full_url.starts_with(BASE));
        assert!(full_url.contains("r_file=seg0.ts"));
        assert!(!full_url.contains("r_range"));
    }

    #[test]
    fn relative_ref_with_manifest_range_composes_range_into_url() {
        let desc = descriptor(3, "seg3.ts", ByteRange::new(100, 199));
        let full_url = resolve_url(BASE, None, &desc);
        assert!(full_url.contains("r_range=100-199"));
        // 组装 URL 与清单携带同一个范围，不重复入链
        let chain = strategy_chain(&desc, &full_url);
        assert_eq!(chain.len(), 2);
    }

    #[test]
    fn absolute_url_is_untouched() {
        let desc = descriptor(0, "https://other.example.com/a.ts", None);
        assert_eq!(
            resolve_url(BASE, None, &desc),
            "https://other.example.com/a.ts"
        );
    }

    #[test]
    fn refetching_a_segment_yields_the_same_outcome_class() {
        let dir = tempfile::tempdir().unwrap();
        let desc = descriptor(0, "seg0.ts", ByteRange::new(0, 3));
        let serve = |strategy: &Strategy| match strategy {
            Strategy::Range(range) if *range == ByteRange::new(0, 3).unwrap() => {
                Some(vec![1, 2, 3, 4])
            }
            _ => None,
        };

        let first = fetch_with(BASE, None, &desc, dir.path(), serve);
        let second = fetch_with(BASE, None, &desc, dir.path(), serve);
        assert!(first.is_success());
        assert!(second.is_success());
        assert_eq!(first.artifact, second.artifact);
        assert_eq!(fs::read(first.artifact.unwrap()).unwrap(), vec![1, 2, 3, 4]);

        // 确定性失败的分段重跑同样稳定
        let deny = |_: &Strategy| None;
        assert!(!fetch_with(BASE, None, &desc, dir.path(), deny).is_success());
        assert!(!fetch_with(BASE, None, &desc, dir.path(), deny).is_success());
    }

    #[test]
    fn body_copy_streams_in_chunks() {
        // 读端每次只吐一块，写端记录每次写入的大小：拷贝必须逐块推进，
        // 而不是攒出完整缓冲后一次写出
        struct ChunkReader {
            chunks: Vec<Vec<u8>>,
            pos: usize,
        }
        impl Read for ChunkReader {
            fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
                let Some(chunk) = self.chunks.get(self.pos) else {
                    return Ok(0);
                };
                let n = chunk.len().min(buf.len());
                buf[..n].copy_from_slice(&chunk[..n]);
                self.pos += 1;
                Ok(n)
            }
        }

        struct RecordingWriter {
            writes: Vec<usize>,
        }
        impl Write for RecordingWriter {
            fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
                self.writes.push(buf.len());
                Ok(buf.len())
            }
            fn flush(&mut self) -> io::Result<()> {
                Ok(())
            }
        }

        let mut reader = ChunkReader {
            chunks: vec![vec![0u8; 100], vec![0u8; 200], vec![0u8; 50]],
            pos: 0,
        };
        let mut writer = RecordingWriter { writes: Vec::new() };
        let total = copy_body(&mut reader, &mut writer).unwrap();
        assert_eq!(total, 350);
        assert_eq!(writer.writes, vec![100, 200, 50]);
    }

    #[test]
    fn chain_and_url_resolution_are_deterministic() {
        // 重复抓取同一分段走完全相同的策略序列
        let desc = descriptor(4, "seg4.ts", ByteRange::new(0, 99));
        let first_url = resolve_url(BASE, Some("video/mp2t"), &desc);
        let second_url = resolve_url(BASE, Some("video/mp2t"), &desc);
        assert_eq!(first_url, second_url);
        assert_eq!(
            strategy_chain(&desc, &first_url),
            strategy_chain(&desc, &second_url)
        );
    }

    #[test]
    fn artifact_path_is_keyed_by_index() {
        let dir = Path::new("/tmp/session");
        assert_eq!(
            artifact_path(dir, 7),
            Path::new("/tmp/session/segment_0007.ts")
        );
        assert_eq!(
            artifact_path(dir, 12345),
            Path::new("/tmp/session/segment_12345.ts")
        );
    }
}
