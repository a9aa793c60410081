//! 下载相关的数据模型定义。
//!
//! 包含流目标、字节范围、分段描述、抓取结果、进度快照等核心数据结构。

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// 流目标的寻址方式。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetKind {
    /// 标准清单：清单里每个分段有独立的 URL。
    StandardManifest,
    /// 范围寻址容器：所有分段通过字节范围从同一个物理资源取出。
    RangeAddressedContainer,
}

/// 一次下载会话的目标，由捕获协作方提供；创建后不可变。
#[derive(Debug, Clone)]
pub struct StreamTarget {
    pub source_url: String,
    pub kind: TargetKind,
    /// 容器基地址（scheme://host/path，不含查询串），相对分段引用据此组装。
    pub base_url: String,
    /// 容器 URL 携带的 r_type，组装分段 URL 时透传；缺省见 range_url。
    pub range_type: Option<String>,
    /// 仅保留 user-agent / referer / cookie / origin 四类捕获请求头。
    pub headers: Vec<(String, String)>,
}

/// 闭区间字节范围，保证 start <= end。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

#[derive(Debug, thiserror::Error)]
#[error("invalid byte range: {0}")]
pub struct ByteRangeParseError(String);

impl ByteRange {
    pub fn new(start: u64, end: u64) -> Option<Self> {
        if start <= end {
            Some(Self { start, end })
        } else {
            None
        }
    }

    /// `size@offset` 指令换算：offset ..= offset+size-1。size 为 0 时无意义。
    pub fn from_size_at(size: u64, offset: u64) -> Option<Self> {
        if size == 0 {
            return None;
        }
        Some(Self {
            start: offset,
            end: offset.checked_add(size - 1)?,
        })
    }
}

impl fmt::Display for ByteRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

impl FromStr for ByteRange {
    type Err = ByteRangeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ByteRangeParseError(s.to_string());
        let (start, end) = s.split_once('-').ok_or_else(err)?;
        let start: u64 = start.trim().parse().map_err(|_| err())?;
        let end: u64 = end.trim().parse().map_err(|_| err())?;
        ByteRange::new(start, end).ok_or_else(err)
    }
}

/// 清单中的一个分段。`index` 从 0 开始、连续，与清单顺序一致。
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentDescriptor {
    pub index: usize,
    /// 绝对 URL，或相对容器基地址的分段引用。
    pub url: String,
    pub duration: Option<f64>,
    /// 来自 #EXT-X-BYTERANGE 指令；只有 size 没有 offset 时保持 None。
    pub byte_range: Option<ByteRange>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    Success,
    Failure,
}

/// 每个提交的抓取任务恰好产生一个结果，由完成它的 worker 写入一次。
#[derive(Debug, Clone)]
pub struct FetchResult {
    pub index: usize,
    pub artifact: Option<PathBuf>,
    pub outcome: FetchOutcome,
}

impl FetchResult {
    pub fn succeeded(index: usize, artifact: PathBuf) -> Self {
        Self {
            index,
            artifact: Some(artifact),
            outcome: FetchOutcome::Success,
        }
    }

    pub fn failed(index: usize) -> Self {
        Self {
            index,
            artifact: None,
            outcome: FetchOutcome::Failure,
        }
    }

    pub fn is_success(&self) -> bool {
        self.outcome == FetchOutcome::Success
    }
}

/// 面向调用方的结果统计：成功抓取数 / 清单总分段数。
#[derive(Debug, Default, Clone, Copy)]
pub struct DownloadReport {
    pub fetched: usize,
    pub total: usize,
}

#[derive(Debug, Clone, Copy, Default, serde::Serialize, serde::Deserialize)]
pub struct ProgressSnapshot {
    pub completed: usize,
    pub total: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn byte_range_display_parse_roundtrip() {
        let range = ByteRange::new(2000, 2999).unwrap();
        assert_eq!(range.to_string(), "2000-2999");
        assert_eq!("2000-2999".parse::<ByteRange>().unwrap(), range);
    }

    #[test]
    fn byte_range_rejects_inverted_and_garbage() {
        assert!("999-0".parse::<ByteRange>().is_err());
        assert!("abc-def".parse::<ByteRange>().is_err());
        assert!("12345".parse::<ByteRange>().is_err());
        assert!(ByteRange::new(10, 9).is_none());
    }

    #[test]
    fn byte_range_from_size_at() {
        assert_eq!(
            ByteRange::from_size_at(1000, 2000),
            ByteRange::new(2000, 2999)
        );
        assert_eq!(ByteRange::from_size_at(1, 0), ByteRange::new(0, 0));
        assert!(ByteRange::from_size_at(0, 42).is_none());
    }
}
