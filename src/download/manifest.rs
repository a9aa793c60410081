//! 分段清单解析：把播放列表文本转成有序的分段描述。

use super::models::{ByteRange, SegmentDescriptor};

/// 逐行扫描清单。`#EXT-X-BYTERANGE` 与 `#EXTINF` 指令携带的元数据作用于
/// 下一条数据行；其余 `#` 行是注释，空行忽略。每条非注释数据行产生一个
/// 分段，`index` 按出现顺序分配；文件末尾悬空的指令直接丢弃。
pub(crate) fn parse_manifest(text: &str) -> Vec<SegmentDescriptor> {
    let mut segments = Vec::new();
    let mut pending_duration: Option<f64> = None;
    let mut pending_range: Option<ByteRange> = None;

    for raw in text.lines() {
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(rest) = line.strip_prefix("#EXT-X-BYTERANGE:") {
            // 只给 size 不给 @offset 时，偏移无法脱离上下文求出；
            // 保持未解析，让 fetcher 走后续回退策略。
            pending_range = parse_byterange(rest);
            continue;
        }
        if let Some(rest) = line.strip_prefix("#EXTINF:") {
            pending_duration = rest
                .split(',')
                .next()
                .and_then(|s| s.trim().parse::<f64>().ok());
            continue;
        }
        if line.starts_with('#') {
            continue;
        }

        segments.push(SegmentDescriptor {
            index: segments.len(),
            url: line.to_string(),
            duration: pending_duration.take(),
            byte_range: pending_range.take(),
        });
    }

    segments
}

fn parse_byterange(rest: &str) -> Option<ByteRange> {
    let (size, offset) = rest.trim().split_once('@')?;
    let size: u64 = size.trim().parse().ok()?;
    let offset: u64 = offset.trim().parse().ok()?;
    ByteRange::from_size_at(size, offset)
}
