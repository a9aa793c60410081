//! 范围寻址 URL 的查询参数编解码（r_file / r_type / r_range）。
//!
//! `extract` 从捕获到的容器 URL 还原寻址信息，`build` 把分段引用组装回
//! 完整请求 URL；字段齐全时两者满足往返一致。

use url::Url;

use super::models::ByteRange;

/// r_type 缺省值：MPEG-TS 分段。
pub(crate) const DEFAULT_RANGE_TYPE: &str = "video/mp2t";

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct RangeDescriptor {
    /// scheme://host[:port]/path，不含查询串。
    pub base_url: String,
    pub file_id: String,
    pub r_type: Option<String>,
    pub range: Option<ByteRange>,
}

/// 解析容器 URL。r_file 与可解析的 r_range 缺一即返回 None；r_type 可选。
pub(crate) fn extract(url: &str) -> Option<RangeDescriptor> {
    let parsed = Url::parse(url).ok()?;

    let mut file_id = None;
    let mut r_type = None;
    let mut r_range = None;
    for (key, value) in parsed.query_pairs() {
        match key.as_ref() {
            "r_file" => file_id = Some(value.into_owned()),
            "r_type" => r_type = Some(value.into_owned()),
            "r_range" => r_range = Some(value.into_owned()),
            _ => {}
        }
    }

    let file_id = file_id.filter(|s| !s.is_empty())?;
    let range: ByteRange = r_range?.parse().ok()?;

    Some(RangeDescriptor {
        base_url: base_of(&parsed),
        file_id,
        r_type,
        range: Some(range),
    })
}

/// 组装完整容器 URL；各参数值做百分号编码，无范围时省略 r_range。
pub(crate) fn build(desc: &RangeDescriptor) -> String {
    let r_type = desc
        .r_type
        .as_deref()
        .filter(|s| !s.is_empty())
        .unwrap_or(DEFAULT_RANGE_TYPE);

    let mut params = vec![
        format!("r_file={}", urlencoding::encode(&desc.file_id)),
        format!("r_type={}", urlencoding::encode(r_type)),
    ];
    if let Some(range) = desc.range {
        params.push(format!("r_range={}", urlencoding::encode(&range.to_string())));
    }
    format!("{}?{}", desc.base_url, params.join("&"))
}

fn base_of(url: &Url) -> String {
    let mut base = format!("{}://", url.scheme());
    if let Some(host) = url.host_str() {
        base.push_str(host);
    }
    if let Some(port) = url.port() {
        base.push_str(&format!(":{port}"));
    }
    base.push_str(url.path());
    base
}

/// 任意 URL 的基地址；解析失败时退化为截掉查询串。
pub(crate) fn base_of_str(url: &str) -> String {
    match Url::parse(url) {
        Ok(parsed) => base_of(&parsed),
        Err(_) => url.split('?').next().unwrap_or(url).to_string(),
    }
}
