//! URL 分类器：判定目标使用范围寻址容器语义还是标准清单语义。

use url::Url;

use super::models::TargetKind;
use super::range_url;

/// 判定寻址方式。只有路径形态（`.tar` 容器）与 r_file / r_range 两个必要
/// 参数同时解析成功才是范围寻址容器；任何缺失或解析失败都回落到标准清单
/// 这个安全默认，本函数不会失败。
pub(crate) fn classify(url: &str) -> TargetKind {
    let Ok(parsed) = Url::parse(url) else {
        return TargetKind::StandardManifest;
    };
    if !parsed.path().ends_with(".tar") {
        return TargetKind::StandardManifest;
    }
    if range_url::extract(url).is_some() {
        TargetKind::RangeAddressedContainer
    } else {
        TargetKind::StandardManifest
    }
}
