//! 分段装配：把成功分段按序交给外部 ffmpeg 做流复制合并。
//!
//! 合并是纯拷贝（`-c copy`），不做转码；ffmpeg 的诊断输出失败时原样
//! 透出。缺失的分段直接跳过，不补占位。

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::{debug, info};

use crate::base_system::config::Config;
use super::models::{FetchOutcome, FetchResult};

#[derive(Debug, thiserror::Error)]
pub(crate) enum MuxError {
    #[error("没有可合并的分段")]
    NoSegments,
    #[error("创建输出目录 {path} 失败: {source}")]
    CreateDir { path: PathBuf, source: io::Error },
    #[error("写合并列表失败: {0}")]
    WriteList(#[source] io::Error),
    #[error("启动 {program} 失败: {source}")]
    Spawn { program: String, source: io::Error },
    #[error("ffmpeg 合并失败（退出码 {code:?}）: {stderr}")]
    Mux { code: Option<i32>, stderr: String },
}

/// 成功分段按 index 升序排列；缺口直接省略。
pub(crate) fn ordered_artifacts(results: &HashMap<usize, FetchResult>) -> Vec<PathBuf> {
    let mut ok: Vec<(usize, &PathBuf)> = results
        .values()
        .filter_map(|r| match (&r.outcome, &r.artifact) {
            (FetchOutcome::Success, Some(path)) => Some((r.index, path)),
            _ => None,
        })
        .collect();
    ok.sort_unstable_by_key(|(index, _)| *index);
    ok.into_iter().map(|(_, path)| path.clone()).collect()
}

/// 调外部 ffmpeg 按 concat 列表合并到目标路径。干净退出即成功。
/// 分段产物与列表文件都在会话临时目录里，随会话一起删除。
pub(crate) fn assemble(
    config: &Config,
    results: &HashMap<usize, FetchResult>,
    work_dir: &Path,
    destination: &Path,
) -> Result<(), MuxError> {
    let artifacts = ordered_artifacts(results);
    if artifacts.is_empty() {
        return Err(MuxError::NoSegments);
    }

    if let Some(parent) = destination.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).map_err(|source| MuxError::CreateDir {
            path: parent.to_path_buf(),
            source,
        })?;
    }

    let concat_list = work_dir.join("concat_list.txt");
    let mut lines = String::new();
    for path in &artifacts {
        lines.push_str(&format!("file '{}'\n", path.display()));
    }
    fs::write(&concat_list, lines).map_err(MuxError::WriteList)?;

    info!(target: "assemble", segments = artifacts.len(), dest = %destination.display(), "开始合并分段");
    let output = Command::new(&config.ffmpeg_path)
        .args(["-f", "concat", "-safe", "0", "-i"])
        .arg(&concat_list)
        .args(["-c", "copy", "-bsf:a", "aac_adtstoasc"])
        .arg(destination)
        .args(["-y", "-v", "warning"])
        .output()
        .map_err(|source| MuxError::Spawn {
            program: config.ffmpeg_path.clone(),
            source,
        })?;

    // 列表文件随临时目录删除，这里仍显式清掉，避免 work_dir 复用时残留
    let _ = fs::remove_file(&concat_list);

    if output.status.success() {
        debug!(target: "assemble", "合并完成");
        Ok(())
    } else {
        Err(MuxError::Mux {
            code: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}
